use colored::Color;

pub const PRIMARY: Color = Color::TrueColor { r: 120, g: 200, b: 255 };
pub const ACCENT: Color = Color::TrueColor { r: 255, g: 200, b: 90 };
pub const SEPARATOR: Color = Color::TrueColor { r: 110, g: 110, b: 110 };
pub const TEXT_DEFAULT: Color = Color::TrueColor { r: 220, g: 220, b: 220 };
pub const OK: Color = Color::TrueColor { r: 90, g: 220, b: 120 };
pub const SKIPPED: Color = Color::TrueColor { r: 150, g: 150, b: 170 };
pub const FAILED: Color = Color::TrueColor { r: 255, g: 95, b: 95 };
pub const WARNING: Color = Color::TrueColor { r: 255, g: 170, b: 60 };
