#![cfg(test)]

mod fleet;
mod util;
