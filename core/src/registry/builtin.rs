//! The built-in check battery.
//!
//! Scripts are read-only queries; their objects are serialized to JSON by the
//! transport. Order here is report order.

use fleetcheck_common::config::CheckScope;

use super::ScriptCheck;

pub(super) const NAMES: [&str; 8] = [
    "uptime",
    "disk-space",
    "pending-reboot",
    "hotfixes",
    "update-history",
    "directory-services",
    "replication-backlog",
    "time-sync",
];

const UPTIME: &str = "\
$os = Get-CimInstance -ClassName Win32_OperatingSystem; \
[pscustomobject]@{ \
  LastBoot = $os.LastBootUpTime.ToString('o'); \
  UptimeHours = [math]::Round(((Get-Date) - $os.LastBootUpTime).TotalHours, 1) }";

const DISK_SPACE: &str = "\
Get-CimInstance -ClassName Win32_LogicalDisk -Filter 'DriveType=3' | \
ForEach-Object { [pscustomobject]@{ \
  Drive = $_.DeviceID; \
  SizeGB = [math]::Round($_.Size / 1GB, 1); \
  FreeGB = [math]::Round($_.FreeSpace / 1GB, 1); \
  FreePercent = [math]::Round(100 * $_.FreeSpace / $_.Size, 1) } }";

const PENDING_REBOOT: &str = "\
[pscustomobject]@{ \
  ComponentServicing = Test-Path 'HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\Component Based Servicing\\RebootPending'; \
  WindowsUpdate = Test-Path 'HKLM:\\SOFTWARE\\Microsoft\\Windows\\CurrentVersion\\WindowsUpdate\\Auto Update\\RebootRequired'; \
  FileRename = $null -ne (Get-ItemProperty 'HKLM:\\SYSTEM\\CurrentControlSet\\Control\\Session Manager' -Name PendingFileRenameOperations -ErrorAction SilentlyContinue) }";

const HOTFIXES: &str = "\
Get-HotFix | Sort-Object InstalledOn -Descending | Select-Object -First 5 | \
ForEach-Object { [pscustomobject]@{ Id = $_.HotFixID; InstalledOn = \"$($_.InstalledOn)\" } }";

const UPDATE_HISTORY: &str = "\
$searcher = (New-Object -ComObject Microsoft.Update.Session).CreateUpdateSearcher(); \
$count = $searcher.GetTotalHistoryCount(); \
if ($count -gt 0) { $searcher.QueryHistory(0, [math]::Min($count, 5)) | \
ForEach-Object { [pscustomobject]@{ Title = $_.Title; Date = $_.Date.ToString('o'); Result = $_.ResultCode } } }";

const DIRECTORY_SERVICES: &str = "\
Get-Service -Name NTDS, ADWS, DNS, DFSR, KDC, Netlogon, W32Time -ErrorAction SilentlyContinue | \
ForEach-Object { [pscustomobject]@{ Name = $_.Name; Status = \"$($_.Status)\"; StartType = \"$($_.StartType)\" } }";

const REPLICATION_BACKLOG: &str = "\
Get-CimInstance -Namespace root/MicrosoftDfs -ClassName DfsrReplicatedFolderInfo | \
ForEach-Object { [pscustomobject]@{ Folder = $_.ReplicatedFolderName; Group = $_.ReplicationGroupName; State = $_.State } }";

const TIME_SYNC: &str = "\
$status = w32tm /query /status; \
[pscustomobject]@{ Source = ($status | Select-String 'Source:').ToString().Split(':', 2)[1].Trim(); \
  LastSync = ($status | Select-String 'Last Successful Sync Time:').ToString().Split(':', 2)[1].Trim() }";

pub(super) fn battery() -> Vec<ScriptCheck> {
    let scripts = [
        (UPTIME, CheckScope::All),
        (DISK_SPACE, CheckScope::All),
        (PENDING_REBOOT, CheckScope::All),
        (HOTFIXES, CheckScope::All),
        (UPDATE_HISTORY, CheckScope::FullInstallation),
        (DIRECTORY_SERVICES, CheckScope::RoleHolders),
        (REPLICATION_BACKLOG, CheckScope::RoleHolders),
        (TIME_SYNC, CheckScope::All),
    ];

    NAMES
        .iter()
        .zip(scripts)
        .map(|(name, (script, scope))| ScriptCheck::new(*name, script, scope))
        .collect()
}
