//! Bootable installer media.
//!
//! Erasing a disk is irreversible, so every step here is critical: the
//! identifier is validated, the disk is inspected with `diskutil info`, and
//! internal or boot disks are refused before anything is written.

use super::Context;
use crate::apply::ApplyTracker;
use crate::error::{DiskError, Result};
use crate::host::Capability;
use crate::process::{CommandRunner, CommandSpec, IoMode};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Capabilities `usb` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Elevated,
];

/// Installer search patterns, most specific first
pub const INSTALLER_PATTERNS: &[&str] = &["/Applications/Install macOS*.app"];

static DISK_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:/dev/)?(disk[0-9]+)$").expect("disk identifier pattern is valid")
});

/// Accept `diskN` or `/dev/diskN` (whole disks only) and return `diskN`
pub fn validate_disk_identifier(identifier: &str) -> std::result::Result<String, DiskError> {
    DISK_IDENTIFIER
        .captures(identifier.trim())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| DiskError::InvalidIdentifier {
            identifier: identifier.to_string(),
        })
}

/// Volume names become `/Volumes/<name>`
pub fn validate_volume_name(name: &str) -> std::result::Result<String, DiskError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.contains(['/', ':']) || trimmed.starts_with('.') {
        return Err(DiskError::InvalidVolumeName {
            name: name.to_string(),
        });
    }
    Ok(trimmed.to_string())
}

/// The subset of `diskutil info -plist` macprov cares about
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DiskInfo {
    /// e.g. `disk4`
    pub device_identifier: String,
    /// Human-readable media name
    pub media_name: String,
    /// Built into the machine
    pub internal: bool,
    /// Can be ejected
    pub ejectable: bool,
    /// Whole disk rather than a partition
    pub whole_disk: bool,
    /// Parent whole disk (for partitions and volumes)
    pub parent_whole_disk: String,
    /// Size in bytes
    pub total_size: u64,
    /// Physical stores backing an APFS container
    #[serde(rename = "APFSPhysicalStores")]
    pub apfs_physical_stores: Vec<PhysicalStore>,
}

/// One entry of `APFSPhysicalStores`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PhysicalStore {
    /// Partition holding the container, e.g. `disk0s2`
    #[serde(rename = "APFSPhysicalStore")]
    pub identifier: String,
}

static WHOLE_DISK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(disk[0-9]+)").expect("whole disk pattern is valid"));

impl DiskInfo {
    /// Parse `diskutil info -plist` output
    pub fn from_plist(bytes: &[u8]) -> Result<Self> {
        Ok(plist::from_bytes(bytes)?)
    }

    /// Whole disks this volume lives on.
    ///
    /// On APFS the parent is a synthesized container disk, so the physical
    /// stores behind it are included too.
    pub fn backing_disks(&self) -> Vec<String> {
        std::iter::once(self.parent_whole_disk.as_str())
            .chain(self.apfs_physical_stores.iter().map(|s| s.identifier.as_str()))
            .filter_map(|id| WHOLE_DISK.captures(id).map(|caps| caps[1].to_string()))
            .fold(Vec::new(), |mut disks, disk| {
                if !disks.contains(&disk) {
                    disks.push(disk);
                }
                disks
            })
    }
}

/// Refuse disks that must never be erased.
///
/// `boot_disks` lists every whole disk backing the running system.
pub fn check_erasable(
    info: &DiskInfo,
    identifier: &str,
    boot_disks: &[String],
) -> std::result::Result<(), DiskError> {
    let protected = |reason: &str| DiskError::Protected {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    };

    if boot_disks.iter().any(|disk| disk == identifier) {
        return Err(protected("it holds the running system"));
    }
    if info.internal {
        return Err(protected("it is an internal disk"));
    }
    if !info.whole_disk {
        return Err(protected("it is not a whole disk"));
    }
    Ok(())
}

/// Resolve the installer application.
///
/// An explicit path wins and must contain `createinstallmedia`. Otherwise the
/// patterns are tried in order; the first one with a match decides, and the
/// most recently modified app within it is used.
pub fn find_installer(
    explicit: Option<&Path>,
    patterns: &[&str],
) -> std::result::Result<PathBuf, DiskError> {
    if let Some(path) = explicit {
        return if createinstallmedia(path).exists() {
            Ok(path.to_path_buf())
        } else {
            Err(DiskError::InstallerNotFound {
                searched: vec![path.to_path_buf()],
            })
        };
    }

    patterns
        .iter()
        .find_map(|pattern| newest_match(pattern))
        .ok_or_else(|| DiskError::InstallerNotFound {
            searched: patterns.iter().map(PathBuf::from).collect(),
        })
}

fn newest_match(pattern: &str) -> Option<PathBuf> {
    glob::glob(pattern)
        .ok()?
        .filter_map(|p| p.ok())
        .filter(|app| createinstallmedia(app).exists())
        .map(|app| {
            let modified = std::fs::metadata(&app)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (modified, app)
        })
        .max()
        .map(|(_, app)| app)
}

/// `<app>/Contents/Resources/createinstallmedia`
pub fn createinstallmedia(installer: &Path) -> PathBuf {
    installer
        .join("Contents")
        .join("Resources")
        .join("createinstallmedia")
}

async fn disk_info<R: CommandRunner>(runner: &R, target: &str) -> Result<DiskInfo> {
    let output = runner
        .run(&CommandSpec::new("diskutil").args(["info", "-plist", target]))
        .await?;
    DiskInfo::from_plist(output.stdout.as_bytes())
}

async fn inspect<R: CommandRunner>(ctx: &Context<'_, R>, disk: &str) -> Result<DiskInfo> {
    let info = disk_info(ctx.runner, disk).await?;
    let boot = disk_info(ctx.runner, "/")
        .await
        .map(|b| b.backing_disks())
        .unwrap_or_default();
    check_erasable(&info, disk, &boot)?;
    log::info!(
        "{} is {} ({} bytes), external and erasable",
        disk,
        info.media_name,
        info.total_size
    );
    Ok(info)
}

/// Erase `disk` and write a bootable installer to it
pub async fn create_installer_media<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    disk: &str,
    volume_name: &str,
    installer: &Path,
) -> Result<()> {
    let disk = validate_disk_identifier(disk)?;
    let volume_name = validate_volume_name(volume_name)?;

    if ctx.dry_run() {
        log::info!("[dry-run] skipping inspection of {}", disk);
    } else {
        // Keep the typed error so refusals carry their recovery suggestions
        match inspect(ctx, &disk).await {
            Ok(_) => tracker.record_applied(format!("Inspect {disk}")),
            Err(e) => {
                tracker.record_failed(format!("Inspect {disk}"), &e);
                return Err(e);
            }
        }
    }

    let erase = CommandSpec::new("diskutil").args(["eraseDisk", "JHFS+", &volume_name, "GPT", &disk]);
    tracker
        .require(format!("Erase {disk} as '{volume_name}'"), ctx.runner.run(&erase))
        .await?;

    let volume = Path::new("/Volumes").join(&volume_name);
    let media = CommandSpec::new(createinstallmedia(installer).to_string_lossy())
        .arg("--volume")
        .arg(volume.to_string_lossy())
        .arg("--nointeraction")
        .io(IoMode::Passthrough);
    tracker
        .require(
            format!("Write {} to {}", installer.display(), volume.display()),
            ctx.runner.run(&media),
        )
        .await?;

    Ok(())
}
