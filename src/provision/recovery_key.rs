//! FileVault personal recovery key rotation.

use super::Context;
use super::harden::FileVaultState;
use crate::apply::ApplyTracker;
use crate::error::{ProvisionError, Result};
use crate::host::Capability;
use crate::process::{CommandRunner, CommandSpec, IoMode};
use chrono::Local;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Capabilities `rotate-key` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Elevated,
];

static RECOVERY_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)recovery key\s*=\s*'([A-Z0-9]{4}(?:-[A-Z0-9]{4}){5})'")
        .expect("recovery key pattern is valid")
});

/// Extract the key from `fdesetup changerecovery` output
pub fn parse_recovery_key(output: &str) -> Option<String> {
    RECOVERY_KEY
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Default output file in `dir`
pub fn default_key_path(dir: &Path) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S");
    dir.join(format!("FileVault-Recovery-Key-{stamp}.txt"))
}

/// Contents of the key file
pub fn key_file_contents(key: &str) -> String {
    format!(
        "FileVault personal recovery key\nGenerated: {}\n\n{}\n\nStore this somewhere safe, then delete this file.\n",
        Local::now().format("%Y-%m-%d %H:%M:%S %Z"),
        key
    )
}

/// Write the key readable by its owner only
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()
}

/// Rotate the personal recovery key and save it to `output`.
///
/// Fails before touching anything when FileVault is not on.
pub async fn rotate<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    output: &Path,
) -> Result<Option<PathBuf>> {
    let dry_run = ctx.dry_run();
    let check_on = async {
        let status = ctx
            .runner
            .run(&CommandSpec::new("fdesetup").arg("status"))
            .await?;
        match FileVaultState::parse(&status.stdout) {
            FileVaultState::On => Ok::<(), anyhow::Error>(()),
            _ if dry_run => Ok(()),
            state => Err(anyhow::anyhow!("FileVault is not on ({state:?})")),
        }
    };
    tracker.require("FileVault is on", check_on).await?;

    let change = CommandSpec::new("fdesetup")
        .args(["changerecovery", "-personal"])
        .io(IoMode::Interactive);
    let result = tracker
        .require("Generate new personal recovery key", ctx.runner.run(&change))
        .await?;

    if dry_run {
        log::info!("[dry-run] write recovery key to {}", output.display());
        return Ok(None);
    }

    let Some(key) = parse_recovery_key(&result.stdout) else {
        tracker.record_failed(
            "Read new recovery key",
            "fdesetup output did not contain a recovery key",
        );
        return Err(ProvisionError::step_failed(
            "Read new recovery key",
            "fdesetup output did not contain a recovery key",
        ));
    };

    let contents = key_file_contents(&key);
    tracker
        .require(format!("Save recovery key to {}", output.display()), async {
            write_private(output, &contents)
        })
        .await?;

    if let Some(user) = ctx.host.invoking_user.clone() {
        let chown = CommandSpec::new("chown")
            .arg(user)
            .arg(output.to_string_lossy());
        tracker
            .attempt("Give the key file to the invoking user", ctx.runner.run(&chown))
            .await;
    }

    Ok(Some(output.to_path_buf()))
}
