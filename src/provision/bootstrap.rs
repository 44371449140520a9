//! Command Line Tools, Homebrew and the packages installed with it.

use super::Context;
use crate::apply::ApplyTracker;
use crate::download::Downloader;
use crate::error::{ProvisionError, Result};
use crate::host::Capability;
use crate::keepalive::SudoKeepAlive;
use crate::process::{CommandRunner, CommandSpec, IoMode};
use crate::templates::{Shellenv, Templates};
use std::path::{Path, PathBuf};

/// Capabilities `bootstrap` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Unprivileged,
];

/// `<prefix>/bin/brew`
pub fn brew_path(prefix: &str) -> PathBuf {
    Path::new(prefix).join("bin").join("brew")
}

/// Shell profile zsh reads for login shells
pub fn zprofile(home: &Path) -> PathBuf {
    home.join(".zprofile")
}

/// Whether `contents` already holds `line`, ignoring surrounding whitespace
pub fn has_line(contents: &str, line: &str) -> bool {
    let wanted = line.trim();
    contents.lines().any(|existing| existing.trim() == wanted)
}

/// `contents` with `line` appended on its own line
pub fn append_line(contents: &str, line: &str) -> String {
    let mut updated = contents.to_string();
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(line.trim_end());
    updated.push('\n');
    updated
}

/// Append `line` to the file unless present; returns whether it was added
pub async fn ensure_line(path: &Path, line: &str) -> std::io::Result<bool> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    if has_line(&contents, line) {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, append_line(&contents, line)).await?;
    Ok(true)
}

async fn command_line_tools<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) {
    const DESCRIPTION: &str = "Command Line Tools installed";

    let installed = ctx
        .runner
        .output(&CommandSpec::new("xcode-select").arg("-p"))
        .await
        .is_ok_and(|output| output.success());
    if installed {
        tracker.record_applied(DESCRIPTION);
        return;
    }

    // The GUI installer runs asynchronously; nothing later can wait for it
    match ctx
        .runner
        .run(&CommandSpec::new("xcode-select").arg("--install"))
        .await
    {
        Ok(_) => tracker.record_warning(
            DESCRIPTION,
            "installation started; re-run `macprov bootstrap` once it completes",
        ),
        Err(e) => tracker.record_warning(DESCRIPTION, e),
    }
}

async fn homebrew<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    brew: &Path,
) -> Result<()> {
    if brew.exists() {
        log::info!("Homebrew found at {}", brew.display());
        tracker.record_applied("Homebrew installed");
        return Ok(());
    }

    let scratch = tempfile::tempdir()?;
    let script = scratch.path().join("install.sh");
    let url = &ctx.config.bootstrap.homebrew_install_url;

    let download = async {
        if ctx.dry_run() {
            log::info!("[dry-run] download {} to {}", url, script.display());
            return Ok::<_, ProvisionError>(script.clone());
        }
        Downloader::new(&ctx.config.download)?
            .download_to(url, &script, None)
            .await
    };
    tracker
        .require("Download Homebrew installer", download)
        .await?;

    let install = CommandSpec::new("/bin/bash")
        .arg(script.to_string_lossy())
        .env("NONINTERACTIVE", "1")
        .io(IoMode::Passthrough);
    tracker
        .require("Homebrew installed", ctx.runner.run(&install))
        .await?;
    Ok(())
}

async fn shell_profile<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    prefix: &str,
) -> Result<()> {
    let line = Templates::new()?.render(&Shellenv {
        prefix: prefix.to_string(),
    })?;
    let path = zprofile(&ctx.home);

    let ensure = async {
        if ctx.dry_run() {
            log::info!("[dry-run] ensure {} contains: {}", path.display(), line.trim());
            return Ok(false);
        }
        ensure_line(&path, &line).await
    };
    if let Some(added) = tracker
        .attempt(format!("Homebrew on PATH in {}", path.display()), ensure)
        .await
    {
        log::debug!("{} {}", path.display(), if added { "updated" } else { "unchanged" });
    }
    Ok(())
}

/// Install developer tooling, then the configured packages
pub async fn run<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) -> Result<()> {
    // Dropped at the end of the run, which stops the refresh task
    let _keepalive = tracker
        .attempt("Keep sudo credentials fresh", SudoKeepAlive::start(ctx.runner))
        .await;

    command_line_tools(ctx, tracker).await;

    let prefix = ctx.host.architecture().homebrew_prefix();
    let brew = brew_path(prefix);
    homebrew(ctx, tracker, &brew).await?;
    shell_profile(ctx, tracker, prefix).await?;

    let brew = brew.to_string_lossy().into_owned();
    tracker
        .attempt(
            "brew update",
            ctx.runner.run(&CommandSpec::new(&brew).arg("update").io(IoMode::Passthrough)),
        )
        .await;

    let config = &ctx.config.bootstrap;
    for formula in &config.formulae {
        let install = CommandSpec::new(&brew)
            .args(["install", formula.as_str()])
            .io(IoMode::Passthrough);
        tracker
            .attempt(format!("brew install {formula}"), ctx.runner.run(&install))
            .await;
    }
    for cask in &config.casks {
        let install = CommandSpec::new(&brew)
            .args(["install", "--cask", cask.as_str()])
            .io(IoMode::Passthrough);
        tracker
            .attempt(format!("brew install --cask {cask}"), ctx.runner.run(&install))
            .await;
    }

    Ok(())
}
