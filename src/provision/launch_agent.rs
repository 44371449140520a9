//! Login agent that re-applies personalization at every login.

use super::Context;
use crate::apply::ApplyTracker;
use crate::error::Result;
use crate::host::{Capability, gui_domain};
use crate::process::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};

/// Capabilities `persist` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Unprivileged,
];

/// A per-user LaunchAgent definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchAgent {
    /// launchd label, also the plist file stem
    pub label: String,
    /// Program and arguments
    pub program_arguments: Vec<String>,
    /// Where stdout/stderr go
    pub log_path: PathBuf,
}

impl LaunchAgent {
    /// Agent that runs `<exe> personalize --no-restart` at login
    pub fn personalize(label: &str, executable: &Path, log_dir: &Path) -> Self {
        Self {
            label: label.to_string(),
            program_arguments: vec![
                executable.to_string_lossy().into_owned(),
                "personalize".to_string(),
                "--no-restart".to_string(),
            ],
            log_path: log_dir.join(format!("{label}.log")),
        }
    }

    /// `~/Library/LaunchAgents/<label>.plist`
    pub fn plist_path(&self, home: &Path) -> PathBuf {
        home.join("Library")
            .join("LaunchAgents")
            .join(format!("{}.plist", self.label))
    }

    /// Property list launchd expects
    pub fn to_plist(&self) -> plist::Value {
        let mut dict = plist::Dictionary::new();
        dict.insert("Label".into(), self.label.clone().into());
        dict.insert(
            "ProgramArguments".into(),
            plist::Value::Array(
                self.program_arguments
                    .iter()
                    .map(|arg| plist::Value::from(arg.clone()))
                    .collect(),
            ),
        );
        dict.insert("RunAtLoad".into(), true.into());
        dict.insert("ProcessType".into(), "Background".into());
        let log = self.log_path.to_string_lossy().into_owned();
        dict.insert("StandardOutPath".into(), log.clone().into());
        dict.insert("StandardErrorPath".into(), log.into());
        plist::Value::Dictionary(dict)
    }

    /// Write the XML plist, creating `~/Library/LaunchAgents` if needed
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        plist::to_file_xml(path, &self.to_plist())?;
        Ok(())
    }
}

fn agent_for<R: CommandRunner>(ctx: &Context<'_, R>) -> Result<LaunchAgent> {
    let executable = std::env::current_exe()?;
    let log_dir = ctx.home.join("Library").join("Logs");
    Ok(LaunchAgent::personalize(
        &ctx.config.general.launch_agent_label,
        &executable,
        &log_dir,
    ))
}

async fn bootout<R: CommandRunner>(ctx: &Context<'_, R>, path: &Path) {
    // Not loaded yet is the common case; the result is irrelevant
    let _ = ctx
        .runner
        .output(
            &CommandSpec::new("launchctl")
                .arg("bootout")
                .arg(gui_domain())
                .arg(path.to_string_lossy()),
        )
        .await;
}

/// Write (or rewrite) the agent and load it into the GUI session
pub async fn install<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) -> Result<()> {
    let agent = agent_for(ctx)?;
    let path = agent.plist_path(&ctx.home);

    let write = async {
        if ctx.dry_run() {
            log::info!("[dry-run] write {}", path.display());
            Ok(())
        } else {
            agent.write(&path)
        }
    };
    tracker
        .require(format!("Write {}", path.display()), write)
        .await?;

    bootout(ctx, &path).await;

    let bootstrap = CommandSpec::new("launchctl")
        .arg("bootstrap")
        .arg(gui_domain())
        .arg(path.to_string_lossy());
    tracker
        .attempt(format!("Load {}", agent.label), ctx.runner.run(&bootstrap))
        .await;

    Ok(())
}

/// Unload the agent and delete its plist
pub async fn remove<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) -> Result<()> {
    let agent = agent_for(ctx)?;
    let path = agent.plist_path(&ctx.home);

    bootout(ctx, &path).await;

    let delete = async {
        if ctx.dry_run() {
            log::info!("[dry-run] rm {}", path.display());
            return Ok(());
        }
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    };
    tracker
        .attempt(format!("Remove {}", path.display()), delete)
        .await;

    Ok(())
}
