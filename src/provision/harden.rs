//! Security and privacy defaults.

use super::Context;
use crate::apply::{ApplyTracker, VerifyCheck, apply_preferences};
use crate::config::HardenConfig;
use crate::error::{CommandError, Result};
use crate::host::{Capability, HostInfo};
use crate::preferences::{PreferenceKey, PreferenceWrite};
use crate::process::{CommandRunner, CommandSpec};

/// Capabilities `harden` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Elevated,
];

/// Step that signals the running firewall to reload
pub const RELOAD_FIREWALL: &str = "Reload application firewall";

const SOCKETFILTERFW: &str = "/usr/libexec/ApplicationFirewall/socketfilterfw";

/// Where deferred FileVault enablement stores its recovery information
const FILEVAULT_DEFER_PLIST: &str = "/var/root/macprov-filevault-defer.plist";

fn firewall(arg: &str, value: &str) -> CommandSpec {
    CommandSpec::new(SOCKETFILTERFW).args([arg, value])
}

/// Firewall and Gatekeeper commands, in order
pub fn system_commands(config: &HardenConfig) -> Vec<(String, CommandSpec)> {
    let mut commands = vec![
        ("Enable application firewall".to_string(), firewall("--setglobalstate", "on")),
        ("Enable firewall logging".to_string(), firewall("--setloggingmode", "on")),
    ];
    if config.stealth_mode {
        commands.push(("Enable firewall stealth mode".to_string(), firewall("--setstealthmode", "on")));
    }
    commands.extend([
        (
            "Stop auto-allowing built-in signed software".to_string(),
            firewall("--setallowsigned", "off"),
        ),
        (
            "Stop auto-allowing downloaded signed software".to_string(),
            firewall("--setallowsignedapp", "off"),
        ),
        (
            "Enable Gatekeeper".to_string(),
            CommandSpec::new("spctl").arg("--master-enable"),
        ),
    ]);
    if config.disable_remote_login {
        commands.extend([
            (
                "Disable remote login (SSH)".to_string(),
                CommandSpec::new("systemsetup").args(["-f", "-setremotelogin", "off"]),
            ),
            (
                "Disable remote Apple events".to_string(),
                CommandSpec::new("systemsetup").args(["-setremoteappleevents", "off"]),
            ),
        ]);
    }
    commands
}

/// Preference-store writes, in order
pub fn preference_writes(host: &HostInfo) -> Vec<PreferenceWrite> {
    let update = |key: &str| PreferenceKey::new("/Library/Preferences/com.apple.SoftwareUpdate", key);
    let login = |key: &str| PreferenceKey::new("/Library/Preferences/com.apple.loginwindow", key);
    let owner = host.preference_owner();
    let screensaver =
        |key: &str| PreferenceKey::new("com.apple.screensaver", key).for_user(owner.clone());

    vec![
        PreferenceWrite::new("Check for updates automatically", update("AutomaticCheckEnabled"), true),
        PreferenceWrite::new("Download updates automatically", update("AutomaticDownload"), true),
        PreferenceWrite::new("Install security responses automatically", update("CriticalUpdateInstall"), true),
        PreferenceWrite::new("Install system data files automatically", update("ConfigDataInstall"), true),
        PreferenceWrite::new(
            "Update App Store apps automatically",
            PreferenceKey::new("/Library/Preferences/com.apple.commerce", "AutoUpdate"),
            true,
        ),
        PreferenceWrite::new("Disable guest account", login("GuestEnabled"), false),
        PreferenceWrite::new("Show name and password fields at login", login("SHOWFULLNAME"), true),
        PreferenceWrite::new(
            "Disable captive portal assistant",
            PreferenceKey::new(
                "/Library/Preferences/SystemConfiguration/com.apple.captive.control",
                "Active",
            ),
            false,
        ),
        PreferenceWrite::new(
            "Disable automatic diagnostics submission",
            PreferenceKey::new(
                "/Library/Application Support/CrashReporter/DiagnosticMessagesHistory",
                "AutoSubmit",
            ),
            false,
        ),
        PreferenceWrite::new("Require password after screen saver", screensaver("askForPassword"), 1i64),
        PreferenceWrite::new("Require password immediately", screensaver("askForPasswordDelay"), 0i64),
    ]
}

/// Read-back and status checks for `harden`
pub fn verify_checks(host: &HostInfo, config: &HardenConfig) -> Vec<VerifyCheck> {
    let mut checks = vec![
        VerifyCheck::command_output(
            "Application firewall enabled",
            CommandSpec::new(SOCKETFILTERFW).arg("--getglobalstate"),
            "enabled",
        ),
        VerifyCheck::command_output(
            "Gatekeeper enabled",
            CommandSpec::new("spctl").arg("--status"),
            "assessments enabled",
        ),
    ];
    if config.enable_filevault {
        checks.push(VerifyCheck::command_output(
            "FileVault on",
            CommandSpec::new("fdesetup").arg("status"),
            "FileVault is On",
        ));
    }
    checks.extend(preference_writes(host).iter().map(PreferenceWrite::verify_check));
    checks
}

/// FileVault state as reported by `fdesetup status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileVaultState {
    /// Encrypted or encrypting
    On,
    /// Enablement scheduled for next logout/login
    Deferred,
    /// Not encrypted
    Off,
    /// Output not recognized
    Unknown,
}

impl FileVaultState {
    /// Interpret `fdesetup status` output
    pub fn parse(output: &str) -> Self {
        if output.contains("Deferred enablement appears to be active") {
            FileVaultState::Deferred
        } else if output.contains("FileVault is On") {
            FileVaultState::On
        } else if output.contains("FileVault is Off") {
            FileVaultState::Off
        } else {
            FileVaultState::Unknown
        }
    }
}

async fn ensure_filevault<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) {
    const DESCRIPTION: &str = "FileVault enabled or scheduled";

    let status = ctx.runner.run(&CommandSpec::new("fdesetup").arg("status")).await;
    let state = match &status {
        Ok(output) => FileVaultState::parse(&output.stdout),
        Err(e) => {
            tracker.record_warning(DESCRIPTION, e);
            return;
        }
    };

    match state {
        FileVaultState::On | FileVaultState::Deferred => tracker.record_applied(DESCRIPTION),
        FileVaultState::Off | FileVaultState::Unknown => {
            let enable = CommandSpec::new("fdesetup").args([
                "enable",
                "-defer",
                FILEVAULT_DEFER_PLIST,
                "-forceatlogin",
                "0",
                "-dontaskatlogout",
            ]);
            tracker.attempt(DESCRIPTION, ctx.runner.run(&enable)).await;
        }
    }
}

/// HUP a running socketfilterfw so it picks up its new settings.
///
/// pkill exits 1 when nothing matched; the firewall then reads the
/// settings when it next starts.
async fn reload_firewall<R: CommandRunner>(runner: &R) -> std::result::Result<(), CommandError> {
    let pkill = CommandSpec::new("pkill").args(["-HUP", "socketfilterfw"]);
    let output = runner.output(&pkill).await?;
    match output.code {
        Some(0 | 1) => Ok(()),
        code => Err(CommandError::Failed {
            command: pkill.display(),
            code,
            stderr: output.stderr.trim().to_string(),
        }),
    }
}

/// Apply every hardening step, best-effort
pub async fn apply<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) -> Result<()> {
    let config = &ctx.config.harden;

    for (description, command) in system_commands(config) {
        tracker.attempt(description, ctx.runner.run(&command)).await;
    }

    tracker
        .attempt(RELOAD_FIREWALL, reload_firewall(ctx.runner))
        .await;

    apply_preferences(ctx.runner, tracker, &preference_writes(ctx.host)).await;

    if config.enable_filevault {
        ensure_filevault(ctx, tracker).await;
    }

    Ok(())
}
