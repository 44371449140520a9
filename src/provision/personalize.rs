//! UI preferences for Dock, Finder, keyboard, trackpad and screenshots.

use super::Context;
use crate::apply::{ApplyTracker, VerifyCheck, apply_preferences};
use crate::config::PersonalizeConfig;
use crate::error::Result;
use crate::host::{Capability, HostInfo};
use crate::preferences::{PreferenceKey, PreferenceWrite};
use crate::process::{CommandRunner, CommandSpec};
use std::path::{Path, PathBuf};

/// Capabilities `personalize` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Unprivileged,
];

/// Processes that cache the preferences written here
pub const RESTART_PROCESSES: &[&str] = &["Dock", "Finder", "SystemUIServer"];

/// Screenshot destination under the user's home
pub fn screenshot_dir(home: &Path) -> PathBuf {
    home.join("Desktop").join("Screenshots")
}

/// Built-in writes followed by the configured extras
pub fn preference_writes(home: &Path, config: &PersonalizeConfig) -> Vec<PreferenceWrite> {
    let dock = |key: &str| PreferenceKey::new("com.apple.dock", key);
    let finder = |key: &str| PreferenceKey::new("com.apple.finder", key);
    let global = |key: &str| PreferenceKey::new("NSGlobalDomain", key);
    let capture = |key: &str| PreferenceKey::new("com.apple.screencapture", key);
    let ds = |key: &str| PreferenceKey::new("com.apple.desktopservices", key);

    let mut writes = vec![
        PreferenceWrite::new("Auto-hide the Dock", dock("autohide"), true),
        PreferenceWrite::new("Dock icon size 48", dock("tilesize"), 48i64),
        PreferenceWrite::new("Hide recent apps in the Dock", dock("show-recents"), false),
        PreferenceWrite::new("Keep Spaces in a fixed order", dock("mru-spaces"), false),
        PreferenceWrite::new("Minimize windows into their app icon", dock("minimize-to-application"), true),
        PreferenceWrite::new("Show Finder path bar", finder("ShowPathbar"), true),
        PreferenceWrite::new("Show Finder status bar", finder("ShowStatusBar"), true),
        PreferenceWrite::new("Use list view in Finder", finder("FXPreferredViewStyle"), "Nlsv"),
        PreferenceWrite::new("Search the current folder by default", finder("FXDefaultSearchScope"), "SCcf"),
        PreferenceWrite::new("Keep folders on top when sorting", finder("_FXSortFoldersFirst"), true),
        PreferenceWrite::new(
            "Don't warn when changing file extensions",
            finder("FXEnableExtensionChangeWarning"),
            false,
        ),
        PreferenceWrite::new("Show all filename extensions", global("AppleShowAllExtensions"), true),
        PreferenceWrite::new("Dark appearance", global("AppleInterfaceStyle"), "Dark"),
        PreferenceWrite::new("Fast key repeat", global("KeyRepeat"), 2i64),
        PreferenceWrite::new("Short delay until key repeat", global("InitialKeyRepeat"), 15i64),
        PreferenceWrite::new("Repeat keys instead of accent menu", global("ApplePressAndHoldEnabled"), false),
        PreferenceWrite::new(
            "Disable automatic spelling correction",
            global("NSAutomaticSpellingCorrectionEnabled"),
            false,
        ),
        PreferenceWrite::new(
            "No .DS_Store files on network volumes",
            ds("DSDontWriteNetworkStores"),
            true,
        ),
        PreferenceWrite::new("No .DS_Store files on USB volumes", ds("DSDontWriteUSBStores"), true),
        PreferenceWrite::new(
            "Save screenshots to ~/Desktop/Screenshots",
            capture("location"),
            screenshot_dir(home).to_string_lossy().into_owned(),
        ),
        PreferenceWrite::new("Save screenshots as PNG", capture("type"), "png"),
        PreferenceWrite::new("No window shadows in screenshots", capture("disable-shadow"), true),
        PreferenceWrite::new(
            "Tap to click (trackpad)",
            PreferenceKey::new("com.apple.AppleMultitouchTrackpad", "Clicking"),
            true,
        ),
        PreferenceWrite::new(
            "Tap to click (login screen)",
            PreferenceKey::new("NSGlobalDomain", "com.apple.mouse.tapBehavior").current_host(),
            1i64,
        ),
    ];

    writes.extend(config.extra.iter().map(|extra| {
        let mut key = PreferenceKey::new(&extra.domain, &extra.key);
        if extra.current_host {
            key = key.current_host();
        }
        PreferenceWrite::new(
            format!("Set {} = {}", key, extra.value),
            key,
            extra.value.clone(),
        )
    }));

    writes
}

/// Read-back checks for every write.
///
/// Under sudo the reads go through the invoking user, whose domains the
/// writes landed in.
pub fn verify_checks(host: &HostInfo, home: &Path, config: &PersonalizeConfig) -> Vec<VerifyCheck> {
    let owner = host.preference_owner();
    preference_writes(home, config)
        .into_iter()
        .map(|mut write| {
            write.key = write.key.for_user(owner.clone());
            write.verify_check()
        })
        .collect()
}

/// Apply every preference, then restart the processes that cache them
pub async fn apply<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    restart: bool,
) -> Result<()> {
    let shots = screenshot_dir(&ctx.home);
    let create_dir = async {
        if ctx.dry_run() {
            log::info!("[dry-run] mkdir -p {}", shots.display());
            Ok(())
        } else {
            tokio::fs::create_dir_all(&shots).await
        }
    };
    tracker.attempt("Create screenshot folder", create_dir).await;

    apply_preferences(
        ctx.runner,
        tracker,
        &preference_writes(&ctx.home, &ctx.config.personalize),
    )
    .await;

    if restart {
        for process in RESTART_PROCESSES {
            tracker
                .attempt(
                    format!("Restart {process}"),
                    ctx.runner.run(&CommandSpec::new("killall").arg(*process)),
                )
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtraPreference;
    use crate::preferences::PreferenceValue;

    #[test]
    fn test_screenshot_location_follows_home() {
        let writes = preference_writes(Path::new("/Users/alice"), &PersonalizeConfig::default());
        let location = writes.iter().find(|w| w.key.key == "location").unwrap();
        assert_eq!(
            location.value,
            PreferenceValue::String("/Users/alice/Desktop/Screenshots".to_string())
        );
    }

    #[test]
    fn test_extras_are_appended_in_order() {
        let config = PersonalizeConfig {
            extra: vec![
                ExtraPreference {
                    domain: "com.apple.dock".to_string(),
                    key: "tilesize".to_string(),
                    value: PreferenceValue::Int(36),
                    current_host: false,
                },
                ExtraPreference {
                    domain: "NSGlobalDomain".to_string(),
                    key: "AppleEnableSwipeNavigateWithScrolls".to_string(),
                    value: PreferenceValue::Bool(false),
                    current_host: true,
                },
            ],
        };
        let builtin = preference_writes(Path::new("/Users/a"), &PersonalizeConfig::default()).len();
        let writes = preference_writes(Path::new("/Users/a"), &config);

        assert_eq!(writes.len(), builtin + 2);
        assert_eq!(writes[builtin].description, "Set com.apple.dock tilesize = 36");
        assert!(writes[builtin + 1].key.current_host);
    }

    #[test]
    fn test_no_personal_write_runs_as_another_user() {
        let writes = preference_writes(Path::new("/Users/a"), &PersonalizeConfig::default());
        assert!(writes.iter().all(|w| w.key.user.is_none()));
    }

    #[test]
    fn test_checks_read_the_invoking_users_domains_under_sudo() {
        let root = HostInfo {
            os: "macos".to_string(),
            arch: "aarch64".to_string(),
            effective_uid: 0,
            invoking_user: Some("alice".to_string()),
        };
        let home = Path::new("/Users/alice");
        let config = PersonalizeConfig::default();

        let checks = verify_checks(&root, home, &config);
        assert_eq!(checks.len(), preference_writes(home, &config).len());
        for check in &checks {
            let crate::apply::Probe::Preference { key, .. } = &check.probe else {
                panic!("{} is not a preference read", check.description);
            };
            let (program, args) = key.read_command().argv();
            assert_eq!(program, "sudo");
            assert_eq!(&args[..3], ["-u", "alice", "defaults"]);
        }

        let user = HostInfo {
            effective_uid: 501,
            invoking_user: None,
            ..root
        };
        let (program, _) = match &verify_checks(&user, home, &config)[0].probe {
            crate::apply::Probe::Preference { key, .. } => key.read_command().argv(),
            other => panic!("expected a preference read, got {other:?}"),
        };
        assert_eq!(program, "defaults");
    }
}
