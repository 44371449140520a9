mod common;

use common::{FakeRunner, config, elevated_host, user_host};
use macprov::apply::{ApplyTracker, Outcome, run_checks};
use macprov::cli::VerifyTarget;
use macprov::cli::commands::checks_for;
use macprov::download::Downloader;
use macprov::error::{DiskError, ProvisionError};
use macprov::process::{CommandOutput, DryRunRunner};
use macprov::templates::Templates;
use macprov::provision::{
    Context, bootstrap, browser, disk, harden, launch_agent, personalize, recovery_key,
};
use std::path::Path;

const EXTERNAL_DISK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>DeviceIdentifier</key><string>disk4</string>
    <key>MediaName</key><string>USB Stick</string>
    <key>Internal</key><false/>
    <key>WholeDisk</key><true/>
    <key>ParentWholeDisk</key><string>disk4</string>
    <key>TotalSize</key><integer>16000000000</integer>
</dict>
</plist>"#;

const BOOT_VOLUME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
    <key>DeviceIdentifier</key><string>disk3s1s1</string>
    <key>Internal</key><true/>
    <key>WholeDisk</key><false/>
    <key>ParentWholeDisk</key><string>disk3</string>
</dict>
</plist>"#;

fn installer(dir: &Path) -> std::path::PathBuf {
    let app = dir.join("Install macOS Sonoma.app");
    std::fs::create_dir_all(app.join("Contents/Resources")).unwrap();
    std::fs::write(disk::createinstallmedia(&app), b"").unwrap();
    app
}

#[tokio::test]
async fn test_personalize_twice_yields_same_applied_set() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut first = ApplyTracker::new();
    personalize::apply(&ctx, &mut first, true).await.unwrap();
    let mut second = ApplyTracker::new();
    personalize::apply(&ctx, &mut second, true).await.unwrap();

    let (first, second) = (first.finish(), second.finish());
    assert_eq!(first.applied(), second.applied());
    assert!(first.is_clean());
    assert!(second.is_clean());
}

#[tokio::test]
async fn test_harden_twice_yields_same_applied_set() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new().respond("fdesetup status", "FileVault is On.\n");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut first = ApplyTracker::new();
    harden::apply(&ctx, &mut first).await.unwrap();
    let mut second = ApplyTracker::new();
    harden::apply(&ctx, &mut second).await.unwrap();

    let (first, second) = (first.finish(), second.finish());
    assert_eq!(first.applied(), second.applied());
    assert!(second.failures().is_empty());
    assert!(!runner.called("fdesetup enable"));
}

#[tokio::test]
async fn test_missing_firewall_tool_only_warns() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new()
        .missing("/usr/libexec/ApplicationFirewall/socketfilterfw")
        .respond("fdesetup status", "FileVault is Off.\n");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    harden::apply(&ctx, &mut tracker).await.unwrap();
    let summary = tracker.finish();

    assert!(summary.failures().is_empty());
    assert_eq!(summary.warnings().len(), 5);
    assert!(
        summary
            .warnings()
            .iter()
            .all(|r| matches!(&r.outcome, Outcome::Warning(reason) if reason.contains("not found")))
    );
    // Later steps still ran
    assert!(runner.called("spctl --master-enable"));
    assert!(runner.called("fdesetup enable -defer"));
}

#[tokio::test]
async fn test_applied_count_matches_successful_attempts() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new()
        .failing("defaults write com.apple.dock autohide", 1, "locked")
        .failing("killall Finder", 1, "No matching processes");
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    personalize::apply(&ctx, &mut tracker, true).await.unwrap();
    let summary = tracker.finish();

    let writes = personalize::preference_writes(home.path(), &config.personalize).len();
    let attempts = 1 + writes + personalize::RESTART_PROCESSES.len();
    assert_eq!(summary.records().len(), attempts);
    assert_eq!(summary.applied().len(), attempts - 2);
    assert_eq!(summary.warnings().len(), 2);
    assert!(home.path().join("Desktop/Screenshots").is_dir());
}

#[tokio::test]
async fn test_verification_passes_iff_read_returns_written_literal() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());
    let checks = personalize::verify_checks(&host, home.path(), &config.personalize);

    // Nothing written yet
    let before = run_checks(&runner, &checks).await;
    assert_eq!(before.failed_checks().len(), checks.len());

    let mut tracker = ApplyTracker::new();
    personalize::apply(&ctx, &mut tracker, false).await.unwrap();
    let after = run_checks(&runner, &checks).await;
    assert!(after.success(), "{}", after.summary());

    runner.set_pref("com.apple.dock", "tilesize", "64");
    let drifted = run_checks(&runner, &checks).await;
    let failed = drifted.failed_checks();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].observed, "64");
    assert_eq!(runner.pref("com.apple.dock", "autohide").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_verify_fails_on_any_drifted_setting() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());
    personalize::apply(&ctx, &mut ApplyTracker::new(), false)
        .await
        .unwrap();

    let checks = checks_for(VerifyTarget::Personalize, &host, home.path(), &config);
    assert!(run_checks(&runner, &checks).await.ensure_success().is_ok());

    runner.set_pref("com.apple.dock", "tilesize", "64");
    let err = run_checks(&runner, &checks)
        .await
        .ensure_success()
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::VerificationFailed { failed: 1, total } if total == checks.len()
    ));
}

#[test]
fn test_verify_all_covers_both_targets() {
    let home = tempfile::tempdir().unwrap();
    let host = elevated_host();
    let config = config();
    let count = |target| checks_for(target, &host, home.path(), &config).len();
    assert_eq!(
        count(VerifyTarget::All),
        count(VerifyTarget::Harden) + count(VerifyTarget::Personalize)
    );
}

#[tokio::test]
async fn test_firewall_reload_failure_only_warns() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new()
        .failing("pkill -HUP socketfilterfw", 3, "pkill: fatal error")
        .respond("fdesetup status", "FileVault is On.\n");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    harden::apply(&ctx, &mut tracker).await.unwrap();
    let summary = tracker.finish();

    let warnings = summary.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].description, harden::RELOAD_FIREWALL);
    assert!(summary.failures().is_empty());
    assert!(runner.called("defaults write /Library/Preferences/com.apple.loginwindow"));
}

#[tokio::test]
async fn test_firewall_reload_tolerates_no_running_firewall() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new()
        .failing("pkill -HUP socketfilterfw", 1, "")
        .respond("fdesetup status", "FileVault is On.\n");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    harden::apply(&ctx, &mut tracker).await.unwrap();
    let summary = tracker.finish();

    assert!(summary.is_clean());
    assert!(summary.applied().contains(&harden::RELOAD_FIREWALL));
}

#[tokio::test]
async fn test_no_restart_skips_killall() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    personalize::apply(&ctx, &mut ApplyTracker::new(), false)
        .await
        .unwrap();
    assert!(!runner.called("killall"));
}

#[tokio::test]
async fn test_usb_erases_then_writes_installer() {
    let scratch = tempfile::tempdir().unwrap();
    let app = installer(scratch.path());
    let runner = FakeRunner::new()
        .respond("diskutil info -plist disk4", EXTERNAL_DISK)
        .respond("diskutil info -plist /", BOOT_VOLUME);
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, scratch.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    disk::create_installer_media(&ctx, &mut tracker, "/dev/disk4", "MacInstaller", &app)
        .await
        .unwrap();

    let calls = runner.calls();
    let erase = calls
        .iter()
        .position(|c| c == "diskutil eraseDisk JHFS+ MacInstaller GPT disk4")
        .unwrap();
    let media = calls
        .iter()
        .position(|c| {
            c.contains("createinstallmedia")
                && c.ends_with("--volume /Volumes/MacInstaller --nointeraction")
        })
        .unwrap();
    assert!(erase < media);
    assert_eq!(tracker.finish().applied().len(), 3);
}

#[tokio::test]
async fn test_usb_refuses_boot_disk_before_erasing() {
    let scratch = tempfile::tempdir().unwrap();
    let app = installer(scratch.path());
    let runner = FakeRunner::new()
        .respond("diskutil info -plist disk3", EXTERNAL_DISK.replace("disk4", "disk3").as_str())
        .respond("diskutil info -plist /", BOOT_VOLUME);
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, scratch.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let err = disk::create_installer_media(&ctx, &mut tracker, "disk3", "MacInstaller", &app)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::Disk(DiskError::Protected { .. })));
    assert!(!runner.called("diskutil eraseDisk"));
    assert_eq!(tracker.finish().failures().len(), 1);
}

#[tokio::test]
async fn test_usb_erase_failure_stops_the_run() {
    let scratch = tempfile::tempdir().unwrap();
    let app = installer(scratch.path());
    let runner = FakeRunner::new()
        .respond("diskutil info -plist disk4", EXTERNAL_DISK)
        .respond("diskutil info -plist /", BOOT_VOLUME)
        .failing("diskutil eraseDisk", 1, "Resource busy");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, scratch.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let err = disk::create_installer_media(&ctx, &mut tracker, "disk4", "MacInstaller", &app)
        .await
        .unwrap_err();

    assert!(matches!(err, ProvisionError::StepFailed { .. }));
    assert!(!runner.calls().iter().any(|c| c.contains("createinstallmedia")));
}

#[tokio::test]
async fn test_rotate_key_saves_key_without_recording_it() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("key.txt");
    let runner = FakeRunner::new()
        .respond("fdesetup status", "FileVault is On.\n")
        .respond(
            "fdesetup changerecovery -personal",
            "New personal recovery key = 'ABCD-EFGH-1234-5678-IJKL-MNOP'\n",
        );
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, dir.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let saved = recovery_key::rotate(&ctx, &mut tracker, &output)
        .await
        .unwrap();

    assert_eq!(saved.as_deref(), Some(output.as_path()));
    assert!(
        std::fs::read_to_string(&output)
            .unwrap()
            .contains("ABCD-EFGH-1234-5678-IJKL-MNOP")
    );
    let summary = tracker.finish();
    assert!(
        summary
            .records()
            .iter()
            .all(|r| !r.format_result().contains("ABCD-EFGH"))
    );
    assert!(runner.called("chown alice"));
}

#[tokio::test]
async fn test_rotate_key_requires_filevault_on() {
    let dir = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new().respond("fdesetup status", "FileVault is Off.\n");
    let host = elevated_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, dir.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let result = recovery_key::rotate(&ctx, &mut tracker, &dir.path().join("key.txt")).await;

    assert!(result.is_err());
    assert!(!runner.called("fdesetup changerecovery"));
    assert!(!dir.path().join("key.txt").exists());
}

#[tokio::test]
async fn test_persist_writes_and_removes_agent() {
    let home = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());
    let plist = home
        .path()
        .join("Library/LaunchAgents/local.macprov.personalize.plist");

    let mut tracker = ApplyTracker::new();
    launch_agent::install(&ctx, &mut tracker).await.unwrap();
    assert!(plist.exists());
    assert!(runner.called("launchctl bootstrap gui/"));

    launch_agent::remove(&ctx, &mut tracker).await.unwrap();
    assert!(!plist.exists());
    assert!(tracker.finish().is_clean());
}

#[tokio::test]
async fn test_bootstrap_dry_run_touches_nothing() {
    let home = tempfile::tempdir().unwrap();
    let runner = DryRunRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    bootstrap::run(&ctx, &mut tracker).await.unwrap();

    let summary = tracker.finish();
    assert!(summary.failures().is_empty());
    assert!(summary.applied().contains(&"brew install git"));
    assert!(!home.path().join(".zprofile").exists());
}

#[tokio::test]
async fn test_browser_dry_run_touches_nothing() {
    let home = tempfile::tempdir().unwrap();
    let runner = DryRunRunner::new();
    let host = user_host();
    let config = config();
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    browser::run(&ctx, &mut tracker).await.unwrap();

    let summary = tracker.finish();
    assert!(summary.failures().is_empty());
    assert_eq!(
        summary
            .applied()
            .iter()
            .filter(|d| d.starts_with("Install extension"))
            .count(),
        config.browser.extensions.len()
    );
    assert_eq!(std::fs::read_dir(home.path()).unwrap().count(), 0);
}

/// Browser settings for a temp home, with the bundle under `apps`
fn browser_config(apps: &Path) -> macprov::ProvisionConfig {
    let mut config = config();
    config.browser.extensions.clear();
    config.browser.applications_dir = apps.to_path_buf();
    config
}

fn write_profiles_ini(home: &Path, profile: &str) {
    let root = home.join("Library/Application Support/Firefox");
    std::fs::create_dir_all(root.join(profile)).unwrap();
    std::fs::write(
        root.join("profiles.ini"),
        format!("[Profile0]\nName=default\nIsRelative=1\nPath={profile}\nDefault=1\n"),
    )
    .unwrap();
}

#[tokio::test]
async fn test_browser_profile_missing_after_create_fails() {
    let home = tempfile::tempdir().unwrap();
    let apps = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new();
    let host = user_host();
    let config = browser_config(apps.path());
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let err = browser::ensure_profile(&ctx, &mut tracker).await.unwrap_err();
    assert!(matches!(err, ProvisionError::StepFailed { ref step, .. } if step == "Locate browser profile"));
    assert!(runner.called(&format!(
        "{} -headless -CreateProfile default",
        browser::executable(&browser::installed_app(&config.browser), &config.browser).display()
    )));

    let summary = tracker.finish();
    assert_eq!(summary.failures().len(), 1);
    assert_eq!(summary.applied(), vec!["Create Firefox profile"]);
}

#[tokio::test]
async fn test_browser_settings_land_in_existing_profile() {
    let home = tempfile::tempdir().unwrap();
    let apps = tempfile::tempdir().unwrap();
    write_profiles_ini(home.path(), "Profiles/abcd.default-release");
    let runner = FakeRunner::new();
    let host = user_host();
    let config = browser_config(apps.path());
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    let profile = browser::ensure_profile(&ctx, &mut tracker).await.unwrap();
    assert_eq!(
        profile,
        home.path()
            .join("Library/Application Support/Firefox/Profiles/abcd.default-release")
    );
    assert!(!runner.calls().iter().any(|c| c.contains("-CreateProfile")));

    let downloader = Downloader::new(&config.download).unwrap();
    let templates = Templates::new().unwrap();
    browser::configure_profile(&ctx, &mut tracker, &downloader, &templates, &profile)
        .await
        .unwrap();

    let user_js = std::fs::read_to_string(profile.join("user.js")).unwrap();
    assert!(user_js.contains("user_pref(\"toolkit.telemetry.enabled\", false);"));

    let policies_file = browser::policies_path(&browser::installed_app(&config.browser));
    assert!(policies_file.starts_with(apps.path()));
    let policies: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(policies_file).unwrap()).unwrap();
    assert_eq!(policies, browser::policies(&config.browser));

    assert!(tracker.finish().is_clean());
}

#[tokio::test]
async fn test_browser_restarts_when_running() {
    let home = tempfile::tempdir().unwrap();
    let apps = tempfile::tempdir().unwrap();
    // Running at first, gone after the quit request
    let runner = FakeRunner::new().script(
        "pgrep -x firefox",
        vec![CommandOutput::ok("4242\n"), CommandOutput::failed(1, "")],
    );
    let host = user_host();
    let config = browser_config(apps.path());
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    browser::relaunch(&ctx, &mut tracker, &Templates::new().unwrap())
        .await
        .unwrap();

    let calls = runner.calls();
    let quit = calls.iter().position(|c| c.starts_with("osascript")).unwrap();
    let reopen = calls.iter().position(|c| c.starts_with("open -a")).unwrap();
    assert!(quit < reopen);
    assert_eq!(
        tracker.finish().applied(),
        vec!["Quit Firefox", "Reopen Firefox"]
    );
}

#[tokio::test]
async fn test_browser_not_running_is_left_alone() {
    let home = tempfile::tempdir().unwrap();
    let apps = tempfile::tempdir().unwrap();
    let runner = FakeRunner::new().failing("pgrep", 1, "");
    let host = user_host();
    let config = browser_config(apps.path());
    let ctx = Context::new(&runner, &host, &config, home.path().to_path_buf());

    let mut tracker = ApplyTracker::new();
    browser::relaunch(&ctx, &mut tracker, &Templates::new().unwrap())
        .await
        .unwrap();

    assert!(!runner.called("osascript"));
    assert!(!runner.called("open"));
    assert!(tracker.finish().records().is_empty());
}
