//! Browser installation and profile setup.
//!
//! The browser is installed from its disk image, then its default profile gets
//! extensions, a `user.js` and an enterprise `policies.json`. A running
//! browser is restarted so the new settings take effect.

mod profile;

pub use profile::ProfilesIni;

use super::Context;
use crate::apply::ApplyTracker;
use crate::config::BrowserConfig;
use crate::download::{Downloader, artifact_path};
use crate::error::{ProvisionError, Result};
use crate::host::Capability;
use crate::process::{CommandRunner, CommandSpec};
use crate::templates::{QuitApp, Templates, UserJs};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Capabilities `browser` needs
pub const CAPABILITIES: &[Capability] = &[
    Capability::MacOs,
    Capability::SupportedArchitecture,
    Capability::Unprivileged,
];

const QUIT_POLL: Duration = Duration::from_millis(500);
const QUIT_ATTEMPTS: u32 = 20;

/// `<applications_dir>/<app>`
pub fn installed_app(config: &BrowserConfig) -> PathBuf {
    config.applications_dir.join(&config.app_name)
}

/// Browser executable inside the bundle
pub fn executable(app: &Path, config: &BrowserConfig) -> PathBuf {
    app.join("Contents").join("MacOS").join(&config.process_name)
}

/// Enterprise policy file location inside the bundle
pub fn policies_path(app: &Path) -> PathBuf {
    app.join("Contents")
        .join("Resources")
        .join("distribution")
        .join("policies.json")
}

/// `policies.json` contents
pub fn policies(config: &BrowserConfig) -> serde_json::Value {
    let extensions: serde_json::Map<String, serde_json::Value> = config
        .extensions
        .iter()
        .map(|ext| {
            (
                ext.id.clone(),
                serde_json::json!({
                    "installation_mode": "normal_installed",
                    "install_url": ext.url,
                }),
            )
        })
        .collect();

    serde_json::json!({
        "policies": {
            "DisableTelemetry": true,
            "DisableFirefoxStudies": true,
            "DisablePocket": true,
            "DontCheckDefaultBrowser": true,
            "ExtensionSettings": extensions,
        }
    })
}

async fn replace_app<R: CommandRunner>(ctx: &Context<'_, R>, source: &Path, dest: &Path) -> Result<()> {
    if !ctx.dry_run() && dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    ctx.runner
        .run(
            &CommandSpec::new("ditto")
                .arg(source.to_string_lossy())
                .arg(dest.to_string_lossy()),
        )
        .await?;
    Ok(())
}

async fn install_app<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    downloader: &Downloader,
) -> Result<()> {
    let config = &ctx.config.browser;
    let scratch = tempfile::tempdir()?;
    let image = scratch.path().join("browser.dmg");
    let mount = scratch.path().join("mnt");

    let download = async {
        if ctx.dry_run() {
            log::info!("[dry-run] download {} to {}", config.download_url, image.display());
            return Ok::<_, ProvisionError>(image.clone());
        }
        downloader
            .download_to(&config.download_url, &image, config.sha256.as_deref())
            .await
    };
    tracker
        .require(format!("Download {}", config.name), download)
        .await?;

    let attach = CommandSpec::new("hdiutil")
        .args(["attach", "-nobrowse", "-readonly", "-mountpoint"])
        .arg(mount.to_string_lossy())
        .arg(image.to_string_lossy());
    tracker
        .require(format!("Mount {} disk image", config.name), ctx.runner.run(&attach))
        .await?;

    let dest = installed_app(config);
    let copied = tracker
        .require(
            format!("Install {}", dest.display()),
            replace_app(ctx, &mount.join(&config.app_name), &dest),
        )
        .await;

    let detach = CommandSpec::new("hdiutil")
        .arg("detach")
        .arg(mount.to_string_lossy());
    tracker
        .attempt(format!("Unmount {} disk image", config.name), ctx.runner.run(&detach))
        .await;

    copied
}

/// Locate the default profile, asking the browser to create one if needed
pub async fn ensure_profile<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
) -> Result<PathBuf> {
    let config = &ctx.config.browser;
    let root = ctx.home.join(&config.profiles_root);

    let find = |root: &Path| -> Result<Option<PathBuf>> {
        Ok(ProfilesIni::load(root)?.and_then(|ini| ini.default_profile(root)))
    };

    if let Some(profile) = find(&root)? {
        log::info!("Using profile {}", profile.display());
        return Ok(profile);
    }

    let create = CommandSpec::new(executable(&installed_app(config), config).to_string_lossy())
        .args(["-headless", "-CreateProfile", "default"]);
    tracker
        .require(format!("Create {} profile", config.name), ctx.runner.run(&create))
        .await?;

    match find(&root)? {
        Some(profile) => Ok(profile),
        None if ctx.dry_run() => Ok(root.join("Profiles").join("default")),
        None => {
            let reason = format!("no profile listed in {}", root.join("profiles.ini").display());
            tracker.record_failed("Locate browser profile", &reason);
            Err(ProvisionError::step_failed("Locate browser profile", reason))
        }
    }
}

async fn place_extensions<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    downloader: &Downloader,
    profile: &Path,
) {
    let dir = profile.join("extensions");
    for ext in &ctx.config.browser.extensions {
        let dest = artifact_path(&dir, &ext.id, "xpi");
        let place = async {
            if ctx.dry_run() {
                log::info!("[dry-run] download {} to {}", ext.url, dest.display());
                return Ok::<_, ProvisionError>(dest.clone());
            }
            downloader
                .download_to(&ext.url, &dest, ext.sha256.as_deref())
                .await
        };
        tracker
            .attempt(format!("Install extension {}", ext.id), place)
            .await;
    }
}

async fn is_running<R: CommandRunner>(ctx: &Context<'_, R>, process: &str) -> bool {
    ctx.runner
        .output(&CommandSpec::new("pgrep").args(["-x", process]))
        .await
        .is_ok_and(|output| output.success())
}

/// Restart the browser if it is running; otherwise leave it for next launch
pub async fn relaunch<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    templates: &Templates,
) -> Result<()> {
    let config = &ctx.config.browser;
    if ctx.dry_run() {
        log::info!("[dry-run] restart {} if it is running", config.name);
        return Ok(());
    }
    if !is_running(ctx, &config.process_name).await {
        log::info!("{} is not running; settings apply at next launch", config.name);
        return Ok(());
    }

    let script = templates.render(&QuitApp::new(&config.name))?;
    let quit = CommandSpec::new("osascript").arg("-e").arg(script.trim_end());
    if tracker
        .attempt(format!("Quit {}", config.name), ctx.runner.run(&quit))
        .await
        .is_none()
    {
        return Ok(());
    }

    for _ in 0..QUIT_ATTEMPTS {
        if !is_running(ctx, &config.process_name).await {
            break;
        }
        tokio::time::sleep(QUIT_POLL).await;
    }

    let open = CommandSpec::new("open")
        .arg("-a")
        .arg(installed_app(config).to_string_lossy());
    tracker
        .attempt(format!("Reopen {}", config.name), ctx.runner.run(&open))
        .await;
    Ok(())
}

/// Place extensions, `user.js` and `policies.json` for `profile`
pub async fn configure_profile<R: CommandRunner>(
    ctx: &Context<'_, R>,
    tracker: &mut ApplyTracker,
    downloader: &Downloader,
    templates: &Templates,
    profile: &Path,
) -> Result<()> {
    let config = &ctx.config.browser;
    place_extensions(ctx, tracker, downloader, profile).await;

    let user_js = templates.render(&UserJs::from_prefs(&config.prefs))?;
    let user_js_path = profile.join("user.js");
    tracker
        .attempt(
            format!("Write {}", user_js_path.display()),
            ctx.write_text(&user_js_path, &user_js),
        )
        .await;

    let policies_json = serde_json::to_string_pretty(&policies(config))?;
    let policies_file = policies_path(&installed_app(config));
    tracker
        .attempt(
            format!("Write {}", policies_file.display()),
            ctx.write_text(&policies_file, &policies_json),
        )
        .await;
    Ok(())
}

/// Install the browser and configure its default profile
pub async fn run<R: CommandRunner>(ctx: &Context<'_, R>, tracker: &mut ApplyTracker) -> Result<()> {
    let downloader = Downloader::new(&ctx.config.download)?;
    let templates = Templates::new()?;

    install_app(ctx, tracker, &downloader).await?;

    let profile = ensure_profile(ctx, tracker).await?;
    configure_profile(ctx, tracker, &downloader, &templates, &profile).await?;

    relaunch(ctx, tracker, &templates).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policies_list_every_extension() {
        let config = BrowserConfig::default();
        let value = policies(&config);
        let settings = value["policies"]["ExtensionSettings"].as_object().unwrap();

        assert_eq!(settings.len(), config.extensions.len());
        let ublock = &settings["uBlock0@raymondhill.net"];
        assert_eq!(ublock["installation_mode"], "normal_installed");
        assert!(ublock["install_url"].as_str().unwrap().starts_with("https://"));
        assert_eq!(value["policies"]["DisableTelemetry"], true);
    }

    #[test]
    fn test_bundle_paths() {
        let config = BrowserConfig::default();
        let app = installed_app(&config);
        assert_eq!(app, PathBuf::from("/Applications/Firefox.app"));
        assert_eq!(
            executable(&app, &config),
            PathBuf::from("/Applications/Firefox.app/Contents/MacOS/firefox")
        );
        assert_eq!(
            policies_path(&app),
            PathBuf::from("/Applications/Firefox.app/Contents/Resources/distribution/policies.json")
        );
    }
}
