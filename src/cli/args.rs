//! Command line argument parsing and validation.

use crate::host::Capability;
use crate::provision::{
    bootstrap, browser, disk, harden, launch_agent, personalize, recovery_key, reinstall,
};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Post-install provisioning for a personal Mac
#[derive(Parser, Debug)]
#[command(
    name = "macprov",
    version,
    about = "Post-install provisioning for a personal Mac",
    long_about = "Configure a Mac after a fresh install: installer media, reinstall, \
hardening, personalization, developer tooling and a browser.

Usage:
  sudo macprov usb disk4
  sudo macprov harden
  macprov personalize
  macprov verify all"
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (default: ~/.config/macprov/config.toml)
    #[arg(long, global = true, value_name = "PATH", env = "MACPROV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print every command instead of running it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Directory for the run log (default: Desktop)
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Show extra detail
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Erase an external disk and write a bootable macOS installer to it
    Usb {
        /// Whole-disk identifier, e.g. disk4 (see `diskutil list external`)
        disk: String,

        /// Name for the installer volume
        volume_name: Option<String>,

        /// Installer application to use
        #[arg(long, value_name = "APP")]
        installer: Option<PathBuf>,
    },

    /// Erase the startup disk and reinstall macOS
    Reinstall {
        /// Acknowledge that every file on this Mac will be erased
        #[arg(long)]
        confirm: bool,

        /// Installer application to use
        #[arg(long, value_name = "APP")]
        installer: Option<PathBuf>,
    },

    /// Install Command Line Tools, Homebrew and configured packages
    Bootstrap,

    /// Apply security and privacy defaults
    Harden,

    /// Apply UI preferences
    Personalize {
        /// Don't restart Dock, Finder and SystemUIServer
        #[arg(long)]
        no_restart: bool,
    },

    /// Re-apply personalization at every login
    Persist {
        /// Unload and delete the login agent instead
        #[arg(long)]
        remove: bool,
    },

    /// Generate a new FileVault personal recovery key
    RotateKey {
        /// File to save the new key to
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Install the browser with extensions and preferences
    Browser,

    /// Check applied settings without changing anything
    Verify {
        /// Which settings to check
        #[arg(value_enum, default_value_t = VerifyTarget::All)]
        target: VerifyTarget,
    },
}

/// Settings groups `verify` can check
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyTarget {
    /// Security defaults
    Harden,
    /// UI preferences
    Personalize,
    /// Both
    All,
}

impl Command {
    /// Subcommand name as typed
    pub fn name(&self) -> &'static str {
        match self {
            Command::Usb { .. } => "usb",
            Command::Reinstall { .. } => "reinstall",
            Command::Bootstrap => "bootstrap",
            Command::Harden => "harden",
            Command::Personalize { .. } => "personalize",
            Command::Persist { .. } => "persist",
            Command::RotateKey { .. } => "rotate-key",
            Command::Browser => "browser",
            Command::Verify { .. } => "verify",
        }
    }

    /// What the host must provide before this command may run
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Command::Usb { .. } => disk::CAPABILITIES,
            Command::Reinstall { .. } => reinstall::CAPABILITIES,
            Command::Bootstrap => bootstrap::CAPABILITIES,
            Command::Harden => harden::CAPABILITIES,
            Command::Personalize { .. } => personalize::CAPABILITIES,
            Command::Persist { .. } => launch_agent::CAPABILITIES,
            Command::RotateKey { .. } => recovery_key::CAPABILITIES,
            Command::Browser => browser::CAPABILITIES,
            Command::Verify { .. } => &[Capability::MacOs],
        }
    }
}

impl Args {
    /// Parse command line arguments.
    ///
    /// Usage errors exit with status 1; `--help` and `--version` exit 0.
    pub fn parse_args() -> Self {
        Self::try_parse().unwrap_or_else(|e| {
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code)
        })
    }

    /// Validate arguments clap cannot check
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Usb {
            disk: identifier,
            volume_name,
            ..
        } = &self.command
        {
            disk::validate_disk_identifier(identifier).map_err(|e| e.to_string())?;
            if let Some(name) = volume_name {
                disk::validate_volume_name(name).map_err(|e| e.to_string())?;
            }
        }
        Ok(())
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    output: super::OutputManager,
    dry_run: bool,
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, args.quiet),
            dry_run: args.dry_run,
        }
    }
}

impl RuntimeConfig {
    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Whether commands are only printed
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print verbose message
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        let _ = self.output.section(title);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.output.is_quiet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("macprov").chain(argv.iter().copied()))
    }

    #[test]
    fn test_parse_usb_with_globals() {
        let args = parse(&["usb", "disk4", "Installer", "--dry-run", "--log-dir", "/tmp/l"]).unwrap();
        assert!(args.dry_run);
        assert_eq!(args.log_dir, Some(PathBuf::from("/tmp/l")));
        match args.command {
            Command::Usb {
                disk, volume_name, ..
            } => {
                assert_eq!(disk, "disk4");
                assert_eq!(volume_name.as_deref(), Some("Installer"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_verify_defaults_to_all() {
        let args = parse(&["verify"]).unwrap();
        assert!(matches!(
            args.command,
            Command::Verify {
                target: VerifyTarget::All
            }
        ));
        assert!(parse(&["verify", "nonsense"]).is_err());
    }

    #[test]
    fn test_validate_rejects_partition_identifier() {
        let args = parse(&["usb", "disk4s2"]).unwrap();
        assert!(args.validate().unwrap_err().contains("disk4s2"));
        assert!(parse(&["usb", "disk4", "bad/name"]).unwrap().validate().is_err());
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(parse(&["harden", "-q", "-v"]).is_err());
    }

    #[test]
    fn test_command_names_match_subcommands() {
        let args = parse(&["rotate-key", "-o", "/tmp/key.txt"]).unwrap();
        assert_eq!(args.command.name(), "rotate-key");
        assert!(
            args.command
                .capabilities()
                .contains(&Capability::Elevated)
        );
        assert_eq!(
            parse(&["verify"]).unwrap().command.capabilities(),
            &[Capability::MacOs]
        );
    }
}
