//! # macprov
//!
//! Post-install provisioning for a personal Mac.
//!
//! Every change macprov makes is an invocation of a stock macOS utility
//! (`defaults`, `diskutil`, `fdesetup`, `launchctl`, ...). This crate decides
//! what to run, in what order, and records what happened.
//!
//! ## Features
//!
//! - **Capability checks**: commands declare what they need from the host and
//!   refuse to start without it
//! - **Best-effort application**: one failed setting never stops the rest
//! - **Read-back verification**: every preference written can be checked
//! - **Dry runs**: print every command without executing anything
//! - **Run logs**: a timestamped record of each invocation on the Desktop
//!
//! ## Usage
//!
//! ```bash
//! sudo macprov usb disk4         # Bootable installer on an external disk
//! sudo macprov harden            # Security defaults
//! macprov personalize            # Dock, Finder, keyboard, trackpad
//! macprov verify all             # Check without changing anything
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod apply;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod host;
pub mod keepalive;
pub mod preferences;
pub mod process;
pub mod provision;
pub mod runlog;
pub mod templates;

// Re-export main types for public API
pub use apply::{ApplyTracker, Outcome, RunSummary, SettingRecord, VerificationReport, VerifyCheck};
pub use cli::Args;
pub use config::ProvisionConfig;
pub use error::{ProvisionError, Result};
pub use host::{Architecture, Capability, HostInfo};
pub use preferences::{PreferenceKey, PreferenceValue, PreferenceWrite};
pub use process::{CommandOutput, CommandRunner, CommandSpec, DryRunRunner, IoMode, SystemRunner};
