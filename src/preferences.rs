//! Typed access to the macOS preference store (`defaults`).

use crate::apply::{Probe, VerifyCheck};
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A literal written to or read from the preference store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    /// `-bool`
    Bool(bool),
    /// `-int`
    Int(i64),
    /// `-float`
    Float(f64),
    /// `-string`
    String(String),
}

impl PreferenceValue {
    /// Type flag passed to `defaults write`
    pub fn type_flag(&self) -> &'static str {
        match self {
            PreferenceValue::Bool(_) => "-bool",
            PreferenceValue::Int(_) => "-int",
            PreferenceValue::Float(_) => "-float",
            PreferenceValue::String(_) => "-string",
        }
    }

    /// Whether `defaults read` output represents this literal.
    ///
    /// Booleans read back as `1`/`0`; numbers are compared numerically so
    /// `0.50` matches `0.5`.
    pub fn matches_read(&self, raw: &str) -> bool {
        let raw = raw.trim_end_matches(['\n', '\r']);
        match self {
            PreferenceValue::Bool(expected) => match raw.trim() {
                "1" | "true" | "YES" => *expected,
                "0" | "false" | "NO" => !*expected,
                _ => false,
            },
            PreferenceValue::Int(expected) => raw.trim().parse::<i64>() == Ok(*expected),
            PreferenceValue::Float(expected) => raw
                .trim()
                .parse::<f64>()
                .map(|actual| (actual - expected).abs() < 1e-9)
                .unwrap_or(false),
            PreferenceValue::String(expected) => raw == expected,
        }
    }
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceValue::Bool(v) => write!(f, "{v}"),
            PreferenceValue::Int(v) => write!(f, "{v}"),
            PreferenceValue::Float(v) => write!(f, "{v}"),
            PreferenceValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Bool(value)
    }
}

impl From<i64> for PreferenceValue {
    fn from(value: i64) -> Self {
        PreferenceValue::Int(value)
    }
}

impl From<f64> for PreferenceValue {
    fn from(value: f64) -> Self {
        PreferenceValue::Float(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::String(value.to_string())
    }
}

impl From<String> for PreferenceValue {
    fn from(value: String) -> Self {
        PreferenceValue::String(value)
    }
}

/// Address of one preference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceKey {
    /// Domain (`com.apple.dock`, `NSGlobalDomain`) or plist path
    pub domain: String,
    /// Key within the domain
    pub key: String,
    /// Use the `-currentHost` (ByHost) variant
    pub current_host: bool,
    /// Write as this user through `sudo -u`
    pub user: Option<String>,
}

impl PreferenceKey {
    /// Key in a per-user or system domain
    pub fn new(domain: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            key: key.into(),
            current_host: false,
            user: None,
        }
    }

    /// Use the ByHost variant of the domain
    pub fn current_host(mut self) -> Self {
        self.current_host = true;
        self
    }

    /// Read and write as another user
    pub fn for_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    fn base(&self, verb: &str) -> CommandSpec {
        let mut spec = CommandSpec::new("defaults");
        if self.current_host {
            spec = spec.arg("-currentHost");
        }
        spec.arg(verb)
            .arg(&self.domain)
            .arg(&self.key)
            .as_user(self.user.clone())
    }

    /// `defaults write <domain> <key> -<type> <value>`
    pub fn write_command(&self, value: &PreferenceValue) -> CommandSpec {
        self.base("write")
            .arg(value.type_flag())
            .arg(value.to_string())
    }

    /// `defaults read <domain> <key>`
    pub fn read_command(&self) -> CommandSpec {
        self.base("read")
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.current_host {
            write!(f, "{} {} (current host)", self.domain, self.key)
        } else {
            write!(f, "{} {}", self.domain, self.key)
        }
    }
}

/// A literal preference write paired with its description
#[derive(Debug, Clone, PartialEq)]
pub struct PreferenceWrite {
    /// What the setting does, for humans
    pub description: String,
    /// Where it is stored
    pub key: PreferenceKey,
    /// Literal to write
    pub value: PreferenceValue,
}

impl PreferenceWrite {
    /// Describe a write
    pub fn new(
        description: impl Into<String>,
        key: PreferenceKey,
        value: impl Into<PreferenceValue>,
    ) -> Self {
        Self {
            description: description.into(),
            key,
            value: value.into(),
        }
    }

    /// Command performing the write
    pub fn command(&self) -> CommandSpec {
        self.key.write_command(&self.value)
    }

    /// Read-back check for this write
    pub fn verify_check(&self) -> VerifyCheck {
        VerifyCheck {
            description: self.description.clone(),
            probe: Probe::Preference {
                key: self.key.clone(),
                expected: self.value.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_command_arguments() {
        let key = PreferenceKey::new("com.apple.dock", "autohide");
        let spec = key.write_command(&PreferenceValue::Bool(true));
        assert_eq!(spec.program, "defaults");
        assert_eq!(spec.args, vec!["write", "com.apple.dock", "autohide", "-bool", "true"]);
    }

    #[test]
    fn test_current_host_flag_precedes_verb() {
        let key = PreferenceKey::new("NSGlobalDomain", "com.apple.mouse.tapBehavior").current_host();
        let spec = key.read_command();
        assert_eq!(
            spec.args,
            vec!["-currentHost", "read", "NSGlobalDomain", "com.apple.mouse.tapBehavior"]
        );
    }

    #[test]
    fn test_user_scoped_key_runs_through_sudo() {
        let key = PreferenceKey::new("com.apple.screensaver", "askForPassword")
            .for_user(Some("alice".to_string()));
        let (program, args) = key.write_command(&PreferenceValue::Int(1)).argv();
        assert_eq!(program, "sudo");
        assert_eq!(&args[..3], &["-u", "alice", "defaults"]);
    }

    #[test]
    fn test_bool_reads_back_as_digit() {
        assert!(PreferenceValue::Bool(true).matches_read("1\n"));
        assert!(PreferenceValue::Bool(false).matches_read("0\n"));
        assert!(!PreferenceValue::Bool(true).matches_read("0\n"));
        assert!(!PreferenceValue::Bool(true).matches_read(""));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert!(PreferenceValue::Int(15).matches_read("15\n"));
        assert!(!PreferenceValue::Int(15).matches_read("2\n"));
        assert!(PreferenceValue::Float(0.5).matches_read("0.50\n"));
        assert!(!PreferenceValue::Float(0.5).matches_read("abc"));
    }

    #[test]
    fn test_strings_compare_exactly() {
        let value = PreferenceValue::from("Nlsv");
        assert!(value.matches_read("Nlsv\n"));
        assert!(!value.matches_read("nlsv\n"));
    }

    #[test]
    fn test_untagged_values_from_toml() {
        #[derive(Deserialize)]
        struct Row {
            value: PreferenceValue,
        }
        let parse = |s: &str| toml::from_str::<Row>(s).unwrap().value;
        assert_eq!(parse("value = true"), PreferenceValue::Bool(true));
        assert_eq!(parse("value = 36"), PreferenceValue::Int(36));
        assert_eq!(parse("value = 0.25"), PreferenceValue::Float(0.25));
        assert_eq!(parse("value = \"png\""), PreferenceValue::String("png".to_string()));
    }
}
