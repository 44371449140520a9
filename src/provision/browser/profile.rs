//! `profiles.ini` lookup.
//!
//! The browser records its profiles in an INI file next to them. The profile
//! the browser actually opens is named by an `[Install…]` section on current
//! releases and by `Default=1` on older ones.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Parsed `profiles.ini`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilesIni {
    sections: Vec<Section>,
}

impl ProfilesIni {
    /// Parse INI text; malformed lines are skipped
    pub fn parse(contents: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                sections.push(Section {
                    name: name.trim().to_string(),
                    entries: Vec::new(),
                });
            } else if let Some((key, value)) = line.split_once('=')
                && let Some(section) = sections.last_mut()
            {
                section
                    .entries
                    .push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        Self { sections }
    }

    /// Read and parse `<root>/profiles.ini`; `None` when it does not exist
    pub fn load(root: &Path) -> std::io::Result<Option<Self>> {
        match std::fs::read_to_string(root.join("profiles.ini")) {
            Ok(contents) => Ok(Some(Self::parse(&contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn profiles(&self) -> impl Iterator<Item = &Section> {
        self.sections
            .iter()
            .filter(|s| s.name.starts_with("Profile") && s.get("Path").is_some())
    }

    /// Directory of the profile the browser opens by default.
    ///
    /// Preference order: an install's `Default`, then the profile marked
    /// `Default=1`, then the first profile listed.
    pub fn default_profile(&self, root: &Path) -> Option<PathBuf> {
        let install = self
            .sections
            .iter()
            .filter(|s| s.name.starts_with("Install"))
            .find_map(|s| s.get("Default"));
        if let Some(path) = install {
            return Some(root.join(path));
        }

        let profile = self
            .profiles()
            .find(|s| s.get("Default") == Some("1"))
            .or_else(|| self.profiles().next())?;
        let path = profile.get("Path")?;

        if profile.get("IsRelative").unwrap_or("1") == "1" {
            Some(root.join(path))
        } else {
            Some(PathBuf::from(path))
        }
    }
}
