//! Shared helpers for integration tests.

#![allow(dead_code)]

use macprov::config::ProvisionConfig;
use macprov::error::CommandError;
use macprov::host::HostInfo;
use macprov::process::{CommandOutput, CommandRunner, CommandSpec};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

/// In-memory runner that simulates the `defaults` preference store.
///
/// Other commands succeed with empty output unless a canned response, a
/// scripted failure or a missing program says otherwise. Every command is
/// recorded in invocation order.
#[derive(Debug, Default)]
pub struct FakeRunner {
    store: RefCell<HashMap<(bool, String, String), String>>,
    calls: RefCell<Vec<String>>,
    missing: HashSet<String>,
    failing: Vec<(String, i32, String)>,
    responses: HashMap<String, String>,
    scripted: RefCell<Vec<(String, VecDeque<CommandOutput>)>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `program` as not installed
    pub fn missing(mut self, program: &str) -> Self {
        self.missing.insert(program.to_string());
        self
    }

    /// Fail every command whose display form starts with `prefix`
    pub fn failing(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.failing
            .push((prefix.to_string(), code, stderr.to_string()));
        self
    }

    /// Return `stdout` for the command with exactly this display form
    pub fn respond(mut self, command: &str, stdout: &str) -> Self {
        self.responses
            .insert(command.to_string(), stdout.to_string());
        self
    }

    /// Answer successive commands starting with `prefix` from `outputs`,
    /// falling back to the usual behaviour once they run out
    pub fn script(self, prefix: &str, outputs: Vec<CommandOutput>) -> Self {
        self.scripted
            .borrow_mut()
            .push((prefix.to_string(), outputs.into()));
        self
    }

    /// Overwrite a stored preference as if another process changed it
    pub fn set_pref(&self, domain: &str, key: &str, raw: &str) {
        self.store
            .borrow_mut()
            .insert((false, domain.to_string(), key.to_string()), raw.to_string());
    }

    /// Stored preference as `defaults read` would print it
    pub fn pref(&self, domain: &str, key: &str) -> Option<String> {
        self.store
            .borrow()
            .get(&(false, domain.to_string(), key.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn defaults(&self, args: &[String]) -> CommandOutput {
        let (current_host, args) = match args.first().map(String::as_str) {
            Some("-currentHost") => (true, &args[1..]),
            _ => (false, args),
        };

        match args {
            [verb, domain, key, flag, value] if verb == "write" => {
                let stored = match (flag.as_str(), value.as_str()) {
                    ("-bool", "true") => "1".to_string(),
                    ("-bool", "false") => "0".to_string(),
                    _ => value.clone(),
                };
                self.store
                    .borrow_mut()
                    .insert((current_host, domain.clone(), key.clone()), stored);
                CommandOutput::ok("")
            }
            [verb, domain, key] if verb == "read" => {
                match self
                    .store
                    .borrow()
                    .get(&(current_host, domain.clone(), key.clone()))
                {
                    Some(value) => CommandOutput::ok(format!("{value}\n")),
                    None => CommandOutput::failed(
                        1,
                        format!("The domain/default pair of ({domain}, {key}) does not exist"),
                    ),
                }
            }
            _ => CommandOutput::failed(255, "unsupported defaults invocation"),
        }
    }
}

impl CommandRunner for FakeRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let display = spec.display();
        self.calls.borrow_mut().push(display.clone());

        if self.missing.contains(&spec.program) {
            return Err(CommandError::NotFound {
                program: spec.program.clone(),
            });
        }
        let next = self
            .scripted
            .borrow_mut()
            .iter_mut()
            .find(|(prefix, queue)| display.starts_with(prefix.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());
        if let Some(output) = next {
            return Ok(output);
        }
        if let Some((_, code, stderr)) = self
            .failing
            .iter()
            .find(|(prefix, _, _)| display.starts_with(prefix.as_str()))
        {
            return Ok(CommandOutput::failed(*code, stderr.clone()));
        }
        if spec.program == "defaults" {
            return Ok(self.defaults(&spec.args));
        }
        Ok(CommandOutput::ok(
            self.responses.get(&display).cloned().unwrap_or_default(),
        ))
    }
}

/// An Apple Silicon Mac, running as root under `sudo` from alice
pub fn elevated_host() -> HostInfo {
    HostInfo {
        os: "macos".to_string(),
        arch: "aarch64".to_string(),
        effective_uid: 0,
        invoking_user: Some("alice".to_string()),
    }
}

/// An Intel Mac, running as alice
pub fn user_host() -> HostInfo {
    HostInfo {
        os: "macos".to_string(),
        arch: "x86_64".to_string(),
        effective_uid: 501,
        invoking_user: None,
    }
}

pub fn config() -> ProvisionConfig {
    ProvisionConfig::default()
}
