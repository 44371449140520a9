//! Typed text payloads handed to external tools.
//!
//! Each payload is a handlebars template paired with a context struct; the
//! struct's fields are the template's only substitution points. Strict mode
//! turns a missing field into a render error instead of an empty string.

use crate::error::Result;
use crate::preferences::PreferenceValue;
use anyhow::Context as _;
use handlebars::Handlebars;
use serde::Serialize;

const USER_JS: &str = "\
// Managed by macprov. Changes here are overwritten on the next run.
{{#each prefs}}
user_pref({{this.name}}, {{this.literal}});
{{/each}}
";

const QUIT_APP: &str = "tell application {{app}} to quit\n";

const SHELLENV: &str = "eval \"$({{prefix}}/bin/brew shellenv)\"\n";

/// A payload with a fixed template
pub trait TemplateContext: Serialize {
    /// Registered template name
    const NAME: &'static str;
}

/// One `user_pref` line; both fields are already JavaScript literals
#[derive(Debug, Clone, Serialize)]
pub struct UserPref {
    name: String,
    literal: String,
}

impl UserPref {
    /// Build a pref line from a name and typed value
    pub fn new(name: &str, value: &PreferenceValue) -> Self {
        let literal = match value {
            PreferenceValue::Bool(v) => v.to_string(),
            PreferenceValue::Int(v) => v.to_string(),
            PreferenceValue::Float(v) => v.to_string(),
            PreferenceValue::String(v) => js_string(v),
        };
        Self {
            name: js_string(name),
            literal,
        }
    }
}

/// Browser `user.js`
#[derive(Debug, Clone, Serialize)]
pub struct UserJs {
    /// Pref lines in output order
    pub prefs: Vec<UserPref>,
}

impl UserJs {
    /// Build from (name, value) pairs
    pub fn from_prefs<'a>(prefs: impl IntoIterator<Item = (&'a String, &'a PreferenceValue)>) -> Self {
        Self {
            prefs: prefs
                .into_iter()
                .map(|(name, value)| UserPref::new(name, value))
                .collect(),
        }
    }
}

impl TemplateContext for UserJs {
    const NAME: &'static str = "user_js";
}

/// AppleScript asking an application to quit
#[derive(Debug, Clone, Serialize)]
pub struct QuitApp {
    app: String,
}

impl QuitApp {
    /// Quit the application with this display name
    pub fn new(app: &str) -> Self {
        Self {
            app: applescript_string(app),
        }
    }
}

impl TemplateContext for QuitApp {
    const NAME: &'static str = "quit_app";
}

/// Shell profile line that puts Homebrew on PATH
#[derive(Debug, Clone, Serialize)]
pub struct Shellenv {
    /// Homebrew prefix
    pub prefix: String,
}

impl TemplateContext for Shellenv {
    const NAME: &'static str = "shellenv";
}

/// Registry of every payload template
#[derive(Debug)]
pub struct Templates {
    registry: Handlebars<'static>,
}

impl Templates {
    /// Register all templates
    pub fn new() -> Result<Self> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);

        for (name, source) in [
            (UserJs::NAME, USER_JS),
            (QuitApp::NAME, QUIT_APP),
            (Shellenv::NAME, SHELLENV),
        ] {
            registry
                .register_template_string(name, source)
                .with_context(|| format!("registering template '{name}'"))?;
        }

        Ok(Self { registry })
    }

    /// Render a payload
    pub fn render<T: TemplateContext>(&self, context: &T) -> Result<String> {
        Ok(self.registry.render(T::NAME, context)?)
    }
}

fn js_string(value: &str) -> String {
    // JSON string literals are valid JavaScript string literals
    serde_json::Value::String(value.to_string()).to_string()
}

fn applescript_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_user_js_renders_typed_literals() {
        let mut prefs = BTreeMap::new();
        prefs.insert("browser.startup.homepage".to_string(), PreferenceValue::from("about:blank"));
        prefs.insert("toolkit.telemetry.enabled".to_string(), PreferenceValue::Bool(false));
        prefs.insert("extensions.autoDisableScopes".to_string(), PreferenceValue::Int(0));

        let rendered = Templates::new()
            .unwrap()
            .render(&UserJs::from_prefs(&prefs))
            .unwrap();

        assert!(rendered.starts_with("// Managed by macprov."));
        assert!(rendered.contains("user_pref(\"browser.startup.homepage\", \"about:blank\");"));
        assert!(rendered.contains("user_pref(\"toolkit.telemetry.enabled\", false);"));
        assert!(rendered.contains("user_pref(\"extensions.autoDisableScopes\", 0);"));
    }

    #[test]
    fn test_user_js_escapes_quotes() {
        let pref = UserPref::new("a\"b", &PreferenceValue::from("say \"hi\""));
        assert_eq!(pref.name, "\"a\\\"b\"");
        assert_eq!(pref.literal, "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_quit_app_quotes_name() {
        let rendered = Templates::new().unwrap().render(&QuitApp::new("Firefox")).unwrap();
        assert_eq!(rendered, "tell application \"Firefox\" to quit\n");
    }

    #[test]
    fn test_shellenv_line() {
        let rendered = Templates::new()
            .unwrap()
            .render(&Shellenv {
                prefix: "/opt/homebrew".to_string(),
            })
            .unwrap();
        assert_eq!(rendered, "eval \"$(/opt/homebrew/bin/brew shellenv)\"\n");
    }
}
