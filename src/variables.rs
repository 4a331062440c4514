// src/variables.rs

//! String bindings used for stage environments and command variables.
//!
//! Both the pipeline `[default]` section and each `[stage.<name>]` section
//! carry `env` and `variables` tables. A stage's effective bindings are the
//! defaults merged with its own table, the stage winning on conflicts.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.?([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder regex is valid")
});

/// Ordered mapping of string keys to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Return a new set where `overrides` takes precedence over `self`.
    pub fn merge(&self, overrides: &Variables) -> Variables {
        let mut merged = self.clone();
        for (k, v) in overrides.iter() {
            merged.set(k, v);
        }
        merged
    }

    /// Replace `{{ key }}` and `{{ .key }}` placeholders with bound values.
    ///
    /// Placeholders naming an unknown key are left untouched.
    pub fn interpolate(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures<'_>| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

impl<K, V> FromIterator<(K, V)> for Variables
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Variables::new();
        for (k, v) in iter {
            vars.set(k, v);
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_overrides() {
        let defaults = Variables::new().with("A", "1").with("B", "2");
        let stage = Variables::new().with("B", "20").with("C", "30");

        let merged = defaults.merge(&stage);
        assert_eq!(merged.get("A"), Some("1"));
        assert_eq!(merged.get("B"), Some("20"));
        assert_eq!(merged.get("C"), Some("30"));
        // Inputs are left alone.
        assert_eq!(defaults.get("B"), Some("2"));
    }

    #[test]
    fn interpolate_replaces_known_placeholders() {
        let vars = Variables::new().with("target", "release").with("Stage.Name", "build");
        assert_eq!(
            vars.interpolate("cargo build --{{ target }} # {{.Stage.Name}}"),
            "cargo build --release # build"
        );
    }

    #[test]
    fn interpolate_keeps_unknown_placeholders() {
        let vars = Variables::new();
        assert_eq!(vars.interpolate("echo {{ missing }}"), "echo {{ missing }}");
    }
}
