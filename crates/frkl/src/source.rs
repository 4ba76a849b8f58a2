//! Configuration sources and location abbreviations

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Token used in abbreviation templates for a positional path segment.
pub const POSITIONAL_TOKEN: &str = "{}";

/// One configuration source, before fetching.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// A local YAML/JSON file.
    Path(PathBuf),
    /// A remote YAML/JSON document.
    Url(String),
    /// Text given directly: a YAML/JSON document or a bare name.
    Inline(String),
    /// An already-parsed tree (typically a stem child written in place).
    Tree(Value),
}

impl ConfigSource {
    /// Classify a user-provided string.
    ///
    /// Abbreviations are expanded first. An existing local path wins over
    /// everything else, then `http(s)://` locations; whatever remains is
    /// treated as inline text.
    pub fn classify(raw: &str, abbreviations: &Abbreviations) -> Result<Self> {
        let expanded = abbreviations.expand(raw)?;

        if Path::new(&expanded).exists() {
            return Ok(Self::Path(PathBuf::from(expanded)));
        }
        if expanded.starts_with("http://") || expanded.starts_with("https://") {
            return Ok(Self::Url(expanded));
        }
        Ok(Self::Inline(expanded))
    }

    /// Build a source from a value found in a stem list or a `load` key.
    pub fn from_value(value: &Value, abbreviations: &Abbreviations) -> Result<Self> {
        match value {
            Value::String(s) => Self::classify(s, abbreviations),
            other => Ok(Self::Tree(other.clone())),
        }
    }

    /// Location that identifies a fetched source, used for cycle detection.
    pub fn location(&self) -> Option<String> {
        match self {
            Self::Path(path) => Some(
                path.canonicalize()
                    .unwrap_or_else(|_| path.clone())
                    .display()
                    .to_string(),
            ),
            Self::Url(url) => Some(url.clone()),
            Self::Inline(_) | Self::Tree(_) => None,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Url(url) => write!(f, "{url}"),
            Self::Inline(text) => write!(f, "{text}"),
            Self::Tree(value) => write!(f, "{value}"),
        }
    }
}

/// Part of an abbreviation template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Fixed text.
    Literal(String),
    /// Takes the next `/`-separated part of the abbreviated location.
    Positional,
}

/// Registered location abbreviations, keyed by scheme prefix.
///
/// `gh:makkus/dotfiles/freckles.yml` expands to
/// `https://raw.githubusercontent.com/makkus/dotfiles/master/freckles.yml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Abbreviations {
    entries: BTreeMap<String, Vec<Segment>>,
}

impl Abbreviations {
    /// No abbreviations at all.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register (or replace) an abbreviation.
    pub fn insert(&mut self, prefix: impl Into<String>, template: Vec<Segment>) {
        self.entries.insert(prefix.into(), template);
    }

    /// Parse a template written as strings, `{}` marking positional slots.
    pub fn parse_template<S: AsRef<str>>(tokens: &[S]) -> Vec<Segment> {
        tokens
            .iter()
            .map(|t| match t.as_ref() {
                POSITIONAL_TOKEN => Segment::Positional,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect()
    }

    /// Whether a prefix is registered.
    pub fn contains(&self, prefix: &str) -> bool {
        self.entries.contains_key(prefix)
    }

    /// Expand `location` if it starts with a registered `prefix:`.
    ///
    /// Locations without a registered prefix are returned unchanged.
    pub fn expand(&self, location: &str) -> Result<String> {
        let Some((prefix, rest)) = location.split_once(':') else {
            return Ok(location.to_string());
        };
        let Some(template) = self.entries.get(prefix) else {
            return Ok(location.to_string());
        };

        let mut tokens = rest.split('/').filter(|t| !t.is_empty());
        let mut parts = Vec::with_capacity(template.len());
        for segment in template {
            match segment {
                Segment::Literal(text) => parts.push(text.clone()),
                Segment::Positional => {
                    let token = tokens.next().ok_or_else(|| Error::Abbreviation {
                        location: location.to_string(),
                        reason: "not enough parts".to_string(),
                    })?;
                    parts.push(token.to_string());
                }
            }
        }
        parts.extend(tokens.map(str::to_string));

        let expanded = parts.join("/");
        log::debug!("Expanded '{location}' to {expanded}");
        Ok(expanded)
    }
}

impl Default for Abbreviations {
    fn default() -> Self {
        let mut abbreviations = Self::empty();
        abbreviations.insert(
            "gh",
            Self::parse_template(&[
                "https://raw.githubusercontent.com",
                POSITIONAL_TOKEN,
                POSITIONAL_TOKEN,
                "master",
            ]),
        );
        abbreviations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_github() {
        let abbreviations = Abbreviations::default();
        assert_eq!(
            abbreviations
                .expand("gh:makkus/freckles/tests/resources/run.yml")
                .unwrap(),
            "https://raw.githubusercontent.com/makkus/freckles/master/tests/resources/run.yml"
        );
    }

    #[test]
    fn test_expand_not_enough_parts() {
        let abbreviations = Abbreviations::default();
        let err = abbreviations.expand("gh:makkus").unwrap_err();
        assert!(matches!(err, Error::Abbreviation { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn test_unknown_prefix_untouched() {
        let abbreviations = Abbreviations::default();
        assert_eq!(
            abbreviations.expand("https://example.com/a.yml").unwrap(),
            "https://example.com/a.yml"
        );
        assert_eq!(abbreviations.expand("debug").unwrap(), "debug");
        assert_eq!(
            abbreviations.expand("{vars: {a: 1}}").unwrap(),
            "{vars: {a: 1}}"
        );
    }

    #[test]
    fn test_custom_abbreviation() {
        let mut abbreviations = Abbreviations::empty();
        abbreviations.insert(
            "gl",
            Abbreviations::parse_template(&["https://gitlab.com", "{}", "{}", "-/raw/main"]),
        );
        assert_eq!(
            abbreviations.expand("gl:me/dots/a/b.yml").unwrap(),
            "https://gitlab.com/me/dots/-/raw/main/a/b.yml"
        );
        assert!(!abbreviations.contains("gh"));
    }

    #[test]
    fn test_classify() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yml");
        std::fs::write(&file, "vars: {}").unwrap();
        let abbreviations = Abbreviations::default();

        assert_eq!(
            ConfigSource::classify(file.to_str().unwrap(), &abbreviations).unwrap(),
            ConfigSource::Path(file.clone())
        );
        assert_eq!(
            ConfigSource::classify("https://example.com/x.yml", &abbreviations).unwrap(),
            ConfigSource::Url("https://example.com/x.yml".into())
        );
        assert_eq!(
            ConfigSource::classify("gh:a/b/c.yml", &abbreviations).unwrap(),
            ConfigSource::Url("https://raw.githubusercontent.com/a/b/master/c.yml".into())
        );
        assert_eq!(
            ConfigSource::classify("debug", &abbreviations).unwrap(),
            ConfigSource::Inline("debug".into())
        );
    }

    #[test]
    fn test_from_value() {
        let abbreviations = Abbreviations::default();
        let tree = json!({"install": ["git"]});
        assert_eq!(
            ConfigSource::from_value(&tree, &abbreviations).unwrap(),
            ConfigSource::Tree(tree.clone())
        );
        assert_eq!(
            ConfigSource::from_value(&json!("stow"), &abbreviations).unwrap(),
            ConfigSource::Inline("stow".into())
        );
        assert_eq!(ConfigSource::Inline("x".into()).location(), None);
        assert_eq!(
            ConfigSource::Url("https://a".into()).location(),
            Some("https://a".into())
        );
    }
}
