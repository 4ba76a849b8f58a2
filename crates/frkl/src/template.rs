//! Rendering of fetched source text before it is parsed

use crate::error::{Error, Result};
use crate::leaf::Leaf;
use crate::merge::deep_merge;
use handlebars::Handlebars;
use serde_json::{Map, Value};

/// Key under which the process environment is exposed to templates.
pub const ENV_KEY: &str = "env";

/// Renders `{{ ... }}` expressions in source text.
pub struct Templater {
    registry: Handlebars<'static>,
    enabled: bool,
}

impl Templater {
    /// Create a templater; a disabled one returns text unchanged.
    pub fn new(enabled: bool) -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        Self { registry, enabled }
    }

    /// Whether `text` has anything to render.
    pub fn needs_render(&self, text: &str) -> bool {
        self.enabled && text.contains("{{")
    }

    /// Render `text` against `context`.
    pub fn render(&self, location: &str, text: &str, context: &Value) -> Result<String> {
        if !self.needs_render(text) {
            return Ok(text.to_string());
        }
        self.registry
            .render_template(text, context)
            .map_err(|e| Error::Template {
                location: location.to_string(),
                message: e.to_string(),
            })
    }
}

/// Build the template context from the leaves emitted so far.
///
/// Earlier leaves take precedence over later ones. The process environment
/// is available under [`ENV_KEY`].
pub fn template_context(leaves: &[Leaf]) -> Value {
    let mut context = leaves
        .iter()
        .rev()
        .fold(Value::Object(Map::new()), |acc, leaf| {
            deep_merge(&acc, &leaf.to_value())
        });

    let env: Map<String, Value> = std::env::vars()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    if let Value::Object(map) = &mut context {
        map.insert(ENV_KEY.to_string(), Value::Object(env));
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_lookup() {
        let templater = Templater::new(true);
        let out = templater
            .render("inline", "dir: {{vars.base}}/x", &json!({"vars": {"base": "/opt"}}))
            .unwrap();
        assert_eq!(out, "dir: /opt/x");
    }

    #[test]
    fn test_no_html_escaping() {
        let templater = Templater::new(true);
        let out = templater
            .render("inline", "{{v}}", &json!({"v": "a&b<c>"}))
            .unwrap();
        assert_eq!(out, "a&b<c>");
    }

    #[test]
    fn test_disabled_passthrough() {
        let templater = Templater::new(false);
        let out = templater
            .render("inline", "{{vars.base}}", &json!({}))
            .unwrap();
        assert_eq!(out, "{{vars.base}}");
    }

    #[test]
    fn test_render_error_is_config_error() {
        let templater = Templater::new(true);
        let err = templater
            .render("inline", "{{#if}}", &json!({}))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_context_has_env() {
        let context = template_context(&[]);
        assert!(context[ENV_KEY].is_object());
    }
}
