//! Chat components as carried by entity metadata (JSON encoded).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A minimal JSON chat component: literal text, optional colour, children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TextComponent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra: Vec<TextComponent>,
}

impl TextComponent {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
            extra: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn colored(text: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: Some(color.into()),
            extra: Vec::new(),
        }
    }

    /// True when neither this node nor any child renders a character.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.extra.iter().all(TextComponent::is_empty)
    }

    /// Join components with newline separators under an empty root.
    pub fn join_lines(lines: Vec<TextComponent>) -> Self {
        let mut extra = Vec::with_capacity(lines.len() * 2);
        for (i, line) in lines.into_iter().enumerate() {
            if i > 0 {
                extra.push(TextComponent::plain("\n"));
            }
            extra.push(line);
        }
        Self {
            text: String::new(),
            color: None,
            extra,
        }
    }

    /// Concatenated text of the whole tree, colours dropped.
    pub fn plain_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.extra {
            out.push_str(&child.plain_text());
        }
        out
    }

    pub fn to_json_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("text".into(), Value::String(self.text.clone()));
        if let Some(color) = &self.color {
            map.insert("color".into(), Value::String(color.clone()));
        }
        if !self.extra.is_empty() {
            map.insert(
                "extra".into(),
                Value::Array(self.extra.iter().map(TextComponent::to_json_value).collect()),
            );
        }
        Value::Object(map)
    }

    pub fn to_json(&self) -> String {
        self.to_json_value().to_string()
    }

    /// A component for an empty JSON text, as the protocol expects for
    /// absent team prefixes and display names.
    pub fn empty_json() -> String {
        json!({ "text": "" }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_lines_interleaves_newlines() {
        let joined = TextComponent::join_lines(vec![
            TextComponent::plain("Steve"),
            TextComponent::colored("[VIP]", "gold"),
        ]);
        assert_eq!(joined.plain_text(), "Steve\n[VIP]");
        assert_eq!(joined.extra.len(), 3);
    }

    #[test]
    fn empty_detection_looks_at_children() {
        assert!(TextComponent::join_lines(vec![]).is_empty());
        assert!(TextComponent::join_lines(vec![TextComponent::empty()]).is_empty());
        assert!(!TextComponent::join_lines(vec![TextComponent::plain("x")]).is_empty());
    }

    #[test]
    fn json_shape() {
        let c = TextComponent::colored("Alex", "red");
        let parsed: TextComponent = serde_json::from_str(&c.to_json()).unwrap();
        assert_eq!(parsed, c);
        assert_eq!(TextComponent::plain("a").to_json(), r#"{"text":"a"}"#);
    }
}
