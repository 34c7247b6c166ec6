//! Custom attribute requirements.
//!
//! A blueprint may declare a newline-separated `key=value` list of
//! attributes it provides. Leases express requirements as `attr_<key>`
//! entries in their attribute bag; a requirement of `true` only asks for
//! the key to be present.

use serde_json::Value;

use crate::types::Attributes;

/// Prefix that marks a lease attribute as a custom requirement.
pub const CUSTOM_PREFIX: &str = "attr_";

/// Parse a `key=value` per line attribute declaration.
pub fn parse_custom_attributes(text: Option<&str>) -> Attributes {
    let mut attributes = Attributes::new();
    let Some(text) = text else {
        return attributes;
    };

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once('=') {
            Some((key, value)) => {
                attributes.insert(
                    format!("{CUSTOM_PREFIX}{}", key.trim()),
                    Value::String(value.trim().to_string()),
                );
            }
            None => {
                attributes.insert(format!("{CUSTOM_PREFIX}{line}"), Value::Bool(true));
            }
        }
    }

    attributes
}

/// Whether `provided` satisfies every custom requirement in `requested`.
pub fn has_requirements(requested: &Attributes, provided: &Attributes) -> bool {
    requested
        .iter()
        .filter(|(key, _)| key.starts_with(CUSTOM_PREFIX))
        .all(|(key, value)| match value {
            Value::Bool(true) => provided.contains_key(key),
            other => provided.get(key) == Some(other),
        })
}
