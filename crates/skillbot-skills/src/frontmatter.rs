//! Frontmatter parser for skill files.

use serde::Deserialize;
use thiserror::Error;

/// Why a skill file's header could not be read.
#[derive(Debug, Error, PartialEq)]
pub enum FrontmatterError {
    #[error("missing frontmatter (file must start with ---)")]
    Missing,
    #[error("frontmatter is not closed by a --- line")]
    Unclosed,
    #[error("invalid frontmatter: {0}")]
    Invalid(String),
}

/// Parsed skill frontmatter. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SkillFrontmatter {
    /// Skill name (identifier).
    #[serde(default, deserialize_with = "scalar_text")]
    pub name: String,
    /// Human-readable description.
    #[serde(default, deserialize_with = "scalar_text")]
    pub description: String,
    /// Keywords that make this skill relevant to a turn.
    #[serde(default, alias = "keywords", deserialize_with = "one_or_many")]
    pub triggers: Vec<String>,
}

/// A bare header value; `name: 2048` is still a name.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn scalar_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(Scalar::into_text)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Scalar),
    Many(Vec<Scalar>),
}

/// Accept `[a, b]`, a block list, or a comma separated string.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items: Vec<String> = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => s.into_text().split(',').map(str::to_string).collect(),
        OneOrMany::Many(v) => v.into_iter().map(Scalar::into_text).collect(),
    };
    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Parse a skill file, separating frontmatter from body.
///
/// Returns `(frontmatter, body)`; the body is trimmed.
pub fn parse_skill_file(content: &str) -> Result<(SkillFrontmatter, String), FrontmatterError> {
    let trimmed = content.trim_start_matches('\u{feff}').trim_start();

    let Some(after_first) = trimmed.strip_prefix("---") else {
        return Err(FrontmatterError::Missing);
    };

    // Find the closing ---
    let end_pos = after_first
        .find("\n---")
        .ok_or(FrontmatterError::Unclosed)?;
    let header = &after_first[..end_pos];
    let rest = &after_first[end_pos + 4..]; // skip \n---
    // Drop the remainder of the closing delimiter line.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");

    let fields = parse_fields(header);
    let fm = serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| FrontmatterError::Invalid(e.to_string()))?;

    Ok((fm, body.trim().to_string()))
}

/// Turn `key: value` lines into a JSON map.
///
/// A key with an empty value followed by `- item` lines becomes an array.
fn parse_fields(header: &str) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    let mut list_key: Option<String> = None;

    for line in header.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if let Some(item) = trimmed.strip_prefix("- ") {
            if let Some(key) = &list_key {
                let entry = map
                    .entry(key.clone())
                    .or_insert_with(|| serde_json::Value::Array(Vec::new()));
                if let serde_json::Value::Array(items) = entry {
                    items.push(serde_json::Value::String(unquote(item.trim()).to_string()));
                }
            }
            continue;
        }

        let (key, value) = match trimmed.split_once(':') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (trimmed, ""),
        };

        if value.is_empty() {
            // Becomes an array only if list items follow.
            list_key = Some(key.to_string());
        } else {
            map.insert(key.to_string(), parse_yaml_value(value));
            list_key = None;
        }
    }

    map
}

/// Simple YAML value parser for frontmatter fields.
fn parse_yaml_value(value: &str) -> serde_json::Value {
    let trimmed = value.trim();

    // Boolean
    if trimmed == "true" {
        return serde_json::Value::Bool(true);
    }
    if trimmed == "false" {
        return serde_json::Value::Bool(false);
    }

    // Array: [item1, item2]
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        let inner = &trimmed[1..trimmed.len() - 1];
        let items: Vec<serde_json::Value> = inner
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| serde_json::Value::String(unquote(s).to_string()))
            .collect();
        return serde_json::Value::Array(items);
    }

    // Number
    if let Ok(n) = trimmed.parse::<i64>() {
        return serde_json::Value::Number(n.into());
    }

    serde_json::Value::String(unquote(trimmed).to_string())
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(s)
}
