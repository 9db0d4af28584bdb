//! Text helpers shared by validation and report rendering.
//!
//! Form payloads arrive from a browser-style frontend, so "empty" comes in
//! several spellings: missing keys, `null`, `""`, and the literal strings
//! `"undefined"` / `"null"` produced by naive string interpolation.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Values that are treated exactly like an empty field.
const PLACEHOLDERS: [&str; 3] = ["undefined", "null", "nan"];

/// Return the trimmed text, or `None` when it is empty or a placeholder.
pub fn clean_text(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if PLACEHOLDERS
        .iter()
        .any(|p| trimmed.eq_ignore_ascii_case(p))
    {
        return None;
    }
    Some(trimmed)
}

/// `true` when an optional text field holds a real value.
pub fn is_filled(value: &Option<String>) -> bool {
    value.as_deref().and_then(clean_text).is_some()
}

/// Render a JSON leaf for display, suppressing placeholders.
///
/// Objects and arrays of objects are not leaves and return `None`.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(true) => Some("Sí".to_string()),
        Value::Bool(false) => Some("No".to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => clean_text(s).map(str::to_string),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(display_value).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        Value::Object(_) => None,
    }
}

/// `true` when a JSON value contains at least one populated leaf.
///
/// Booleans only count when checked; an unchecked box is not "filled in".
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => clean_text(s).is_some(),
        Value::Array(items) => items.iter().any(has_content),
        Value::Object(map) => map.values().any(has_content),
    }
}

/// Turn a camelCase or snake_case key into a human label.
///
/// `apellidoPaterno` → `Apellido paterno`, `piso_boca` → `Piso boca`.
pub fn humanize_key(key: &str) -> String {
    let mut words = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch == '_' || ch == '-' {
            words.push(' ');
        } else if ch.is_uppercase() && i > 0 {
            words.push(' ');
            words.extend(ch.to_lowercase());
        } else {
            words.push(ch);
        }
    }

    let mut chars = words.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deserialize a field that the frontend may send as a string, a number, or a bool.
pub fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Deserialize a checkbox that may arrive as `true`, `"true"`, `"si"`, `1`, etc.
pub fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Bool(b)) => Some(b),
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0),
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "si" | "sí" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        },
        Some(_) => None,
    })
}

/// Map text to the single-byte WinAnsi range used by the standard PDF fonts.
///
/// Latin-1 characters (accents, ñ, ¿, ¡) pass through; anything else becomes `?`.
pub fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2013}' | '\u{2014}' => b'-',
            '\u{2018}' | '\u{2019}' => b'\'',
            '\u{201C}' | '\u{201D}' => b'"',
            c if (c as u32) < 0x100 => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}
