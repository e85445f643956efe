//! Canonical JSON encoding for hashed payloads.
//!
//! Object keys are written in byte order at every depth and no whitespace is
//! emitted. Two processes holding the same logical payload therefore produce
//! identical bytes no matter how their maps iterate.
//!
//! Strings escape `<`, `>`, `&`, U+2028 and U+2029 as `\uXXXX`, the way Go's
//! `encoding/json` writes them.

use serde_json::{Map, Value};

/// Encode a JSON value canonically.
pub fn to_canonical_string(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

/// Encode a JSON object canonically.
pub fn encode_object(map: &Map<String, Value>) -> Result<String, serde_json::Error> {
    let mut out = String::new();
    write_object(&mut out, map)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => write_object(out, map)?,
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::String(text) => write_string(out, text)?,
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}

fn write_string(out: &mut String, text: &str) -> Result<(), serde_json::Error> {
    // serde_json leaves these characters unescaped, so they only ever appear
    // literally in its output.
    for ch in serde_json::to_string(text)?.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    Ok(())
}

fn write_object(out: &mut String, map: &Map<String, Value>) -> Result<(), serde_json::Error> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    out.push('{');
    for (idx, (key, value)) in entries.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        write_string(out, key)?;
        out.push(':');
        write_value(out, value)?;
    }
    out.push('}');
    Ok(())
}
