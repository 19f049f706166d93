//! Pretty-compact JSON writer for stored artifacts.
//!
//! Containers that fit within `max_length` (after indentation and any
//! trailing key or comma) are written on one line as `{"a": 1, "b": [1, 2]}`;
//! larger ones are expanded one entry per line.

use serde_json::Value;

use crate::config::StringifyOptions;

pub fn stringify(value: &Value, options: &StringifyOptions) -> String {
    let indent = " ".repeat(options.indent);
    // Without indentation there is no expanded form to fall back to
    let max_length = if indent.is_empty() {
        usize::MAX
    } else {
        options.max_length
    };
    let mut out = String::new();
    write_value(&mut out, value, &indent, max_length, "", 0);
    out
}

fn write_value(
    out: &mut String,
    value: &Value,
    indent: &str,
    max_length: usize,
    current_indent: &str,
    reserved: usize,
) {
    let compact = compact(value);
    let available = max_length.saturating_sub(current_indent.len() + reserved);
    if compact.chars().count() <= available {
        out.push_str(&compact);
        return;
    }

    let next_indent = format!("{current_indent}{indent}");
    match value {
        Value::Array(items) if !items.is_empty() => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                out.push('\n');
                out.push_str(&next_indent);
                let last = i == items.len() - 1;
                write_value(out, item, indent, max_length, &next_indent, usize::from(!last));
                if !last {
                    out.push(',');
                }
            }
            out.push('\n');
            out.push_str(current_indent);
            out.push(']');
        }
        Value::Object(map) if !map.is_empty() => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                out.push('\n');
                out.push_str(&next_indent);
                let key_part = format!("{}: ", quote(key));
                out.push_str(&key_part);
                let last = i == map.len() - 1;
                let reserved = key_part.chars().count() + usize::from(!last);
                write_value(out, item, indent, max_length, &next_indent, reserved);
                if !last {
                    out.push(',');
                }
            }
            out.push('\n');
            out.push_str(current_indent);
            out.push('}');
        }
        _ => out.push_str(&compact),
    }
}

/// Single-line form with a space after every `:` and `,`.
fn compact(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(compact).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Object(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(key, item)| format!("{}: {}", quote(key), compact(item)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        scalar => scalar.to_string(),
    }
}

fn quote(key: &str) -> String {
    Value::String(key.to_string()).to_string()
}
