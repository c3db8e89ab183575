//! Best-effort repair of truncated JSON.
//!
//! Tool-call arguments stream in as raw fragments, and a provider that stops
//! early (length limit, dropped connection) leaves them cut mid-token. The
//! repair closes what is open: strings, objects and arrays, dropping a
//! dangling comma or escape and filling a missing value with `null`.

use serde_json::Value;

/// Returns `(text, parsed)` for the first candidate that parses, or `None`
/// when nothing reasonable does.
pub fn repair_json(raw: &str) -> Option<(String, Value)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        // Providers send no argument text for zero-argument tools.
        return Some(("{}".to_string(), Value::Object(Default::default())));
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some((trimmed.to_string(), value));
    }

    let scan = scan(trimmed);
    let mut base = trimmed.to_string();
    if scan.pending_escape {
        base.pop();
    }
    if scan.in_string {
        base.push('"');
    }
    let base = base.trim_end().trim_end_matches(',').to_string();
    let closers: String = scan.stack.iter().rev().collect();

    // A trailing key or colon needs a value before the object can close.
    let candidates = [
        format!("{base}{closers}"),
        format!("{base}null{closers}"),
        format!("{base}:null{closers}"),
    ];
    candidates.into_iter().find_map(|candidate| {
        serde_json::from_str::<Value>(&candidate)
            .ok()
            .map(|value| (candidate, value))
    })
}

struct Scan {
    /// Closing delimiters for every open object/array, innermost last.
    stack: Vec<char>,
    in_string: bool,
    pending_escape: bool,
}

fn scan(text: &str) -> Scan {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    Scan {
        stack,
        in_string,
        pending_escape: in_string && escaped,
    }
}
