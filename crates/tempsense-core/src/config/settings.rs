//! Reader for CircuitPython-style `settings.toml` files.
//!
//! Only the subset boards actually ship is understood: one `KEY = value`
//! pair per line, values either double-quoted strings or bare tokens, and
//! `#` comments. Quoted strings accept the `\"` and `\\` escapes; any other
//! backslash sequence is rejected. Values without escapes are borrowed from
//! the source text.

use alloc::borrow::Cow;
use alloc::string::String;
use alloc::vec::Vec;

use super::ConfigError;

/// Parsed key/value pairs of a settings file, in file order.
#[derive(Debug, Default)]
pub struct Settings<'a> {
    entries: Vec<(&'a str, Cow<'a, str>)>,
}

impl<'a> Settings<'a> {
    pub fn parse(text: &'a str) -> Result<Self, ConfigError> {
        let mut entries = Vec::new();

        for (index, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = ConfigError::MalformedLine { line: index + 1 };
            let (key, rest) = line.split_once('=').ok_or(malformed.clone())?;
            let key = key.trim();
            if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(malformed);
            }

            let value = parse_value(rest.trim()).ok_or(malformed)?;
            entries.push((key, value));
        }

        Ok(Self { entries })
    }

    /// Look up a key. When a key repeats, the last occurrence wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_value(rest: &str) -> Option<Cow<'_, str>> {
    if let Some(quoted) = rest.strip_prefix('"') {
        let (value, end) = unquote(quoted)?;
        let trailing = quoted[end + 1..].trim_start();
        if !trailing.is_empty() && !trailing.starts_with('#') {
            return None;
        }
        return Some(value);
    }

    let bare = match rest.find('#') {
        Some(comment) => rest[..comment].trim_end(),
        None => rest,
    };
    if bare.is_empty() || bare.contains('"') {
        return None;
    }
    Some(Cow::Borrowed(bare))
}

/// Contents of a quoted string and the index of its closing quote.
fn unquote(quoted: &str) -> Option<(Cow<'_, str>, usize)> {
    let mut unescaped: Option<String> = None;
    let mut run_start = 0;
    let mut chars = quoted.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let value = match unescaped {
                    Some(mut text) => {
                        text.push_str(&quoted[run_start..i]);
                        Cow::Owned(text)
                    }
                    None => Cow::Borrowed(&quoted[..i]),
                };
                return Some((value, i));
            }
            '\\' => {
                let Some((_, escaped @ ('"' | '\\'))) = chars.next() else {
                    return None;
                };
                let text = unescaped.get_or_insert_with(String::new);
                text.push_str(&quoted[run_start..i]);
                text.push(escaped);
                run_start = i + 2;
            }
            _ => {}
        }
    }
    None
}
