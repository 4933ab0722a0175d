use std::{borrow::Cow, collections::BTreeMap, fmt::Write};

use serde_json::{Value, json};

use crate::{
    error::{Error, Result},
    manifest::Str,
    tree::Node,
};

use super::Resource;

impl Resource {
    /// The ten character content hash appended to generated names.
    pub fn shorthash(&self) -> Result<Str> {
        shorthash(self.kind(), self.root())
    }
}

fn shorthash(kind: &str, root: &Node) -> Result<Str> {
    let encoded = match kind {
        "ConfigMap" => encode_config_map(root)?,
        "Secret" => encode_secret(root)?,
        _ => {
            return Err(Error::config(format_args!(
                "content hashes are only supported for ConfigMap and Secret, not `{kind}`"
            )));
        }
    };

    // kustomize hashes the output of Go's `json.Marshal`, which escapes HTML characters.
    let hex = sha256::digest(html_escape(&encoded).as_ref());
    Ok(encode_hex(&hex))
}

/// The string entries of the mapping under `key`, sorted like a marshalled Go map.
fn string_map<'a>(root: &'a Node, key: &str) -> Result<Option<BTreeMap<&'a str, &'a str>>> {
    let Some(node) = root.get(key).filter(|node| !node.is_null()) else {
        return Ok(None);
    };
    let Some(map) = node.as_mapping() else {
        return Err(Error::config(format_args!("`{key}` must be a mapping of strings")));
    };

    map.iter()
        .map(|(k, v)| match v.as_scalar() {
            Some(scalar) => Ok((k.as_str(), scalar.value.as_str())),
            None => Err(Error::config(format_args!("`{key}.{k}` must be a string"))),
        })
        .collect::<Result<_>>()
        .map(Some)
}

// Generated names are hashed before any name is assigned, so the name is always empty.
fn encode_config_map(root: &Node) -> Result<String> {
    let data = string_map(root, "data")?;
    let mut object = json!({
        "data": data.map_or_else(|| Value::String(String::new()), |data| json!(data)),
        "kind": "ConfigMap",
        "name": "",
    });
    if let Some(binary) = string_map(root, "binaryData")?.filter(|m| !m.is_empty()) {
        object["binaryData"] = json!(binary);
    }

    Ok(serde_json::to_string(&sorted(object))?)
}

fn encode_secret(root: &Node) -> Result<String> {
    let data = string_map(root, "data")?;
    let mut object = json!({
        "data": data.map_or_else(|| Value::String(String::new()), |data| json!(data)),
        "kind": "Secret",
        "name": "",
        "type": root.get_str("type").unwrap_or_default(),
    });
    if let Some(string_data) = string_map(root, "stringData")?.filter(|m| !m.is_empty()) {
        object["stringData"] = json!(string_data);
    }

    Ok(serde_json::to_string(&sorted(object))?)
}

/// `serde_json` keeps insertion order here, Go sorts map keys.
fn sorted(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    }
}

/// Escape `<`, `>`, `&`, U+2028 and U+2029 the way Go's `json.HTMLEscape` does.
fn html_escape(src: &str) -> Cow<'_, str> {
    fn needs_escape(c: char) -> bool {
        matches!(c, '<' | '>' | '&' | '\u{2028}' | '\u{2029}')
    }

    if !src.contains(needs_escape) {
        return Cow::Borrowed(src);
    }

    let mut out = String::with_capacity(src.len() + 8);
    for c in src.chars() {
        if needs_escape(c) {
            // Writing to a `String` cannot fail.
            let _ = write!(out, "\\u{:04x}", c as u32);
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

// Mirrors kubectl's hash encoding: take ten characters and swap out vowels and
// vowel-like digits so the suffix never spells words.
fn encode_hex(hex: &str) -> Str {
    hex.chars()
        .take(10)
        .map(|c| match c {
            '0' => 'g',
            '1' => 'h',
            '3' => 'k',
            'a' => 'm',
            'e' => 't',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests;
