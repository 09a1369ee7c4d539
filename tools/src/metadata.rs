//! `package.json` model shared by the scanner and the rewriter.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub const PACKAGE_FILE: &str = "package.json";
pub const BACKUP_FILE: &str = "package.json.bak";

/// Fields every package must carry with a non-empty value.
pub const REQUIRED_FIELDS: [&str; 4] = ["name", "version", "description", "author"];

pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_AUTHOR: &str = "unknown";

const CHIPS_COMMENT: &str = "Chip models the package runs on; all means no restriction";
const FW_COMMENT: &str = "Firmware the package depends on, such as ulab or lvgl; all means none";

/// Fixed fields stamped onto every rewritten package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteDefaults {
    pub license: String,
    pub chips: String,
    pub fw: String,
}

impl Default for RewriteDefaults {
    fn default() -> Self {
        Self {
            license: "MIT".into(),
            chips: "all".into(),
            fw: "all".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comments {
    pub chips: String,
    pub fw: String,
}

impl Default for Comments {
    fn default() -> Self {
        Self {
            chips: CHIPS_COMMENT.into(),
            fw: FW_COMMENT.into(),
        }
    }
}

/// Normalized package document. Field order here is the key order on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub license: String,
    pub chips: String,
    pub fw: String,
    #[serde(rename = "_comments")]
    pub comments: Comments,
    pub urls: Vec<[String; 2]>,
}

impl PackageDocument {
    /// Two-space indented JSON; non-ASCII text is written as-is.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// One `urls` entry as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlEntry {
    /// `[source, target]` or `{"src": source, "dest": target}`
    Pair { source: String, target: String },
    /// Anything else, kept as its JSON text
    Malformed(String),
}

impl UrlEntry {
    pub fn parse(value: &Value) -> Self {
        let pair = match value {
            Value::Array(items) if items.len() == 2 => (&items[0], &items[1]),
            Value::Object(map) => match (map.get("src"), map.get("dest")) {
                (Some(src), Some(dest)) => (src, dest),
                _ => return UrlEntry::Malformed(value.to_string()),
            },
            _ => return UrlEntry::Malformed(value.to_string()),
        };
        match pair {
            (Value::String(source), Value::String(target)) => UrlEntry::Pair {
                source: source.clone(),
                target: target.clone(),
            },
            _ => UrlEntry::Malformed(value.to_string()),
        }
    }
}

/// Read and parse a JSON file, tolerating a UTF-8 byte-order mark.
pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    serde_json::from_str(text).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Missing, null and empty-string fields all count as absent.
pub fn field_str<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    match doc.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        _ => None,
    }
}

/// Present with a usable value. Non-string values count as present.
pub fn has_field(doc: &Map<String, Value>, field: &str) -> bool {
    match doc.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// Field rendered for display: strings bare, other JSON values as text.
pub fn field_text(doc: &Map<String, Value>, field: &str) -> Option<String> {
    match doc.get(field)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Directory holding the last `.py` segment of an install target, or ""
/// when the file sits at the top or no segment ends in `.py`.
pub fn parent_dir_of_py(target: &str) -> &str {
    let parts: Vec<&str> = target.split('/').collect();
    match parts.iter().rposition(|p| p.ends_with(".py")) {
        Some(i) if i > 0 => parts[i - 1],
        _ => "",
    }
}
