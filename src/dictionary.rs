//! Optional rename table for inbound header names.
//!
//! Applied once per frame after correlation, so the reader still sees the
//! raw `Response`, `Event` and `ActionID` names. Those three are never
//! renamed even when the table lists them.

use crate::{error::AmiResult, headers::AmiHeader, message::AmiMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const PROTECTED: [AmiHeader; 3] = [AmiHeader::Response, AmiHeader::Event, AmiHeader::ActionId];

/// Immutable `raw name -> display name` mapping. Raw names match
/// case-insensitively; unknown names pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct Dictionary {
    entries: HashMap<String, String>,
}

impl Dictionary {
    /// Empty dictionary; translates nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON object of `"RawKey": "display_key"` pairs.
    pub fn from_json_str(json: &str) -> AmiResult<Self> {
        let map: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self::from(map))
    }

    /// Display name for `key`, or `key` itself.
    pub fn translate<'a>(&'a self, key: &'a str) -> &'a str {
        if PROTECTED
            .iter()
            .any(|p| p.as_str().eq_ignore_ascii_case(key))
        {
            return key;
        }
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(|s| s.as_str())
            .unwrap_or(key)
    }

    /// Rename every header of `message` in place.
    pub fn apply(&self, message: &mut AmiMessage) {
        if self.is_empty() {
            return;
        }
        for (name, _) in message
            .headers_mut()
            .iter_mut()
        {
            let translated = self.translate(name);
            if translated != name.as_str() {
                *name = translated.to_string();
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries
            .len()
    }

    /// `true` if no entries.
    pub fn is_empty(&self) -> bool {
        self.entries
            .is_empty()
    }
}

impl From<HashMap<String, String>> for Dictionary {
    fn from(map: HashMap<String, String>) -> Self {
        map.into_iter()
            .collect()
    }
}

impl From<Dictionary> for HashMap<String, String> {
    fn from(dict: Dictionary) -> Self {
        dict.entries
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| {
                    (
                        k.as_ref()
                            .to_ascii_lowercase(),
                        v.into(),
                    )
                })
                .collect(),
        }
    }
}
