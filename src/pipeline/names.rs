// Icon name normalization and request deduplication

use std::collections::HashSet;
use std::fmt;

/// Extension carried by every element name in a Klei atlas catalog.
pub const TEX_EXTENSION: &str = ".tex";

/// Canonical lookup key for a requested icon, e.g. `"meat.tex"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IconKey(String);

impl IconKey {
    pub fn from_raw(raw: &str) -> Self {
        Self(normalize(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its `.tex` suffix, used for output file names.
    pub fn stem(&self) -> &str {
        self.0.strip_suffix(TEX_EXTENSION).unwrap_or(&self.0)
    }
}

impl fmt::Display for IconKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IconKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let base = lowered.strip_suffix(TEX_EXTENSION).unwrap_or(&lowered);
    format!("{}{}", base, TEX_EXTENSION)
}

/// Turns raw user input into the ordered list of distinct keys to process.
///
/// Blank entries are dropped before normalization; later entries that map to
/// an already seen key are dropped too.
pub fn canonical_requests<I, S>(raw_names: I) -> Vec<IconKey>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut keys = Vec::new();

    for raw in raw_names {
        let raw = raw.as_ref();
        if raw.trim().is_empty() {
            continue;
        }

        let key = IconKey::from_raw(raw);
        if seen.insert(key.clone()) {
            keys.push(key);
        }
    }

    keys
}
