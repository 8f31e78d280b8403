use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One extracted record: field name to textual value.
pub type FlatRecord = BTreeMap<String, String>;

/// Two-level record: outer key (symbol or schema key) to an inner flat record.
pub type MultiRecord = BTreeMap<String, FlatRecord>;

/// Handle returned for every monitor; the only way a caller refers to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonitorToken {
    id: u64,
}

impl MonitorToken {
    pub const INVALID: Self = Self { id: 0 };

    pub(crate) const fn new(id: u64) -> Self {
        Self { id }
    }

    pub const fn id(&self) -> u64 {
        self.id
    }

    pub const fn is_valid(&self) -> bool {
        self.id > 0
    }
}

impl Default for MonitorToken {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for MonitorToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor#{}", self.id)
    }
}

/// Declarative extraction schema.
///
/// Maps each top-level field to the set of nested fields to pull out of it.
/// An empty set marks a scalar field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonKeys {
    keys: BTreeMap<String, BTreeSet<String>>,
}

impl JsonKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar field
    #[must_use]
    pub fn scalar(mut self, key: &str) -> Self {
        self.keys.insert(key.to_string(), BTreeSet::new());
        self
    }

    /// Add several scalar fields
    #[must_use]
    pub fn scalars(mut self, keys: &[&str]) -> Self {
        for key in keys {
            self.keys.insert((*key).to_string(), BTreeSet::new());
        }
        self
    }

    /// Add a field whose listed sub-fields are extracted
    #[must_use]
    pub fn nested(mut self, key: &str, sub_keys: &[&str]) -> Self {
        self.keys.insert(
            key.to_string(),
            sub_keys.iter().map(|k| (*k).to_string()).collect(),
        );
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.keys.iter()
    }

    pub fn get(&self, key: &str) -> Option<&BTreeSet<String>> {
        self.keys.get(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl<const N: usize> From<[(&str, &[&str]); N]> for JsonKeys {
    fn from(entries: [(&str, &[&str]); N]) -> Self {
        entries
            .into_iter()
            .fold(Self::new(), |keys, (key, sub_keys)| keys.nested(key, sub_keys))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KlineInterval {
    Seconds1,
    Minutes1,
    Minutes3,
    Minutes5,
    Minutes15,
    Minutes30,
    Hours1,
    Hours2,
    Hours4,
    Hours6,
    Hours8,
    Hours12,
    Days1,
    Days3,
    Weeks1,
    Months1,
}

impl KlineInterval {
    /// Binance interval notation (e.g., "1m", "1h", "1d")
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Seconds1 => "1s",
            Self::Minutes1 => "1m",
            Self::Minutes3 => "3m",
            Self::Minutes5 => "5m",
            Self::Minutes15 => "15m",
            Self::Minutes30 => "30m",
            Self::Hours1 => "1h",
            Self::Hours2 => "2h",
            Self::Hours4 => "4h",
            Self::Hours6 => "6h",
            Self::Hours8 => "8h",
            Self::Hours12 => "12h",
            Self::Days1 => "1d",
            Self::Days3 => "3d",
            Self::Weeks1 => "1w",
            Self::Months1 => "1M",
        }
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_validity() {
        assert!(!MonitorToken::INVALID.is_valid());
        assert!(!MonitorToken::default().is_valid());
        assert!(MonitorToken::new(1).is_valid());
    }

    #[test]
    fn test_json_keys_builder() {
        let keys = JsonKeys::new().scalars(&["E", "s"]).nested("k", &["o", "c"]);
        assert_eq!(keys.len(), 3);
        assert!(keys.get("s").unwrap().is_empty());
        assert!(keys.get("k").unwrap().contains("c"));
        assert!(keys.get("missing").is_none());
    }

    #[test]
    fn test_json_keys_from_array() {
        let keys = JsonKeys::from([("s", &["s", "c"][..]), ("E", &[][..])]);
        assert_eq!(keys.get("s").unwrap().len(), 2);
        assert!(keys.get("E").unwrap().is_empty());
    }

    #[test]
    fn test_kline_interval_format() {
        assert_eq!(KlineInterval::Minutes15.as_str(), "15m");
        assert_eq!(KlineInterval::Months1.to_string(), "1M");
    }
}
