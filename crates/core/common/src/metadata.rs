//! Caller-provided snapshot metadata.

use std::collections::BTreeMap;

/// Key-value metadata recorded in a snapshot's manifest.
///
/// Metadata presence is explicit: the write APIs take a `Metadata` value, so
/// a snapshot can carry an *empty* metadata map but never an *absent* one.
/// Construct with [`Metadata::new`] for no metadata, or collect from pairs:
///
/// ```
/// use lode_common::Metadata;
///
/// let meta: Metadata = [("source", "ingest")].into_iter().collect();
/// assert_eq!(meta.get("source"), Some("ingest"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Creates empty metadata.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a key-value pair, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Returns the value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns an iterator over the entries, ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consumes the metadata and returns the inner map.
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }

    /// Returns the first key that is not usable as a metadata key, if any.
    ///
    /// Keys must be non-empty; values are unconstrained.
    pub fn invalid_key(&self) -> Option<&str> {
        self.0.keys().find(|k| k.is_empty()).map(String::as_str)
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<Metadata> for BTreeMap<String, String> {
    fn from(metadata: Metadata) -> Self {
        metadata.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::Metadata;

    #[test]
    fn empty_metadata_is_valid() {
        let meta = Metadata::new();
        assert!(meta.is_empty());
        assert_eq!(meta.invalid_key(), None);
    }

    #[test]
    fn empty_key_is_invalid() {
        let meta: Metadata = [("", "v")].into_iter().collect();
        assert_eq!(meta.invalid_key(), Some(""));
    }

    #[test]
    fn serializes_as_plain_map() {
        let meta: Metadata = [("source", "ingest")].into_iter().collect();
        let json = serde_json::to_string(&meta).unwrap();
        assert_eq!(json, r#"{"source":"ingest"}"#);
    }
}
