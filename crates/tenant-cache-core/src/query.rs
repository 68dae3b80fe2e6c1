//! Canonical collection queries.
//!
//! Two queries that select the same rows must serialize to the same cache key,
//! so parameters are normalized on insertion and kept in sorted containers.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// An ordered, normalized set of query parameters.
///
/// - names are trimmed and lowercased
/// - values are trimmed; their case is preserved
/// - parameters are ordered by name, values of a repeated name are ordered and
///   de-duplicated
/// - parameters with a blank name are dropped
///
/// Deserialized queries go through the same normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawQuery")]
pub struct CollectionQuery {
    params: BTreeMap<String, BTreeSet<String>>,
}

/// Wire shape of a query before normalization.
#[derive(Deserialize)]
struct RawQuery {
    #[serde(default)]
    params: BTreeMap<String, Vec<String>>,
}

impl From<RawQuery> for CollectionQuery {
    fn from(raw: RawQuery) -> Self {
        raw.params
            .into_iter()
            .flat_map(|(name, values)| values.into_iter().map(move |v| (name.clone(), v)))
            .collect()
    }
}

impl CollectionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, builder style.
    pub fn with(mut self, name: impl AsRef<str>, value: impl ToString) -> Self {
        self.insert(name, value);
        self
    }

    /// Add a parameter.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl ToString) {
        let name = name.as_ref().trim().to_lowercase();
        if name.is_empty() {
            return;
        }
        let value = value.to_string().trim().to_string();
        self.params.entry(name).or_default().insert(value);
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Values for a parameter name (the name is normalized before lookup).
    pub fn get(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.params.get(&name.trim().to_lowercase())
    }

    /// Iterate parameters in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Canonical string form: `name=v1,v2&other=v`.
    ///
    /// Names and values are percent-encoded, so `&`, `=`, `,`, the key
    /// separator and glob metacharacters never appear unescaped.
    pub fn canonical(&self) -> String {
        self.params
            .iter()
            .map(|(name, values)| {
                let joined = values
                    .iter()
                    .map(|v| urlencoding::encode(v).into_owned())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}={}", urlencoding::encode(name), joined)
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl<K, V> FromIterator<(K, V)> for CollectionQuery
where
    K: AsRef<str>,
    V: ToString,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut query = Self::new();
        for (name, value) in iter {
            query.insert(name, value);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_order_is_irrelevant() {
        let a = CollectionQuery::new().with("a", 1).with("b", 2);
        let b = CollectionQuery::new().with("b", 2).with("a", 1);
        assert_eq!(a, b);
        assert_eq!(a.canonical(), "a=1&b=2");
    }

    #[test]
    fn test_name_normalization() {
        let q = CollectionQuery::new().with("  Status ", " ACTIVE ");
        assert_eq!(q.canonical(), "status=ACTIVE");
        assert!(q.get("STATUS").is_some());
    }

    #[test]
    fn test_repeated_values_sorted_and_deduplicated() {
        let q: CollectionQuery = [("tag", "b"), ("tag", "a"), ("tag", "b")]
            .into_iter()
            .collect();
        assert_eq!(q.canonical(), "tag=a,b");
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_reserved_characters_are_encoded() {
        let q = CollectionQuery::new().with("name", "a:b*c&d=e,f");
        assert_eq!(q.canonical(), "name=a%3Ab%2Ac%26d%3De%2Cf");
    }

    #[test]
    fn test_blank_names_dropped() {
        let q = CollectionQuery::new().with("   ", "x");
        assert!(q.is_empty());
        assert_eq!(q.canonical(), "");
    }

    #[test]
    fn test_deserialized_query_is_normalized() {
        let wire: CollectionQuery =
            serde_json::from_str(r#"{"params":{" Status ":[" ACTIVE","ACTIVE"],"":["x"]}}"#).unwrap();
        let built = CollectionQuery::new().with("status", "ACTIVE");

        assert_eq!(wire, built);
        assert_eq!(wire.canonical(), "status=ACTIVE");
    }

    #[test]
    fn test_serialized_query_reads_back_equal() {
        let q = CollectionQuery::new().with("tag", "b").with("tag", "a").with("age", 30);
        let json = serde_json::to_string(&q).unwrap();
        let back: CollectionQuery = serde_json::from_str(&json).unwrap();
        assert_eq!(back, q);
    }
}
