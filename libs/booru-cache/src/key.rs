//! Cache-key derivation from call arguments.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// A key template: fixed prefix plus the argument properties that identify
/// one cached result.
///
/// ```rust
/// use booru_cache::CacheKey;
/// use serde_json::json;
///
/// const SOURCE_BY_ID: CacheKey = CacheKey::new("sourceById", &["sourceId"]);
///
/// assert_eq!(SOURCE_BY_ID.derive_value(&json!({ "sourceId": 42 })), "sourceById_42");
/// assert_eq!(SOURCE_BY_ID.derive_value(&json!({})), "sourceById_null");
/// assert_eq!(CacheKey::fixed("allSources").derive_value(&json!(null)), "allSources");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheKey {
    prefix: &'static str,
    fields: &'static [&'static str],
}

impl CacheKey {
    #[must_use]
    pub const fn new(prefix: &'static str, fields: &'static [&'static str]) -> Self {
        Self { prefix, fields }
    }

    /// A key that ignores the arguments.
    #[must_use]
    pub const fn fixed(prefix: &'static str) -> Self {
        Self::new(prefix, &[])
    }

    #[must_use]
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    /// Derive the key for `arg`, the first argument of the memoized call.
    #[must_use]
    pub fn derive<A: Serialize + ?Sized>(&self, arg: &A) -> String {
        if self.fields.is_empty() {
            return self.prefix.to_owned();
        }
        match serde_json::to_value(arg) {
            Ok(value) => self.derive_value(&value),
            Err(e) => {
                warn!(prefix = self.prefix, error = %e, "cache key argument is not serializable; using bare prefix");
                self.prefix.to_owned()
            }
        }
    }

    /// - no fields: the prefix;
    /// - object argument: prefix and each field's value joined with `_`,
    ///   strings unquoted, absent or `null` fields as `null`;
    /// - anything else: the prefix, with a warning.
    #[must_use]
    pub fn derive_value(&self, arg: &Value) -> String {
        if self.fields.is_empty() {
            return self.prefix.to_owned();
        }
        let Value::Object(obj) = arg else {
            warn!(
                prefix = self.prefix,
                fields = ?self.fields,
                "cache key fields configured but argument is not an object; using bare prefix"
            );
            return self.prefix.to_owned();
        };

        let mut key = self.prefix.to_owned();
        for field in self.fields {
            key.push('_');
            match obj.get(*field) {
                None | Some(Value::Null) => key.push_str("null"),
                Some(Value::String(s)) => key.push_str(s),
                Some(other) => key.push_str(&other.to_string()),
            }
        }
        key
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    const BY_SOURCE: CacheKey = CacheKey::new("sourceById", &["sourceId"]);
    const BY_PAGE: CacheKey = CacheKey::new("posts", &["sourceId", "page", "nsfw"]);

    #[test]
    fn fields_are_joined_in_order() {
        assert_eq!(
            BY_PAGE.derive_value(&json!({ "nsfw": false, "page": 3, "sourceId": "gel" })),
            "posts_gel_3_false"
        );
    }

    #[test]
    fn absent_and_null_fields() {
        assert_eq!(BY_SOURCE.derive_value(&json!({})), "sourceById_null");
        assert_eq!(
            BY_SOURCE.derive_value(&json!({ "sourceId": null })),
            "sourceById_null"
        );
    }

    #[test]
    fn prefix_only_when_no_fields() {
        let key = CacheKey::fixed("allSources");
        assert_eq!(key.derive_value(&json!({ "sourceId": 1 })), "allSources");
        assert_eq!(key.derive(&()), "allSources");
    }

    #[test]
    #[tracing_test::traced_test]
    fn non_object_argument_falls_back_to_prefix() {
        assert_eq!(BY_SOURCE.derive_value(&json!(42)), "sourceById");
        assert!(logs_contain("argument is not an object"));
    }

    #[test]
    fn derive_from_struct() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Query {
            source_id: u32,
        }
        assert_eq!(BY_SOURCE.derive(&Query { source_id: 42 }), "sourceById_42");
    }
}
