//! Attribute capture — pulls configured metadata keys into a record.
//!
//! The list of attribute names to capture is configuration, not code.
//! A name missing from a notification's metadata is skipped with a warning;
//! partial capture is acceptable.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use rollsettle_state::AttrValue;

/// Ordered list of metadata attribute names to capture at record creation.
#[derive(Debug, Clone, Default)]
pub struct AttributeCapture {
    names: Vec<String>,
}

impl AttributeCapture {
    /// Capture the given attribute names, in order.
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Capture nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Configured attribute names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Extract configured attributes from notification metadata.
    ///
    /// Values are coerced into the [`AttrValue`] union; compound values are
    /// kept as their JSON string rendering rather than interpreted.
    pub fn extract(
        &self,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> BTreeMap<String, AttrValue> {
        let mut captured = BTreeMap::new();
        for name in &self.names {
            match metadata.get(name) {
                Some(value) => {
                    captured.insert(name.clone(), AttrValue::from_json(value));
                }
                None => {
                    warn!(attribute = %name, "attribute not present in notification metadata");
                }
            }
        }
        captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata() -> HashMap<String, serde_json::Value> {
        HashMap::from([
            ("tier".to_string(), json!("web")),
            ("replicas".to_string(), json!(3)),
            ("canary".to_string(), json!(true)),
            ("owners".to_string(), json!(["ops", "platform"])),
        ])
    }

    #[test]
    fn extracts_configured_names_only() {
        let capture = AttributeCapture::new(vec!["tier".to_string(), "canary".to_string()]);
        let attrs = capture.extract(&metadata());

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["tier"], AttrValue::Str("web".to_string()));
        assert_eq!(attrs["canary"], AttrValue::Bool(true));
    }

    #[test]
    fn missing_attribute_is_skipped() {
        let capture = AttributeCapture::new(vec![
            "tier".to_string(),
            "does-not-exist".to_string(),
            "replicas".to_string(),
        ]);
        let attrs = capture.extract(&metadata());

        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs["replicas"], AttrValue::Num(3.0));
        assert!(!attrs.contains_key("does-not-exist"));
    }

    #[test]
    fn compound_values_become_strings() {
        let capture = AttributeCapture::new(vec!["owners".to_string()]);
        let attrs = capture.extract(&metadata());
        assert_eq!(
            attrs["owners"],
            AttrValue::Str("[\"ops\",\"platform\"]".to_string())
        );
    }

    #[test]
    fn empty_capture_extracts_nothing() {
        let attrs = AttributeCapture::empty().extract(&metadata());
        assert!(attrs.is_empty());
    }
}
