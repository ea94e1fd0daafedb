//! Open Context search result records
//!
//! A record is the JSON object Open Context returns for one search result. The
//! attribute order of the response is kept, which is what gives flattened
//! tables their first-seen column order.

use serde_json::{Map, Value};

/// One search result: attribute name to value, in response order
pub type Record = Map<String, Value>;

/// Keys that may carry the URI of a nested `{label, uri}` value
const URI_KEYS: [&str; 3] = ["id", "uri", "@id"];

/// A value that names a linked entity by label and URI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledUri {
    pub label: String,
    pub uri: String,
}

/// Returns the label and URI of a nested value, if it is one
pub fn labeled_uri(value: &Value) -> Option<LabeledUri> {
    let obj = value.as_object()?;
    let label = obj.get("label")?.as_str()?;
    let uri = URI_KEYS
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))?;
    Some(LabeledUri {
        label: label.to_string(),
        uri: uri.to_string(),
    })
}

/// Renders a scalar for display inside a joined or one-hot column name
///
/// Strings are used as-is; everything else uses its JSON form.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Whether a value is a number or a string that parses as one
pub fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_labeled_uri_accepts_id_uri_and_at_id() {
        for key in ["id", "uri", "@id"] {
            let v = json!({ "label": "Panther", key: "https://example.org/p" });
            assert_eq!(
                labeled_uri(&v),
                Some(LabeledUri {
                    label: "Panther".into(),
                    uri: "https://example.org/p".into()
                })
            );
        }
    }

    #[test]
    fn test_labeled_uri_rejects_partial_objects() {
        assert!(labeled_uri(&json!({ "label": "x" })).is_none());
        assert!(labeled_uri(&json!({ "id": "x" })).is_none());
        assert!(labeled_uri(&json!("x")).is_none());
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric(&json!(3)));
        assert!(is_numeric(&json!("4.5")));
        assert!(!is_numeric(&json!("Panther")));
        assert!(!is_numeric(&json!(true)));
    }

    #[test]
    fn test_record_keeps_attribute_order() {
        let rec: Record =
            serde_json::from_str(r#"{"uri": "u", "label": "l", "Motif": "m"}"#).unwrap();
        let keys: Vec<&str> = rec.keys().map(String::as_str).collect();
        assert_eq!(keys, ["uri", "label", "Motif"]);
    }
}
