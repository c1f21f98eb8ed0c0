//! CJ is loose about response shapes: the same id can arrive as a string, a
//! number, or the first element of an array, and `data` is sometimes an object
//! and sometimes a one-element list. These helpers flatten that ambiguity at
//! the client boundary.

use serde_json::Value;

pub fn first_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => items.first().and_then(|first| match first {
            Value::Array(_) => None,
            other => first_scalar(other),
        }),
        _ => None,
    }
}

pub fn first_record(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(_) => Some(value),
        Value::Array(items) => items.iter().find(|item| item.is_object()),
        _ => None,
    }
}

/// First non-empty scalar among `keys` on `record`.
pub fn field(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key))
        .find_map(first_scalar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_from_string_number_or_array() {
        assert_eq!(first_scalar(&json!("CJ123")), Some("CJ123".into()));
        assert_eq!(first_scalar(&json!(42)), Some("42".into()));
        assert_eq!(first_scalar(&json!(["CJ9", "CJ10"])), Some("CJ9".into()));
        assert_eq!(first_scalar(&json!([7])), Some("7".into()));
    }

    #[test]
    fn blanks_and_odd_shapes_are_absent() {
        assert_eq!(first_scalar(&json!("  ")), None);
        assert_eq!(first_scalar(&json!([])), None);
        assert_eq!(first_scalar(&json!([["nested"]])), None);
        assert_eq!(first_scalar(&json!(null)), None);
        assert_eq!(first_scalar(&json!({"id": 1})), None);
    }

    #[test]
    fn record_from_object_or_list() {
        let obj = json!({"sourceStatus": "3"});
        assert_eq!(first_record(&obj), Some(&obj));
        let list = json!([null, {"sourceStatus": 4}]);
        assert_eq!(first_record(&list), Some(&json!({"sourceStatus": 4})));
        assert!(first_record(&json!(true)).is_none());
    }

    #[test]
    fn field_falls_through_aliases() {
        let record = json!({"cjSourcingId": "", "sourcingId": ["S-1"]});
        assert_eq!(
            field(&record, &["cjSourcingId", "sourcingId", "id"]),
            Some("S-1".into())
        );
    }
}
