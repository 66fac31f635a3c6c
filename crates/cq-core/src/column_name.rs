//! Strongly-typed column name.

use crate::newtype_string::define_newtype_string;

define_newtype_string! {
    /// A non-empty column name of the event table.
    pub struct ColumnName;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_try_new_rejects_blank() {
        assert!(ColumnName::try_new("").is_none());
        assert!(ColumnName::try_new("   ").is_none());
        assert!(ColumnName::try_new("duration").is_some());
    }

    #[test]
    fn test_borrow_lookup_by_str() {
        let mut map: HashMap<ColumnName, u8> = HashMap::new();
        map.insert(ColumnName::new("duration"), 1);
        assert_eq!(map.get("duration"), Some(&1));
    }

    #[test]
    fn test_deserialize_rejects_empty() {
        let err = serde_json::from_str::<ColumnName>(r#""""#);
        assert!(err.is_err());
        let ok: ColumnName = serde_json::from_str(r#""expense_sum""#).unwrap();
        assert_eq!(ok, "expense_sum");
    }
}
