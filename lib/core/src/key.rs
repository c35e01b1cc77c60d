use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::error::{Error, Result};

/// Separator between table id and column index in the string form.
/// Table ids may contain path separators but never this character.
pub const KEY_DELIMITER: char = ':';

/// Identifies one column of one corpus table
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    pub table_id: String,
    pub column_index: usize,
}

impl ColumnKey {
    /// Create a key, rejecting table ids that would make the string
    /// encoding ambiguous.
    pub fn new(table_id: impl Into<String>, column_index: usize) -> Result<Self> {
        let table_id = table_id.into();
        if table_id.contains(KEY_DELIMITER) {
            return Err(Error::MalformedColumnKey(format!(
                "table id {:?} contains reserved delimiter '{}'",
                table_id, KEY_DELIMITER
            )));
        }
        Ok(Self { table_id, column_index })
    }

    #[inline]
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    #[inline]
    pub fn column_index(&self) -> usize {
        self.column_index
    }

    /// Lossless `"tableID:columnIndex"` encoding
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.table_id, KEY_DELIMITER, self.column_index)
    }
}

impl FromStr for ColumnKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(KEY_DELIMITER);
        let (table_id, column) = match (parts.next(), parts.next(), parts.next()) {
            (Some(t), Some(c), None) if !t.is_empty() => (t, c),
            _ => return Err(Error::MalformedColumnKey(s.to_string())),
        };
        let column_index = column
            .parse::<usize>()
            .map_err(|_| Error::MalformedColumnKey(s.to_string()))?;
        Ok(Self {
            table_id: table_id.to_string(),
            column_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_with_path_separators() {
        let key = ColumnKey::new("open.canada.ca/51e2/05770001-eng.csv", 3).unwrap();
        let encoded = key.encode();
        assert_eq!(encoded, "open.canada.ca/51e2/05770001-eng.csv:3");
        assert_eq!(encoded.parse::<ColumnKey>().unwrap(), key);
    }

    #[test]
    fn test_rejects_delimiter_in_table_id() {
        assert!(matches!(
            ColumnKey::new("bad:table", 0),
            Err(Error::MalformedColumnKey(_))
        ));
    }

    #[test]
    fn test_malformed_strings() {
        for s in ["", "table", "a:b:1", "table:x", ":3", "table:-1"] {
            assert!(s.parse::<ColumnKey>().is_err(), "{s:?} should not parse");
        }
    }
}
