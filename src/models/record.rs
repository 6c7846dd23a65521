//! Record types and identifiers.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Unique identifier for a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// CRM module (record category) name, e.g. `Contacts` or `Leads`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleName(String);

impl ModuleName {
    /// Creates a new module name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Sort index a record list can be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortIndex {
    /// Last update timestamp.
    #[default]
    Updated,
    /// Display name.
    Name,
    /// Raw record identifier.
    Id,
}

impl SortIndex {
    /// Returns the wire name of the index.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::Name => "name",
            Self::Id => "id",
        }
    }
}

impl FromStr for SortIndex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "updated" | "updated.$t" | "date_modified" => Ok(Self::Updated),
            "name" | "full_name" => Ok(Self::Name),
            "id" => Ok(Self::Id),
            other => Err(Error::InvalidInput(format!("unknown sort index: {other}"))),
        }
    }
}

impl fmt::Display for SortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display order of the active sort index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest key first.
    #[default]
    Ascending,
    /// Largest key first.
    Descending,
}

impl SortOrder {
    /// Orders two cursors the way they are displayed.
    #[must_use]
    pub fn compare(self, a: &Cursor, b: &Cursor) -> Ordering {
        match self {
            Self::Ascending => a.cmp(b),
            Self::Descending => b.cmp(a),
        }
    }

    /// Returns `true` for descending order.
    #[must_use]
    pub const fn is_descending(self) -> bool {
        matches!(self, Self::Descending)
    }
}

impl FromStr for SortOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "des" | "desc" | "descending" => Ok(Self::Descending),
            other => Err(Error::InvalidInput(format!("unknown sort order: {other}"))),
        }
    }
}

/// Value of a record under a sort index.
///
/// Variants never mix within one index, so the derived cross-variant order
/// is never observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderKey {
    /// Unix timestamp in seconds.
    Timestamp(i64),
    /// String collation (names, raw ids).
    Text(String),
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{ts}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Strict position of a record under a sort index.
///
/// Two records may share an [`OrderKey`] (same display name), so the record
/// id breaks ties and keeps every cursor unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    /// Key under the active index.
    pub key: OrderKey,
    /// Tie-breaking record id.
    pub id: RecordId,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.id)
    }
}

/// A record fetched from the background data owner.
///
/// Records are immutable once fetched; a refetch replaces the prior copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier.
    pub id: RecordId,
    /// Owning module.
    pub module: ModuleName,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Last update timestamp (Unix epoch seconds).
    #[serde(default)]
    pub updated: i64,
    /// Remaining record fields, opaque to this crate.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Record {
    /// Creates a record with empty data.
    #[must_use]
    pub fn new(
        id: impl Into<RecordId>,
        module: impl Into<ModuleName>,
        name: impl Into<String>,
        updated: i64,
    ) -> Self {
        Self {
            id: id.into(),
            module: module.into(),
            name: name.into(),
            updated,
            data: serde_json::Value::Null,
        }
    }

    /// Returns the key of this record under `index`.
    #[must_use]
    pub fn order_key(&self, index: SortIndex) -> OrderKey {
        match index {
            SortIndex::Updated => OrderKey::Timestamp(self.updated),
            SortIndex::Name => OrderKey::Text(self.name.clone()),
            SortIndex::Id => OrderKey::Text(self.id.as_str().to_string()),
        }
    }

    /// Returns the strict cursor of this record under `index`.
    #[must_use]
    pub fn cursor(&self, index: SortIndex) -> Cursor {
        Cursor {
            key: self.order_key(index),
            id: self.id.clone(),
        }
    }
}

impl From<String> for ModuleName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("updated", SortIndex::Updated; "updated")]
    #[test_case("updated.$t", SortIndex::Updated; "raw gdata field")]
    #[test_case("NAME", SortIndex::Name; "case insensitive")]
    #[test_case("full_name", SortIndex::Name; "full name alias")]
    #[test_case("id", SortIndex::Id; "id")]
    fn test_sort_index_parse(input: &str, expected: SortIndex) {
        assert_eq!(input.parse::<SortIndex>().ok(), Some(expected));
    }

    #[test]
    fn test_sort_index_rejects_unknown() {
        assert!(matches!(
            "color".parse::<SortIndex>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cursor_breaks_ties_by_id() {
        let a = Record::new("a", "Contacts", "Smith", 1);
        let b = Record::new("b", "Contacts", "Smith", 1);
        assert!(a.cursor(SortIndex::Name) < b.cursor(SortIndex::Name));
        assert_eq!(
            SortOrder::Descending.compare(&a.cursor(SortIndex::Name), &b.cursor(SortIndex::Name)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_order_key_by_index() {
        let record = Record::new("42", "Leads", "Ada", 1_700_000_000);
        assert_eq!(
            record.order_key(SortIndex::Updated),
            OrderKey::Timestamp(1_700_000_000)
        );
        assert_eq!(record.order_key(SortIndex::Name), OrderKey::Text("Ada".into()));
        assert_eq!(record.order_key(SortIndex::Id), OrderKey::Text("42".into()));
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let json = r#"{"id": "c1", "module": "Contacts"}"#;
        let record: Record = serde_json::from_str(json).unwrap();
        assert_eq!(record.id.as_str(), "c1");
        assert!(record.name.is_empty());
        assert_eq!(record.data, serde_json::Value::Null);
    }
}
