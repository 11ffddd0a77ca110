// Deterministic identifiers derived from natural keys.
// Re-ingesting the same logical entity must produce the same identifier so the
// store replaces the previous object instead of adding a duplicate.


use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::{RecordKind, Zone};

/// Namespace for all catalog identifiers (the RFC 4122 DNS namespace,
/// `6ba7b810-9dad-11d1-80b4-00c04fd430c8`).
///
/// Changing it re-keys every object in the store.
pub const IDENTIFIER_NAMESPACE: Uuid = Uuid::NAMESPACE_DNS;

/// Fields that logically identify a catalog entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Dataset {
        table_name: String,
        zone: Zone,
    },
    Relationship {
        from_table: String,
        from_column: String,
        to_table: String,
        to_column: String,
    },
    DomainTag {
        tag_name: String,
    },
}

impl NaturalKey {
    #[inline]
    pub fn dataset(table_name: impl Into<String>, zone: Zone) -> Self {
        Self::Dataset {
            table_name: table_name.into(),
            zone,
        }
    }

    #[inline]
    pub fn relationship(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self::Relationship {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
        }
    }

    #[inline]
    pub fn domain_tag(tag_name: impl Into<String>) -> Self {
        Self::DomainTag {
            tag_name: tag_name.into(),
        }
    }

    #[inline]
    pub const fn kind(&self) -> RecordKind {
        match self {
            NaturalKey::Dataset { .. } => RecordKind::Dataset,
            NaturalKey::Relationship { .. } => RecordKind::Relationship,
            NaturalKey::DomainTag { .. } => RecordKind::DomainTag,
        }
    }

    /// Lower-cased canonical string the identifier is derived from.
    #[inline]
    pub fn canonical(&self) -> String {
        let joined = match self {
            NaturalKey::Dataset { table_name, zone } => format!("{table_name}_{zone}"),
            NaturalKey::Relationship {
                from_table,
                from_column,
                to_table,
                to_column,
            } => format!("{from_table}.{from_column}_to_{to_table}.{to_column}"),
            NaturalKey::DomainTag { tag_name } => tag_name.clone(),
        };
        joined.to_lowercase()
    }

    #[inline]
    pub fn identifier(&self) -> Uuid {
        identifier_for(self)
    }
}

impl fmt::Display for NaturalKey {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NaturalKey::Dataset { table_name, zone } => write!(f, "{table_name} ({zone})"),
            NaturalKey::Relationship {
                from_table,
                from_column,
                to_table,
                to_column,
            } => write!(f, "{from_table}.{from_column} -> {to_table}.{to_column}"),
            NaturalKey::DomainTag { tag_name } => f.write_str(tag_name),
        }
    }
}

/// Name-based (v5) identifier for a natural key.
#[inline]
pub fn identifier_for(key: &NaturalKey) -> Uuid {
    identifier_for_canonical(&key.canonical())
}

/// Name-based (v5) identifier for an already canonical key string.
#[inline]
pub fn identifier_for_canonical(canonical: &str) -> Uuid {
    Uuid::new_v5(&IDENTIFIER_NAMESPACE, canonical.as_bytes())
}
