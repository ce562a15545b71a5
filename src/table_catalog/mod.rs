//! # Lazy Table Catalog
//!
//! Read-only registry of the tables a query can start from and the fields each
//! of them serves, including the lazy joins that reach other tables:
//!
//! ```text
//! events.pdi                 -> person_distinct_ids (on distinct_id)
//! events.group_0..group_4    -> groups (on $group_N, LEFT)
//! person_distinct_ids.person -> persons (on person_id = id)
//! events.person_id           => pdi.person_id
//! events.person              => pdi.person
//! ```
//!
//! The registry is built once per process and shared by every compilation.

use std::collections::HashMap;

pub mod errors;
pub mod lazy_join;
pub mod tables;

pub use lazy_join::{flattened_name, JoinContext, LazyJoin, RequestedField, PATH_SEPARATOR};
pub use tables::{FieldDef, TableKind};

use errors::CatalogError;

/// Catalog entry for one table.
#[derive(Debug)]
pub struct TableSchema {
    pub kind: TableKind,
    fields: Vec<(&'static str, FieldDef)>,
    person_on_events_fields: Vec<(&'static str, FieldDef)>,
}

impl TableSchema {
    fn new(kind: TableKind) -> Self {
        TableSchema {
            kind,
            fields: tables::field_defs(kind, false),
            person_on_events_fields: tables::field_defs(kind, true),
        }
    }

    /// The field set served by this table in the given storage mode.
    pub fn fields(&self, person_on_events: bool) -> &[(&'static str, FieldDef)] {
        if person_on_events {
            &self.person_on_events_fields
        } else {
            &self.fields
        }
    }

    pub fn field(&self, name: &str, person_on_events: bool) -> Option<FieldDef> {
        tables::find_field(self.fields(person_on_events), name)
    }
}

lazy_static::lazy_static! {
    static ref CATALOG: HashMap<TableKind, TableSchema> = {
        let mut m = HashMap::new();
        for kind in TableKind::ALL {
            m.insert(kind, TableSchema::new(kind));
        }
        m
    };
}

/// Find a table by the name used in queries.
pub fn lookup_table(name: &str) -> Result<&'static TableSchema, CatalogError> {
    TableKind::ALL
        .iter()
        .find(|kind| kind.name() == name)
        .map(|kind| table_schema(*kind))
        .ok_or_else(|| CatalogError::UnknownTable(name.to_string()))
}

pub fn table_schema(kind: TableKind) -> &'static TableSchema {
    // Every TableKind is registered when the catalog is built.
    &CATALOG[&kind]
}

/// The lazy join serving `group_<index>` on events.
pub fn group_join(index: u8) -> Option<LazyJoin> {
    tables::GROUP_JOINS.get(usize::from(index)).copied()
}

pub fn distinct_id_join() -> LazyJoin {
    tables::PDI_JOIN
}

pub fn person_join() -> LazyJoin {
    tables::PERSON_JOIN
}
