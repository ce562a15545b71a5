//! Static field sets of the known tables.
//!
//! Each table exposes a finite set of fields. Resolution is a lookup against
//! that set; there is no runtime attribute probing.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ast::JoinType;

use super::lazy_join::LazyJoin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Events,
    PersonDistinctIds,
    Persons,
    Groups,
}

impl TableKind {
    pub const ALL: [TableKind; 4] = [
        TableKind::Events,
        TableKind::PersonDistinctIds,
        TableKind::Persons,
        TableKind::Groups,
    ];

    /// Name used in queries.
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Events => "events",
            TableKind::PersonDistinctIds => "person_distinct_ids",
            TableKind::Persons => "persons",
            TableKind::Groups => "groups",
        }
    }

    /// Physical ClickHouse table.
    pub fn clickhouse_name(&self) -> &'static str {
        match self {
            TableKind::Events => "events",
            TableKind::PersonDistinctIds => "person_distinct_id2",
            TableKind::Persons => "person",
            TableKind::Groups => "groups",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// What a field name on a table stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDef {
    /// Plain column with the given physical name.
    Column(&'static str),
    /// JSON string column; any further path segments are extracted keys.
    Json(&'static str),
    /// Shortcut for a longer path on the same table (`person_id` → `pdi.person_id`).
    Traverser(&'static [&'static str]),
    /// Inline field set over columns of the same physical table.
    Virtual(&'static [(&'static str, FieldDef)]),
    LazyJoin(LazyJoin),
}

pub(crate) const PDI_JOIN: LazyJoin = LazyJoin {
    join_table: TableKind::PersonDistinctIds,
    from_field: "distinct_id",
    to_field: "distinct_id",
    join_type: JoinType::Inner,
    version_column: "version",
    exclude_deleted: true,
    group_type_index: None,
};

pub(crate) const PERSON_JOIN: LazyJoin = LazyJoin {
    join_table: TableKind::Persons,
    from_field: "person_id",
    to_field: "id",
    join_type: JoinType::Inner,
    version_column: "version",
    exclude_deleted: true,
    group_type_index: None,
};

const fn group_join(index: u8, from_field: &'static str) -> LazyJoin {
    LazyJoin {
        join_table: TableKind::Groups,
        from_field,
        to_field: "group_key",
        join_type: JoinType::Left,
        version_column: "_timestamp",
        exclude_deleted: false,
        group_type_index: Some(index),
    }
}

pub(crate) const GROUP_JOINS: [LazyJoin; 5] = [
    group_join(0, "$group_0"),
    group_join(1, "$group_1"),
    group_join(2, "$group_2"),
    group_join(3, "$group_3"),
    group_join(4, "$group_4"),
];

const EVENTS_COMMON: &[(&str, FieldDef)] = &[
    ("uuid", FieldDef::Column("uuid")),
    ("event", FieldDef::Column("event")),
    ("properties", FieldDef::Json("properties")),
    ("timestamp", FieldDef::Column("timestamp")),
    ("distinct_id", FieldDef::Column("distinct_id")),
    ("elements_chain", FieldDef::Column("elements_chain")),
    ("created_at", FieldDef::Column("created_at")),
    ("team_id", FieldDef::Column("team_id")),
    ("$group_0", FieldDef::Column("$group_0")),
    ("$group_1", FieldDef::Column("$group_1")),
    ("$group_2", FieldDef::Column("$group_2")),
    ("$group_3", FieldDef::Column("$group_3")),
    ("$group_4", FieldDef::Column("$group_4")),
    ("group_0", FieldDef::LazyJoin(GROUP_JOINS[0])),
    ("group_1", FieldDef::LazyJoin(GROUP_JOINS[1])),
    ("group_2", FieldDef::LazyJoin(GROUP_JOINS[2])),
    ("group_3", FieldDef::LazyJoin(GROUP_JOINS[3])),
    ("group_4", FieldDef::LazyJoin(GROUP_JOINS[4])),
];

const EVENTS_JOINED_PERSONS: &[(&str, FieldDef)] = &[
    ("pdi", FieldDef::LazyJoin(PDI_JOIN)),
    ("person_id", FieldDef::Traverser(&["pdi", "person_id"])),
    ("person", FieldDef::Traverser(&["pdi", "person"])),
];

const POE_PERSON: &[(&str, FieldDef)] = &[
    ("id", FieldDef::Column("person_id")),
    ("properties", FieldDef::Json("person_properties")),
    ("created_at", FieldDef::Column("person_created_at")),
];

const POE_PDI: &[(&str, FieldDef)] = &[
    ("distinct_id", FieldDef::Column("distinct_id")),
    ("person_id", FieldDef::Column("person_id")),
    ("person", FieldDef::Virtual(POE_PERSON)),
];

const EVENTS_PERSONS_ON_EVENTS: &[(&str, FieldDef)] = &[
    ("pdi", FieldDef::Virtual(POE_PDI)),
    ("person_id", FieldDef::Column("person_id")),
    ("person", FieldDef::Virtual(POE_PERSON)),
];

const PERSON_DISTINCT_IDS: &[(&str, FieldDef)] = &[
    ("distinct_id", FieldDef::Column("distinct_id")),
    ("person_id", FieldDef::Column("person_id")),
    ("team_id", FieldDef::Column("team_id")),
    ("is_deleted", FieldDef::Column("is_deleted")),
    ("version", FieldDef::Column("version")),
    ("person", FieldDef::LazyJoin(PERSON_JOIN)),
];

const PERSONS: &[(&str, FieldDef)] = &[
    ("id", FieldDef::Column("id")),
    ("created_at", FieldDef::Column("created_at")),
    ("team_id", FieldDef::Column("team_id")),
    ("properties", FieldDef::Json("properties")),
    ("is_identified", FieldDef::Column("is_identified")),
    ("is_deleted", FieldDef::Column("is_deleted")),
    ("version", FieldDef::Column("version")),
];

const GROUPS: &[(&str, FieldDef)] = &[
    ("group_type_index", FieldDef::Column("group_type_index")),
    ("group_key", FieldDef::Column("group_key")),
    ("created_at", FieldDef::Column("created_at")),
    ("team_id", FieldDef::Column("team_id")),
    ("group_properties", FieldDef::Json("group_properties")),
];

/// Field definitions of `kind`, in declaration order.
///
/// With `person_on_events` the events table serves person fields from its
/// flattened columns instead of joining `pdi` and `person`.
pub(crate) fn field_defs(kind: TableKind, person_on_events: bool) -> Vec<(&'static str, FieldDef)> {
    match kind {
        TableKind::Events => {
            let person_fields = if person_on_events {
                EVENTS_PERSONS_ON_EVENTS
            } else {
                EVENTS_JOINED_PERSONS
            };
            EVENTS_COMMON.iter().chain(person_fields).copied().collect()
        }
        TableKind::PersonDistinctIds => PERSON_DISTINCT_IDS.to_vec(),
        TableKind::Persons => PERSONS.to_vec(),
        TableKind::Groups => GROUPS.to_vec(),
    }
}

/// Look a field up in an inline field set.
pub fn find_field(fields: &[(&'static str, FieldDef)], name: &str) -> Option<FieldDef> {
    fields
        .iter()
        .find(|(field_name, _)| *field_name == name)
        .map(|(_, def)| *def)
}
