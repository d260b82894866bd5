//! SQL migrations compiled into the binary, in application order

pub struct EmbeddedMigration {
    pub id: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[EmbeddedMigration] = &[EmbeddedMigration {
    id: "001_object_graph",
    sql: include_str!("../../migrations/001_object_graph.sql"),
}];
