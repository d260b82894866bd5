//! Store table migrations
//!
//! Separate from model migration: these evolve Grove's own tables, are
//! embedded at compile time and are checksummed once applied.

mod checksums;
mod embedded;
mod runner;

pub use checksums::compute_checksum;
pub use runner::apply_migrations;
