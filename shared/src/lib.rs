//! Shared types for the guildhouse portal
//!
//! Models are serialized over the API and (with the `db` feature) read
//! straight from SQLite rows. All IDs are `i64`, all timestamps are
//! millisecond UTC epochs.

pub mod models;
pub mod util;
