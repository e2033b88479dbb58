//! Data models
//!
//! Shared between portal-server and API consumers.
//! DB row types use `#[cfg_attr(feature = "db", derive(sqlx::FromRow))]`.
//! All IDs are `i64` (SQLite INTEGER PRIMARY KEY).

pub mod member;
pub mod milestone;
pub mod points;
pub mod progression;
pub mod streak;

// Re-exports
pub use member::*;
pub use milestone::*;
pub use points::*;
pub use progression::*;
pub use streak::*;
