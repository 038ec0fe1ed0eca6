//! Shared database repository test infrastructure
//!
//! The same test functions run against every `PageViewRepo` implementation:
//!
//! - **In-memory**: always compiled
//! - **SQLite**: in-memory databases with the real migrations
//! - **PostgreSQL**: testcontainers, run with `cargo test -- --ignored`
