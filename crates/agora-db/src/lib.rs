//! agora-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and one query module per feature.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod time;
