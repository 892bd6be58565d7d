//! # XER Ingest
//!
//! Loads Primavera P6 XER schedule exports into SQLite.
//!
//! An XER file is a tagged, tab-delimited dump of many tables. This crate
//! streams the file into typed table blocks, evolves one destination table
//! per XER table so it can hold every column ever seen, and inserts each
//! record tagged with the id of the file it came from. Writes are retried
//! while another process holds the database lock.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │ .xer     │──▶│  Parser  │──▶│ Orchestrator │──▶│  SQLite  │
//! │ file     │   │ +Sanitize│   │ Schema+Retry │   │  tables  │
//! └──────────┘   └──────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`sanitize`] | Column name sanitization and identifier quoting |
//! | [`parser`] | Streaming XER parser |
//! | [`models`] | Table blocks, records, file metadata |
//! | [`schema`] | Destination schema reconciliation |
//! | [`retry`] | Retry with backoff on lock contention |
//! | [`ingest`] | Ingestion orchestration and CLI runners |
//! | [`metadata`] | File name classifier and metadata insert |
//! | [`store`] | SQLite pool handle and statement trait |
//! | [`migrate`] | Metadata table creation |
//! | [`discover`] | Directory scan for XER files |
//! | [`stats`] | Database summary |
//! | [`config`] | TOML configuration |
//! | [`logging`] | Tracing subscriber setup |
//! | [`error`] | Error types |

pub mod config;
pub mod discover;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod parser;
pub mod retry;
pub mod sanitize;
pub mod schema;
pub mod stats;
pub mod store;
