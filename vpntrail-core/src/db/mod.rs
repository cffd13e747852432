//! Result database layer for vpntrail
//!
//! Each run materializes its history, sessions and correlated visits into a
//! fresh SQLite file:
//! - Schema migrations
//! - Repository for inserts and read-back queries

pub mod repo;
pub mod schema;

pub use repo::{format_local, output_file_name, OutputDatabase, VpnHistoryRow};
