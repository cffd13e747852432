//! Output database repository
//!
//! Insert operations for the result tables, plus the read-back queries used by
//! the CLI summary and by tests.

use super::schema::{self, PROXY_LIST_DDL};
use crate::error::{Error, Result};
use crate::proxy_list::ProxyNode;
use crate::types::*;
use chrono::{DateTime, Local, TimeZone};
use rusqlite::{params, Connection, Row};
use std::path::Path;

/// Format used for `vpn_history.visit_time`.
pub const LOCAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result file name for a run started at `now`.
///
/// `{browser}_{extension}_{%Y-%m-%d_%H%M%S}.sqlite`
pub fn output_file_name(variant: Variant, now: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.sqlite",
        variant.browser.as_str(),
        variant.extension.as_str(),
        now.format("%Y-%m-%d_%H%M%S")
    )
}

/// Render epoch seconds as local wall-clock time.
///
/// Falls back to the raw number for timestamps chrono cannot represent.
pub fn format_local(ts: i64) -> String {
    match Local.timestamp_opt(ts, 0).earliest() {
        Some(dt) => dt.format(LOCAL_TIME_FORMAT).to_string(),
        None => ts.to_string(),
    }
}

/// A row of `vpn_history` as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpnHistoryRow {
    pub visit_time: String,
    pub url: String,
    pub title: String,
    pub proxy: String,
}

/// Handle on one result database.
pub struct OutputDatabase {
    conn: Connection,
}

impl OutputDatabase {
    /// Create a new result database. Refuses to overwrite an existing file.
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("output database already exists: {}", path.display()),
            )));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        schema::run_migrations(&conn)?;

        tracing::info!(path = %path.display(), "Output database created");
        Ok(Self { conn })
    }

    /// Open an existing result database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ============================================
    // Inserts
    // ============================================

    /// Copy the visit timeline into `history`.
    pub fn insert_history(&mut self, visits: &[Visit]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO history (id, visit_time, url, title) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for visit in visits {
                stmt.execute(params![visit.id, visit.timestamp, visit.url, visit.title])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = visits.len(), "Inserted history");
        Ok(())
    }

    /// Write reconstructed sessions into `vpn`.
    pub fn insert_sessions(&mut self, sessions: &[Session]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vpn (id, startTS, stopTS, Proxy) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for session in sessions {
                stmt.execute(params![
                    session.id,
                    session.start,
                    session.stop,
                    session.proxy().unwrap_or_default(),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = sessions.len(), "Inserted sessions");
        Ok(())
    }

    /// Write matched records into `vpn_history`. Unmatched visits are skipped.
    pub fn insert_correlated(&mut self, records: &[CorrelatedRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vpn_history (visit_time, url, title, Proxy) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for record in records {
                let Some(proxy) = &record.proxy_attributes else {
                    continue;
                };
                stmt.execute(params![
                    format_local(record.visit_time),
                    record.url,
                    record.title,
                    proxy,
                ])?;
                written += 1;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = written, "Inserted correlated history");
        Ok(written)
    }

    /// Create and fill `proxy_list`.
    pub fn insert_proxy_list(&mut self, nodes: &[ProxyNode]) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(PROXY_LIST_DDL)?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO proxy_list (id, country_code, URLs, IPs) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for node in nodes {
                stmt.execute(params![node.id, node.country_code, node.hostname, node.ip])?;
            }
        }
        tx.commit()?;
        tracing::debug!(rows = nodes.len(), "Inserted proxy list");
        Ok(())
    }

    // ============================================
    // Queries
    // ============================================

    /// Sessions as stored in `vpn`, ordered by id.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, startTS, stopTS, Proxy FROM vpn ORDER BY id")?;
        let sessions = stmt
            .query_map([], Self::row_to_session)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    /// Rows of `vpn_history` in insertion order.
    pub fn list_vpn_history(&self) -> Result<Vec<VpnHistoryRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT visit_time, url, title, Proxy FROM vpn_history ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(VpnHistoryRow {
                    visit_time: row.get(0)?,
                    url: row.get(1)?,
                    title: row.get(2)?,
                    proxy: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of rows in `history`.
    pub fn history_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?;
        Ok(count)
    }

    /// Number of rows in `proxy_list`, or `None` when the table was not created.
    pub fn proxy_list_count(&self) -> Result<Option<i64>> {
        let exists: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='proxy_list'",
            [],
            |r| r.get(0),
        )?;
        if exists == 0 {
            return Ok(None);
        }
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM proxy_list", [], |r| r.get(0))?;
        Ok(Some(count))
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
        let proxy: Option<String> = row.get(3)?;
        let mut attributes = Attributes::new();
        attributes.insert(ATTR_PROXY.to_string(), proxy.unwrap_or_default());
        Ok(Session {
            id: row.get(0)?,
            start: row.get(1)?,
            stop: row.get(2)?,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session(id: i64, start: i64, stop: i64, proxy: &str) -> Session {
        let mut attributes = Attributes::new();
        attributes.insert(ATTR_PROXY.to_string(), proxy.to_string());
        Session {
            id,
            start,
            stop,
            attributes,
        }
    }

    fn record(visit_time: i64, proxy: Option<&str>) -> CorrelatedRecord {
        CorrelatedRecord {
            visit_time,
            url: format!("https://example.com/{}", visit_time),
            title: "title".to_string(),
            proxy_attributes: proxy.map(str::to_string),
        }
    }

    #[test]
    fn test_output_file_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 2).unwrap();
        let variant = Variant::new(Browser::Chrome, Extension::TouchVpn);
        assert_eq!(
            output_file_name(variant, now),
            "chrome_touchvpn_2024-03-09_070502.sqlite"
        );
    }

    #[test]
    fn test_sessions_round_trip() {
        let mut db = OutputDatabase::open_in_memory().unwrap();
        let sessions = vec![
            session(1, 100, 500, "fr1.touchvpn.com"),
            session(2, 600, SENTINEL_MAX, ""),
        ];

        db.insert_sessions(&sessions).unwrap();

        assert_eq!(db.list_sessions().unwrap(), sessions);
    }

    #[test]
    fn test_only_matched_records_written() {
        let mut db = OutputDatabase::open_in_memory().unwrap();
        let records = vec![
            record(50, None),
            record(300, Some("fr1.touchvpn.com")),
            record(400, Some("")),
            record(600, None),
        ];

        let written = db.insert_correlated(&records).unwrap();

        assert_eq!(written, 2);
        let rows = db.list_vpn_history().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].visit_time, format_local(300));
        assert_eq!(rows[0].proxy, "fr1.touchvpn.com");
        assert_eq!(rows[1].proxy, "");
    }

    #[test]
    fn test_format_local_matches_chrono() {
        let expected = Local
            .timestamp_opt(1_700_000_000, 0)
            .earliest()
            .unwrap()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        assert_eq!(format_local(1_700_000_000), expected);
        assert_eq!(format_local(1_700_000_000).len(), 19);
    }

    #[test]
    fn test_history_and_proxy_list() {
        let mut db = OutputDatabase::open_in_memory().unwrap();
        assert_eq!(db.proxy_list_count().unwrap(), None);

        db.insert_history(&[Visit {
            id: 1,
            timestamp: 10,
            url: "https://example.com/".to_string(),
            title: String::new(),
        }])
        .unwrap();
        db.insert_proxy_list(&[ProxyNode {
            id: 1,
            country_code: "US".to_string(),
            hostname: "us-1.zenguard.biz".to_string(),
            ip: "198.51.100.1".to_string(),
        }])
        .unwrap();

        assert_eq!(db.history_count().unwrap(), 1);
        assert_eq!(db.proxy_list_count().unwrap(), Some(1));
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.sqlite");

        OutputDatabase::create(&path).unwrap();
        let err = OutputDatabase::create(&path).err().unwrap();
        assert!(matches!(err, Error::Io(_)));
    }
}
