//! Browser history loading
//!
//! Reads the visited-URL timeline out of a browser's own history database and
//! normalizes visit times to Unix seconds.
//!
//! | Family | File | Query | Clock |
//! |--------|------|-------|-------|
//! | Chromium | `History` | `visits` ⋈ `urls` | µs since 1601-01-01 |
//! | Firefox | `places.sqlite` | `moz_historyvisits` ⋈ `moz_places` | µs since 1970-01-01 |

use crate::error::{Error, Result};
use crate::types::{BrowserFamily, Visit};
use rusqlite::{Connection, OpenFlags, Row};
use std::path::Path;

/// Seconds between 1601-01-01 and 1970-01-01.
const WINDOWS_EPOCH_OFFSET: i64 = 11_644_473_600;

const CHROMIUM_QUERY: &str = r#"
    SELECT visits.id, visits.visit_time, urls.url, urls.title
    FROM visits
    LEFT JOIN urls ON visits.url = urls.id
    ORDER BY visits.visit_time ASC, visits.id ASC
"#;

const FIREFOX_QUERY: &str = r#"
    SELECT moz_historyvisits.id, moz_historyvisits.visit_date, moz_places.url, moz_places.title
    FROM moz_historyvisits
    LEFT JOIN moz_places ON moz_historyvisits.place_id = moz_places.id
    ORDER BY moz_historyvisits.visit_date ASC, moz_historyvisits.id ASC
"#;

/// Chromium `visit_time` (µs since 1601) to Unix seconds.
pub fn chromium_to_unix(micros: i64) -> i64 {
    micros / 1_000_000 - WINDOWS_EPOCH_OFFSET
}

/// Firefox `visit_date` (µs since 1970) to Unix seconds.
pub fn firefox_to_unix(micros: i64) -> i64 {
    micros / 1_000_000
}

/// Load every visit from a history database, ordered by visit time.
pub fn load(path: &Path, family: BrowserFamily) -> Result<Vec<Visit>> {
    if !path.is_file() {
        return Err(Error::History(format!(
            "history file not found: {}",
            path.display()
        )));
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let (query, to_unix): (&str, fn(i64) -> i64) = match family {
        BrowserFamily::Chromium => (CHROMIUM_QUERY, chromium_to_unix),
        BrowserFamily::Firefox => (FIREFOX_QUERY, firefox_to_unix),
    };

    let mut stmt = conn.prepare(query).map_err(|e| {
        Error::History(format!(
            "{} is not a {:?} history database: {}",
            path.display(),
            family,
            e
        ))
    })?;

    let visits = stmt
        .query_map([], |row| row_to_visit(row, to_unix))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    tracing::info!(
        path = %path.display(),
        ?family,
        visits = visits.len(),
        "History loaded"
    );
    Ok(visits)
}

fn row_to_visit(row: &Row, to_unix: fn(i64) -> i64) -> rusqlite::Result<Visit> {
    let raw_time: i64 = row.get(1)?;
    Ok(Visit {
        id: row.get(0)?,
        timestamp: to_unix(raw_time),
        url: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}
