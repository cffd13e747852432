//! End-to-end extraction runs over the fixture artifacts.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vpntrail_core::{
    pipeline, Browser, BrowserFamily, Caution, Error, ExtractionRequest, Extension, OutputDatabase,
    Stage, Variant, SENTINEL_MAX,
};

const WINDOWS_EPOCH_OFFSET: i64 = 11_644_473_600;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

/// Chromium `History` with one visit per timestamp (Unix seconds).
fn chromium_history(dir: &Path, visits: &[i64]) -> PathBuf {
    let path = dir.join("History");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE urls (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR);
        CREATE TABLE visits (id INTEGER PRIMARY KEY, url INTEGER NOT NULL, visit_time INTEGER NOT NULL);
        "#,
    )
    .unwrap();
    for (i, ts) in visits.iter().enumerate() {
        let id = i as i64 + 1;
        conn.execute(
            "INSERT INTO urls (id, url, title) VALUES (?1, ?2, ?3)",
            params![id, format!("https://site{}.example/", id), format!("Site {}", id)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO visits (id, url, visit_time) VALUES (?1, ?2, ?3)",
            params![id, id, (ts + WINDOWS_EPOCH_OFFSET) * 1_000_000],
        )
        .unwrap();
    }
    path
}

/// Firefox `places.sqlite` with one visit per timestamp (Unix seconds).
fn firefox_history(dir: &Path, visits: &[i64]) -> PathBuf {
    let path = dir.join("places.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE moz_places (id INTEGER PRIMARY KEY, url LONGVARCHAR, title LONGVARCHAR);
        CREATE TABLE moz_historyvisits (id INTEGER PRIMARY KEY, place_id INTEGER, visit_date INTEGER);
        "#,
    )
    .unwrap();
    for (i, ts) in visits.iter().enumerate() {
        let id = i as i64 + 1;
        conn.execute(
            "INSERT INTO moz_places (id, url, title) VALUES (?1, ?2, ?3)",
            params![id, format!("https://site{}.example/", id), format!("Site {}", id)],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO moz_historyvisits (id, place_id, visit_date) VALUES (?1, ?2, ?3)",
            params![id, id, ts * 1_000_000],
        )
        .unwrap();
    }
    path
}

struct Run {
    _dir: TempDir,
    output_dir: PathBuf,
    request: ExtractionRequest,
}

fn prepare(browser: Browser, extension: Extension, fixture_dir: &str, visits: &[i64]) -> Run {
    let dir = TempDir::new().unwrap();
    let history_path = match browser.family() {
        BrowserFamily::Chromium => chromium_history(dir.path(), visits),
        BrowserFamily::Firefox => firefox_history(dir.path(), visits),
    };
    let output_dir = dir.path().join("out");

    let request = ExtractionRequest {
        variant: Variant::new(browser, extension),
        artifact_dir: fixture(fixture_dir),
        history_path,
        output_dir: output_dir.clone(),
        proxy_list: None,
    };
    Run {
        _dir: dir,
        output_dir,
        request,
    }
}

fn output_files(dir: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[test]
fn chrome_touchvpn_end_to_end() {
    vpntrail_core::logging::init_test();
    let run = prepare(
        Browser::Chrome,
        Extension::TouchVpn,
        "chrome_touchvpn",
        &[1_699_999_000, 1_700_000_300, 1_700_000_550, 1_700_002_000],
    );

    let report = pipeline::run(&run.request).unwrap();

    assert!(report.artifact_path.ends_with("000003.log"));
    assert_eq!(report.events, 3);
    assert_eq!(report.history_count, 4);
    assert_eq!(report.correlated, 2);
    assert_eq!(report.cautions, vec![Caution::OpenEnded]);
    assert_eq!(report.proxy_nodes, None);

    let file_name = report.output_path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("chrome_touchvpn_"));
    assert!(file_name.ends_with(".sqlite"));

    let db = OutputDatabase::open(&report.output_path).unwrap();
    let sessions = db.list_sessions().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(
        (sessions[0].id, sessions[0].start, sessions[0].stop),
        (1, 1_700_000_100, 1_700_000_500)
    );
    assert_eq!(
        sessions[0].proxy(),
        Some("fr1.touchvpn.com, fr2.touchvpn.com")
    );
    assert_eq!(
        (sessions[1].id, sessions[1].start, sessions[1].stop),
        (2, 1_700_001_000, SENTINEL_MAX)
    );
    assert_eq!(sessions[1].proxy(), Some("de1.touchvpn.com"));

    assert_eq!(db.history_count().unwrap(), 4);
    let rows = db.list_vpn_history().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].url, "https://site2.example/");
    assert_eq!(rows[0].proxy, "fr1.touchvpn.com, fr2.touchvpn.com");
    assert_eq!(
        rows[0].visit_time,
        vpntrail_core::db::format_local(1_700_000_300)
    );
    assert_eq!(rows[1].proxy, "de1.touchvpn.com");
    assert_eq!(db.proxy_list_count().unwrap(), None);
}

#[test]
fn edge_zenmate_with_proxy_list() {
    let mut run = prepare(
        Browser::Edge,
        Extension::ZenMate,
        "edge_zenmate",
        &[1_700_000_300, 1_700_000_600, 1_700_005_000],
    );
    run.request.proxy_list = Some(fixture("zenmate_proxy_list.json"));

    let report = pipeline::run(&run.request).unwrap();

    assert_eq!(report.sessions.len(), 2);
    assert_eq!(report.sessions[0].start, 1_700_000_000);
    assert_eq!(report.sessions[0].stop, 1_700_000_600);
    assert_eq!(report.sessions[1].stop, SENTINEL_MAX);
    assert_eq!(
        report.cautions,
        vec![Caution::NoStopMarkers, Caution::OpenEnded]
    );
    assert_eq!(report.proxy_nodes, Some(4));

    let db = OutputDatabase::open(&report.output_path).unwrap();
    let proxies: Vec<String> = db
        .list_vpn_history()
        .unwrap()
        .into_iter()
        .map(|row| row.proxy)
        .collect();
    // The boundary visit belongs to the lower-numbered session.
    assert_eq!(proxies, vec!["US", "US", "DE"]);
    assert_eq!(db.proxy_list_count().unwrap(), Some(4));
}

#[test]
fn zenmate_without_proxy_list_is_a_caution() {
    let mut run = prepare(
        Browser::Firefox,
        Extension::ZenMate,
        "firefox_zenmate",
        &[1_700_000_300],
    );
    let missing = run.output_dir.join("nowhere.json");
    run.request.proxy_list = Some(missing.clone());

    let report = pipeline::run(&run.request).unwrap();

    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].start, 1_700_000_000);
    assert_eq!(report.sessions[0].proxy(), Some("NL"));
    assert!(report.cautions.contains(&Caution::OpenEnded));
    assert!(report.cautions.contains(&Caution::MissingProxyList(missing)));
    assert_eq!(report.proxy_nodes, None);

    let db = OutputDatabase::open(&report.output_path).unwrap();
    assert_eq!(db.proxy_list_count().unwrap(), None);
    assert_eq!(db.list_vpn_history().unwrap().len(), 1);
}

#[test]
fn chrome_browsec_end_to_end() {
    let run = prepare(
        Browser::Chrome,
        Extension::Browsec,
        "chrome_browsec",
        &[1_700_000_100, 1_700_000_900, 1_700_001_300],
    );

    let report = pipeline::run(&run.request).unwrap();

    let spans: Vec<(i64, i64)> = report.sessions.iter().map(|s| (s.start, s.stop)).collect();
    assert_eq!(
        spans,
        vec![(1_700_000_000, 1_700_000_600), (1_700_000_600, 1_700_001_200)]
    );
    assert!(report.cautions.is_empty());
    assert_eq!(report.correlated, 2);

    let db = OutputDatabase::open(&report.output_path).unwrap();
    let proxies: Vec<String> = db
        .list_vpn_history()
        .unwrap()
        .into_iter()
        .map(|row| row.proxy)
        .collect();
    assert_eq!(proxies, vec!["nl-1.prmsrvs.com", "de-1.prmsrvs.com"]);
}

#[test]
fn firefox_touchvpn_end_to_end() {
    let run = prepare(
        Browser::Firefox,
        Extension::TouchVpn,
        "firefox_touchvpn",
        &[1_699_999_999, 1_700_000_000, 1_800_000_000],
    );

    let report = pipeline::run(&run.request).unwrap();

    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].start, 1_700_000_000);
    assert_eq!(report.sessions[0].stop, SENTINEL_MAX);
    assert_eq!(report.cautions, vec![Caution::OpenEnded]);
    assert_eq!(report.correlated, 2);
}

#[test]
fn firefox_browsec_end_to_end() {
    let run = prepare(
        Browser::Firefox,
        Extension::Browsec,
        "firefox_browsec",
        &[1_700_000_500, 1_700_001_000],
    );

    let report = pipeline::run(&run.request).unwrap();

    assert_eq!(report.sessions.len(), 1);
    assert_eq!(report.sessions[0].start, 1_700_000_000);
    assert_eq!(report.sessions[0].stop, 1_700_000_900);
    assert_eq!(report.sessions[0].proxy(), Some("sg-1.prmsrvs.com"));
    assert_eq!(report.correlated, 1);
}

#[test]
fn malformed_artifact_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let artifact_dir = dir.path().join("leveldb");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::write(
        artifact_dir.join("000003.log"),
        "\"ts\":1700000000000 Proxy.Status.status{\"state\":1}",
    )
    .unwrap();
    let output_dir = dir.path().join("out");

    let request = ExtractionRequest {
        variant: Variant::new(Browser::Chrome, Extension::TouchVpn),
        artifact_dir,
        history_path: chromium_history(dir.path(), &[1_700_000_000]),
        output_dir: output_dir.clone(),
        proxy_list: None,
    };

    let err = pipeline::run(&request).unwrap_err();

    assert!(matches!(err, Error::MalformedArtifact { .. }));
    assert!(output_files(&output_dir).is_empty());
}

#[test]
fn log_without_markers_still_writes_tables() {
    let dir = TempDir::new().unwrap();
    let artifact_dir = dir.path().join("leveldb");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::write(
        artifact_dir.join("000003.log"),
        "\u{0}\u{1}settings{\"theme\":\"dark\"}\u{0}",
    )
    .unwrap();
    let output_dir = dir.path().join("out");

    let request = ExtractionRequest {
        variant: Variant::new(Browser::Chrome, Extension::TouchVpn),
        artifact_dir,
        history_path: chromium_history(dir.path(), &[1_700_000_000, 1_700_000_300]),
        output_dir: output_dir.clone(),
        proxy_list: None,
    };

    let report = pipeline::run(&request).unwrap();

    assert_eq!(report.cautions, vec![Caution::NoSessionMarkers]);
    assert_eq!(report.events, 0);
    assert!(report.sessions.is_empty());
    assert_eq!(report.history_count, 2);
    assert_eq!(report.correlated, 0);

    assert_eq!(output_files(&output_dir), vec![report.output_path.clone()]);
    let db = OutputDatabase::open(&report.output_path).unwrap();
    assert!(db.list_sessions().unwrap().is_empty());
    assert_eq!(db.history_count().unwrap(), 2);
    assert!(db.list_vpn_history().unwrap().is_empty());
}

#[test]
fn missing_artifact_is_reported() {
    let dir = TempDir::new().unwrap();
    let request = ExtractionRequest {
        variant: Variant::new(Browser::Edge, Extension::Browsec),
        artifact_dir: dir.path().to_path_buf(),
        history_path: chromium_history(dir.path(), &[]),
        output_dir: dir.path().join("out"),
        proxy_list: None,
    };

    let err = pipeline::run(&request).unwrap_err();

    match err {
        Error::ArtifactNotFound { pattern, .. } => assert_eq!(pattern, "*.log"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn missing_history_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let output_dir = dir.path().join("out");
    let request = ExtractionRequest {
        variant: Variant::new(Browser::Chrome, Extension::TouchVpn),
        artifact_dir: fixture("chrome_touchvpn"),
        history_path: dir.path().join("History"),
        output_dir: output_dir.clone(),
        proxy_list: None,
    };

    let err = pipeline::run(&request).unwrap_err();

    assert!(matches!(err, Error::History(_)));
    assert!(output_files(&output_dir).is_empty());
}

#[test]
fn progress_reports_every_stage() {
    let run = prepare(
        Browser::Chrome,
        Extension::Browsec,
        "chrome_browsec",
        &[1_700_000_100],
    );

    let mut stages = Vec::new();
    pipeline::run_with_progress(&run.request, |stage| stages.push(stage)).unwrap();

    assert_eq!(
        stages,
        vec![
            Stage::Discover,
            Stage::Scan,
            Stage::LoadHistory,
            Stage::Correlate,
            Stage::Write
        ]
    );
}
