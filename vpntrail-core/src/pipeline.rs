//! Extraction pipeline
//!
//! Drives one run end to end:
//!
//! ```text
//! artifact dir ──► discover ──► scan ──► build sessions ─┐
//! history file ──► load visits ──────────────────────────┴─► correlate ──► result .sqlite
//! ```
//!
//! Everything up to and including the correlation happens in memory. The
//! result database is only created once all of it has succeeded, so a failed
//! run leaves nothing behind.

use crate::artifact::{self, Artifact};
use crate::correlate::correlate;
use crate::db::{output_file_name, OutputDatabase};
use crate::error::Result;
use crate::history;
use crate::proxy_list::{self, ProxyNode};
use crate::scan::scanner_for;
use crate::session::build_sessions;
use crate::types::{Caution, CorrelatedRecord, Event, Session, Variant, Visit};
use chrono::Local;
use std::path::{Path, PathBuf};

/// Inputs for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub variant: Variant,
    /// Directory holding the extension's storage files
    pub artifact_dir: PathBuf,
    /// Browser history database
    pub history_path: PathBuf,
    /// Where the result database is created
    pub output_dir: PathBuf,
    /// ZenMate reference dataset; only consulted for ZenMate runs
    pub proxy_list: Option<PathBuf>,
}

/// Events and sessions recovered from a single artifact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    pub events: Vec<Event>,
    pub sessions: Vec<Session>,
    pub cautions: Vec<Caution>,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub variant: Variant,
    pub artifact_path: PathBuf,
    pub output_path: PathBuf,
    pub events: usize,
    pub sessions: Vec<Session>,
    pub history_count: usize,
    /// Visits that fell inside a session
    pub correlated: usize,
    pub proxy_nodes: Option<usize>,
    pub cautions: Vec<Caution>,
}

/// Pipeline stage reported to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discover,
    Scan,
    LoadHistory,
    Correlate,
    Write,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Discover => "locating artifact",
            Stage::Scan => "scanning artifact",
            Stage::LoadHistory => "loading history",
            Stage::Correlate => "correlating history",
            Stage::Write => "writing results",
        }
    }
}

/// Scan an artifact and fold its events into sessions.
///
/// Pure with respect to the filesystem: running it twice on the same artifact
/// yields identical results.
pub fn reconstruct(variant: Variant, artifact: &Artifact) -> Result<Reconstruction> {
    let outcome = scanner_for(variant).scan(artifact)?;
    let sessions = build_sessions(&outcome.events);

    let mut cautions = outcome.cautions;
    let derived = [
        sessions
            .iter()
            .any(Session::is_open_ended)
            .then_some(Caution::OpenEnded),
        sessions
            .iter()
            .any(Session::is_open_start)
            .then_some(Caution::OpenStart),
    ];
    for caution in derived.into_iter().flatten() {
        if !cautions.contains(&caution) {
            cautions.push(caution);
        }
    }

    for caution in &cautions {
        tracing::warn!(%variant, %caution, "Caution");
    }

    Ok(Reconstruction {
        events: outcome.events,
        sessions,
        cautions,
    })
}

/// Run an extraction with no progress reporting.
pub fn run(request: &ExtractionRequest) -> Result<ExtractionReport> {
    run_with_progress(request, |_| {})
}

/// Run an extraction, calling `on_stage` as each stage begins.
pub fn run_with_progress<F>(request: &ExtractionRequest, mut on_stage: F) -> Result<ExtractionReport>
where
    F: FnMut(Stage),
{
    let variant = request.variant;
    let family = variant.browser.family();
    tracing::info!(
        %variant,
        artifact_dir = %request.artifact_dir.display(),
        history = %request.history_path.display(),
        "Starting extraction"
    );

    on_stage(Stage::Discover);
    let (artifact_path, artifact) = artifact::open(&request.artifact_dir, family)?;
    tracing::debug!(path = %artifact_path.display(), kind = ?artifact.kind(), "Artifact selected");

    on_stage(Stage::Scan);
    let reconstruction = reconstruct(variant, &artifact)?;
    let mut cautions = reconstruction.cautions;

    on_stage(Stage::LoadHistory);
    let visits = history::load(&request.history_path, family)?;

    on_stage(Stage::Correlate);
    let records = correlate(&visits, &reconstruction.sessions);

    let proxy_nodes = if variant.extension.has_proxy_list() {
        let path = request
            .proxy_list
            .clone()
            .unwrap_or_else(|| PathBuf::from(proxy_list::DEFAULT_FILE_NAME));
        if path.is_file() {
            Some(proxy_list::load(&path)?)
        } else {
            tracing::warn!(path = %path.display(), "Proxy list not found");
            cautions.push(Caution::MissingProxyList(path));
            None
        }
    } else {
        None
    };

    on_stage(Stage::Write);
    let output_path = request
        .output_dir
        .join(output_file_name(variant, Local::now()));
    let correlated = write_results(
        &output_path,
        &visits,
        &reconstruction.sessions,
        &records,
        proxy_nodes.as_deref(),
    )?;

    tracing::info!(
        %variant,
        output = %output_path.display(),
        sessions = reconstruction.sessions.len(),
        correlated,
        "Extraction complete"
    );

    Ok(ExtractionReport {
        variant,
        artifact_path,
        output_path,
        events: reconstruction.events.len(),
        sessions: reconstruction.sessions,
        history_count: visits.len(),
        correlated,
        proxy_nodes: proxy_nodes.map(|nodes| nodes.len()),
        cautions,
    })
}

/// Materialize a run. A partially written file is removed on failure.
fn write_results(
    path: &Path,
    visits: &[Visit],
    sessions: &[Session],
    records: &[CorrelatedRecord],
    proxy_nodes: Option<&[ProxyNode]>,
) -> Result<usize> {
    let mut db = OutputDatabase::create(path)?;

    let written = (|| -> Result<usize> {
        db.insert_history(visits)?;
        db.insert_sessions(sessions)?;
        let correlated = db.insert_correlated(records)?;
        if let Some(nodes) = proxy_nodes {
            db.insert_proxy_list(nodes)?;
        }
        Ok(correlated)
    })();

    if written.is_err() {
        drop(db);
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial output");
        }
    }
    written
}
