//! vpntrail - reconstruct VPN extension sessions from browser artifacts
//!
//! Scans the storage a VPN browser extension left behind, rebuilds when the
//! tunnel was up and through which proxy, and joins that against the browser
//! history. Results land in a new SQLite file per run.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/vpntrail/vpntrail.log (~/.local/state/vpntrail/vpntrail.log)
//! - Config: $XDG_CONFIG_HOME/vpntrail/config.toml (~/.config/vpntrail/config.toml)

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use vpntrail_core::db::format_local;
use vpntrail_core::{
    pipeline, Browser, Config, ExtractionReport, ExtractionRequest, Extension, Session, Variant,
    SENTINEL_MAX, SENTINEL_MIN,
};

#[derive(Parser)]
#[command(name = "vpntrail")]
#[command(about = "Extract VPN extension sessions and correlate them with browser history")]
#[command(version)]
struct Args {
    /// Browser that produced the artifacts (chrome, edge, firefox)
    #[arg(short, long)]
    browser: Browser,

    /// VPN extension (touchvpn, zenmate, browsec)
    #[arg(short, long)]
    extension: Extension,

    /// Directory holding the extension's LevelDB files or IndexedDB export
    #[arg(short, long)]
    dbpath: PathBuf,

    /// Browser history database (History or places.sqlite)
    #[arg(long)]
    history: PathBuf,

    /// Directory for the result database (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// ZenMate node list (overrides config)
    #[arg(long)]
    proxy_list: Option<PathBuf>,

    /// Print every reconstructed session
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard =
        vpntrail_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let variant = Variant::new(args.browser, args.extension);
    tracing::info!(%variant, "vpntrail starting");

    println!(
        "[*] {} {} started at {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    println!("[*] Browser: {}", variant.browser.display_name());
    println!("[*] Extension: {}", variant.extension.display_name());

    let request = ExtractionRequest {
        variant,
        artifact_dir: args.dbpath.clone(),
        history_path: args.history.clone(),
        output_dir: args.output_dir.clone().unwrap_or(config.output.dir),
        proxy_list: Some(
            args.proxy_list
                .clone()
                .unwrap_or(config.zenmate.proxy_list),
        ),
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = pipeline::run_with_progress(&request, |stage| {
        spinner.set_message(stage.label());
    });
    spinner.finish_and_clear();

    let report = result.with_context(|| format!("{} extraction failed", variant))?;
    print_report(&report, args.verbose);

    tracing::info!(output = %report.output_path.display(), "vpntrail finished");
    Ok(())
}

fn print_report(report: &ExtractionReport, verbose: bool) {
    println!("[*] Artifact: {}", report.artifact_path.display());

    for caution in &report.cautions {
        println!("[!] caution -> {}", caution);
    }

    println!(
        "[*] {} event(s), {} session(s)",
        report.events,
        report.sessions.len()
    );
    if verbose {
        for session in &report.sessions {
            print_session(session);
        }
    }

    println!(
        "[*] {} history visit(s), {} during a VPN session",
        report.history_count, report.correlated
    );
    if let Some(nodes) = report.proxy_nodes {
        println!("[*] proxy_list: {} node(s)", nodes);
    }
    println!("[*] Result: {}", report.output_path.display());
}

fn print_session(session: &Session) {
    let start = if session.start == SENTINEL_MIN {
        "(unknown)".to_string()
    } else {
        format_local(session.start)
    };
    let stop = if session.stop == SENTINEL_MAX {
        "(open)".to_string()
    } else {
        format_local(session.stop)
    };
    println!(
        "    #{:<3} {} -> {}  {}",
        session.id,
        start,
        stop,
        session.proxy().unwrap_or_default()
    );
}
