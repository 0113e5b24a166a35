//! `update-ocsp` — one-shot refresher for `.ocsp` files.
//!
//! Reads the given certificate bundles (or directories of bundles),
//! queries the responders for those whose cached response is due per
//! the refresh heuristic, and stores the results in `<bundle>.ocsp`
//! files. Meant to be run from cron; `--interval` should roughly match
//! the cron period so responses never expire between runs.

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;
use ocsp_daemon::cli::parse_duration;
use ocsp_daemon::{expand_paths, needs_refresh_file, persist_response, run_hook_cmd};
use ocsp_proto::{create_request, parse_certificate_bundle, CertificateStatus, Fetcher};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// USG OCSP Updater - one-shot OCSP response refresh
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "update-ocsp")]
struct Cli {
    /// Certificate bundle files or directories of bundles
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Indicative interval between invocations of this tool (e.g. 24h)
    #[arg(short = 'i', long = "interval", default_value = "24h", value_parser = parse_duration)]
    interval: Duration,

    /// Program to run with the raw DER response on stdin after each refresh
    #[arg(short = 'H', long = "hook", value_name = "CMD")]
    hook: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (files, _dirs) = match expand_paths(&cli.paths) {
        Ok(expanded) => expanded,
        Err(e) => {
            eprintln!("cannot expand paths: {e}");
            process::exit(2);
        }
    };
    if files.is_empty() {
        eprintln!("missing certificate bundle(s)");
        process::exit(2);
    }

    let fetcher = Fetcher::default();
    let mut exit_code = 0;
    for bundle in &files {
        if let Err(e) = refresh_bundle(&fetcher, bundle, cli.interval, cli.hook.as_deref()).await {
            warn!(bundle = %bundle.display(), "refresh failed: {e}");
            exit_code = 1;
        }
    }
    process::exit(exit_code);
}

async fn refresh_bundle(
    fetcher: &Fetcher,
    bundle: &Path,
    interval: Duration,
    hook: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let parsed = parse_certificate_bundle(bundle)?;

    // Leave responses alone while the cached one is still fresh enough
    // to survive until the next invocation.
    if !needs_refresh_file(bundle, &parsed.issuer_der, interval) {
        return Ok(());
    }

    let request = create_request(&parsed.cert_der, &parsed.issuer_der, None)?;
    let response = fetcher
        .fetch(&request, None, None, None)
        .await?
        .ok_or("responder answered 304 to an unconditional request")?;
    let ocsp = response
        .ocsp
        .as_ref()
        .ok_or("fetched response has no parsed content")?;

    println!("{}: {}", bundle.display(), ocsp.status);
    println!("\tThis Update: {}", ocsp.this_update);
    if let Some(next_update) = ocsp.next_update {
        println!("\tNext Update: {next_update}");
    }
    if let CertificateStatus::Revoked { revoked_at, reason } = &ocsp.status {
        if let Some(reason) = reason {
            println!("\tReason: {reason}");
        }
        println!("\tRevocation Time: {revoked_at}");
    }

    persist_response(bundle, &response.raw, ocsp.this_update)?;
    if let Some(hook) = hook {
        run_hook_cmd(hook, &response.raw).await?;
    }
    Ok(())
}
