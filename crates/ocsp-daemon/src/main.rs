//! `usg_ocspd` — daemon keeping `.ocsp` files fresh for a set of
//! certificate bundles.
//!
//! Bundle files (or directories of them) are given on the command
//! line. The daemon watches them, maintains `<bundle>.ocsp` next to
//! each one, and optionally runs a hook program after every refresh.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use notify::{recommended_watcher, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use ocsp_daemon::cli::parse_duration;
use ocsp_daemon::{
    expand_paths, load_cached_response, persist_response, run_hook_cmd, should_ignore_file_name,
    Event, UpdateHandler, Updater,
};
use ocsp_proto::{create_request, parse_certificate_bundle};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// USG OCSP Updater - maintains fresh OCSP responses for server certificates
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "usg_ocspd")]
struct Cli {
    /// Certificate bundle files or directories of bundles to monitor
    #[arg(value_name = "PATH", required = true)]
    paths: Vec<PathBuf>,

    /// Minimum interval between scheduler ticks (e.g. 5m, 300s)
    #[arg(short = 't', long = "tick", default_value = "5m", value_parser = parse_duration)]
    tick: Duration,

    /// Program to run with the raw DER response on stdin after each refresh
    #[arg(short = 'H', long = "hook", value_name = "CMD")]
    hook: Option<String>,
}

/// Persists refreshed responses to `.ocsp` files and runs the hook.
struct FileStoreHandler {
    hook_cmd: Option<String>,
}

#[async_trait]
impl UpdateHandler for FileStoreHandler {
    async fn on_update(&self, event: Event) {
        let tags = event.tags.join(", ");
        info!(
            tags = %tags,
            status = %event.response.status,
            this_update = %event.response.this_update,
            "OCSP response refreshed"
        );
        for tag in &event.tags {
            if let Err(e) = persist_response(Path::new(tag), &event.raw, event.response.this_update)
            {
                error!(bundle = %tag, error = %e, "failed to store OCSP response");
                break;
            }
        }
        if let Some(hook) = &self.hook_cmd {
            if let Err(e) = run_hook_cmd(hook, &event.raw).await {
                error!(tags = %tags, error = %e, "hook command failed");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("USG OCSP Updater v{}", env!("CARGO_PKG_VERSION"));

    let (files, dirs) = match expand_paths(&cli.paths) {
        Ok(expanded) => expanded,
        Err(e) => {
            error!("cannot expand paths: {e}");
            process::exit(1);
        }
    };
    if files.is_empty() && dirs.is_empty() {
        error!("no certificate bundles found");
        process::exit(2);
    }

    let handler = Arc::new(FileStoreHandler {
        hook_cmd: cli.hook,
    });
    let updater = Arc::new(
        Updater::new()
            .with_tick_round(cli.tick)
            .with_handler(handler),
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut watcher = match recommended_watcher(move |res| {
        let _ = tx.send(res);
    }) {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("cannot create filesystem watcher: {e}");
            process::exit(1);
        }
    };

    for dir in &dirs {
        if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
            error!(dir = %dir.display(), "cannot watch directory: {e}");
            process::exit(1);
        }
    }
    for file in &files {
        if let Err(e) = register_bundle(&updater, &mut watcher, file).await {
            error!(bundle = %file.display(), "cannot monitor bundle: {e}");
            process::exit(1);
        }
    }
    info!(
        bundles = files.len(),
        directories = dirs.len(),
        "monitoring started"
    );

    let scheduler = {
        let updater = Arc::clone(&updater);
        tokio::spawn(async move { updater.start().await })
    };

    loop {
        tokio::select! {
            maybe_event = rx.recv() => match maybe_event {
                Some(Ok(event)) => {
                    for path in &event.paths {
                        handle_fs_event(&updater, &mut watcher, &event.kind, path).await;
                    }
                }
                Some(Err(e)) => warn!("filesystem watcher error: {e}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    updater.stop().await;
    let _ = scheduler.await;
}

/// (Re-)registers one bundle: parse it, prepare its OCSP request, seed
/// the schedule from any cached `.ocsp` file, and watch it for changes.
async fn register_bundle(
    updater: &Updater,
    watcher: &mut RecommendedWatcher,
    bundle: &Path,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tag = bundle.to_string_lossy().into_owned();
    updater.remove(&tag).await;

    let parsed = parse_certificate_bundle(bundle)?;
    let request = create_request(&parsed.cert_der, &parsed.issuer_der, None)?;
    let cached = load_cached_response(bundle, &parsed.issuer_der);

    watcher.watch(bundle, RecursiveMode::NonRecursive)?;
    updater.add_or_update(&tag, request, cached).await?;
    Ok(())
}

async fn handle_fs_event(
    updater: &Updater,
    watcher: &mut RecommendedWatcher,
    kind: &EventKind,
    path: &Path,
) {
    if matches!(kind, EventKind::Access(_)) {
        return;
    }
    let name = path.to_string_lossy().into_owned();

    let gone = matches!(kind, EventKind::Remove(_)) || !path.exists();
    if gone {
        // Losing a sidecar file means the bundle's schedule is stale.
        for suffix in [".ocsp", ".issuer"] {
            if let Some(bundle) = name.strip_suffix(suffix) {
                info!(path = %name, "sidecar file removed, rescheduling");
                let bundle = PathBuf::from(bundle);
                if is_regular_file(&bundle) {
                    if let Err(e) = register_bundle(updater, watcher, &bundle).await {
                        warn!(bundle = %bundle.display(), "cannot monitor bundle: {e}");
                    }
                }
                break;
            }
        }
        if !should_ignore_file_name(&name) {
            updater.remove(&name).await;
        }
        return;
    }

    // Created or modified: an .issuer file maps back to its bundle.
    let bundle = name.strip_suffix(".issuer").unwrap_or(&name).to_string();
    if should_ignore_file_name(&bundle) {
        return;
    }
    let bundle = PathBuf::from(bundle);
    if !is_regular_file(path) || !is_regular_file(&bundle) {
        return;
    }
    if let Err(e) = register_bundle(updater, watcher, &bundle).await {
        warn!(bundle = %bundle.display(), "cannot monitor bundle: {e}");
    }
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
