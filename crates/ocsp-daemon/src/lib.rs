//! OCSP Updater Daemon
//!
//! This crate keeps a set of certificate bundles supplied with fresh
//! OCSP responses. The [`Updater`] schedules one query per distinct
//! OCSP request at the right moment — late enough to get a new
//! response, early enough never to serve a stale one — and notifies a
//! handler on every refresh.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use ocsp_daemon::{Event, UpdateHandler, Updater};
//! use ocsp_proto::{create_request, parse_certificate_bundle};
//!
//! struct PrintHandler;
//!
//! #[async_trait]
//! impl UpdateHandler for PrintHandler {
//!     async fn on_update(&self, event: Event) {
//!         println!("{}: {}", event.tags.join(", "), event.response.status);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let updater = Arc::new(Updater::new().with_handler(Arc::new(PrintHandler)));
//!
//! let bundle = parse_certificate_bundle("example.com.pem".as_ref())?;
//! let request = create_request(&bundle.cert_der, &bundle.issuer_der, None)?;
//! updater.add_or_update("example.com.pem", request, None).await?;
//!
//! updater.start().await;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod event;
pub mod files;
pub mod hook;
pub mod updater;

pub use event::{Event, UpdateHandler};
pub use files::{
    expand_paths, load_cached_response, needs_refresh_file, ocsp_file, persist_response,
    should_ignore_file_name,
};
pub use hook::run_hook_cmd;
pub use updater::{Jitter, Updater, UpdaterError, DEFAULT_TICK_ROUND};
