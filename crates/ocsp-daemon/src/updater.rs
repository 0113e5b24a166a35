//! Timer-driven scheduler that keeps OCSP responses fresh.
//!
//! The [`Updater`] maintains one status record per distinct OCSP query.
//! Callers attach opaque tags to the certificates they monitor; two
//! tags whose certificates produce equivalent queries share a single
//! record, so duplicated certificates cause no duplicated work.
//!
//! Refreshes are scheduled halfway into the remaining validity of the
//! current response (plus jitter, rounded to the tick), so responders
//! see roughly one query per certificate per validity window rather
//! than a stampede. All state sits behind a single mutex: fetches are
//! performed while holding it, which serializes the scheduler against
//! `add_or_update`/`remove` exactly as the public contract requires.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocsp_proto::{Fetcher, Response};
use rand::Rng;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use crate::event::{Event, UpdateHandler};

/// Default minimum interval between scheduler ticks; also the rounding
/// quantum for scheduled refresh times and the deferral on failure.
pub const DEFAULT_TICK_ROUND: Duration = Duration::from_secs(5 * 60);

/// Errors returned by [`Updater::add_or_update`].
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// The tag is already registered for a different OCSP query.
    #[error("duplicate tag: {0}")]
    DuplicateTag(String),
}

/// Injectable jitter source. Must return a duration in `[0, d)` for
/// `d > 0` and zero otherwise.
pub type Jitter = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

fn default_jitter(d: Duration) -> Duration {
    if d.is_zero() {
        Duration::ZERO
    } else {
        rand::thread_rng().gen_range(Duration::ZERO..d)
    }
}

/// One monitored OCSP query and its refresh schedule.
struct StatusEntry {
    id: u64,
    request: ocsp_proto::Request,
    response: Option<Response>,
    /// `None` means "refresh as soon as possible" and sorts earliest.
    next_update: Option<DateTime<Utc>>,
    /// Sorted, non-empty while the entry exists.
    tags: Vec<String>,
}

impl StatusEntry {
    fn display_tags(&self) -> String {
        self.tags.join(", ")
    }

    /// The event describing the entry's current response, if it has a
    /// parsed one.
    fn event(&self) -> Option<Event> {
        let response = self.response.as_ref()?;
        let ocsp = response.ocsp.clone()?;
        Some(Event {
            response: ocsp,
            raw: response.raw.clone(),
            tags: self.tags.clone(),
        })
    }
}

#[derive(Default)]
struct UpdaterState {
    entries: Vec<StatusEntry>,
    tag_index: HashMap<String, u64>,
    next_id: u64,
    running: bool,
}

impl UpdaterState {
    fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| cmp_next_update(a.next_update, b.next_update));
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

fn cmp_next_update(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    }
}

/// Schedules OCSP queries for a set of monitored certificates and
/// notifies a handler whenever a response is refreshed.
pub struct Updater {
    fetcher: Fetcher,
    tick_round: Duration,
    handler: Option<Arc<dyn UpdateHandler>>,
    jitter: Jitter,
    state: Mutex<UpdaterState>,
    /// Signaled whenever the earliest deadline may have changed.
    schedule_changed: Notify,
}

impl Default for Updater {
    fn default() -> Self {
        Updater::new()
    }
}

impl Updater {
    /// Creates an updater with the default HTTP client and tick.
    pub fn new() -> Self {
        Updater {
            fetcher: Fetcher::default(),
            tick_round: DEFAULT_TICK_ROUND,
            handler: None,
            jitter: Arc::new(default_jitter),
            state: Mutex::new(UpdaterState::default()),
            schedule_changed: Notify::new(),
        }
    }

    /// Replaces the fetcher (custom HTTP client or clock).
    pub fn with_fetcher(mut self, fetcher: Fetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Sets the scheduling quantum.
    pub fn with_tick_round(mut self, tick_round: Duration) -> Self {
        self.tick_round = tick_round;
        self
    }

    /// Sets the handler receiving refresh events.
    pub fn with_handler(mut self, handler: Arc<dyn UpdateHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replaces the jitter source, for deterministic tests.
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        self.fetcher.now()
    }

    fn tick(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.tick_round).unwrap_or(chrono::Duration::MAX)
    }

    /// Registers `tag` for the given query, with an optional cached
    /// response (typically loaded from disk).
    ///
    /// The cached response's parsed content and `max_age` drive the
    /// next refresh time; its validators are sent with the next fetch.
    /// Re-registering an already-monitored tag reschedules it; the
    /// request must then be equivalent to the one on file, otherwise
    /// [`UpdaterError::DuplicateTag`] is returned.
    ///
    /// # Panics
    ///
    /// Panics when `tag` is empty: that is a programming error, not a
    /// runtime condition.
    pub async fn add_or_update(
        &self,
        tag: &str,
        request: ocsp_proto::Request,
        cached: Option<Response>,
    ) -> Result<(), UpdaterError> {
        assert!(!tag.is_empty(), "empty tag");

        let mut state = self.state.lock().await;
        if let Some(&id) = state.tag_index.get(tag) {
            // Fast path, and the duplicate-tag check.
            let pos = state.position(id).expect("tag index points at a live entry");
            if !state.entries[pos].request.is_equivalent(&request) {
                return Err(UpdaterError::DuplicateTag(tag.to_string()));
            }
            self.update_status(&mut state.entries[pos], cached);
        } else if let Some(pos) = state
            .entries
            .iter()
            .position(|e| e.request.is_equivalent(&request))
        {
            // Another tag already monitors the same query.
            let running = state.running;
            let entry = &mut state.entries[pos];
            entry.tags.push(tag.to_string());
            entry.tags.sort();
            let had_cached = cached.is_some();
            self.update_status(entry, cached);
            if !had_cached && running {
                // Late joiner: replay the current response so the new
                // subscriber learns the status it missed.
                if let Some(event) = entry.event() {
                    self.dispatch(event);
                }
            }
            let id = entry.id;
            state.tag_index.insert(tag.to_string(), id);
        } else {
            let id = state.next_id;
            state.next_id += 1;
            let mut entry = StatusEntry {
                id,
                request,
                response: None,
                next_update: None,
                tags: vec![tag.to_string()],
            };
            self.update_status(&mut entry, cached);
            state.entries.push(entry);
            state.tag_index.insert(tag.to_string(), id);
        }
        self.reset_timer(&mut state);
        Ok(())
    }

    /// Stops monitoring `tag`. The underlying status is dropped once
    /// its last tag is removed. Unknown tags are ignored.
    pub async fn remove(&self, tag: &str) {
        let mut state = self.state.lock().await;
        let Some(id) = state.tag_index.remove(tag) else {
            return;
        };
        if let Some(pos) = state.position(id) {
            let entry = &mut state.entries[pos];
            entry.tags.retain(|t| t != tag);
            if entry.tags.is_empty() {
                state.entries.remove(pos);
            }
        }
        info!(tag = %tag, "no longer monitored");
        self.reset_timer(&mut state);
    }

    /// Runs the scheduler until [`Updater::stop`] is called.
    ///
    /// Calling `start` on an already-running updater returns
    /// immediately; otherwise it blocks, sleeping until the earliest
    /// scheduled refresh and sweeping due statuses via
    /// [`Updater::update_now`].
    pub async fn start(&self) {
        {
            let mut state = self.state.lock().await;
            if state.running {
                return;
            }
            state.running = true;
        }
        loop {
            let deadline = {
                let mut state = self.state.lock().await;
                if !state.running {
                    break;
                }
                state.sort();
                state.entries.first().map(|e| e.next_update)
            };
            match deadline {
                // Nothing monitored: wait for the schedule to change.
                None => self.schedule_changed.notified().await,
                Some(next) => {
                    let delay = match next {
                        None => Duration::ZERO,
                        Some(t) => (t - self.now()).to_std().unwrap_or(Duration::ZERO),
                    };
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => self.update_now().await,
                        _ = self.schedule_changed.notified() => {}
                    }
                }
            }
        }
        let mut state = self.state.lock().await;
        state.running = false;
    }

    /// Wakes [`Updater::start`] out of its loop and prevents further
    /// timer fires. An in-flight fetch completes; it is not aborted.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.running {
            return;
        }
        state.running = false;
        self.schedule_changed.notify_one();
    }

    /// Sweeps the schedule, refreshing every status that is due.
    ///
    /// Statuses are visited in schedule order; the sweep stops at the
    /// first one whose refresh time is still in the future. A fetch
    /// failure defers the status by one tick and the sweep continues.
    pub async fn update_now(&self) {
        let mut state = self.state.lock().await;
        state.sort();
        let mut i = 0;
        while i < state.entries.len() {
            let now = self.now();
            let due = match state.entries[i].next_update {
                None => true,
                Some(t) => t <= now,
            };
            if !due {
                break;
            }

            let tags = state.entries[i].display_tags();
            info!(tags = %tags, "fetching OCSP response");
            let outcome = {
                let entry = &state.entries[i];
                self.fetcher
                    .fetch_with_previous(&entry.request, entry.response.as_ref())
                    .await
            };

            let entry = &mut state.entries[i];
            match outcome {
                Err(err) => {
                    warn!(tags = %tags, error = %err, "failed to fetch OCSP response");
                    entry.next_update = Some(match entry.next_update {
                        Some(t) => t + self.tick(),
                        None => now + self.tick(),
                    });
                }
                Ok(None) => {
                    debug!(tags = %tags, "fetched OCSP response: up-to-date");
                    self.reschedule_unchanged(entry, now);
                }
                Ok(Some(response)) => {
                    info!(tags = %tags, "fetched OCSP response");
                    self.update_status(entry, Some(response));
                    if let Some(event) = entry.event() {
                        self.dispatch(event);
                    }
                }
            }
            i += 1;
        }
        self.reset_timer(&mut state);
    }

    /// Applies a (possibly absent) new response to an entry and decides
    /// its next refresh time.
    ///
    /// Rules, first match wins:
    /// 1. a `max_age` earlier than the response's `nextUpdate` (or with
    ///    no parsed response at all) is used verbatim;
    /// 2. an already-expired response is refreshed asap;
    /// 3. a live response is refreshed at a jittered point in the
    ///    second half of its remaining validity, rounded down to the
    ///    tick;
    /// 4. no response at all (new entry, nothing cached): asap;
    /// 5. otherwise the existing schedule stands.
    fn update_status(&self, entry: &mut StatusEntry, response: Option<Response>) {
        let (ocsp, max_age) = match &response {
            Some(r) => (r.ocsp.clone(), r.max_age),
            None => (None, None),
        };
        if let Some(r) = response {
            entry.response = Some(r);
        }

        let tags = entry.display_tags();
        let http_expiry = max_age.filter(|ma| match &ocsp {
            None => true,
            Some(o) => o.next_update.is_some_and(|nu| *ma < nu),
        });

        if let Some(at) = http_expiry {
            entry.next_update = Some(at);
            info!(tags = %tags, at = %at, "update scheduled");
        } else if let Some(o) = &ocsp {
            let now = self.now();
            match o.next_update {
                Some(nu) if nu >= now => {
                    let at = self.schedule_between(now, nu);
                    entry.next_update = Some(at);
                    info!(tags = %tags, at = %at, "update scheduled");
                }
                _ => {
                    entry.next_update = None;
                    info!(tags = %tags, "update scheduled asap");
                }
            }
        } else if entry.response.is_none() {
            entry.next_update = None;
            info!(tags = %tags, "update scheduled asap");
        }
        // Otherwise: no new information, keep the current schedule.
    }

    /// Reschedules an entry whose response the responder just confirmed
    /// as current (`304 Not Modified`).
    ///
    /// The retained response is pushed through the midpoint rule
    /// against the current time; without a live retained response the
    /// entry is simply retried one tick later.
    fn reschedule_unchanged(&self, entry: &mut StatusEntry, now: DateTime<Utc>) {
        let tags = entry.display_tags();
        let next_update = entry
            .response
            .as_ref()
            .and_then(|r| r.next_update())
            .filter(|nu| *nu > now);
        match next_update {
            Some(nu) => {
                let at = self.schedule_between(now, nu);
                entry.next_update = Some(at);
                info!(tags = %tags, at = %at, "update scheduled");
            }
            None => {
                let at = now + self.tick();
                entry.next_update = Some(at);
                info!(tags = %tags, at = %at, "update scheduled");
            }
        }
    }

    /// A point in the second half of `(now, next_update)`: one tick out
    /// at the earliest, plus half the remainder, plus jitter over that
    /// half, rounded down to the tick.
    fn schedule_between(&self, now: DateTime<Utc>, next_update: DateTime<Utc>) -> DateTime<Utc> {
        let earliest = now + self.tick();
        let half = (next_update - earliest) / 2;
        let jitter = (self.jitter)(half.to_std().unwrap_or(Duration::ZERO));
        let target = earliest + half + chrono::Duration::from_std(jitter).unwrap_or_default();
        truncate_to(target, self.tick_round)
    }

    /// Re-sorts the schedule and pokes the timer loop so it re-arms on
    /// the new earliest deadline.
    fn reset_timer(&self, state: &mut UpdaterState) {
        state.sort();
        self.schedule_changed.notify_one();
    }

    fn dispatch(&self, event: Event) {
        if let Some(handler) = &self.handler {
            let handler = handler.clone();
            tokio::spawn(async move {
                handler.on_update(event).await;
            });
        }
    }
}

/// Rounds `t` down to a multiple of `tick` from the Unix epoch.
fn truncate_to(t: DateTime<Utc>, tick: Duration) -> DateTime<Utc> {
    let tick_ms = tick.as_millis() as i64;
    if tick_ms <= 0 {
        return t;
    }
    let ms = t.timestamp_millis();
    DateTime::from_timestamp_millis(ms - ms.rem_euclid(tick_ms)).unwrap_or(t)
}
