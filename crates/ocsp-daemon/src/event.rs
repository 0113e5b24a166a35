//! Refresh events delivered to the daemon's subscriber.

use async_trait::async_trait;
use ocsp_proto::OcspResponse;

/// A successfully refreshed OCSP response for one monitored status.
///
/// `tags` is a snapshot of the tags attached to the status at the time
/// of the refresh, sorted.
#[derive(Debug, Clone)]
pub struct Event {
    /// Parsed and verified response.
    pub response: OcspResponse,
    /// Raw DER, for persistence and hook delivery.
    pub raw: Vec<u8>,
    /// Tags of the refreshed status.
    pub tags: Vec<String>,
}

/// Capability to receive refresh events.
///
/// Handlers run on their own task, fire-and-forget, so a slow handler
/// never stalls the scheduler. Events for the same status are emitted
/// in refresh order, but a handler observing two events concurrently
/// must do its own serialization.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn on_update(&self, event: Event);
}
