//! Admin presence feed.
//!
//! Login and logout publish a `PresenceEvent` on a broadcast channel. Each SSE
//! subscriber replays the admins changed since its cursor, then follows the
//! live channel, with a periodic database poll to cover anything the channel
//! dropped (lagging receivers, events from another process).

use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use helpdesk_common::{AdminUser, PresenceEvent};

use crate::server::AppState;

/// Buffered events per live subscriber before it starts lagging
const CHANNEL_CAPACITY: usize = 256;

/// Outgoing SSE frames buffered per connection
const STREAM_BUFFER: usize = 64;

/// Fan-out point for presence changes
#[derive(Clone)]
pub struct PresenceHub {
    tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish to current subscribers; nobody listening is fine
    pub fn publish(&self, event: PresenceEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        debug!("Presence event delivered to {} subscribers", receivers);
    }

    pub fn publish_admin(&self, admin: &AdminUser) {
        self.publish(admin.presence_event());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection dedup and cursor state
#[derive(Debug)]
pub struct PresenceFeed {
    cursor: DateTime<Utc>,
    emitted: HashSet<String>,
}

impl PresenceFeed {
    pub fn new(cursor: DateTime<Utc>) -> Self {
        Self {
            cursor,
            emitted: HashSet::new(),
        }
    }

    /// Start from the `after` query value; anything unparsable means the epoch
    pub fn from_query(after: Option<&str>) -> Self {
        Self::new(parse_cursor(after))
    }

    pub fn cursor(&self) -> DateTime<Utc> {
        self.cursor
    }

    /// True the first time an event id is seen. Advances the cursor.
    pub fn admit(&mut self, event: &PresenceEvent) -> bool {
        if !self.emitted.insert(event.id.clone()) {
            return false;
        }
        if let Some(updated_at) = event.updated_at() {
            if updated_at > self.cursor {
                self.cursor = updated_at;
            }
        }
        true
    }
}

pub fn parse_cursor(after: Option<&str>) -> DateTime<Utc> {
    after
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub type SseItem = Result<Event, Infallible>;

/// Spawn the feed task for one subscriber and hand back its SSE frames.
/// The task ends once the client goes away.
pub fn spawn_feed(state: Arc<AppState>, feed: PresenceFeed) -> ReceiverStream<SseItem> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    // Subscribe before the backlog query so nothing slips between them
    let live = state.presence.subscribe();
    debug!("Presence subscriber joined ({} live)", state.presence.subscriber_count());
    tokio::spawn(run_feed(state, feed, live, tx));
    ReceiverStream::new(rx)
}

async fn run_feed(
    state: Arc<AppState>,
    mut feed: PresenceFeed,
    mut live: broadcast::Receiver<PresenceEvent>,
    tx: mpsc::Sender<SseItem>,
) {
    let connected = Event::default().event("connected").data(r#"{"ok":true}"#);
    if tx.send(Ok(connected)).await.is_err() {
        return;
    }

    let backlog_limit = state.config.presence.backlog_limit;
    if !emit_changed_since(&state, &mut feed, backlog_limit, &tx).await {
        return;
    }

    let poll_every = Duration::from_secs(state.config.presence.poll_secs.max(1));
    let mut poll = tokio::time::interval_at(tokio::time::Instant::now() + poll_every, poll_every);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let poll_limit = state.config.presence.poll_limit;

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(event) => {
                    if !emit(&mut feed, &event, &tx).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Presence subscriber lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = poll.tick() => {
                if !emit_changed_since(&state, &mut feed, poll_limit, &tx).await {
                    break;
                }
            }
            _ = tx.closed() => break,
        }
    }

    debug!("Presence subscriber disconnected");
}

/// Returns false once the client is gone
async fn emit_changed_since(
    state: &AppState,
    feed: &mut PresenceFeed,
    limit: usize,
    tx: &mpsc::Sender<SseItem>,
) -> bool {
    let changed = {
        let store = state.store.lock().await;
        store.admins_updated_after(feed.cursor(), limit)
    };

    match changed {
        Ok(admins) => {
            for admin in admins {
                if !emit(feed, &admin.presence_event(), tx).await {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            // Transient; the next poll retries from the same cursor
            warn!("Presence poll failed: {:#}", e);
            !tx.is_closed()
        }
    }
}

async fn emit(feed: &mut PresenceFeed, event: &PresenceEvent, tx: &mpsc::Sender<SseItem>) -> bool {
    if !feed.admit(event) {
        return true;
    }
    match Event::default().event("presence").json_data(event) {
        Ok(frame) => tx.send(Ok(frame)).await.is_ok(),
        Err(e) => {
            warn!("Failed to encode presence event {}: {}", event.id, e);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(admin: &str, updated_at: DateTime<Utc>) -> PresenceEvent {
        AdminUser {
            id: admin.to_string(),
            username: admin.to_string(),
            name: admin.to_string(),
            password: String::new(),
            active: true,
            is_online: true,
            created_at: updated_at,
            updated_at,
        }
        .presence_event()
    }

    #[test]
    fn test_parse_cursor() {
        assert_eq!(parse_cursor(None), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(parse_cursor(Some("yesterday")), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(
            parse_cursor(Some("2025-01-02T03:04:05Z")),
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(
            parse_cursor(Some("2025-01-02T05:04:05+02:00")),
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
        );
    }

    #[test]
    fn test_feed_dedups_and_advances() {
        let t1 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap();
        let mut feed = PresenceFeed::from_query(None);

        assert!(feed.admit(&event("a", t2)));
        assert_eq!(feed.cursor(), t2);

        assert!(!feed.admit(&event("a", t2)));

        // Older event from another admin still goes out, cursor stays put
        assert!(feed.admit(&event("b", t1)));
        assert_eq!(feed.cursor(), t2);
    }

    #[tokio::test]
    async fn test_hub_fan_out() {
        let hub = PresenceHub::new();
        hub.publish(event("nobody", DateTime::<Utc>::UNIX_EPOCH));

        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let sent = event("rina", Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        hub.publish(sent.clone());

        assert_eq!(a.recv().await.unwrap(), sent);
        assert_eq!(b.recv().await.unwrap(), sent);
    }
}
