//! Default values used by the relay pool and the catalog store.

use std::time::Duration;

/// Relay addresses used when the caller does not supply an explicit pool.
pub const DEFAULT_RELAYS: [&str; 3] = [
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.nostr.band",
];

/// How long [`RelayPool::init`] waits for the first relay to connect.
///
/// [`RelayPool::init`]: crate::pool::RelayPool::init
pub const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single websocket dial attempt.
pub(crate) const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// First reconnect delay after a session loses its connection.
///
/// Doubles per attempt up to [`RECONNECT_DELAY_MAX`].
pub(crate) const RECONNECT_DELAY_INITIAL: Duration = Duration::from_millis(500);

/// Upper bound for the reconnect backoff.
pub(crate) const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(30);

/// Capacity of the per-session command channel (publishes and REQ replays).
pub(crate) const SESSION_COMMANDS_CAP: usize = 64;

/// How long a publish waits for a backlogged session to accept the frame.
pub(crate) const PUBLISH_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

/// Capacity of the channels bridging a transport connection.
pub(crate) const WIRE_CHANNEL_CAP: usize = 256;

/// Capacity of the store's projection-change broadcast channel.
pub(crate) const STORE_EVENTS_CAP: usize = 128;
