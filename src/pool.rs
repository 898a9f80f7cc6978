//! The relay connection pool.
//!
//! A [`RelayPool`] owns one session task per configured relay address. Each
//! session dials through the [`Connector`] capability, reports its state
//! transitions to a monitor task and reconnects with exponential backoff
//! after a failure. [`RelayPool::init`] resolves once a quorum of one relay
//! is connected, fails once every relay has failed at least once without any
//! connecting, or times out; concurrent callers share a single in-flight
//! attempt and the
//! outcome is memoized for the life of the pool.
//!
//! Readiness is latched: relays dropping after the pool became ready never
//! demote it. Consumers of a [`PoolHandle`] must tolerate partial
//! availability.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{mpsc, mpsc::error::TrySendError, watch, OnceCell},
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
    defaults::{
        DEFAULT_RELAYS, INIT_TIMEOUT, PUBLISH_ENQUEUE_TIMEOUT, RECONNECT_DELAY_INITIAL,
        RECONNECT_DELAY_MAX, SESSION_COMMANDS_CAP,
    },
    proto::{ClientFrame, Filter, Record, RelayFrame},
    subscription::{RecordStream, SubGuard},
    transport::{Connection, Connector, WsConnector},
};

/// Configuration for a [`RelayPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Relay addresses to hold sessions with.
    pub relays: Vec<Url>,
    /// How long [`RelayPool::init`] waits for the first connection.
    pub init_timeout: Duration,
}

impl PoolConfig {
    /// Configuration for the given relay addresses with the default timeout.
    pub fn new(relays: Vec<Url>) -> Self {
        Self {
            relays,
            init_timeout: INIT_TIMEOUT,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let relays = DEFAULT_RELAYS
            .iter()
            .map(|url| Url::parse(url).expect("valid default relay url"))
            .collect();
        Self::new(relays)
    }
}

/// Connection state of one relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected; the session may be backing off before a retry.
    Disconnected,
    /// Dial in progress.
    Connecting,
    /// Live connection.
    Connected,
}

/// Aggregated connection counts over all sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStatus {
    /// Number of configured relays.
    pub total: usize,
    /// Sessions currently connected.
    pub connected: usize,
    /// Sessions currently disconnected.
    pub disconnected: usize,
    /// Sessions that have disconnected at least once since the pool started.
    pub failed: usize,
}

/// Failure to initialize the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// The pool was configured with no relay addresses.
    #[error("no relay addresses configured")]
    NoRelays,
    /// No relay connected within the configured timeout.
    #[error("no relay connected within {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },
    /// Every relay disconnected before any reached a connection.
    #[error("all {relays} relays disconnected before any connected")]
    AllRelaysFailed {
        /// Number of relays that failed.
        relays: usize,
    },
}

/// Failure to hand a record to the pool for publishing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// No connected relay accepted the record for sending.
    #[error("no connected relay accepted the record")]
    NoRelayAvailable,
}

/// Registry of active subscriptions, shared between sessions and streams.
#[derive(Default)]
pub(crate) struct SubRegistry {
    pub(crate) entries: HashMap<u64, SubEntry>,
}

pub(crate) struct SubEntry {
    pub(crate) filter: Filter,
    pub(crate) tx: mpsc::UnboundedSender<Record>,
}

/// The context object holding relay sessions and the initialization guard.
///
/// Construct once at process start and pass by handle; cloning is cheap.
#[derive(Clone)]
pub struct RelayPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    config: PoolConfig,
    connector: Arc<dyn Connector>,
    runtime: Mutex<Option<Arc<PoolRuntime>>>,
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.cancel.cancel();
        }
    }
}

impl fmt::Debug for RelayPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayPool")
            .field("relays", &self.shared.config.relays.len())
            .finish_non_exhaustive()
    }
}

impl RelayPool {
    /// Pool over the websocket transport.
    pub fn new(config: PoolConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    /// Pool over a custom transport, used by tests and embedders.
    pub fn with_connector(config: PoolConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                config,
                connector,
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Initializes the pool and waits until it is ready.
    ///
    /// Ready means at least one relay session is connected. The first call
    /// spawns the sessions; concurrent callers await the same in-flight
    /// attempt, and once resolved the outcome is memoized, so later calls
    /// return immediately.
    pub async fn init(&self) -> Result<PoolHandle, InitError> {
        if self.shared.config.relays.is_empty() {
            return Err(InitError::NoRelays);
        }
        let runtime = self.runtime_or_spawn();
        let outcome = runtime
            .ready
            .get_or_init(|| {
                wait_ready(runtime.clone(), self.shared.config.init_timeout)
            })
            .await;
        outcome.clone()?;
        Ok(PoolHandle { runtime })
    }

    /// Tears down all sessions and forgets the initialization outcome.
    ///
    /// Mainly for test isolation; the next [`init`](Self::init) starts over.
    pub fn reset(&self) {
        if let Some(runtime) = self.shared.runtime.lock().take() {
            runtime.cancel.cancel();
        }
    }

    fn runtime_or_spawn(&self) -> Arc<PoolRuntime> {
        let mut guard = self.shared.runtime.lock();
        if let Some(runtime) = guard.as_ref() {
            return runtime.clone();
        }
        let runtime = PoolRuntime::spawn(&self.shared.config, self.shared.connector.clone());
        *guard = Some(runtime.clone());
        runtime
    }
}

async fn wait_ready(runtime: Arc<PoolRuntime>, init_timeout: Duration) -> Result<(), InitError> {
    let mut status_rx = runtime.status_rx.clone();
    let wait = async {
        loop {
            let status = *status_rx.borrow_and_update();
            if status.connected > 0 {
                info!(
                    connected = status.connected,
                    total = status.total,
                    "relay pool ready"
                );
                return Ok(());
            }
            // Backoff staggers the sessions, so a momentary disconnect count
            // can miss the all-failed instant; the latched count cannot.
            if status.failed == status.total {
                return Err(InitError::AllRelaysFailed {
                    relays: status.total,
                });
            }
            if status_rx.changed().await.is_err() {
                return Err(InitError::AllRelaysFailed {
                    relays: status.total,
                });
            }
        }
    };
    let outcome = match tokio::time::timeout(init_timeout, wait).await {
        Ok(outcome) => outcome,
        Err(_) => Err(InitError::Timeout { after: init_timeout }),
    };
    if let Err(err) = &outcome {
        warn!("relay pool initialization failed: {err}");
        // Terminal failure; stop the sessions from retrying in the dark.
        runtime.cancel.cancel();
    }
    outcome
}

/// Handle to a pool that passed initialization.
///
/// The handle is read-only with respect to pool internals: it can submit
/// publishes and open subscriptions but never mutates session state.
#[derive(Clone)]
pub struct PoolHandle {
    pub(crate) runtime: Arc<PoolRuntime>,
}

impl fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolHandle")
            .field("status", &self.status())
            .finish()
    }
}

impl PoolHandle {
    /// Current aggregated connection counts.
    pub fn status(&self) -> PoolStatus {
        *self.runtime.status_rx.borrow()
    }

    /// Opens a live subscription for records matching the filter.
    ///
    /// The stream is unbounded and never completes on its own; it is merged
    /// over all currently and future connected relays, de-duplicated by
    /// record id, and closed by dropping it.
    pub fn subscribe(&self, filter: Filter) -> RecordStream {
        let id = self.runtime.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.runtime
            .subs
            .write()
            .entries
            .insert(id, SubEntry { filter, tx });
        self.runtime.subs_version.send_modify(|version| *version += 1);
        debug!(sub_id = id, "subscription opened");
        RecordStream::new(
            rx,
            SubGuard {
                id,
                subs: Arc::downgrade(&self.runtime.subs),
                version: Arc::downgrade(&self.runtime.subs_version),
            },
        )
    }

    /// Hands a signed record to every connected session for sending.
    ///
    /// Returns the number of sessions that accepted the record, or an error
    /// if none did. Acceptance means queued for sending, not externally
    /// confirmed. A backlogged session is given a bounded wait to drain
    /// before it is skipped, so a transient queue spike does not fail the
    /// publish.
    pub async fn publish(&self, record: &Record) -> Result<usize, PublishError> {
        let mut accepted = 0;
        for session in &self.runtime.sessions {
            if *session.state.borrow() != SessionState::Connected {
                continue;
            }
            let frame = ClientFrame::Publish {
                record: record.clone(),
            };
            match session.commands.try_send(frame) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(frame)) => {
                    match time::timeout(PUBLISH_ENQUEUE_TIMEOUT, session.commands.send(frame))
                        .await
                    {
                        Ok(Ok(())) => accepted += 1,
                        Ok(Err(_)) | Err(_) => {
                            warn!(url = %session.url, "backlogged session did not accept record")
                        }
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    trace!(url = %session.url, "session command queue closed")
                }
            }
        }
        if accepted == 0 {
            return Err(PublishError::NoRelayAvailable);
        }
        debug!(record_id = %record.id, relays = accepted, "record queued for publish");
        Ok(accepted)
    }
}

pub(crate) struct PoolRuntime {
    sessions: Vec<SessionHandle>,
    status_rx: watch::Receiver<PoolStatus>,
    pub(crate) subs: Arc<RwLock<SubRegistry>>,
    subs_version: Arc<watch::Sender<u64>>,
    ready: OnceCell<Result<(), InitError>>,
    cancel: CancellationToken,
    next_sub_id: AtomicU64,
}

struct SessionHandle {
    url: Url,
    commands: mpsc::Sender<ClientFrame>,
    state: watch::Receiver<SessionState>,
}

impl PoolRuntime {
    fn spawn(config: &PoolConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let total = config.relays.len();
        let cancel = CancellationToken::new();
        let subs = Arc::new(RwLock::new(SubRegistry::default()));
        let (subs_version, _) = watch::channel(0u64);
        let subs_version = Arc::new(subs_version);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(PoolStatus {
            total,
            connected: 0,
            disconnected: 0,
            failed: 0,
        });

        tokio::spawn(monitor(
            config.relays.clone(),
            events_rx,
            status_tx,
            cancel.clone(),
        ));

        let mut sessions = Vec::with_capacity(total);
        for (idx, url) in config.relays.iter().enumerate() {
            let (commands_tx, commands_rx) = mpsc::channel(SESSION_COMMANDS_CAP);
            let (state_tx, state_rx) = watch::channel(SessionState::Connecting);
            let task = SessionTask {
                idx,
                url: url.clone(),
                connector: connector.clone(),
                commands: commands_rx,
                state: state_tx,
                events: events_tx.clone(),
                subs: subs.clone(),
                subs_version: subs_version.subscribe(),
                cancel: cancel.clone(),
            };
            tokio::spawn(task.run());
            sessions.push(SessionHandle {
                url: url.clone(),
                commands: commands_tx,
                state: state_rx,
            });
        }

        Arc::new(PoolRuntime {
            sessions,
            status_rx,
            subs,
            subs_version,
            ready: OnceCell::new(),
            cancel,
            next_sub_id: AtomicU64::new(1),
        })
    }
}

/// Folds session state events into the aggregated pool status.
async fn monitor(
    urls: Vec<Url>,
    mut events: mpsc::UnboundedReceiver<(usize, SessionState)>,
    status_tx: watch::Sender<PoolStatus>,
    cancel: CancellationToken,
) {
    let total = urls.len();
    let mut states = vec![SessionState::Connecting; total];
    let mut failed = vec![false; total];
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            event = events.recv() => event,
        };
        let Some((idx, state)) = event else { return };
        match state {
            SessionState::Connected => info!(url = %urls[idx], "relay connected"),
            SessionState::Disconnected => warn!(url = %urls[idx], "relay disconnected"),
            SessionState::Connecting => debug!(url = %urls[idx], "relay connecting"),
        }
        states[idx] = state;
        if state == SessionState::Disconnected {
            failed[idx] = true;
        }
        let status = PoolStatus {
            total,
            connected: states
                .iter()
                .filter(|s| **s == SessionState::Connected)
                .count(),
            disconnected: states
                .iter()
                .filter(|s| **s == SessionState::Disconnected)
                .count(),
            failed: failed.iter().filter(|f| **f).count(),
        };
        status_tx.send_replace(status);
    }
}

struct SessionTask {
    idx: usize,
    url: Url,
    connector: Arc<dyn Connector>,
    commands: mpsc::Receiver<ClientFrame>,
    state: watch::Sender<SessionState>,
    events: mpsc::UnboundedSender<(usize, SessionState)>,
    subs: Arc<RwLock<SubRegistry>>,
    subs_version: watch::Receiver<u64>,
    cancel: CancellationToken,
}

impl SessionTask {
    async fn run(mut self) {
        let mut delay = RECONNECT_DELAY_INITIAL;
        loop {
            self.set_state(SessionState::Connecting);
            let dialed = tokio::select! {
                _ = self.cancel.cancelled() => return,
                dialed = self.connector.dial(&self.url) => dialed,
            };
            let conn = match dialed {
                Ok(conn) => conn,
                Err(err) => {
                    debug!(url = %self.url, "dial failed: {err}");
                    self.set_state(SessionState::Disconnected);
                    if !self.backoff(&mut delay).await {
                        return;
                    }
                    continue;
                }
            };

            delay = RECONNECT_DELAY_INITIAL;
            self.set_state(SessionState::Connected);
            self.connected(conn).await;
            if self.cancel.is_cancelled() {
                return;
            }
            self.set_state(SessionState::Disconnected);
            if !self.backoff(&mut delay).await {
                return;
            }
        }
    }

    /// Sleeps the current backoff delay; false means the pool shut down.
    async fn backoff(&self, delay: &mut Duration) -> bool {
        let sleep = tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(*delay) => true,
        };
        *delay = (*delay * 2).min(RECONNECT_DELAY_MAX);
        sleep
    }

    /// Runs one established connection until it drops or the pool shuts down.
    async fn connected(&mut self, mut conn: Connection) {
        let mut synced = HashSet::new();
        // Replay the active subscriptions so a late-connecting relay serves
        // the same record feed as the rest of the pool.
        if !self.sync_subscriptions(&mut conn, &mut synced).await {
            return;
        }
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                frame = conn.inbound.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => return,
                },
                command = self.commands.recv() => match command {
                    Some(frame) => {
                        if conn.outbound.send(frame).await.is_err() {
                            return;
                        }
                    }
                    None => return,
                },
                changed = self.subs_version.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    if !self.sync_subscriptions(&mut conn, &mut synced).await {
                        return;
                    }
                }
            }
        }
    }

    /// Brings the relay's subscription set in line with the registry.
    async fn sync_subscriptions(
        &self,
        conn: &mut Connection,
        synced: &mut HashSet<u64>,
    ) -> bool {
        let (opened, closed) = {
            let registry = self.subs.read();
            let opened: Vec<(u64, Filter)> = registry
                .entries
                .iter()
                .filter(|(id, _)| !synced.contains(id))
                .map(|(id, entry)| (*id, entry.filter.clone()))
                .collect();
            let closed: Vec<u64> = synced
                .iter()
                .copied()
                .filter(|id| !registry.entries.contains_key(id))
                .collect();
            (opened, closed)
        };
        for id in closed {
            synced.remove(&id);
            let frame = ClientFrame::Close {
                sub_id: id.to_string(),
            };
            if conn.outbound.send(frame).await.is_err() {
                return false;
            }
        }
        for (id, filter) in opened {
            let frame = ClientFrame::Req {
                sub_id: id.to_string(),
                filter,
            };
            if conn.outbound.send(frame).await.is_err() {
                return false;
            }
            synced.insert(id);
        }
        true
    }

    fn handle_frame(&self, frame: RelayFrame) {
        match frame {
            RelayFrame::Event { sub_id, record } => {
                let registry = self.subs.read();
                let entry = sub_id
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| registry.entries.get(&id));
                match entry {
                    Some(entry) if entry.filter.matches(&record) => {
                        let _ = entry.tx.send(record);
                    }
                    Some(_) => {
                        trace!(url = %self.url, %sub_id, "record outside subscription filter")
                    }
                    None => trace!(url = %self.url, %sub_id, "record for unknown subscription"),
                }
            }
            RelayFrame::Ok {
                record_id,
                accepted,
                message,
            } => {
                if accepted {
                    trace!(url = %self.url, %record_id, "record accepted");
                } else {
                    warn!(url = %self.url, %record_id, "relay rejected record: {message}");
                }
            }
            RelayFrame::Eose { sub_id } => {
                trace!(url = %self.url, %sub_id, "end of stored records")
            }
            RelayFrame::Notice { message } => debug!(url = %self.url, "relay notice: {message}"),
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state.send_replace(state);
        let _ = self.events.send((self.idx, state));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MemoryConnector;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("valid url")
    }

    fn config(relays: &[&str]) -> PoolConfig {
        PoolConfig {
            relays: relays.iter().map(|r| url(r)).collect(),
            init_timeout: Duration::from_secs(10),
        }
    }

    async fn wait_for<F: Fn(PoolStatus) -> bool>(handle: &PoolHandle, pred: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if pred(handle.status()) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status condition not reached");
    }

    #[tokio::test]
    async fn ready_once_one_relay_connects() {
        let network = MemoryConnector::default();
        network.add_relay("wss://a.test");
        network.add_unreachable("wss://b.test");

        let pool = RelayPool::with_connector(
            config(&["wss://a.test/", "wss://b.test/"]),
            Arc::new(network),
        );
        let handle = pool.init().await.expect("quorum of one");
        assert!(handle.status().connected >= 1);
    }

    #[tokio::test]
    async fn all_relays_failing_rejects_before_timeout() {
        let network = MemoryConnector::default();
        network.add_unreachable("wss://a.test");
        network.add_unreachable("wss://b.test");

        let pool = RelayPool::with_connector(
            config(&["wss://a.test/", "wss://b.test/"]),
            Arc::new(network),
        );
        let err = pool.init().await.expect_err("no relay can connect");
        assert_eq!(err, InitError::AllRelaysFailed { relays: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn no_connection_in_time_rejects_with_timeout() {
        let network = MemoryConnector::default();
        network.add_stalled("wss://a.test");

        let pool = RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network));
        let err = pool.init().await.expect_err("nothing ever connects");
        assert_eq!(
            err,
            InitError::Timeout {
                after: Duration::from_secs(10)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_failures_reject_with_all_failed() {
        let network = MemoryConnector::default();
        // a fails once and stalls in its retry; b fails while a is mid-dial,
        // so at no instant are both sessions disconnected together.
        network.add_fail_then_stall("wss://a.test");
        network.add_unreachable_after("wss://b.test", Duration::from_secs(1));

        let pool = RelayPool::with_connector(
            config(&["wss://a.test/", "wss://b.test/"]),
            Arc::new(network),
        );
        let err = pool.init().await.expect_err("every relay failed once");
        assert_eq!(err, InitError::AllRelaysFailed { relays: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn publish_waits_out_a_backlogged_session() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");

        let pool = RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network));
        let handle = pool.init().await.expect("ready");
        wait_for(&handle, |status| status.connected == 1).await;

        // Saturate every queue between the pool and the relay.
        relay.pause();
        let record = crate::testing::signed_listing("widget-1", "Widget", "9.99", 100);
        while handle.publish(&record).await.is_ok() {}

        // A publish issued while the backlog drains is accepted, not dropped.
        let (published, ()) = tokio::join!(handle.publish(&record), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            relay.resume();
        });
        published.expect("accepted once the session drained");
    }

    #[tokio::test]
    async fn empty_relay_list_is_rejected() {
        let pool = RelayPool::with_connector(config(&[]), Arc::new(MemoryConnector::default()));
        assert_eq!(pool.init().await.unwrap_err(), InitError::NoRelays);
    }

    #[tokio::test]
    async fn concurrent_initialization_shares_one_attempt() {
        let network = MemoryConnector::default();
        network.add_relay("wss://a.test");

        let pool = RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network));
        let (first, second) = tokio::join!(pool.init(), pool.init());
        let first = first.expect("ready");
        let second = second.expect("ready");
        assert!(Arc::ptr_eq(&first.runtime, &second.runtime));
    }

    #[tokio::test]
    async fn readiness_is_latched_after_disconnects() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");

        let pool =
            RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network.clone()));
        let handle = pool.init().await.expect("ready");
        wait_for(&handle, |status| status.connected == 1).await;

        network.remove_relay("wss://a.test");
        relay.disconnect_all();
        wait_for(&handle, |status| status.connected == 0).await;

        // A ready pool stays usable; init keeps resolving immediately.
        pool.init().await.expect("still ready");
    }

    #[tokio::test]
    async fn publish_without_connected_relay_fails() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");

        let pool =
            RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network.clone()));
        let handle = pool.init().await.expect("ready");
        wait_for(&handle, |status| status.connected == 1).await;

        network.remove_relay("wss://a.test");
        relay.disconnect_all();
        wait_for(&handle, |status| status.connected == 0).await;

        let record = crate::testing::signed_listing("widget-1", "Widget", "9.99", 100);
        assert_eq!(
            handle.publish(&record).await.unwrap_err(),
            PublishError::NoRelayAvailable
        );
    }

    #[tokio::test]
    async fn reset_forgets_the_initialization_outcome() {
        let network = MemoryConnector::default();
        network.add_unreachable("wss://a.test");

        let pool =
            RelayPool::with_connector(config(&["wss://a.test/"]), Arc::new(network.clone()));
        pool.init().await.expect_err("unreachable");

        network.remove_relay("wss://a.test");
        network.add_relay("wss://a.test");
        pool.reset();
        pool.init().await.expect("fresh attempt succeeds");
    }
}
