//! In-memory relays and record factories to support testing.
//!
//! A [`MemoryConnector`] stands in for the websocket transport: it serves
//! [`Connection`]s to in-process [`MemoryRelay`]s that store records, replay
//! them to new subscriptions and fan live records out to every matching
//! subscriber, mimicking the externally observable behavior of a real relay.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::future;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use url::Url;

use crate::{
    defaults::WIRE_CHANNEL_CAP,
    keys::{Keypair, Signer},
    listing::{build_tags, ListingFields, Price},
    proto::{ClientFrame, DraftRecord, Filter, Record, RecordKind, RelayFrame},
    transport::{Connection, Connector, DialError},
};

#[derive(Debug, Clone)]
enum Endpoint {
    Relay(Arc<MemoryRelay>),
    /// Dials fail immediately.
    Unreachable,
    /// Dials hang forever.
    Stalled,
    /// Dials fail after the given delay.
    UnreachableAfter(Duration),
    /// The first dial fails immediately, later dials hang forever.
    FailThenStall(Arc<AtomicBool>),
}

/// A connector serving an in-memory relay network.
///
/// Clones share the network, so a test can hold one clone to reconfigure
/// endpoints while the pool dials through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    endpoints: Arc<Mutex<HashMap<String, Endpoint>>>,
}

impl MemoryConnector {
    /// Adds a working relay at `url` and returns its handle.
    pub fn add_relay(&self, url: &str) -> Arc<MemoryRelay> {
        let relay = Arc::new(MemoryRelay::default());
        self.endpoints
            .lock()
            .insert(normalize(url), Endpoint::Relay(relay.clone()));
        relay
    }

    /// Adds an address whose dials fail immediately.
    pub fn add_unreachable(&self, url: &str) {
        self.endpoints
            .lock()
            .insert(normalize(url), Endpoint::Unreachable);
    }

    /// Adds an address whose dials never complete.
    pub fn add_stalled(&self, url: &str) {
        self.endpoints
            .lock()
            .insert(normalize(url), Endpoint::Stalled);
    }

    /// Adds an address whose dials fail after `delay`.
    pub fn add_unreachable_after(&self, url: &str, delay: Duration) {
        self.endpoints
            .lock()
            .insert(normalize(url), Endpoint::UnreachableAfter(delay));
    }

    /// Adds an address whose first dial fails immediately and whose later
    /// dials never complete.
    pub fn add_fail_then_stall(&self, url: &str) {
        self.endpoints.lock().insert(
            normalize(url),
            Endpoint::FailThenStall(Arc::new(AtomicBool::new(false))),
        );
    }

    /// Removes the endpoint at `url`; later dials fail immediately.
    /// Existing connections stay up until the relay drops them.
    pub fn remove_relay(&self, url: &str) {
        self.endpoints.lock().remove(&normalize(url));
    }
}

/// `Url` serializes with a trailing slash on an empty path; store keys in
/// that form so string and `Url` callers agree.
fn normalize(url: &str) -> String {
    Url::parse(url).expect("valid url").to_string()
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn dial(&self, url: &Url) -> Result<Connection, DialError> {
        let endpoint = self.endpoints.lock().get(&url.to_string()).cloned();
        match endpoint {
            Some(Endpoint::Relay(relay)) => Ok(relay.accept()),
            Some(Endpoint::Stalled) => future::pending().await,
            Some(Endpoint::UnreachableAfter(delay)) => {
                tokio::time::sleep(delay).await;
                Err(DialError::Unreachable(url.to_string()))
            }
            Some(Endpoint::FailThenStall(tried)) => {
                if tried.swap(true, Ordering::Relaxed) {
                    future::pending().await
                } else {
                    Err(DialError::Unreachable(url.to_string()))
                }
            }
            Some(Endpoint::Unreachable) | None => {
                Err(DialError::Unreachable(url.to_string()))
            }
        }
    }
}

/// One in-memory relay: a record store plus its connected clients.
#[derive(Debug, Default)]
pub struct MemoryRelay {
    state: Mutex<RelayState>,
    next_client: AtomicU64,
    paused: AtomicBool,
    resumed: Notify,
}

#[derive(Debug, Default)]
struct RelayState {
    records: Vec<Record>,
    clients: HashMap<u64, ClientConn>,
}

#[derive(Debug)]
struct ClientConn {
    tx: mpsc::Sender<RelayFrame>,
    subs: HashMap<String, Filter>,
}

impl MemoryRelay {
    /// Stores a record server-side and fans it out to matching
    /// subscriptions, as if another client had published it.
    pub fn inject(&self, record: Record) {
        let mut state = self.state.lock();
        state.records.push(record.clone());
        fan_out(&state, &record);
    }

    /// Drops every client connection. Sessions observe a disconnect and
    /// start their reconnect loop.
    pub fn disconnect_all(&self) {
        self.state.lock().clients.clear();
    }

    /// Snapshot of all records the relay has stored.
    pub fn records(&self) -> Vec<Record> {
        self.state.lock().records.clone()
    }

    /// Stops serving client frames. Connections stay up; frames queue in the
    /// transport until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    /// Resumes serving client frames after a [`pause`](Self::pause).
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.resumed.notify_waiters();
    }

    async fn serving(&self) {
        while self.paused.load(Ordering::Relaxed) {
            let resumed = self.resumed.notified();
            if !self.paused.load(Ordering::Relaxed) {
                return;
            }
            resumed.await;
        }
    }

    fn accept(self: &Arc<Self>) -> Connection {
        let (outbound, outbound_rx) = mpsc::channel(WIRE_CHANNEL_CAP);
        let (inbound_tx, inbound) = mpsc::channel(WIRE_CHANNEL_CAP);
        let client_id = self.next_client.fetch_add(1, Ordering::Relaxed);
        self.state.lock().clients.insert(
            client_id,
            ClientConn {
                tx: inbound_tx,
                subs: HashMap::new(),
            },
        );
        let relay = self.clone();
        tokio::spawn(async move {
            let mut frames = outbound_rx;
            while let Some(frame) = frames.recv().await {
                relay.serving().await;
                relay.handle(client_id, frame);
            }
            relay.state.lock().clients.remove(&client_id);
        });
        Connection { outbound, inbound }
    }

    fn handle(&self, client_id: u64, frame: ClientFrame) {
        let mut state = self.state.lock();
        match frame {
            ClientFrame::Req { sub_id, filter } => {
                let stored: Vec<Record> = state
                    .records
                    .iter()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect();
                if let Some(client) = state.clients.get_mut(&client_id) {
                    for record in stored {
                        let _ = client.tx.try_send(RelayFrame::Event {
                            sub_id: sub_id.clone(),
                            record,
                        });
                    }
                    let _ = client.tx.try_send(RelayFrame::Eose {
                        sub_id: sub_id.clone(),
                    });
                    client.subs.insert(sub_id, filter);
                }
            }
            ClientFrame::Close { sub_id } => {
                if let Some(client) = state.clients.get_mut(&client_id) {
                    client.subs.remove(&sub_id);
                }
            }
            ClientFrame::Publish { record } => {
                state.records.push(record.clone());
                if let Some(client) = state.clients.get(&client_id) {
                    let _ = client.tx.try_send(RelayFrame::Ok {
                        record_id: record.id.clone(),
                        accepted: true,
                        message: String::new(),
                    });
                }
                // The publisher's own subscriptions receive the echo too.
                fan_out(&state, &record);
            }
        }
    }
}

fn fan_out(state: &RelayState, record: &Record) {
    for client in state.clients.values() {
        for (sub_id, filter) in &client.subs {
            if filter.matches(record) {
                let _ = client.tx.try_send(RelayFrame::Event {
                    sub_id: sub_id.clone(),
                    record: record.clone(),
                });
            }
        }
    }
}

/// A signed catalog listing record under a throwaway identity.
pub fn signed_listing(identity: &str, title: &str, amount: &str, created_at: u64) -> Record {
    let fields = ListingFields::new(title, Price::new(amount, "USD"));
    let draft = DraftRecord {
        kind: RecordKind::CatalogListing,
        created_at,
        tags: build_tags(identity, &fields),
        content: String::new(),
    };
    Keypair::generate().sign(draft).expect("keypair signing")
}

/// A signed retraction record for a catalog listing identity.
pub fn signed_retraction(identity: &str, created_at: u64) -> Record {
    let draft = DraftRecord {
        kind: RecordKind::Retraction,
        created_at,
        tags: vec![
            vec!["e".into(), identity.into()],
            vec!["k".into(), crate::proto::CATALOG_LISTING_KIND.to_string()],
        ],
        content: String::new(),
    };
    Keypair::generate().sign(draft).expect("keypair signing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relay_replays_stored_records_to_new_subscriptions() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");
        relay.inject(signed_listing("widget-1", "Widget", "9.99", 100));

        let mut conn = network
            .dial(&Url::parse("wss://a.test").unwrap())
            .await
            .unwrap();
        conn.outbound
            .send(ClientFrame::Req {
                sub_id: "1".into(),
                filter: Filter::kinds([RecordKind::CatalogListing]),
            })
            .await
            .unwrap();

        let first = conn.inbound.recv().await.unwrap();
        assert!(matches!(first, RelayFrame::Event { .. }));
        let second = conn.inbound.recv().await.unwrap();
        assert!(matches!(second, RelayFrame::Eose { .. }));
    }

    #[tokio::test]
    async fn publish_is_acknowledged_and_stored() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");

        let mut conn = network
            .dial(&Url::parse("wss://a.test").unwrap())
            .await
            .unwrap();
        let record = signed_listing("widget-1", "Widget", "9.99", 100);
        conn.outbound
            .send(ClientFrame::Publish {
                record: record.clone(),
            })
            .await
            .unwrap();

        let ack = conn.inbound.recv().await.unwrap();
        assert_eq!(
            ack,
            RelayFrame::Ok {
                record_id: record.id.clone(),
                accepted: true,
                message: String::new(),
            }
        );
        assert_eq!(relay.records(), vec![record]);
    }

    #[tokio::test]
    async fn unknown_address_is_unreachable() {
        let network = MemoryConnector::default();
        let err = network
            .dial(&Url::parse("wss://nowhere.test").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DialError::Unreachable(_)));
    }
}
