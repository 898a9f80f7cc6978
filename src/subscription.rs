//! Live record streams over a ready pool.

use std::{
    collections::HashSet,
    pin::Pin,
    sync::Weak,
    task::{Context, Poll},
};

use futures_util::Stream;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{pool::SubRegistry, proto::Record};

/// A live, unbounded stream of records from all connected relays.
///
/// Records are merged across relays with no ordering guarantee; the
/// timestamps inside records are authoritative for ordering decisions.
/// A record already yielded once (by exact content identity) is suppressed
/// when another relay delivers it again, for the lifetime of the stream.
///
/// The stream never completes on its own. Dropping it cancels the
/// subscription on every relay.
#[derive(Debug)]
pub struct RecordStream {
    rx: mpsc::UnboundedReceiver<Record>,
    seen: HashSet<String>,
    _guard: SubGuard,
}

impl RecordStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Record>, guard: SubGuard) -> Self {
        Self {
            rx,
            seen: HashSet::new(),
            _guard: guard,
        }
    }

    /// Cancels the subscription. Equivalent to dropping the stream.
    pub fn cancel(self) {}
}

impl Stream for RecordStream {
    type Item = Record;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(record)) => {
                    if self.seen.insert(record.id.clone()) {
                        return Poll::Ready(Some(record));
                    }
                    // Redelivery from another relay; keep polling.
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Removes the subscription from the pool registry when the stream goes.
#[derive(Debug)]
pub(crate) struct SubGuard {
    pub(crate) id: u64,
    pub(crate) subs: Weak<RwLock<SubRegistry>>,
    pub(crate) version: Weak<watch::Sender<u64>>,
}

impl Drop for SubGuard {
    fn drop(&mut self) {
        if let Some(subs) = self.subs.upgrade() {
            subs.write().entries.remove(&self.id);
        }
        if let Some(version) = self.version.upgrade() {
            version.send_modify(|v| *v += 1);
        }
        debug!(sub_id = self.id, "subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use futures_util::StreamExt;

    use crate::{
        pool::{PoolConfig, RelayPool},
        proto::{Filter, RecordKind},
        testing::{signed_listing, MemoryConnector},
    };

    async fn next_with_timeout(
        stream: &mut crate::subscription::RecordStream,
    ) -> Option<crate::proto::Record> {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("stream produced nothing in time")
    }

    #[tokio::test]
    async fn merges_and_deduplicates_across_relays() {
        let network = MemoryConnector::default();
        let relay_a = network.add_relay("wss://a.test");
        let relay_b = network.add_relay("wss://b.test");

        let pool = RelayPool::with_connector(
            PoolConfig::new(vec![
                url::Url::parse("wss://a.test").unwrap(),
                url::Url::parse("wss://b.test").unwrap(),
            ]),
            Arc::new(network),
        );
        let handle = pool.init().await.unwrap();
        let mut stream = handle.subscribe(Filter::kinds([RecordKind::CatalogListing]));

        // The same record arriving from both relays is delivered once.
        let record = signed_listing("widget-1", "Widget", "9.99", 100);
        relay_a.inject(record.clone());
        relay_b.inject(record.clone());
        let other = signed_listing("widget-2", "Gadget", "19.99", 101);
        relay_b.inject(other.clone());

        let first = next_with_timeout(&mut stream).await.unwrap();
        let second = next_with_timeout(&mut stream).await.unwrap();
        assert_eq!(first.id, record.id);
        assert_eq!(second.id, other.id);
    }

    #[tokio::test]
    async fn filters_by_kind() {
        let network = MemoryConnector::default();
        let relay = network.add_relay("wss://a.test");

        let pool = RelayPool::with_connector(
            PoolConfig::new(vec![url::Url::parse("wss://a.test").unwrap()]),
            Arc::new(network),
        );
        let handle = pool.init().await.unwrap();
        let mut stream = handle.subscribe(Filter::kinds([RecordKind::Retraction]));

        relay.inject(signed_listing("widget-1", "Widget", "9.99", 100));
        let retraction = crate::testing::signed_retraction("widget-1", 101);
        relay.inject(retraction.clone());

        // Only the retraction passes the filter.
        let first = next_with_timeout(&mut stream).await.unwrap();
        assert_eq!(first.id, retraction.id);
    }
}
