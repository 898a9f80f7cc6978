//! Decentralized catalog synchronization over relay servers.
//!
//! The crate keeps a local catalog of product listings in sync with a set of
//! relay servers that store and forward signed records. It has four layers:
//!
//! * [`proto`]: signed records, subscription filters and the JSON frames
//!   exchanged with relays.
//! * [`pool`]: a [`RelayPool`](pool::RelayPool) holding one reconnecting
//!   session per relay, ready once a single relay is connected.
//! * [`subscription`]: merged, de-duplicated record streams over the pool.
//! * [`store`]: the [`CatalogStore`](store::CatalogStore), a last-writer-wins
//!   projection of the catalog with optimistic create, update and delete.
//!
//! Records are signed by a [`Signer`](keys::Signer) and validated by a
//! [`Validator`](listing::Validator) before they are published or folded into
//! the projection. The transport behind the pool is a capability, so tests
//! run against the in-memory relays in [`testing`] while production uses the
//! websocket [`WsConnector`](transport::WsConnector).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use catalog_sync::{
//!     keys::Keypair,
//!     listing::{ListingFields, Price},
//!     pool::{PoolConfig, RelayPool},
//!     store::CatalogStore,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = RelayPool::new(PoolConfig::default());
//! let store = CatalogStore::new(pool, Arc::new(Keypair::generate()));
//! store.fetch().await?;
//! let id = store
//!     .create(ListingFields::new("Widget", Price::new("9.99", "USD")))
//!     .await?;
//! println!("published {id}: {} listings", store.snapshot().len());
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod defaults;
pub mod keys;
pub mod listing;
pub mod pool;
pub mod proto;
pub mod store;
pub mod subscription;
pub mod testing;
pub mod transport;

pub use self::{
    keys::{Keypair, NoSigner, Signer},
    listing::{CatalogListing, ListingFields, ListingPatch},
    pool::{InitError, PoolConfig, PoolHandle, PoolStatus, RelayPool},
    proto::{Filter, Record, RecordKind},
    store::{CatalogStore, LoadingState, StoreError, StoreEvent},
    subscription::RecordStream,
};
