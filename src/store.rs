//! The reconciling catalog cache and its mutation pipeline.
//!
//! [`CatalogStore`] owns the local catalog projection: a map from logical
//! identity to the latest valid [`CatalogListing`]. The projection is built
//! by folding the pool's record stream through validation and the
//! replacement rule, and is the target of local create/update/delete intents
//! that are optimistically applied once their publish was accepted for
//! sending.
//!
//! Replacement rule: for a given identity only the record with the greatest
//! creation timestamp is retained; an exact timestamp collision is won by
//! the record processed last. A retraction removes the identity
//! unconditionally and leaves a floor timestamp behind, so stale inbound
//! records cannot resurrect the entry.

use std::{collections::HashMap, sync::Arc};

use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::{
    defaults::STORE_EVENTS_CAP,
    keys::{Signer, SigningError},
    listing::{
        build_tags, CatalogListing, ListingFields, ListingPatch, SchemaValidator, ValidationError,
        Validator,
    },
    pool::{InitError, PublishError, RelayPool},
    proto::{unix_now, DraftRecord, Filter, Record, RecordKind, CATALOG_LISTING_KIND},
};

/// Lifecycle of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    /// No fetch requested yet.
    #[default]
    Idle,
    /// Pool initialization in progress.
    Loading,
    /// Subscription issued; the projection updates continuously. The cache
    /// is usable (possibly empty) in this state.
    Streaming,
    /// Pool initialization failed; sticky until the next fetch.
    Error,
}

/// Notification that the projection changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A listing appeared under a new identity.
    Inserted(String),
    /// The listing for an identity was replaced.
    Updated(String),
    /// The identity was removed.
    Removed(String),
}

/// Failure of a store operation, surfaced per call and via
/// [`CatalogStore::last_error`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The relay pool could not be initialized.
    #[error("relay pool unavailable: {0}")]
    Pool(#[from] InitError),
    /// The candidate listing failed schema validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The outbound record could not be signed.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// The mutation referenced an identity not present in the projection.
    #[error("listing not found: {0}")]
    NotFound(String),
    /// No relay accepted the record for sending.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// The authoritative local projection of the catalog.
#[derive(Debug, Clone)]
pub struct CatalogStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    pool: RelayPool,
    signer: Arc<dyn Signer>,
    validator: Arc<dyn Validator>,
    listings: RwLock<HashMap<String, CatalogListing>>,
    /// Identity -> floor timestamp left behind by a processed retraction.
    /// Inbound listings at or below the floor are dropped.
    retracted: RwLock<HashMap<String, u64>>,
    state: RwLock<LoadingState>,
    last_error: RwLock<Option<String>>,
    events: broadcast::Sender<StoreEvent>,
    fold_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreInner")
            .field("listings", &self.listings.read().len())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl CatalogStore {
    /// Store over the given pool and signer, validating with the default
    /// schema rules.
    pub fn new(pool: RelayPool, signer: Arc<dyn Signer>) -> Self {
        Self::with_validator(pool, signer, Arc::new(SchemaValidator))
    }

    /// Store with a custom validation capability.
    pub fn with_validator(
        pool: RelayPool,
        signer: Arc<dyn Signer>,
        validator: Arc<dyn Validator>,
    ) -> Self {
        let (events, _) = broadcast::channel(STORE_EVENTS_CAP);
        Self {
            inner: Arc::new(StoreInner {
                pool,
                signer,
                validator,
                listings: RwLock::new(HashMap::new()),
                retracted: RwLock::new(HashMap::new()),
                state: RwLock::new(LoadingState::Idle),
                last_error: RwLock::new(None),
                events,
                fold_task: Mutex::new(None),
            }),
        }
    }

    /// A point-in-time copy of the projection, safe to iterate while the
    /// fold continues concurrently.
    pub fn snapshot(&self) -> HashMap<String, CatalogListing> {
        self.inner.listings.read().clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoadingState {
        *self.inner.state.read()
    }

    /// Whether a fetch or mutation is in flight.
    pub fn is_loading(&self) -> bool {
        self.state() == LoadingState::Loading
    }

    /// The most recent operation error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.read().clone()
    }

    /// Registers for projection-change notifications.
    ///
    /// Push-based complement to polling [`snapshot`](Self::snapshot); slow
    /// receivers may observe lag and should fall back to a snapshot.
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Initializes the pool and starts folding the record stream into the
    /// projection.
    ///
    /// The loading flag clears as soon as the subscription has been issued;
    /// the cache is usable empty while records stream in. A pool failure
    /// leaves the store in the sticky [`LoadingState::Error`] until the next
    /// fetch.
    pub async fn fetch(&self) -> Result<(), StoreError> {
        self.set_state(LoadingState::Loading);
        *self.inner.last_error.write() = None;

        let handle = match self.inner.pool.init().await {
            Ok(handle) => handle,
            Err(err) => {
                *self.inner.last_error.write() = Some(err.to_string());
                self.set_state(LoadingState::Error);
                return Err(err.into());
            }
        };

        let mut stream = handle.subscribe(Filter::kinds([
            RecordKind::CatalogListing,
            RecordKind::Retraction,
        ]));
        let inner = self.inner.clone();
        let fold = tokio::spawn(async move {
            while let Some(record) = stream.next().await {
                inner.apply_record(&record);
            }
        });
        if let Some(previous) = self.inner.fold_task.lock().replace(fold) {
            previous.abort();
        }

        self.set_state(LoadingState::Streaming);
        Ok(())
    }

    /// Creates a listing: builds tags, validates, signs, publishes and
    /// applies the new entry to the projection.
    ///
    /// Returns the listing identity, freshly minted unless pinned in
    /// `fields`. The local entry is visible as soon as this returns; no
    /// round trip through the subscription is awaited. On any failure the
    /// projection is untouched.
    pub async fn create(&self, fields: ListingFields) -> Result<String, StoreError> {
        let identity = fields
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let record = self
            .publish_listing(&identity, &fields)
            .await
            .inspect_err(|err| self.note_error(err))?;
        self.inner.apply_local_listing(&record);
        Ok(identity)
    }

    /// Updates an existing listing by merging the patch over its current
    /// fields, then re-publishing under the same identity with a fresh
    /// timestamp.
    pub async fn update(&self, identity: &str, patch: ListingPatch) -> Result<(), StoreError> {
        let result = async {
            let existing = self
                .inner
                .listings
                .read()
                .get(identity)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
            let mut fields = existing.fields();
            patch.apply(&mut fields);
            let record = self.publish_listing(identity, &fields).await?;
            self.inner.apply_local_listing(&record);
            Ok(())
        }
        .await;
        if let Err(err) = &result {
            self.note_error(err);
        }
        result
    }

    /// Deletes a listing by publishing a retraction referencing its identity
    /// and kind, then removing the local entry.
    ///
    /// The removal only happens after the retraction was accepted for
    /// sending; a definitive publish failure leaves the entry in place.
    pub async fn delete(&self, identity: &str) -> Result<(), StoreError> {
        let result = async {
            if !self.inner.listings.read().contains_key(identity) {
                return Err(StoreError::NotFound(identity.to_string()));
            }
            let created_at = unix_now();
            let draft = DraftRecord {
                kind: RecordKind::Retraction,
                created_at,
                tags: vec![
                    vec!["e".into(), identity.into()],
                    vec!["k".into(), CATALOG_LISTING_KIND.to_string()],
                ],
                content: String::new(),
            };
            let record = self.inner.signer.sign(draft)?;
            let handle = self.inner.pool.init().await?;
            handle.publish(&record).await?;

            self.inner
                .retracted
                .write()
                .entry(identity.to_string())
                .and_modify(|floor| *floor = (*floor).max(created_at))
                .or_insert(created_at);
            if self.inner.listings.write().remove(identity).is_some() {
                self.inner.emit(StoreEvent::Removed(identity.to_string()));
            }
            Ok(())
        }
        .await;
        if let Err(err) = &result {
            self.note_error(err);
        }
        result
    }

    /// Shared tail of create and update: draft, validate, sign, publish.
    async fn publish_listing(
        &self,
        identity: &str,
        fields: &ListingFields,
    ) -> Result<Record, StoreError> {
        let draft = DraftRecord {
            kind: RecordKind::CatalogListing,
            created_at: unix_now(),
            tags: build_tags(identity, fields),
            content: fields.description.clone(),
        };
        self.inner.validator.validate(&draft)?;
        let record = self.inner.signer.sign(draft)?;
        let handle = self.inner.pool.init().await?;
        handle.publish(&record).await?;
        Ok(record)
    }

    fn note_error(&self, err: &StoreError) {
        *self.inner.last_error.write() = Some(err.to_string());
    }

    fn set_state(&self, state: LoadingState) {
        *self.inner.state.write() = state;
    }
}

impl StoreInner {
    /// Folds one inbound record into the projection.
    ///
    /// Malformed or invalid records are dropped with a diagnostic log entry
    /// and never surface to the user; the rest of the catalog stays usable.
    fn apply_record(&self, record: &Record) {
        match record.kind {
            RecordKind::CatalogListing => self.apply_listing_record(record),
            RecordKind::Retraction => self.apply_retraction(record),
            RecordKind::Other(kind) => trace!(kind, "ignoring record of unrequested kind"),
        }
    }

    fn apply_listing_record(&self, record: &Record) {
        if let Err(err) = self.validator.validate(&record.as_draft()) {
            warn!(record_id = %record.id, "dropping invalid listing record: {err}");
            return;
        }
        let listing = match CatalogListing::from_record(record) {
            Ok(listing) => listing,
            Err(err) => {
                trace!(record_id = %record.id, "dropping undecodable listing: {err}");
                return;
            }
        };

        // A processed retraction leaves a floor; only strictly newer records
        // may re-insert the identity.
        {
            let mut retracted = self.retracted.write();
            if let Some(&floor) = retracted.get(&listing.identity) {
                if record.created_at <= floor {
                    trace!(
                        identity = %listing.identity,
                        "dropping listing at or below retraction floor"
                    );
                    return;
                }
                retracted.remove(&listing.identity);
            }
        }

        self.insert_listing(listing);
    }

    /// Applies the replacement rule and emits the change notification.
    fn insert_listing(&self, listing: CatalogListing) {
        let identity = listing.identity.clone();
        let event = {
            let mut listings = self.listings.write();
            match listings.get(&identity) {
                // Strictly older than what we hold: drop. An equal timestamp
                // is won by the record processed last.
                Some(existing) if listing.created_at < existing.created_at => {
                    trace!(%identity, "dropping superseded listing record");
                    return;
                }
                Some(_) => {
                    listings.insert(identity.clone(), listing);
                    StoreEvent::Updated(identity)
                }
                None => {
                    listings.insert(identity.clone(), listing);
                    StoreEvent::Inserted(identity)
                }
            }
        };
        self.emit(event);
    }

    /// Applies a locally published listing record.
    ///
    /// The write carries the new timestamp, so the later echo of the same
    /// record through the subscription replays as a no-op.
    fn apply_local_listing(&self, record: &Record) {
        match CatalogListing::from_record(record) {
            Ok(listing) => {
                // A deliberate local write supersedes an earlier retraction.
                self.retracted.write().remove(&listing.identity);
                self.insert_listing(listing);
            }
            // Unreachable after validation; leave the projection alone.
            Err(err) => warn!(record_id = %record.id, "published record undecodable: {err}"),
        }
    }

    fn apply_retraction(&self, record: &Record) {
        if record.tag_value("k") != Some(CATALOG_LISTING_KIND.to_string().as_str()) {
            trace!(record_id = %record.id, "ignoring retraction for other kind");
            return;
        }
        let Some(identity) = record.tag_value("e") else {
            trace!(record_id = %record.id, "ignoring retraction without identity");
            return;
        };

        // The floor is the retraction's processing time (or its own
        // timestamp if that is later), so records created before we saw the
        // retraction cannot resurrect the entry.
        let floor = record.created_at.max(unix_now());
        self.retracted
            .write()
            .entry(identity.to_string())
            .and_modify(|existing| *existing = (*existing).max(floor))
            .or_insert(floor);

        if self.listings.write().remove(identity).is_some() {
            debug!(%identity, "listing retracted");
            self.emit(StoreEvent::Removed(identity.to_string()));
        }
    }

    fn emit(&self, event: StoreEvent) {
        // Receiver lag or absence is fine; consumers can always snapshot.
        let _ = self.events.send(event);
    }
}
