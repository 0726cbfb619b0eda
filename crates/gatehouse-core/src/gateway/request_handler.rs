//! Request coalescing for settings reads.
//!
//! Every unsynchronized document asks the handler for its row. Requests
//! for an id that is already in flight share that request; requests for
//! new ids join the current wave, which yields once so that concurrent
//! callers can pile in and then issues a single batched provider read.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;

use crate::ports::{ProviderError, ProviderRegistry, Row};

/// Batched row source behind a [`RequestHandler`].
#[async_trait]
pub trait BatchFetcher: Send + Sync {
    /// Fetch the rows of `ids`. Missing ids are simply absent.
    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Row>, ProviderError>;
}

/// Fetches rows from a named provider's table.
///
/// The provider is resolved through the registry on every batch.
pub struct ProviderFetcher {
    providers: Arc<ProviderRegistry>,
    provider: String,
    table: String,
}

impl ProviderFetcher {
    pub fn new(
        providers: Arc<ProviderRegistry>,
        provider: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            providers,
            provider: provider.into(),
            table: table.into(),
        }
    }
}

#[async_trait]
impl BatchFetcher for ProviderFetcher {
    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Row>, ProviderError> {
        let provider = self.providers.get(&self.provider)?;
        provider.get_all(&self.table, Some(ids)).await
    }
}

type RowResult = Result<Option<Row>, ProviderError>;
type SharedRow = Shared<BoxFuture<'static, RowResult>>;
type SharedBatch = Shared<BoxFuture<'static, Result<Arc<HashMap<String, Row>>, ProviderError>>>;

#[derive(Default)]
struct HandlerState {
    /// Ids waiting for the current wave.
    pending: Vec<String>,
    /// The wave new ids join; cleared once it starts fetching.
    batch: Option<SharedBatch>,
    in_flight: HashMap<String, SharedRow>,
}

struct HandlerInner {
    fetcher: Arc<dyn BatchFetcher>,
    state: Mutex<HandlerState>,
}

impl HandlerInner {
    fn lock(&self) -> MutexGuard<'_, HandlerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Coalesces concurrent fetch-by-id calls into batched reads.
#[derive(Clone)]
pub struct RequestHandler {
    inner: Arc<HandlerInner>,
}

impl RequestHandler {
    pub fn new(fetcher: Arc<dyn BatchFetcher>) -> Self {
        Self {
            inner: Arc::new(HandlerInner {
                fetcher,
                state: Mutex::new(HandlerState::default()),
            }),
        }
    }

    /// Fetch the row of `id`, sharing any in-flight request for it.
    pub async fn push(&self, id: &str) -> RowResult {
        let request = {
            let mut state = self.inner.lock();
            if let Some(existing) = state.in_flight.get(id) {
                existing.clone()
            } else {
                let batch = match &state.batch {
                    Some(batch) => batch.clone(),
                    None => {
                        let batch = Self::start_batch(Arc::clone(&self.inner));
                        state.batch = Some(batch.clone());
                        batch
                    }
                };
                state.pending.push(id.to_string());

                let key = id.to_string();
                let request = async move {
                    let rows = batch.await?;
                    Ok(rows.get(&key).cloned())
                }
                .boxed()
                .shared();
                state.in_flight.insert(id.to_string(), request.clone());
                request
            }
        };

        request.await
    }

    fn start_batch(inner: Arc<HandlerInner>) -> SharedBatch {
        async move {
            tokio::task::yield_now().await;

            let ids = {
                let mut state = inner.lock();
                state.batch = None;
                std::mem::take(&mut state.pending)
            };
            tracing::debug!(ids = ids.len(), "Fetching settings batch");

            let fetched = inner.fetcher.fetch_many(&ids).await;

            // Settled before any waiter resumes, so later pushes start a new wave
            // even if every waiter of an id was dropped.
            {
                let mut state = inner.lock();
                for id in &ids {
                    state.in_flight.remove(id);
                }
            }

            let rows = fetched?;
            let mut by_id = HashMap::with_capacity(rows.len());
            for row in rows {
                match row.get("id").and_then(Value::as_str) {
                    Some(id) => {
                        by_id.insert(id.to_string(), row);
                    }
                    None => tracing::warn!("Provider returned a settings row without an id"),
                }
            }
            Ok(Arc::new(by_id))
        }
        .boxed()
        .shared()
    }

    /// Ids waiting for the next batch.
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Ids with an unresolved request.
    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("RequestHandler")
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
