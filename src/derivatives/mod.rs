//! Perpetual futures positioning: funding, open interest, top-trader
//! long/short ratio and order book walls.
//!
//! Each part is fetched independently. A part that fails is recorded as
//! unavailable with its reason; the snapshot itself never fails.

use crate::api::{with_retry, ClientResult, DerivativesClient, RequestPool, RetryPolicy};
use crate::models::DerivativesSnapshot;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct DerivativesSource {
    client: Arc<dyn DerivativesClient>,
    pool: RequestPool,
    retry: RetryPolicy,
    /// Largest order book levels kept per side
    walls: usize,
}

impl DerivativesSource {
    pub fn new(client: Arc<dyn DerivativesClient>, pool: RequestPool, retry: RetryPolicy, walls: usize) -> Self {
        Self {
            client,
            pool,
            retry,
            walls: walls.max(1),
        }
    }

    pub async fn snapshot(&self, symbol: &str) -> DerivativesSnapshot {
        let client = &self.client;
        let (funding, open_interest, ratio, book) = futures::join!(
            self.part("funding", symbol, || client.funding(symbol)),
            self.part("open_interest", symbol, || client.open_interest(symbol)),
            self.part("long_short_ratio", symbol, || client.long_short_ratio(symbol)),
            self.part("order_book", symbol, || client.order_book(symbol, self.walls)),
        );

        let mut unavailable = BTreeMap::new();
        let snapshot = DerivativesSnapshot {
            funding: keep(funding, "funding", &mut unavailable),
            open_interest: keep(open_interest, "open_interest", &mut unavailable),
            long_short_ratio: keep(ratio, "long_short_ratio", &mut unavailable),
            order_book: keep(book, "order_book", &mut unavailable),
            unavailable,
        };

        tracing::info!(
            symbol,
            missing = snapshot.unavailable.len(),
            "Derivatives data fetched"
        );
        snapshot
    }

    async fn part<T, F, Fut>(&self, label: &str, symbol: &str, op: F) -> ClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let result = with_retry(&self.pool, &self.retry, label, op).await;
        if let Err(e) = &result {
            tracing::warn!(symbol, part = label, error = %e, "Derivatives data unavailable");
        }
        result
    }
}

fn keep<T>(result: ClientResult<T>, part: &str, unavailable: &mut BTreeMap<String, String>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            unavailable.insert(part.to_string(), e.to_string());
            None
        }
    }
}
