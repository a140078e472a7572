//! Per-run cache of the image store listing.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use super::{ImageIndex, ImageStore, StoreError};

/// Caches the first full listing of the image store.
///
/// The first call to [`get`](Self::get) queries the store; concurrent first
/// callers wait for that single query and every later caller receives the same
/// listing. The cache is never refreshed, so it goes stale as soon as an image
/// is built in this run. Use [`fresh`](Self::fresh) when current state matters.
pub struct ImageHashRegistry {
  store: Arc<dyn ImageStore>,
  cached: OnceCell<Arc<ImageIndex>>,
}

impl ImageHashRegistry {
  pub fn new(store: Arc<dyn ImageStore>) -> Self {
    Self {
      store,
      cached: OnceCell::new(),
    }
  }

  /// The cached listing, querying the store on first use.
  pub async fn get(&self) -> Result<Arc<ImageIndex>, StoreError> {
    let index = self
      .cached
      .get_or_try_init(|| async {
        let index = self.store.list_images().await?;
        info!(images = index.len(), "cached image store listing");
        Ok::<_, StoreError>(Arc::new(index))
      })
      .await?;
    Ok(index.clone())
  }

  /// A new listing straight from the store, bypassing the cache.
  pub async fn fresh(&self) -> Result<ImageIndex, StoreError> {
    self.store.list_images().await
  }

  pub fn is_populated(&self) -> bool {
    self.cached.initialized()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::FakeStore;

  #[tokio::test]
  async fn first_get_queries_store() {
    let store = Arc::new(FakeStore::new(&[("airbyte/db:dev", "h1")]));
    let registry = ImageHashRegistry::new(store.clone());

    assert!(!registry.is_populated());
    let index = registry.get().await.unwrap();

    assert_eq!(index.hash_of("airbyte/db:dev"), Some("h1"));
    assert_eq!(store.queries(), 1);
    assert!(registry.is_populated());
  }

  #[tokio::test]
  async fn later_gets_reuse_the_cached_listing() {
    let store = Arc::new(FakeStore::new(&[("airbyte/db:dev", "h1")]));
    let registry = ImageHashRegistry::new(store.clone());

    registry.get().await.unwrap();
    store.set(&[("airbyte/db:dev", "h2")]);
    let index = registry.get().await.unwrap();

    assert_eq!(index.hash_of("airbyte/db:dev"), Some("h1"));
    assert_eq!(store.queries(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn concurrent_first_callers_share_one_query() {
    let store = Arc::new(FakeStore::new(&[("airbyte/db:dev", "h1")]).with_delay_ms(50));
    let registry = Arc::new(ImageHashRegistry::new(store.clone()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
      let registry = registry.clone();
      tasks.spawn(async move { registry.get().await.unwrap() });
    }

    let mut listings = Vec::new();
    while let Some(result) = tasks.join_next().await {
      listings.push(result.unwrap());
    }

    assert_eq!(store.queries(), 1);
    assert_eq!(listings.len(), 16);
    assert!(listings.iter().all(|l| Arc::ptr_eq(l, &listings[0])));
  }

  #[tokio::test]
  async fn fresh_bypasses_the_cache() {
    let store = Arc::new(FakeStore::new(&[("airbyte/db:dev", "h1")]));
    let registry = ImageHashRegistry::new(store.clone());

    registry.get().await.unwrap();
    store.set(&[("airbyte/db:dev", "h2")]);

    let fresh = registry.fresh().await.unwrap();
    assert_eq!(fresh.hash_of("airbyte/db:dev"), Some("h2"));
    assert_eq!(registry.get().await.unwrap().hash_of("airbyte/db:dev"), Some("h1"));
    assert_eq!(store.queries(), 2);
  }

  #[tokio::test]
  async fn failed_query_is_returned_to_the_caller() {
    let store = Arc::new(FakeStore::failing());
    let registry = ImageHashRegistry::new(store.clone());

    assert!(registry.get().await.is_err());
    assert!(!registry.is_populated());
  }
}
