// Tests to verify cache behaviors under different configurations

use crate::integration::common::{
    create_crypto, create_static_kms, create_test_config, Config, ORIGINAL_DATA, PARTITION_ID,
    PRODUCT, SERVICE,
};
use appencryption::{
    metastore::InMemoryMetastore, CryptoPolicy, Error, Metastore, Session, SessionFactory,
};
use async_trait::async_trait;
use securememory::protected_memory::DefaultSecretFactory;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::time::sleep;

// A metastore wrapper that counts operations
struct CountingMetastore<M: Metastore> {
    inner: Arc<M>,
    load_count: AtomicUsize,
    load_latest_count: AtomicUsize,
    store_count: AtomicUsize,
    store_success_count: AtomicUsize,
}

impl<M: Metastore> CountingMetastore<M> {
    fn new(inner: Arc<M>) -> Self {
        Self {
            inner,
            load_count: AtomicUsize::new(0),
            load_latest_count: AtomicUsize::new(0),
            store_count: AtomicUsize::new(0),
            store_success_count: AtomicUsize::new(0),
        }
    }

    fn reset_counts(&self) {
        self.load_count.store(0, Ordering::SeqCst);
        self.load_latest_count.store(0, Ordering::SeqCst);
        self.store_count.store(0, Ordering::SeqCst);
    }

    fn get_counts(&self) -> (usize, usize, usize) {
        (
            self.load_count.load(Ordering::SeqCst),
            self.load_latest_count.load(Ordering::SeqCst),
            self.store_count.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl<M: Metastore> Metastore for CountingMetastore<M> {
    async fn load(
        &self,
        id: &str,
        created: i64,
    ) -> Result<Option<appencryption::envelope::EnvelopeKeyRecord>, Error> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.inner.load(id, created).await
    }

    async fn load_latest(
        &self,
        id: &str,
    ) -> Result<Option<appencryption::envelope::EnvelopeKeyRecord>, Error> {
        self.load_latest_count.fetch_add(1, Ordering::SeqCst);
        self.inner.load_latest(id).await
    }

    async fn store(
        &self,
        id: &str,
        created: i64,
        envelope: &appencryption::envelope::EnvelopeKeyRecord,
    ) -> Result<bool, Error> {
        self.store_count.fetch_add(1, Ordering::SeqCst);
        let stored = self.inner.store(id, created, envelope).await?;
        if stored {
            self.store_success_count.fetch_add(1, Ordering::SeqCst);
        }
        Ok(stored)
    }
}

#[tokio::test]
async fn test_lru_cache_behavior() {
    // Create dependencies
    let config = create_test_config();
    let _crypto = create_crypto();
    let kms = create_static_kms().await;

    // Create a basic metastore and wrap it
    let inner_metastore = Arc::new(InMemoryMetastore::new());
    let metastore = Arc::new(CountingMetastore::new(inner_metastore));

    // Create a session factory - the library itself handles caching
    let policy = (*config.policy).clone();
    let metastore_arc: Arc<dyn Metastore> = metastore.clone();
    let factory = SessionFactory::new(
        config.service,
        config.product,
        policy,
        kms,
        metastore_arc,
        Arc::new(DefaultSecretFactory::new()),
        vec![], // Empty options
    );

    // For the first 3 partitions, we should have cache misses
    for i in 0..3 {
        metastore.reset_counts();

        let partition = format!("{}_lru_{}", PARTITION_ID, i);
        let session = factory
            .session(&partition)
            .await
            .expect("Failed to get session");

        let data = ORIGINAL_DATA.as_bytes().to_vec();
        let _drr = session
            .encrypt(&data)
            .await
            .expect("Failed to encrypt data");

        // Should have metastore operations for a cache miss
        let (_load_count, load_latest_count, store_count) = metastore.get_counts();
        assert!(
            load_latest_count > 0 || store_count > 0,
            "Should have metastore operations for partition {}",
            i
        );
    }

    // Now add a 4th partition - this should evict the least recently used one
    metastore.reset_counts();

    let partition3 = format!("{}_lru_3", PARTITION_ID);
    let session3 = factory
        .session(&partition3)
        .await
        .expect("Failed to get session");

    let data = ORIGINAL_DATA.as_bytes().to_vec();
    let _ = session3
        .encrypt(&data)
        .await
        .expect("Failed to encrypt data");

    // Should have metastore operations for a cache miss
    let (_load_count, load_latest_count, store_count) = metastore.get_counts();
    assert!(
        load_latest_count > 0 || store_count > 0,
        "Should have metastore operations for partition 3"
    );

    // Now go back to partition 0 - it should be evicted and cause a cache miss
    metastore.reset_counts();

    let partition0 = format!("{}_lru_0", PARTITION_ID);
    let session0 = factory
        .session(&partition0)
        .await
        .expect("Failed to get session");

    let _ = session0
        .encrypt(&data)
        .await
        .expect("Failed to encrypt data");

    // Should have metastore operations for a cache miss
    let (_load_count, load_latest_count, store_count) = metastore.get_counts();
    assert!(
        load_latest_count > 0 || store_count > 0,
        "Should have metastore operations for partition 0 after eviction"
    );
}

#[tokio::test]
async fn test_cache_expiration_behavior() {
    if option_env!("SKIP_SLOW_TESTS").is_some() {
        return;
    }

    // Create dependencies with a very short expiry
    let mut policy = CryptoPolicy::new();
    policy.expire_key_after = std::time::Duration::from_secs(2);

    let config = Config {
        product: PRODUCT.to_string(),
        service: SERVICE.to_string(),
        policy: Arc::new(policy),
    };

    let _crypto = create_crypto();
    let kms = create_static_kms().await;

    // Create a basic metastore and wrap it
    let inner_metastore = Arc::new(InMemoryMetastore::new());
    let metastore = Arc::new(CountingMetastore::new(inner_metastore));

    // Create a session factory
    let policy = (*config.policy).clone();
    let metastore_arc: Arc<dyn Metastore> = metastore.clone();
    let factory = SessionFactory::new(
        config.service,
        config.product,
        policy,
        kms,
        metastore_arc,
        Arc::new(DefaultSecretFactory::new()),
        vec![], // Empty options
    );

    // First encryption should be a cache miss
    metastore.reset_counts();

    let session = factory
        .session(PARTITION_ID)
        .await
        .expect("Failed to get session");

    let data = ORIGINAL_DATA.as_bytes().to_vec();
    let _drr = session
        .encrypt(&data)
        .await
        .expect("Failed to encrypt data");

    // Should have metastore operations for a cache miss
    let (_load_count1, load_latest_count1, store_count1) = metastore.get_counts();
    assert!(
        load_latest_count1 > 0 || store_count1 > 0,
        "Should have metastore operations for first encryption"
    );

    // Second encryption immediately after should be a cache hit
    metastore.reset_counts();

    let _drr2 = session
        .encrypt(&data)
        .await
        .expect("Failed to encrypt data");

    // Should have fewer metastore operations for a cache hit
    let (_load_count2, load_latest_count2, store_count2) = metastore.get_counts();
    assert!(
        load_latest_count2 <= load_latest_count1 && store_count2 <= store_count1,
        "Should have fewer metastore operations for cache hit"
    );

    // Wait for the cache to expire
    sleep(Duration::from_secs(3)).await;

    // Third encryption after expiry should be a cache miss again
    metastore.reset_counts();

    let _drr3 = session
        .encrypt(&data)
        .await
        .expect("Failed to encrypt data");

    // Should have metastore operations for a cache miss
    let (_load_count3, load_latest_count3, store_count3) = metastore.get_counts();
    assert!(
        load_latest_count3 > 0 || store_count3 > 0,
        "Should have metastore operations after cache expiry"
    );
}

/// Two sessions for the same partition, racing to create the first
/// intermediate key: exactly one `store` succeeds for that created
/// timestamp, and both encrypts succeed using the winning key.
#[tokio::test]
async fn test_duplicate_store_race() {
    let config = create_test_config();
    let _crypto = create_crypto();
    let kms = create_static_kms().await;

    let inner_metastore = Arc::new(InMemoryMetastore::new());
    let metastore = Arc::new(CountingMetastore::new(inner_metastore));

    let policy = (*config.policy).clone();
    let metastore_arc: Arc<dyn Metastore> = metastore.clone();
    let factory = Arc::new(SessionFactory::new(
        config.service,
        config.product,
        policy,
        kms,
        metastore_arc,
        Arc::new(DefaultSecretFactory::new()),
        vec![],
    ));

    let partition = format!("{}_race", PARTITION_ID);
    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let data = ORIGINAL_DATA.as_bytes().to_vec();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let factory = factory.clone();
        let partition = partition.clone();
        let barrier = barrier.clone();
        let data = data.clone();

        handles.push(tokio::spawn(async move {
            // Each thread gets its own session/IK cache (no session or
            // shared-IK caching configured), so both genuinely race to
            // create the partition's first intermediate key.
            let session = factory
                .session(&partition)
                .await
                .expect("failed to get session");

            barrier.wait().await;

            session.encrypt(&data).await
        }));
    }

    for handle in handles {
        let result = handle.await.expect("task panicked");
        assert!(result.is_ok(), "both encrypts must succeed despite the race");
    }

    let (_load_count, _load_latest_count, store_count) = metastore.get_counts();
    assert_eq!(
        metastore.store_success_count.load(Ordering::SeqCst),
        1,
        "exactly one store should have won the race for this IK, but {} attempted",
        store_count
    );
}

/// With a session cache capped at one entry, a held session must not be
/// evicted by another partition's session being opened concurrently.
#[tokio::test]
async fn test_session_cache_pinning() {
    let mut policy = (*create_test_config().policy).clone();
    policy.cache_sessions = true;
    policy.session_cache_max_size = 1;
    policy.session_cache_duration = Duration::from_millis(50);

    let _crypto = create_crypto();
    let kms = create_static_kms().await;
    let inner_metastore = Arc::new(InMemoryMetastore::new());
    let metastore = Arc::new(CountingMetastore::new(inner_metastore));
    let metastore_arc: Arc<dyn Metastore> = metastore.clone();

    let factory = SessionFactory::new(
        SERVICE.to_string(),
        PRODUCT.to_string(),
        policy,
        kms,
        metastore_arc,
        Arc::new(DefaultSecretFactory::new()),
        vec![],
    );

    let partition_a = format!("{}_pin_a", PARTITION_ID);
    let partition_b = format!("{}_pin_b", PARTITION_ID);
    let data = ORIGINAL_DATA.as_bytes().to_vec();

    // Hold session A across the time partition B is opened.
    let session_a = factory
        .session(&partition_a)
        .await
        .expect("failed to get session a");
    let _ = session_a
        .encrypt(&data)
        .await
        .expect("failed to encrypt with session a");

    let session_b = factory
        .session(&partition_b)
        .await
        .expect("failed to get session b");
    let _ = session_b
        .encrypt(&data)
        .await
        .expect("failed to encrypt with session b");

    // A is still held via `session_a`; re-fetching it must return the same
    // cached session rather than recreating it, even though the cache can
    // only hold one entry and B was opened in between.
    let session_a_again = factory
        .session(&partition_a)
        .await
        .expect("failed to get session a again");
    assert!(
        Arc::ptr_eq(&session_a, &session_a_again),
        "session A must not be evicted while a caller still holds it"
    );

    // `close()` is what actually releases a checked-out session (the usage
    // counter that pins it is decremented there, not on `Drop`); each `get`
    // above incremented it once, so both releases are required.
    session_a.close().await.expect("failed to close session a");
    session_a_again
        .close()
        .await
        .expect("failed to close session a again");

    // Once released, A is eligible for reclamation; after the TTL and a
    // fresh access pattern it should eventually be recreated rather than
    // pinned forever.
    sleep(Duration::from_millis(100)).await;

    metastore.reset_counts();
    let session_a_reclaimed = factory
        .session(&partition_a)
        .await
        .expect("failed to get session a after release");
    let _ = session_a_reclaimed
        .encrypt(&data)
        .await
        .expect("failed to encrypt with reclaimed session a");
    assert!(
        !Arc::ptr_eq(&session_a, &session_a_reclaimed),
        "session A should have been reclaimed after release + TTL, not reused"
    );

    let _ = session_b.close().await;
}
