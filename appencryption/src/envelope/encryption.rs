use crate::envelope::{DataRowRecord, EnvelopeKeyRecord, KeyMeta};
use crate::error::{Error, Result};
use crate::key::cache::{CachedCryptoKey, KeyCacher};
use crate::key::{is_key_invalid, CryptoKey};
use crate::partition::Partition;
use crate::policy::{CryptoPolicy, RotationStrategy};
use crate::util;
use crate::Aead;
use crate::Encryption;
use crate::KeyManagementService;
use crate::Metastore;
use crate::AES256_KEY_SIZE;

use async_trait::async_trait;
use chrono::Utc;
use securememory::protected_memory::DefaultSecretFactory;
use std::sync::Arc;

/// Implementation of envelope encryption
pub struct EnvelopeEncryption {
    /// Partition for key separation
    partition: Arc<dyn Partition>,

    /// Metastore for key persistence
    metastore: Arc<dyn Metastore>,

    /// Key Management Service for key encryption
    kms: Arc<dyn KeyManagementService>,

    /// Crypto policy for key management
    policy: Arc<CryptoPolicy>,

    /// AEAD implementation for data encryption
    crypto: Arc<dyn Aead>,

    /// Secret factory for creating secure secrets
    secret_factory: Arc<DefaultSecretFactory>,

    /// System key cache
    sk_cache: crate::key::cache::AnyCache,

    /// Intermediate key cache
    ik_cache: crate::key::cache::AnyCache,
}

impl std::fmt::Debug for EnvelopeEncryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopeEncryption")
            .field("partition", &self.partition)
            .finish()
    }
}

/// Builder for EnvelopeEncryption
#[derive(Default)]
pub struct EnvelopeEncryptionBuilder {
    partition: Option<Arc<dyn Partition>>,
    metastore: Option<Arc<dyn Metastore>>,
    kms: Option<Arc<dyn KeyManagementService>>,
    policy: Option<Arc<CryptoPolicy>>,
    crypto: Option<Arc<dyn Aead>>,
    secret_factory: Option<Arc<DefaultSecretFactory>>,
    sk_cache: Option<crate::key::cache::AnyCache>,
    ik_cache: Option<crate::key::cache::AnyCache>,
}

impl EnvelopeEncryptionBuilder {
    /// Creates a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the partition
    pub fn with_partition(mut self, partition: Arc<dyn Partition>) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Sets the metastore
    pub fn with_metastore(mut self, metastore: Arc<dyn Metastore>) -> Self {
        self.metastore = Some(metastore);
        self
    }

    /// Sets the KMS
    pub fn with_kms(mut self, kms: Arc<dyn KeyManagementService>) -> Self {
        self.kms = Some(kms);
        self
    }

    /// Sets the crypto policy
    pub fn with_policy(mut self, policy: Arc<CryptoPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the crypto implementation
    pub fn with_crypto(mut self, crypto: Arc<dyn Aead>) -> Self {
        self.crypto = Some(crypto);
        self
    }

    /// Sets the secret factory
    pub fn with_secret_factory(mut self, secret_factory: Arc<DefaultSecretFactory>) -> Self {
        self.secret_factory = Some(secret_factory);
        self
    }

    /// Sets the system key cache
    pub fn with_sk_cache(mut self, sk_cache: crate::key::cache::AnyCache) -> Self {
        self.sk_cache = Some(sk_cache);
        self
    }

    /// Sets the intermediate key cache
    pub fn with_ik_cache(mut self, ik_cache: crate::key::cache::AnyCache) -> Self {
        self.ik_cache = Some(ik_cache);
        self
    }

    /// Builds the EnvelopeEncryption
    pub fn build(self) -> Result<EnvelopeEncryption> {
        let partition = self
            .partition
            .ok_or_else(|| Error::InvalidArgument("partition is required".to_string()))?;
        let metastore = self
            .metastore
            .ok_or_else(|| Error::InvalidArgument("metastore is required".to_string()))?;
        let kms = self
            .kms
            .ok_or_else(|| Error::InvalidArgument("kms is required".to_string()))?;
        let policy = self
            .policy
            .ok_or_else(|| Error::InvalidArgument("policy is required".to_string()))?;
        let crypto = self
            .crypto
            .ok_or_else(|| Error::InvalidArgument("crypto is required".to_string()))?;
        let secret_factory = self
            .secret_factory
            .ok_or_else(|| Error::InvalidArgument("secret_factory is required".to_string()))?;
        let sk_cache = self
            .sk_cache
            .ok_or_else(|| Error::InvalidArgument("sk_cache is required".to_string()))?;
        let ik_cache = self
            .ik_cache
            .ok_or_else(|| Error::InvalidArgument("ik_cache is required".to_string()))?;

        if crate::metrics::metrics_enabled() {
            crate::metrics::register_counter("ael.envelope.encrypt");
            crate::metrics::register_counter("ael.envelope.decrypt");
            crate::metrics::register_counter("ael.envelope.stale_key");
            crate::metrics::register_counter("ael.envelope.stale_key_read");
            crate::metrics::register_timer("ael.envelope.encrypt.time");
            crate::metrics::register_timer("ael.envelope.decrypt.time");
            crate::metrics::register_timer("ael.envelope.get_system_key");
            crate::metrics::register_timer("ael.envelope.get_intermediate_key");
        }

        Ok(EnvelopeEncryption {
            partition,
            metastore,
            kms,
            policy,
            crypto,
            secret_factory,
            sk_cache,
            ik_cache,
        })
    }
}

impl EnvelopeEncryption {
    /// Creates a new EnvelopeEncryption
    #[deprecated(since = "0.1.1", note = "Use EnvelopeEncryptionBuilder instead")]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        partition: Arc<dyn Partition>,
        metastore: Arc<dyn Metastore>,
        kms: Arc<dyn KeyManagementService>,
        policy: Arc<CryptoPolicy>,
        crypto: Arc<dyn Aead>,
        secret_factory: Arc<DefaultSecretFactory>,
        sk_cache: crate::key::cache::AnyCache,
        ik_cache: crate::key::cache::AnyCache,
    ) -> Self {
        Self {
            partition,
            metastore,
            kms,
            policy,
            crypto,
            secret_factory,
            sk_cache,
            ik_cache,
        }
    }

    /// Creates a new EnvelopeEncryption using the builder pattern
    pub fn builder() -> EnvelopeEncryptionBuilder {
        EnvelopeEncryptionBuilder::new()
    }

    /// Loads the latest system key, creating one (wrapped by the
    /// master-key provider) if none exists or the rotation strategy calls
    /// for it.
    async fn get_latest_or_create_system_key(&self) -> Result<Arc<CachedCryptoKey>> {
        let key_id = self.partition.system_key_id();
        let _timer = crate::timer!("ael.envelope.get_system_key");

        load_or_create_system_key(
            &self.sk_cache,
            &self.metastore,
            &self.kms,
            &self.policy,
            &self.secret_factory,
            &key_id,
        )
        .await
    }

    /// Loads the latest intermediate key for this partition, creating one
    /// (wrapped by the current system key) if none exists or the rotation
    /// strategy calls for it. The entire fetch-validate-rotate-create
    /// sequence runs as the `ik_cache` loader, so a fresh cache entry means
    /// the metastore is never consulted at all.
    async fn with_intermediate_for_write(&self) -> Result<Arc<CachedCryptoKey>> {
        let key_id = self.partition.intermediate_key_id();
        let _timer = crate::timer!("ael.envelope.get_intermediate_key");

        let metastore = self.metastore.clone();
        let kms = self.kms.clone();
        let policy = self.policy.clone();
        let secret_factory = self.secret_factory.clone();
        let crypto = self.crypto.clone();
        let sk_cache = self.sk_cache.clone();

        let loader = move |meta: KeyMeta| {
            let metastore = metastore.clone();
            let kms = kms.clone();
            let policy = policy.clone();
            let secret_factory = secret_factory.clone();
            let crypto = crypto.clone();
            let sk_cache = sk_cache.clone();

            async move {
                if let Some(record) = metastore.load_latest(&meta.id).await? {
                    let parent_meta = record.parent_key_meta.clone().ok_or_else(|| {
                        Error::MetadataMissing(format!(
                            "intermediate key {} has no parent system key meta",
                            meta.id
                        ))
                    })?;

                    match load_existing_system_key(
                        &metastore,
                        &kms,
                        &secret_factory,
                        &sk_cache,
                        policy.expire_key_after,
                        &parent_meta,
                        true,
                    )
                    .await
                    {
                        Ok(sk_handle) => {
                            let result =
                                decrypt_ik_record(&record, &sk_handle.crypto_key, &crypto, &secret_factory);
                            let _ = sk_handle.close();
                            let crypto_key = result?;

                            let invalid = is_key_invalid(&crypto_key, policy.expire_key_after);
                            if !invalid {
                                return Ok(crypto_key);
                            }
                            if policy.rotation_strategy == RotationStrategy::Queued {
                                log::warn!(
                                    "intermediate key rotation deferred: using stale key {}:{}",
                                    meta.id,
                                    crypto_key.created()
                                );
                                crate::metrics::increment_counter("ael.envelope.stale_key", 1);
                                return Ok(crypto_key);
                            }
                            // Inline rotation strategy and the key is invalid: fall through to creation.
                        }
                        Err(Error::MetadataMissing(_)) => {
                            // System key gone or revoked-and-demanded-valid; fall through to creation.
                        }
                        Err(e) => return Err(e),
                    }
                }

                create_intermediate_key(&metastore, &kms, &policy, &secret_factory, &crypto, &sk_cache, &meta.id)
                    .await
            }
        };

        self.ik_cache.get_or_load_latest(&key_id, loader).await
    }

    /// Resolves the intermediate key referenced by an existing Data Row
    /// Record's parent meta, for decryption. Fails `MetadataMissing` if
    /// the record can't be found; tolerates revoked/expired keys.
    async fn with_intermediate_for_read(&self, meta: &KeyMeta) -> Result<Arc<CachedCryptoKey>> {
        let metastore = self.metastore.clone();
        let secret_factory = self.secret_factory.clone();
        let this_crypto = self.crypto.clone();
        let sk_cache = self.sk_cache.clone();
        let kms = self.kms.clone();
        let policy = self.policy.clone();

        let loader = move |meta: KeyMeta| {
            let metastore = metastore.clone();
            let secret_factory = secret_factory.clone();
            let this_crypto = this_crypto.clone();
            let sk_cache = sk_cache.clone();
            let kms = kms.clone();
            let policy = policy.clone();

            async move {
                let record = metastore
                    .load(&meta.id, meta.created)
                    .await?
                    .ok_or_else(|| {
                        Error::MetadataMissing(format!(
                            "intermediate key {}:{} not found",
                            meta.id, meta.created
                        ))
                    })?;

                let parent_meta = record.parent_key_meta.clone().ok_or_else(|| {
                    Error::MetadataMissing(format!(
                        "intermediate key {} has no parent system key meta",
                        meta.id
                    ))
                })?;

                // Point-load the system key that wraps this specific IK record.
                let sk_loader = move |sk_meta: KeyMeta| {
                    let metastore = metastore.clone();
                    let secret_factory = secret_factory.clone();
                    let kms = kms.clone();

                    async move {
                        let sk_record = metastore
                            .load(&sk_meta.id, sk_meta.created)
                            .await?
                            .ok_or_else(|| {
                                Error::MetadataMissing(format!(
                                    "system key {}:{} not found",
                                    sk_meta.id, sk_meta.created
                                ))
                            })?;
                        let key_bytes = kms.decrypt_key(sk_record.encrypted_key.as_slice()).await?;
                        let sk = CryptoKey::new(
                            sk_record.id,
                            sk_record.created,
                            key_bytes,
                            secret_factory.as_ref(),
                        )?;
                        sk.set_revoked(sk_record.revoked.unwrap_or(false));
                        Ok(sk)
                    }
                };
                let sk_handle = sk_cache.get_or_load(parent_meta, sk_loader).await?;

                let key_bytes = sk_handle
                    .crypto_key
                    .with_bytes(|sk_bytes| this_crypto.decrypt(&record.encrypted_key, sk_bytes))?;
                let _ = sk_handle.close();

                let crypto_key = CryptoKey::new(
                    record.id,
                    record.created,
                    key_bytes,
                    secret_factory.as_ref(),
                )?;
                crypto_key.set_revoked(record.revoked.unwrap_or(false));

                if policy.notify_expired_on_read && is_key_invalid(&crypto_key, policy.expire_key_after) {
                    log::warn!(
                        "decrypt served by stale intermediate key {}:{}",
                        crypto_key.id(),
                        crypto_key.created()
                    );
                    crate::metrics::increment_counter("ael.envelope.stale_key_read", 1);
                }

                Ok(crypto_key)
            }
        };

        self.ik_cache.get_or_load(meta.clone(), loader).await
    }

    /// Creates a data row record from a payload
    async fn create_data_row_record(&self, data: &[u8]) -> Result<DataRowRecord> {
        let intermediate_key = self.with_intermediate_for_write().await?;

        let data_key = util::get_rand_bytes(AES256_KEY_SIZE);
        let encrypted_data = self.crypto.encrypt(data, &data_key)?;

        let encrypted_data_key = intermediate_key
            .crypto_key
            .with_bytes(|key_bytes| self.crypto.encrypt(&data_key, key_bytes))?;

        let result = DataRowRecord {
            key: EnvelopeKeyRecord {
                revoked: None,
                id: String::new(), // Data row keys don't have their own ID
                created: Utc::now().timestamp(),
                encrypted_key: encrypted_data_key,
                parent_key_meta: Some(KeyMeta {
                    id: intermediate_key.crypto_key.id().to_string(),
                    created: intermediate_key.crypto_key.created(),
                }),
            },
            data: encrypted_data,
        };

        let _ = intermediate_key.close();
        Ok(result)
    }
}

/// Loads a specific, already-persisted system key by `(id, created)` — the
/// system key an intermediate key record's parent meta points at. Never
/// creates. Fails with `MetadataMissing` if the record is gone, or (when
/// `treat_expired_as_missing`) if it is revoked or expired.
///
/// Standalone so it can run inside another cache's loader closure (which
/// must be `'static` and so cannot borrow `&EnvelopeEncryption`).
async fn load_existing_system_key(
    metastore: &Arc<dyn Metastore>,
    kms: &Arc<dyn KeyManagementService>,
    secret_factory: &Arc<DefaultSecretFactory>,
    sk_cache: &crate::key::cache::AnyCache,
    expire_key_after: std::time::Duration,
    parent_meta: &KeyMeta,
    treat_expired_as_missing: bool,
) -> Result<Arc<CachedCryptoKey>> {
    let metastore = metastore.clone();
    let kms = kms.clone();
    let secret_factory = secret_factory.clone();

    let loader = move |meta: KeyMeta| {
        let metastore = metastore.clone();
        let kms = kms.clone();
        let secret_factory = secret_factory.clone();

        async move {
            let record = metastore
                .load(&meta.id, meta.created)
                .await?
                .ok_or_else(|| {
                    Error::MetadataMissing(format!(
                        "system key {}:{} not found",
                        meta.id, meta.created
                    ))
                })?;

            let key_bytes = kms.decrypt_key(record.encrypted_key.as_slice()).await?;
            let crypto_key =
                CryptoKey::new(record.id.clone(), record.created, key_bytes, secret_factory.as_ref())?;
            crypto_key.set_revoked(record.revoked.unwrap_or(false));

            Ok(crypto_key)
        }
    };

    let handle = sk_cache.get_or_load(parent_meta.clone(), loader).await?;

    if treat_expired_as_missing && is_key_invalid(&handle.crypto_key, expire_key_after) {
        let _ = handle.close();
        return Err(Error::MetadataMissing(format!(
            "system key {}:{} is revoked or expired",
            parent_meta.id, parent_meta.created
        )));
    }

    Ok(handle)
}

/// Loads the latest system key from `sk_cache`, creating one (wrapped by
/// the master-key provider) if none exists or the rotation strategy calls
/// for it. The metastore round-trip happens only if `sk_cache` decides the
/// cached entry (if any) needs refreshing.
///
/// Standalone for the same reason as [`load_existing_system_key`]: it is
/// also invoked from the intermediate-key write loader.
async fn load_or_create_system_key(
    sk_cache: &crate::key::cache::AnyCache,
    metastore: &Arc<dyn Metastore>,
    kms: &Arc<dyn KeyManagementService>,
    policy: &Arc<CryptoPolicy>,
    secret_factory: &Arc<DefaultSecretFactory>,
    key_id: &str,
) -> Result<Arc<CachedCryptoKey>> {
    let metastore = metastore.clone();
    let kms = kms.clone();
    let policy = policy.clone();
    let secret_factory = secret_factory.clone();

    let loader = move |meta: KeyMeta| {
        let metastore = metastore.clone();
        let kms = kms.clone();
        let policy = policy.clone();
        let secret_factory = secret_factory.clone();

        async move {
            let latest = metastore.load_latest(&meta.id).await?;

            if let Some(record) = &latest {
                let key_bytes = kms.decrypt_key(record.encrypted_key.as_slice()).await?;
                let crypto_key = CryptoKey::new(
                    record.id.clone(),
                    record.created,
                    key_bytes,
                    secret_factory.as_ref(),
                )?;
                crypto_key.set_revoked(record.revoked.unwrap_or(false));

                let invalid = is_key_invalid(&crypto_key, policy.expire_key_after);
                if !invalid {
                    return Ok(crypto_key);
                }

                if policy.rotation_strategy == RotationStrategy::Queued {
                    log::warn!(
                        "system key rotation deferred: using stale key {}:{}",
                        meta.id,
                        crypto_key.created()
                    );
                    crate::metrics::increment_counter("ael.envelope.stale_key", 1);
                    return Ok(crypto_key);
                }
            }

            // Create a new system key, wrapped by the master-key provider.
            let created = crate::policy::new_key_timestamp(policy.system_key_precision);
            let key_bytes = util::get_rand_bytes(AES256_KEY_SIZE);
            let mut crypto_key =
                CryptoKey::new(meta.id.clone(), created, key_bytes, secret_factory.as_ref())?;

            let encrypted_key = crypto_key
                .with_bytes(|bytes| futures::executor::block_on(kms.encrypt_key(bytes)))?;

            let record = EnvelopeKeyRecord {
                id: meta.id.clone(),
                created,
                encrypted_key,
                parent_key_meta: None,
                revoked: None,
            };

            if !metastore.store(&meta.id, created, &record).await? {
                // Another writer won the race for this truncation window.
                let _ = crypto_key.close();

                let record = metastore.load(&meta.id, created).await?.ok_or_else(|| {
                    Error::AppEncryption(format!(
                        "system key {}:{} reported duplicate but reload found nothing",
                        meta.id, created
                    ))
                })?;

                let key_bytes = kms.decrypt_key(record.encrypted_key.as_slice()).await?;
                crypto_key = CryptoKey::new(
                    record.id,
                    record.created,
                    key_bytes,
                    secret_factory.as_ref(),
                )?;
                crypto_key.set_revoked(record.revoked.unwrap_or(false));
            }

            Ok(crypto_key)
        }
    };

    sk_cache.get_or_load_latest(key_id, loader).await
}

/// Decrypts an intermediate key record's bytes under the given system key
/// and wraps the result in a fresh `CryptoKey`.
fn decrypt_ik_record(
    record: &EnvelopeKeyRecord,
    sk: &CryptoKey,
    crypto: &Arc<dyn Aead>,
    secret_factory: &Arc<DefaultSecretFactory>,
) -> Result<CryptoKey> {
    let key_bytes = sk.with_bytes(|sk_bytes| crypto.decrypt(&record.encrypted_key, sk_bytes))?;
    let crypto_key = CryptoKey::new(record.id.clone(), record.created, key_bytes, secret_factory.as_ref())?;
    crypto_key.set_revoked(record.revoked.unwrap_or(false));
    Ok(crypto_key)
}

/// Generates, wraps, and stores a brand-new intermediate key, retrying
/// against a concurrent writer per §4.6 step 5. Returns the resolved key
/// itself rather than a cache handle: the caller is the `ik_cache` loader,
/// so the cache call wrapping it performs the actual insert.
async fn create_intermediate_key(
    metastore: &Arc<dyn Metastore>,
    kms: &Arc<dyn KeyManagementService>,
    policy: &Arc<CryptoPolicy>,
    secret_factory: &Arc<DefaultSecretFactory>,
    crypto: &Arc<dyn Aead>,
    sk_cache: &crate::key::cache::AnyCache,
    key_id: &str,
) -> Result<CryptoKey> {
    let created = crate::policy::new_key_timestamp(policy.intermediate_key_precision);

    let sk_handle = load_or_create_system_key(sk_cache, metastore, kms, policy, secret_factory, key_id).await?;
    let key_bytes = util::get_rand_bytes(AES256_KEY_SIZE);
    let mut crypto_key = CryptoKey::new(key_id.to_string(), created, key_bytes, secret_factory.as_ref())?;

    let encrypted_key = crypto_key.with_bytes(|bytes| {
        sk_handle
            .crypto_key
            .with_bytes(|sk_bytes| crypto.encrypt(bytes, sk_bytes))
    })?;

    let parent_key_meta = KeyMeta {
        id: sk_handle.crypto_key.id().to_string(),
        created: sk_handle.crypto_key.created(),
    };

    let record = EnvelopeKeyRecord {
        id: key_id.to_string(),
        created,
        encrypted_key,
        parent_key_meta: Some(parent_key_meta),
        revoked: None,
    };

    if !metastore.store(key_id, created, &record).await? {
        let _ = crypto_key.close();

        let record = metastore.load(key_id, created).await?.ok_or_else(|| {
            Error::AppEncryption(format!(
                "intermediate key {}:{} reported duplicate but reload found nothing",
                key_id, created
            ))
        })?;

        let reload_parent_meta = record.parent_key_meta.clone().ok_or_else(|| {
            Error::MetadataMissing(format!("intermediate key {} has no parent meta", key_id))
        })?;
        let winning_sk = load_existing_system_key(
            metastore,
            kms,
            secret_factory,
            sk_cache,
            policy.expire_key_after,
            &reload_parent_meta,
            false,
        )
        .await?;
        crypto_key = decrypt_ik_record(&record, &winning_sk.crypto_key, crypto, secret_factory)?;
        let _ = winning_sk.close();
    }

    let _ = sk_handle.close();
    Ok(crypto_key)
}

#[async_trait]
impl Encryption for EnvelopeEncryption {
    async fn encrypt_payload(&self, data: &[u8]) -> Result<DataRowRecord> {
        let timer = crate::timer!("ael.envelope.encrypt.time");
        crate::metrics::increment_counter("ael.envelope.encrypt", 1);

        let result = self.create_data_row_record(data).await;
        if let Some(t) = timer {
            t.observe_duration();
        }
        result
    }

    async fn decrypt_data_row_record(&self, drr: &DataRowRecord) -> Result<Vec<u8>> {
        let timer = crate::timer!("ael.envelope.decrypt.time");
        crate::metrics::increment_counter("ael.envelope.decrypt", 1);

        let parent_key_meta = drr
            .key
            .parent_key_meta
            .as_ref()
            .ok_or_else(|| Error::MetadataMissing("data row record has no parent key meta".into()))?;

        if !self
            .partition
            .is_valid_intermediate_key_id(&parent_key_meta.id)
        {
            return Err(Error::Crypto("Unable to decrypt record".into()));
        }

        let intermediate_key = self.with_intermediate_for_read(parent_key_meta).await?;

        let data_key = intermediate_key
            .crypto_key
            .with_bytes(|key_bytes| self.crypto.decrypt(&drr.key.encrypted_key, key_bytes))?;

        let data = self.crypto.decrypt(&drr.data, &data_key);

        let _ = intermediate_key.close();

        if let Some(t) = timer {
            t.observe_duration();
        }
        data
    }

    async fn close(&self) -> Result<()> {
        self.ik_cache.close().await?;
        self.sk_cache.close().await
    }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}
