//! Issuer verification keys, fetched from the issuer's JWKS endpoint.
//!
//! The key store holds one immutable [`KeySnapshot`] at a time. Readers clone
//! the `Arc` and never observe a half-built map. A refresh fetches and parses
//! the whole document before swapping the pointer, so a failed refresh leaves
//! the previous snapshot in place.
//!
//! There is no TTL. Refreshes happen at startup and when the authenticator
//! suspects a key rotation.
//!
//! # Key material
//!
//! Keys come from the first `x5c` certificate of each entry (standard base64
//! DER). RSA subject public keys become [`VerificationKey::Rsa`]; any other
//! key type is kept as [`VerificationKey::Unsupported`] so a token naming it
//! fails with `InvalidCertificate` rather than `UnknownKeyId`.

use crate::auth::error::AuthError;
use crate::observability::metrics;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use common::http_client::HttpClient;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;
use x509_parser::public_key::PublicKey;

/// Default path of the JWKS document on the issuer.
pub const DEFAULT_JWKS_PATH: &str = "/.well-known/jwks.json";

/// The fields of one JWKS entry that the key store uses.
///
/// Decoded per entry, so an entry with a wrongly typed `kid` or `x5c` is
/// skipped without affecting its siblings.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkEntry {
    #[serde(default)]
    pub kid: Option<String>,

    /// Certificate chain, leaf first, standard base64 DER.
    #[serde(default)]
    pub x5c: Option<Vec<String>>,
}

/// JWKS document served by the issuer.
///
/// Entries stay raw JSON until [`KeySnapshot::from_document`] picks them apart.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<Value>,
}

/// Key material for one key ID.
#[derive(Clone)]
pub enum VerificationKey {
    /// RSA public key from the certificate's SubjectPublicKeyInfo.
    Rsa(DecodingKey),

    /// Parsed certificate with a non-RSA public key.
    Unsupported {
        /// Public key algorithm OID, dotted form.
        algorithm: String,
    },
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationKey::Rsa(_) => f.write_str("Rsa(..)"),
            VerificationKey::Unsupported { algorithm } => f
                .debug_struct("Unsupported")
                .field("algorithm", algorithm)
                .finish(),
        }
    }
}

/// Immutable mapping from key ID to key material.
#[derive(Debug, Clone, Default)]
pub struct KeySnapshot {
    keys: HashMap<String, VerificationKey>,
}

impl KeySnapshot {
    /// Build a snapshot from a JWKS document.
    ///
    /// Entries whose `kid` or `x5c` is missing or not of the expected JSON
    /// type are skipped. When two entries share a `kid`, the first one wins.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCertificate` if any used certificate is not
    /// valid base64 or not a valid X.509 DER certificate. One bad certificate
    /// fails the whole document.
    pub fn from_document(document: &JwksDocument) -> Result<Self, AuthError> {
        let mut keys = HashMap::with_capacity(document.keys.len());

        for (index, raw) in document.keys.iter().enumerate() {
            let entry = match JwkEntry::deserialize(raw) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(
                        target: "ms.auth.keystore",
                        index,
                        error = %e,
                        "Skipping malformed JWKS entry"
                    );
                    continue;
                }
            };

            let Some(kid) = entry.kid.as_deref().filter(|kid| !kid.is_empty()) else {
                tracing::warn!(
                    target: "ms.auth.keystore",
                    index,
                    "Skipping JWKS entry without kid"
                );
                continue;
            };

            let Some(certificate) = entry.x5c.as_ref().and_then(|chain| chain.first()) else {
                tracing::warn!(
                    target: "ms.auth.keystore",
                    kid = %kid,
                    "Skipping JWKS entry without x5c certificate"
                );
                continue;
            };

            if keys.contains_key(kid) {
                tracing::warn!(target: "ms.auth.keystore", kid = %kid, "Ignoring duplicate kid in JWKS");
                continue;
            }

            let key = decode_certificate(kid, certificate)?;
            keys.insert(kid.to_string(), key);
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key IDs in the snapshot, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

/// Decode the leaf certificate of an `x5c` chain into key material.
fn decode_certificate(kid: &str, certificate_b64: &str) -> Result<VerificationKey, AuthError> {
    let der = STANDARD.decode(certificate_b64.trim()).map_err(|e| {
        AuthError::InvalidCertificate(format!("certificate for kid {kid} is not valid base64: {e}"))
    })?;

    let (_, certificate) = x509_parser::parse_x509_certificate(&der).map_err(|e| {
        AuthError::InvalidCertificate(format!("certificate for kid {kid} is not valid X.509: {e}"))
    })?;

    let spki = certificate.public_key();
    match spki.parsed() {
        Ok(PublicKey::RSA(_)) => Ok(VerificationKey::Rsa(DecodingKey::from_rsa_der(
            spki.subject_public_key.data.as_ref(),
        ))),
        _ => {
            let algorithm = spki.algorithm.algorithm.to_id_string();
            tracing::debug!(
                target: "ms.auth.keystore",
                kid = %kid,
                algorithm = %algorithm,
                "Certificate carries a non-RSA public key"
            );
            Ok(VerificationKey::Unsupported { algorithm })
        }
    }
}

/// Where JWKS documents come from.
#[async_trait]
pub trait JwksSource: Send + Sync {
    /// Fetch the current JWKS document.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamFetchFailure` if no document could be
    /// obtained or it is not valid JWKS JSON.
    async fn fetch_jwks(&self) -> Result<JwksDocument, AuthError>;
}

/// Fetches the JWKS document over HTTP from the issuer.
pub struct HttpJwksSource {
    client: HttpClient,
    path: String,
}

impl HttpJwksSource {
    /// `path` is resolved against the client's base URL.
    pub fn new(client: HttpClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
        }
    }

    pub fn url(&self) -> String {
        self.client.url_for(&self.path)
    }
}

#[async_trait]
impl JwksSource for HttpJwksSource {
    async fn fetch_jwks(&self) -> Result<JwksDocument, AuthError> {
        self.client
            .get_json::<JwksDocument>(&self.path)
            .await
            .map_err(|e| AuthError::UpstreamFetchFailure(e.to_string()))
    }
}

/// Shared, refreshable store of issuer verification keys.
pub struct KeyStore {
    source: Arc<dyn JwksSource>,

    /// Current snapshot; the write lock is held only for the pointer swap.
    snapshot: RwLock<Arc<KeySnapshot>>,

    /// Serializes refreshes.
    refresh_lock: Mutex<()>,
}

impl KeyStore {
    /// Create an empty key store. Call [`KeyStore::refresh`] before use.
    pub fn new(source: Arc<dyn JwksSource>) -> Self {
        Self {
            source,
            snapshot: RwLock::new(Arc::new(KeySnapshot::default())),
            refresh_lock: Mutex::new(()),
        }
    }

    /// The current snapshot.
    pub async fn snapshot(&self) -> Arc<KeySnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Key material for `kid` in the current snapshot.
    pub async fn lookup(&self, kid: &str) -> Option<VerificationKey> {
        self.snapshot().await.get(kid).cloned()
    }

    pub async fn key_count(&self) -> usize {
        self.snapshot().await.len()
    }

    /// Fetch the JWKS document and replace the snapshot.
    ///
    /// Concurrent calls are serialized; each one fetches. Readers keep seeing
    /// the old snapshot until the new one is fully built.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UpstreamFetchFailure` if the fetch fails or the
    /// document contains an unusable certificate. The previous snapshot is
    /// kept.
    #[instrument(skip_all)]
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _guard = self.refresh_lock.lock().await;
        let start = Instant::now();

        let result = match self.source.fetch_jwks().await {
            Ok(document) => KeySnapshot::from_document(&document).map_err(|e| match e {
                AuthError::InvalidCertificate(detail) => AuthError::UpstreamFetchFailure(detail),
                other => other,
            }),
            Err(e) => Err(e),
        };

        match result {
            Ok(snapshot) => {
                let key_count = snapshot.len();
                *self.snapshot.write().await = Arc::new(snapshot);

                metrics::record_jwks_refresh("success", start.elapsed());
                metrics::set_jwks_key_count(key_count);
                tracing::info!(target: "ms.auth.keystore", key_count, "Key snapshot refreshed");
                Ok(())
            }
            Err(e) => {
                metrics::record_jwks_refresh("error", start.elapsed());
                tracing::error!(
                    target: "ms.auth.keystore",
                    error = ?e,
                    "Key snapshot refresh failed, keeping previous snapshot"
                );
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use ms_test_utils::{
        corrupt_certificate_jwk_json, ec_jwk_json, jwks_document, TestSigningKey,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves documents in order, repeating the last one.
    struct ScriptedSource {
        documents: std::sync::Mutex<Vec<Result<Value, AuthError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(documents: Vec<Result<Value, AuthError>>) -> Arc<Self> {
            Arc::new(Self {
                documents: std::sync::Mutex::new(documents),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JwksSource for ScriptedSource {
        async fn fetch_jwks(&self) -> Result<JwksDocument, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = {
                let mut documents = self.documents.lock().unwrap();
                if documents.len() > 1 {
                    documents.remove(0)
                } else {
                    documents[0].clone()
                }
            };
            next.and_then(|value| {
                serde_json::from_value(value)
                    .map_err(|e| AuthError::UpstreamFetchFailure(e.to_string()))
            })
        }
    }

    fn document(keys: &[Value]) -> JwksDocument {
        serde_json::from_value(jwks_document(keys)).unwrap()
    }

    #[test]
    fn test_snapshot_from_rsa_certificate() {
        let key = TestSigningKey::primary("key-a");
        let snapshot = KeySnapshot::from_document(&document(&[key.jwk_json()])).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(matches!(snapshot.get("key-a"), Some(VerificationKey::Rsa(_))));
    }

    #[test]
    fn test_snapshot_keeps_non_rsa_key_as_unsupported() {
        let snapshot = KeySnapshot::from_document(&document(&[ec_jwk_json("ec-key")])).unwrap();

        match snapshot.get("ec-key") {
            Some(VerificationKey::Unsupported { algorithm }) => {
                // id-ecPublicKey
                assert_eq!(algorithm, "1.2.840.10045.2.1");
            }
            other => panic!("expected unsupported key, got {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_skips_entries_without_kid_or_x5c() {
        let key = TestSigningKey::primary("key-a");
        let doc = document(&[
            json!({"kty": "RSA", "x5c": [key.certificate_der_b64()]}),
            json!({"kty": "RSA", "kid": "", "x5c": [key.certificate_der_b64()]}),
            json!({"kty": "RSA", "kid": "no-chain"}),
            json!({"kty": "RSA", "kid": "empty-chain", "x5c": []}),
            key.jwk_json(),
        ]);

        let snapshot = KeySnapshot::from_document(&doc).unwrap();
        assert_eq!(snapshot.kids(), vec!["key-a"]);
    }

    #[test]
    fn test_snapshot_first_duplicate_kid_wins() {
        let primary = TestSigningKey::primary("dup");
        let doc = document(&[primary.jwk_json(), ec_jwk_json("dup")]);

        let snapshot = KeySnapshot::from_document(&doc).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(matches!(snapshot.get("dup"), Some(VerificationKey::Rsa(_))));
    }

    #[test]
    fn test_snapshot_rejects_invalid_base64() {
        let doc = document(&[json!({"kid": "bad", "x5c": ["%%% not base64 %%%"]})]);
        let err = KeySnapshot::from_document(&doc).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCertificate(_)));
    }

    #[test]
    fn test_snapshot_rejects_invalid_der() {
        let key = TestSigningKey::primary("good");
        let doc = document(&[key.jwk_json(), corrupt_certificate_jwk_json("bad")]);

        let err = KeySnapshot::from_document(&doc).unwrap_err();
        assert!(matches!(err, AuthError::InvalidCertificate(_)));
    }

    #[test]
    fn test_empty_document_gives_empty_snapshot() {
        let snapshot = KeySnapshot::from_document(&document(&[])).unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_key_store_starts_empty() {
        let store = KeyStore::new(ScriptedSource::new(vec![Ok(jwks_document(&[]))]));
        assert_eq!(store.key_count().await, 0);
        assert!(store.lookup("anything").await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_replaces_snapshot() {
        let a = TestSigningKey::primary("key-a");
        let b = TestSigningKey::rotated("key-b");
        let source = ScriptedSource::new(vec![
            Ok(jwks_document(&[a.jwk_json()])),
            Ok(jwks_document(&[b.jwk_json()])),
        ]);
        let store = KeyStore::new(source.clone());

        store.refresh().await.unwrap();
        assert!(store.lookup("key-a").await.is_some());

        store.refresh().await.unwrap();
        assert!(store.lookup("key-a").await.is_none());
        assert!(store.lookup("key-b").await.is_some());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let a = TestSigningKey::primary("key-a");
        let source = ScriptedSource::new(vec![
            Ok(jwks_document(&[a.jwk_json()])),
            Err(AuthError::UpstreamFetchFailure("status 503".to_string())),
        ]);
        let store = KeyStore::new(source);

        store.refresh().await.unwrap();
        let before = store.snapshot().await;

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamFetchFailure(_)));

        let after = store.snapshot().await;
        assert!(Arc::ptr_eq(&before, &after));
        assert!(store.lookup("key-a").await.is_some());
    }

    #[tokio::test]
    async fn test_bad_certificate_fails_refresh_as_upstream_failure() {
        let a = TestSigningKey::primary("key-a");
        let source = ScriptedSource::new(vec![
            Ok(jwks_document(&[a.jwk_json()])),
            Ok(jwks_document(&[
                a.jwk_json(),
                corrupt_certificate_jwk_json("key-b"),
            ])),
        ]);
        let store = KeyStore::new(source);

        store.refresh().await.unwrap();
        let err = store.refresh().await.unwrap_err();

        assert!(matches!(err, AuthError::UpstreamFetchFailure(_)));
        assert_eq!(store.snapshot().await.kids(), vec!["key-a"]);
    }

    #[tokio::test]
    async fn test_malformed_entries_are_skipped_and_siblings_kept() {
        let key = TestSigningKey::primary("key-a");
        let source = ScriptedSource::new(vec![Ok(json!({"keys": [
            key.jwk_json(),
            {"kid": 42, "x5c": ["AAAA"]},
            {"kid": "other", "x5c": "not-an-array"},
            {"kid": "mixed", "x5c": [7, key.certificate_der_b64()]},
            "not-an-object",
        ]}))]);
        let store = KeyStore::new(source);

        store.refresh().await.unwrap();

        assert_eq!(store.snapshot().await.kids(), vec!["key-a"]);
        assert!(matches!(
            store.lookup("key-a").await,
            Some(VerificationKey::Rsa(_))
        ));
    }

    #[tokio::test]
    async fn test_document_without_keys_array_fails_refresh() {
        let source = ScriptedSource::new(vec![Ok(json!({"keys": {"kid": "key-a"}}))]);
        let store = KeyStore::new(source);

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamFetchFailure(_)));
    }

    #[tokio::test]
    async fn test_concurrent_readers_see_whole_snapshots() {
        let a = TestSigningKey::primary("key-a");
        let b = TestSigningKey::rotated("key-b");
        let source = ScriptedSource::new(vec![
            Ok(jwks_document(&[a.jwk_json()])),
            Ok(jwks_document(&[a.jwk_json(), b.jwk_json()])),
        ]);
        let store = Arc::new(KeyStore::new(source));
        store.refresh().await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..20 {
                    store.refresh().await.unwrap();
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                for _ in 0..50 {
                    let snapshot = store.snapshot().await;
                    let kids = snapshot.kids();
                    assert!(
                        kids == vec!["key-a"] || kids == vec!["key-a", "key-b"],
                        "unexpected snapshot {kids:?}"
                    );
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.key_count().await, 2);
    }

    #[tokio::test]
    async fn test_http_source_fetches_document() {
        let mock_server = MockServer::start().await;
        let key = TestSigningKey::primary("http-key");

        Mock::given(method("GET"))
            .and(path(DEFAULT_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(&[key.jwk_json()])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let source = HttpJwksSource::new(client, DEFAULT_JWKS_PATH);
        assert_eq!(source.url(), format!("{}{}", mock_server.uri(), DEFAULT_JWKS_PATH));

        let doc = source.fetch_jwks().await.unwrap();
        assert_eq!(doc.keys.len(), 1);
        assert_eq!(doc.keys[0]["kid"], "http-key");
    }

    #[tokio::test]
    async fn test_http_source_maps_errors_to_upstream_failure() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DEFAULT_JWKS_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let source = HttpJwksSource::new(client, DEFAULT_JWKS_PATH);

        let err = source.fetch_jwks().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamFetchFailure(_)));
    }

    #[tokio::test]
    async fn test_http_source_rejects_non_jwks_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(DEFAULT_JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new(mock_server.uri(), Duration::from_secs(5)).unwrap();
        let store = KeyStore::new(Arc::new(HttpJwksSource::new(client, DEFAULT_JWKS_PATH)));

        let err = store.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::UpstreamFetchFailure(_)));
        assert_eq!(store.key_count().await, 0);
    }
}
