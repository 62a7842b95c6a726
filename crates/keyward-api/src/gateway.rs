//! The admission HTTP server: validates requests, deduplicates sessions
//! against the cache, and enqueues tasks. No MPC work happens here.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use governor::{DefaultKeyedRateLimiter, Quota};
use keyward_blobstore::BlobStore;
use keyward_cache::Cache;
use keyward_core::requests::{
    KeysignRequest, MigrationRequest, ReshareRequest, VaultCreateRequest, VaultGetResponse,
    VaultResendRequest,
};
use keyward_core::{Config, LibType, Metrics, RngSource, TaskKind};
use keyward_queue::TaskQueue;
use keyward_state::LocalStateAccessor;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;

/// Request bodies are capped at 2 MiB per the admission contract.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[derive(Clone)]
pub struct AdmissionState {
    pub config: Arc<Config>,
    pub cache: Arc<dyn Cache>,
    pub queue: Arc<dyn TaskQueue>,
    pub blob_store: Arc<BlobStore>,
    pub rng: Arc<dyn RngSource>,
    pub metrics: Arc<dyn Metrics>,
}

/// Build the admission router: routes plus the body-size cap and per-source
/// rate limiter layered over every endpoint. Serve with
/// `into_make_service_with_connect_info::<SocketAddr>()` so the rate
/// limiter can key off the caller's address.
pub fn build_router(state: AdmissionState) -> Router {
    let limiter: Arc<DefaultKeyedRateLimiter<IpAddr>> = Arc::new(DefaultKeyedRateLimiter::keyed(
        Quota::per_second(NonZeroU32::new(5).expect("5 is nonzero"))
            .allow_burst(NonZeroU32::new(30).expect("30 is nonzero")),
    ));

    Router::new()
        .route("/ping", get(ping))
        .route("/getDerivedPublicKey", get(get_derived_public_key))
        .route("/vault/create", post(vault_create))
        .route("/vault/reshare", post(vault_reshare))
        .route("/vault/migrate", post(vault_migrate))
        .route("/vault/sign", post(vault_sign))
        .route("/vault/get/:pub_key", get(vault_get))
        .route("/vault/exist/:pub_key", get(vault_exist))
        .route("/vault/resend", post(vault_resend))
        .route("/vault/verify/:pub_key/:code", get(vault_verify))
        .layer(tower_http::limit::RequestBodyLimitLayer::new(
            MAX_BODY_BYTES,
        ))
        .layer(middleware::from_fn_with_state(limiter, rate_limit))
        .with_state(state)
}

async fn rate_limit(
    State(limiter): State<Arc<DefaultKeyedRateLimiter<IpAddr>>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if limiter.check_key(&addr.ip()).is_err() {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }
    next.run(request).await
}

async fn ping() -> &'static str {
    "Vultisig"
}

#[derive(Debug, Deserialize)]
struct DerivedPublicKeyQuery {
    public_key: String,
    hex_chain_code: String,
    derive_path: String,
    #[serde(default)]
    is_eddsa: bool,
}

/// Pure function of its inputs: no MPC engine, no network call. The real
/// BIP32/SLIP-10-style child-key derivation this stands in for is an
/// external library call in the source system and stays out of scope here
/// (see the MPC crate's module doc); this derives a stable digest instead
/// so repeated calls for the same inputs always agree.
async fn get_derived_public_key(
    axum::extract::Query(params): axum::extract::Query<DerivedPublicKeyQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !keyward_core::validate::is_hex_string(&params.hex_chain_code) {
        return Err(ApiError::BadRequest(
            "hex_chain_code is not valid hex".into(),
        ));
    }
    let derived = derive_public_key(
        &params.public_key,
        &params.hex_chain_code,
        &params.derive_path,
        params.is_eddsa,
    );
    Ok(Json(json!({ "public_key": derived })))
}

fn derive_public_key(
    public_key: &str,
    hex_chain_code: &str,
    derive_path: &str,
    is_eddsa: bool,
) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(public_key.as_bytes());
    hasher.update(hex_chain_code.as_bytes());
    hasher.update(derive_path.as_bytes());
    hasher.update([is_eddsa as u8]);
    hex::encode(hasher.finalize())
}

async fn vault_create(
    State(state): State<AdmissionState>,
    Json(req): Json<VaultCreateRequest>,
) -> Result<StatusCode, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;
    if dedup_hit(
        &state,
        &req.session_id,
        keyward_cache::keys::SESSION_TTL_PROVISIONING,
    )
    .await?
    {
        return Ok(StatusCode::OK);
    }
    state.metrics.incr_counter("vault.create", &[]);
    let kind = match req.lib_type {
        LibType::Gg20 => TaskKind::Keygen,
        LibType::Dkls => TaskKind::KeygenDkls,
    };
    state
        .queue
        .enqueue(
            kind,
            serde_json::to_vec(&req).expect("VaultCreateRequest serializes"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vault_reshare(
    State(state): State<AdmissionState>,
    Json(req): Json<ReshareRequest>,
) -> Result<StatusCode, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;
    if dedup_hit(
        &state,
        &req.session_id,
        keyward_cache::keys::SESSION_TTL_PROVISIONING,
    )
    .await?
    {
        return Ok(StatusCode::OK);
    }
    state.metrics.incr_counter("vault.reshare", &[]);
    let kind = match req.lib_type {
        LibType::Gg20 => TaskKind::Reshare,
        LibType::Dkls => TaskKind::ReshareDkls,
    };
    state
        .queue
        .enqueue(
            kind,
            serde_json::to_vec(&req).expect("ReshareRequest serializes"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vault_migrate(
    State(state): State<AdmissionState>,
    Json(req): Json<MigrationRequest>,
) -> Result<StatusCode, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;
    if dedup_hit(
        &state,
        &req.session_id,
        keyward_cache::keys::SESSION_TTL_PROVISIONING,
    )
    .await?
    {
        return Ok(StatusCode::OK);
    }
    state.metrics.incr_counter("vault.migrate", &[]);
    state
        .queue
        .enqueue(
            TaskKind::Migrate,
            serde_json::to_vec(&req).expect("MigrationRequest serializes"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vault_sign(
    State(state): State<AdmissionState>,
    headers: HeaderMap,
    Json(req): Json<KeysignRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    req.validate().map_err(ApiError::BadRequest)?;
    if dedup_hit(
        &state,
        &req.session_id,
        keyward_cache::keys::SESSION_TTL_SIGNING,
    )
    .await?
    {
        return Ok(Json(json!({ "task_id": null, "status": "already_running" })));
    }
    state.metrics.incr_counter("vault.sign", &[]);

    let password = password_from_headers(&headers).unwrap_or_else(|| req.vault_password.clone());
    let filename = format!("{}.bak", req.public_key);
    let accessor = LocalStateAccessor::from_backup(&state.blob_store, &filename, &password)?;
    let vault = accessor
        .vault()
        .ok_or_else(|| ApiError::NotFound("vault not found".into()))?;

    let kind = match vault.lib_type {
        LibType::Gg20 => TaskKind::Keysign,
        LibType::Dkls => TaskKind::KeysignDkls,
    };
    let task_id = state
        .queue
        .enqueue(
            kind,
            serde_json::to_vec(&req).expect("KeysignRequest serializes"),
        )
        .await?;
    Ok(Json(json!({ "task_id": task_id.to_string() })))
}

async fn vault_get(
    State(state): State<AdmissionState>,
    Path(pub_key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<VaultGetResponse>, ApiError> {
    require_valid_hash(&pub_key)?;
    let password = password_from_headers(&headers)
        .ok_or_else(|| ApiError::BadRequest("x-password header is required".into()))?;
    let filename = format!("{pub_key}.bak");
    let accessor = LocalStateAccessor::from_backup(&state.blob_store, &filename, &password)?;
    let vault = accessor
        .vault()
        .ok_or_else(|| ApiError::NotFound("vault not found".into()))?;
    Ok(Json(VaultGetResponse {
        name: vault.name.clone(),
        public_key_ecdsa: vault.public_key_ecdsa.clone(),
        public_key_eddsa: vault.public_key_eddsa.clone(),
        hex_chain_code: vault.hex_chain_code.clone(),
        local_party_id: vault.local_party_id.clone(),
    }))
}

async fn vault_exist(
    State(state): State<AdmissionState>,
    Path(pub_key): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_valid_hash(&pub_key)?;
    let filename = format!("{pub_key}.bak");
    if state.blob_store.file_exists(&filename) {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::NotFound("vault not found".into()))
    }
}

async fn vault_resend(
    State(state): State<AdmissionState>,
    headers: HeaderMap,
    Json(req): Json<VaultResendRequest>,
) -> Result<StatusCode, ApiError> {
    require_valid_hash(&req.public_key_ecdsa)?;

    let cooldown_key = keyward_cache::keys::resend_cooldown_key(&req.public_key_ecdsa);
    if keyward_cache::exists(state.cache.as_ref(), &cooldown_key).await? {
        return Err(ApiError::TooManyRequests(
            "resend already requested within the last 3 minutes".into(),
        ));
    }

    let password = password_from_headers(&headers).unwrap_or_else(|| req.password.clone());
    let filename = format!("{}.bak", req.public_key_ecdsa);
    let accessor = LocalStateAccessor::from_backup(&state.blob_store, &filename, &password)?;
    let vault = accessor
        .vault()
        .ok_or_else(|| ApiError::NotFound("vault not found".into()))?;

    state
        .cache
        .set(
            &cooldown_key,
            &req.public_key_ecdsa,
            keyward_cache::keys::RESEND_COOLDOWN_TTL,
        )
        .await?;

    // Worker-owned keygen/reshare flows persist-and-email in one step; a
    // resend re-reads the existing backup bytes and drives the same email
    // task directly instead of duplicating that persistence logic here.
    let backup = state.blob_store.get_file(&filename)?;
    let code = format!("{:04}", state.rng.verification_code());
    state
        .cache
        .set(
            &keyward_cache::keys::verification_code_key(&req.public_key_ecdsa),
            &code,
            keyward_cache::keys::VERIFICATION_CODE_TTL,
        )
        .await?;

    use base64::Engine as _;
    let task = keyward_core::requests::EmailVaultBackupTask {
        email: req.email.clone(),
        file_name: vault.backup_filename(),
        file_content_base64: base64::engine::general_purpose::STANDARD.encode(&backup),
        vault_name: vault.name.clone(),
        code,
    };
    state
        .queue
        .enqueue(
            TaskKind::EmailVaultBackup,
            serde_json::to_vec(&task).expect("EmailVaultBackupTask serializes"),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn vault_verify(
    State(state): State<AdmissionState>,
    Path((pub_key, code)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    require_valid_hash(&pub_key)?;
    let key = keyward_cache::keys::verification_code_key(&pub_key);
    let stored = state.cache.get(&key).await?;
    match stored {
        Some(stored_code) if stored_code == code => {
            state
                .cache
                .expire(&key, keyward_cache::keys::VERIFICATION_CODE_TTL_AFTER_CONSUME)
                .await?;
            Ok(StatusCode::OK)
        }
        _ => Err(ApiError::BadRequest(
            "verification code does not match".into(),
        )),
    }
}

fn require_valid_hash(pub_key: &str) -> Result<(), ApiError> {
    if keyward_core::validate::is_valid_public_key_ecdsa(pub_key) {
        Ok(())
    } else {
        Err(ApiError::BadRequest("invalid public key".into()))
    }
}

fn password_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-password")
        .and_then(|v| v.to_str().ok())
        .map(keyward_core::validate::extract_password)
}

/// `GET session_id`; if present, the request is a duplicate of one already
/// admitted and should be treated as accepted without re-enqueuing. Else
/// `SET session_id EX=<ttl>`.
async fn dedup_hit(
    state: &AdmissionState,
    session_id: &str,
    ttl: std::time::Duration,
) -> Result<bool, ApiError> {
    if keyward_cache::exists(state.cache.as_ref(), session_id).await? {
        return Ok(true);
    }
    state.cache.set(session_id, session_id, ttl).await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_cache::InMemoryCache;
    use keyward_core::config::{BlobStoreConfig, CacheConfig, EmailConfig, RelayConfig, ServerConfig};
    use keyward_core::rng::OsRngSource;
    use keyward_core::{LibType, NoopMetrics};
    use keyward_queue::InMemoryQueue;
    use tempfile::tempdir;

    fn test_state(dir: &std::path::Path) -> AdmissionState {
        let config = Config {
            relay: RelayConfig {
                server: "https://relay.example".into(),
                verification_server: None,
            },
            cache: CacheConfig::default(),
            blob_store: BlobStoreConfig {
                vaults_file_path: dir.to_string_lossy().into_owned(),
            },
            email: EmailConfig {
                api_key: "key".into(),
                sending_domain: "keyward.example".into(),
                template_name: "fastvault".into(),
                gateway_url: "https://gateway.example/send".into(),
            },
            server: ServerConfig::default(),
        };
        AdmissionState {
            config: Arc::new(config),
            cache: Arc::new(InMemoryCache::new()),
            queue: Arc::new(InMemoryQueue::new()),
            blob_store: Arc::new(BlobStore::open(dir).unwrap()),
            rng: Arc::new(OsRngSource),
            metrics: Arc::new(NoopMetrics),
        }
    }

    fn valid_create() -> VaultCreateRequest {
        VaultCreateRequest {
            name: "v".into(),
            session_id: "550e8400-e29b-41d4-a716-446655440000".into(),
            hex_encryption_key: "ab".repeat(32),
            hex_chain_code: "cd".repeat(32),
            local_party_id: "party-1".into(),
            encryption_password: "pw".into(),
            email: "user@example.com".into(),
            lib_type: LibType::Gg20,
        }
    }

    #[tokio::test]
    async fn ping_responds() {
        assert_eq!(ping().await, "Vultisig");
    }

    #[tokio::test]
    async fn create_request_rejects_invalid_session_id() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let mut req = valid_create();
        req.session_id = "not-a-uuid".into();
        let err = vault_create(State(state), Json(req)).await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn create_request_dedups_same_session() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let req = valid_create();
        let first = vault_create(State(state.clone()), Json(req.clone()))
            .await
            .unwrap();
        assert_eq!(first, StatusCode::NO_CONTENT);
        let second = vault_create(State(state), Json(req)).await.unwrap();
        assert_eq!(second, StatusCode::OK);
    }

    #[tokio::test]
    async fn exist_rejects_malformed_hash_before_touching_storage() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let err = vault_exist(State(state), Path("not-hex".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn exist_reports_not_found_for_unknown_vault() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let err = vault_exist(State(state), Path("a".repeat(66)))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_code() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let pub_key = "a".repeat(66);
        state
            .cache
            .set(
                &keyward_cache::keys::verification_code_key(&pub_key),
                "1234",
                keyward_cache::keys::VERIFICATION_CODE_TTL,
            )
            .await
            .unwrap();
        let err = vault_verify(State(state), Path((pub_key, "0000".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn verify_accepts_matching_code_and_shortens_ttl() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let pub_key = "a".repeat(66);
        state
            .cache
            .set(
                &keyward_cache::keys::verification_code_key(&pub_key),
                "1234",
                keyward_cache::keys::VERIFICATION_CODE_TTL,
            )
            .await
            .unwrap();
        let status = vault_verify(State(state), Path((pub_key, "1234".into())))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn resend_is_rate_limited_by_cooldown() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let pub_key = "a".repeat(66);
        state
            .cache
            .set(
                &keyward_cache::keys::resend_cooldown_key(&pub_key),
                &pub_key,
                keyward_cache::keys::RESEND_COOLDOWN_TTL,
            )
            .await
            .unwrap();
        let req = VaultResendRequest {
            public_key_ecdsa: pub_key,
            password: "pw".into(),
            email: "user@example.com".into(),
        };
        let err = vault_resend(State(state), HeaderMap::new(), Json(req))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::TooManyRequests(_)));
    }

    #[test]
    fn derived_public_key_is_pure_and_deterministic() {
        let a = derive_public_key("pub", "cc", "m/44/0", false);
        let b = derive_public_key("pub", "cc", "m/44/0", false);
        assert_eq!(a, b);
        let c = derive_public_key("pub", "cc", "m/44/1", false);
        assert_ne!(a, c);
    }
}
