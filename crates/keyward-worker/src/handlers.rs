//! One handler per [`TaskKind`], each parsing its JSON payload, running the
//! MPC engine, and persisting/publishing the result.

use base64::Engine as _;
use keyward_core::requests::{
    EmailVaultBackupTask, KeyGenerationTaskResult, KeysignRequest, MigrationRequest,
    ReshareRequest, VaultCreateRequest,
};
use keyward_core::{LibType, TaskKind, Vault};
use keyward_mpc::{KeygenContext, KeysignContext, MigrateContext, ReshareContext};
use keyward_queue::QueuedTask;
use keyward_relay::Messenger;
use keyward_state::LocalStateAccessor;
use tokio_util::sync::CancellationToken;

use crate::email;
use crate::{Worker, WorkerError};

fn check_cancellation(shutdown: &CancellationToken) -> Result<(), WorkerError> {
    if shutdown.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }
    Ok(())
}

/// CBC is the legacy encryption mode this system's relay traffic started
/// with (GG20); DKLS sessions use the newer authenticated GCM mode.
fn is_gcm_for(lib_type: LibType) -> bool {
    matches!(lib_type, LibType::Dkls)
}

pub async fn dispatch(
    worker: &Worker,
    task: &QueuedTask,
    shutdown: CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    check_cancellation(&shutdown)?;
    match task.kind {
        TaskKind::Keygen => handle_keygen(worker, task, LibType::Gg20, &shutdown).await,
        TaskKind::KeygenDkls => handle_keygen(worker, task, LibType::Dkls, &shutdown).await,
        TaskKind::Keysign => handle_keysign(worker, task, LibType::Gg20, &shutdown).await,
        TaskKind::KeysignDkls => handle_keysign(worker, task, LibType::Dkls, &shutdown).await,
        TaskKind::Reshare => handle_reshare(worker, task, LibType::Gg20, &shutdown).await,
        TaskKind::ReshareDkls => handle_reshare(worker, task, LibType::Dkls, &shutdown).await,
        TaskKind::Migrate => handle_migrate(worker, task, &shutdown).await,
        TaskKind::EmailVaultBackup => email::handle(worker, task, &shutdown).await,
    }
}

async fn handle_keygen(
    worker: &Worker,
    task: &QueuedTask,
    lib_type: LibType,
    shutdown: &CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    let req: VaultCreateRequest = serde_json::from_slice(&task.payload)?;
    req.validate().map_err(WorkerError::Invalid)?;
    worker.metrics.incr_counter("worker.vault.create", &[]);
    tracing::info!(session = %req.session_id, email = %req.email, "keygen request");
    check_cancellation(shutdown)?;

    let engine = keyward_mpc::engine_for(lib_type);
    let is_gcm = is_gcm_for(lib_type);
    let mut messenger = Messenger::for_relay(
        worker.config.relay.server.clone(),
        req.session_id.clone(),
        Some(req.hex_encryption_key.clone()),
        is_gcm,
    );
    let peers = vec![req.local_party_id.clone()];
    let output = engine
        .keygen(KeygenContext {
            session_id: &req.session_id,
            local_party_id: &req.local_party_id,
            peers: &peers,
            hex_chain_code: &req.hex_chain_code,
            messenger: Some(&mut messenger),
        })
        .await?;

    let mut vault = Vault::skeleton(
        req.name.clone(),
        req.hex_chain_code.clone(),
        req.local_party_id.clone(),
        peers,
        None,
        lib_type,
    );
    vault.public_key_ecdsa = output.public_key_ecdsa.clone();
    vault.public_key_eddsa = output.public_key_eddsa.clone();
    vault
        .key_shares
        .insert(output.public_key_ecdsa.clone(), output.key_share);

    persist_and_email(worker, &vault, &req.encryption_password, &req.email).await?;

    let result = KeyGenerationTaskResult {
        ecdsa_public_key: vault.public_key_ecdsa,
        eddsa_public_key: vault.public_key_eddsa,
    };
    Ok(serde_json::to_vec(&result)?)
}

async fn handle_keysign(
    worker: &Worker,
    task: &QueuedTask,
    lib_type: LibType,
    shutdown: &CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    let req: KeysignRequest = serde_json::from_slice(&task.payload)?;
    req.validate().map_err(WorkerError::Invalid)?;
    worker.metrics.incr_counter("worker.vault.sign", &[]);
    tracing::info!(
        public_key = %req.public_key,
        session = %req.session_id,
        messages = req.messages.len(),
        derive_path = %req.derive_path,
        is_ecdsa = req.is_ecdsa,
        "keysign request"
    );
    check_cancellation(shutdown)?;

    let filename = format!("{}.bak", req.public_key);
    let accessor =
        LocalStateAccessor::from_backup(&worker.blob_store, &filename, &req.vault_password)?;
    let vault = accessor
        .vault()
        .ok_or_else(|| WorkerError::Invalid("vault backup missing after load".into()))?;
    if vault.lib_type != lib_type {
        return Err(WorkerError::Invalid(format!(
            "vault is {:?}, task requested {:?}",
            vault.lib_type, lib_type
        )));
    }

    let engine = keyward_mpc::engine_for(lib_type);
    let is_gcm = is_gcm_for(lib_type);
    let mut messenger = Messenger::for_relay(
        worker.config.relay.server.clone(),
        req.session_id.clone(),
        Some(req.hex_encryption_key.clone()),
        is_gcm,
    );
    let signatures = engine
        .keysign(KeysignContext {
            vault,
            messages: &req.messages,
            derive_path: &req.derive_path,
            is_ecdsa: req.is_ecdsa,
            messenger: Some(&mut messenger),
        })
        .await?;

    Ok(serde_json::to_vec(&signatures)?)
}

async fn handle_reshare(
    worker: &Worker,
    task: &QueuedTask,
    lib_type: LibType,
    shutdown: &CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    let req: ReshareRequest = serde_json::from_slice(&task.payload)?;
    req.validate().map_err(WorkerError::Invalid)?;
    worker.metrics.incr_counter("worker.vault.reshare", &[]);
    tracing::info!(session = %req.session_id, email = %req.email, "reshare request");
    check_cancellation(shutdown)?;

    let filename = format!("{}.bak", req.public_key);
    let accessor = if worker.blob_store.file_exists(&filename) {
        Some(LocalStateAccessor::from_backup(
            &worker.blob_store,
            &filename,
            &req.encryption_password,
        )?)
    } else {
        None
    };
    let current_vault = accessor.as_ref().and_then(LocalStateAccessor::vault);

    let skeleton = if current_vault.is_none() {
        Some(Vault::skeleton(
            req.name.clone(),
            req.hex_chain_code.clone(),
            req.local_party_id.clone(),
            req.old_parties.clone(),
            req.old_reshare_prefix.clone(),
            lib_type,
        ))
    } else {
        None
    };

    let engine = keyward_mpc::engine_for(lib_type);
    let is_gcm = is_gcm_for(lib_type);
    let mut messenger = Messenger::for_relay(
        worker.config.relay.server.clone(),
        req.session_id.clone(),
        Some(req.hex_encryption_key.clone()),
        is_gcm,
    );
    let new_vault = engine
        .reshare(ReshareContext {
            session_id: &req.session_id,
            local_party_id: &req.local_party_id,
            current_vault,
            skeleton: skeleton.as_ref(),
            new_committee: &req.new_parties,
            messenger: Some(&mut messenger),
        })
        .await?;

    persist_and_email(worker, &new_vault, &req.encryption_password, &req.email).await?;
    Ok(serde_json::to_vec(&KeyGenerationTaskResult {
        ecdsa_public_key: new_vault.public_key_ecdsa,
        eddsa_public_key: new_vault.public_key_eddsa,
    })?)
}

async fn handle_migrate(
    worker: &Worker,
    task: &QueuedTask,
    shutdown: &CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    let req: MigrationRequest = serde_json::from_slice(&task.payload)?;
    req.validate().map_err(WorkerError::Invalid)?;
    worker.metrics.incr_counter("worker.vault.migrate.dkls", &[]);
    tracing::info!(session = %req.session_id, email = %req.email, "migrate request");
    check_cancellation(shutdown)?;

    let filename = format!("{}.bak", req.public_key);
    if !worker.blob_store.file_exists(&filename) {
        return Err(WorkerError::Invalid(
            "vault doesn't exist, fail to migrate".into(),
        ));
    }
    let accessor =
        LocalStateAccessor::from_backup(&worker.blob_store, &filename, &req.encryption_password)?;
    let gg20_vault = accessor
        .vault()
        .ok_or_else(|| WorkerError::Invalid("vault backup missing after load".into()))?;

    let engine = keyward_mpc::engine_for(LibType::Dkls);
    let mut messenger = Messenger::for_relay(
        worker.config.relay.server.clone(),
        req.session_id.clone(),
        Some(req.hex_encryption_key.clone()),
        true,
    );
    let dkls_vault = engine
        .migrate(MigrateContext {
            gg20_vault,
            messenger: Some(&mut messenger),
        })
        .await?;

    persist_and_email(worker, &dkls_vault, &req.encryption_password, &req.email).await?;
    Ok(serde_json::to_vec(&KeyGenerationTaskResult {
        ecdsa_public_key: dkls_vault.public_key_ecdsa,
        eddsa_public_key: dkls_vault.public_key_eddsa,
    })?)
}

/// Encrypt and upload the produced vault, then enqueue its backup email
/// with a fresh verification code — shared by keygen, reshare and migrate.
async fn persist_and_email(
    worker: &Worker,
    vault: &Vault,
    password: &str,
    email: &str,
) -> Result<(), WorkerError> {
    let backup = keyward_vault::encrypt_vault_backup(password, vault);
    worker
        .blob_store
        .upload_file(&vault.backup_filename(), &backup)?;

    let code = worker.rng.verification_code().to_string();
    let key = keyward_cache::keys::verification_code_key(&vault.public_key_ecdsa);
    worker
        .cache
        .set(&key, &code, keyward_cache::keys::VERIFICATION_CODE_TTL)
        .await?;

    let task = EmailVaultBackupTask {
        email: email.to_string(),
        file_name: vault.backup_filename(),
        file_content_base64: base64::engine::general_purpose::STANDARD.encode(&backup),
        vault_name: vault.name.clone(),
        code,
    };
    worker
        .queue
        .enqueue(TaskKind::EmailVaultBackup, serde_json::to_vec(&task)?)
        .await?;
    Ok(())
}
