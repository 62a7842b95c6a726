//! The `email_vault_backup` handler: builds the template-provider payload
//! and POSTs it to the configured gateway. Any non-2xx response is a
//! permanent failure — the email never arrives from a second attempt with
//! the same payload.

use keyward_core::requests::EmailVaultBackupTask;
use keyward_queue::QueuedTask;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{Worker, WorkerError};

#[derive(Serialize)]
struct TemplateContentEntry<'a> {
    name: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MergeVar<'a> {
    rcpt: &'a str,
    vars: Vec<TemplateContentEntry<'a>>,
}

#[derive(Serialize)]
struct Recipient<'a> {
    email: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Attachment<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    name: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Message<'a> {
    to: Vec<Recipient<'a>>,
    merge_vars: Vec<MergeVar<'a>>,
    sending_domain: &'a str,
    attachments: Vec<Attachment<'a>>,
}

#[derive(Serialize)]
struct TemplatePayload<'a> {
    key: &'a str,
    template_name: &'a str,
    template_content: Vec<TemplateContentEntry<'a>>,
    message: Message<'a>,
}

pub async fn handle(
    worker: &Worker,
    task: &QueuedTask,
    shutdown: &CancellationToken,
) -> Result<Vec<u8>, WorkerError> {
    if shutdown.is_cancelled() {
        return Err(WorkerError::Cancelled);
    }
    let req: EmailVaultBackupTask = serde_json::from_slice(&task.payload)?;
    worker.metrics.incr_counter("worker.email.vault_backup", &[]);
    tracing::info!(email = %req.email, vault_name = %req.vault_name, "sending vault backup email");

    let template_content = vec![
        TemplateContentEntry {
            name: "VAULT_NAME",
            content: &req.vault_name,
        },
        TemplateContentEntry {
            name: "VERIFICATION_CODE",
            content: &req.code,
        },
    ];

    let payload = TemplatePayload {
        key: &worker.config.email.api_key,
        template_name: &worker.config.email.template_name,
        template_content: template_content.iter().map(clone_entry).collect(),
        message: Message {
            to: vec![Recipient {
                email: &req.email,
                kind: "to",
            }],
            merge_vars: vec![MergeVar {
                rcpt: &req.email,
                vars: template_content,
            }],
            sending_domain: &worker.config.email.sending_domain,
            attachments: vec![Attachment {
                content_type: "application/octet-stream",
                name: &req.file_name,
                content: &req.file_content_base64,
            }],
        },
    };

    let response = worker
        .http
        .post(&worker.config.email.gateway_url)
        .json(&payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(WorkerError::EmailGateway(response.status()));
    }

    Ok(b"email sent".to_vec())
}

fn clone_entry<'a>(entry: &TemplateContentEntry<'a>) -> TemplateContentEntry<'a> {
    TemplateContentEntry {
        name: entry.name,
        content: entry.content,
    }
}
