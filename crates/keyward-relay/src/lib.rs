//! Relay messenger: encrypts, hashes, and POSTs sequenced envelopes to a
//! relay server (or, for the verification flow, a separate verification
//! server) on behalf of one MPC session.

mod cipher;

use base64::Engine as _;
use md5::{Digest as Md5Digest, Md5};
use serde::Serialize;
use thiserror::Error;

pub use cipher::CipherError;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("relay body must not be empty")]
    EmptyBody,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("relay responded {0}, expected 202 Accepted")]
    UnexpectedStatus(reqwest::StatusCode),
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    to: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<&'a str>,
    #[serde(skip_serializing_if = "is_zero")]
    sequence_no: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// One party's channel to a relay server for a single MPC session.
///
/// `server` and `verification_server` are fixed at construction time by
/// calling the matching constructor ([`Messenger::for_relay`] or
/// [`Messenger::for_verification`]) rather than toggled on a shared
/// instance, so a messenger's destination is never ambiguous mid-session.
pub struct Messenger {
    base_url: String,
    session_id: String,
    hex_encryption_key: Option<String>,
    is_gcm: bool,
    message_id: Option<String>,
    counter: u64,
    http: reqwest::Client,
}

impl Messenger {
    /// A messenger that posts to the main relay server.
    pub fn for_relay(
        server: impl Into<String>,
        session_id: impl Into<String>,
        hex_encryption_key: Option<String>,
        is_gcm: bool,
    ) -> Self {
        Self::new(server.into(), session_id.into(), hex_encryption_key, is_gcm)
    }

    /// A messenger that posts to the verification server instead (used for
    /// the resend/verify flow, which never touches peer relay traffic).
    pub fn for_verification(
        verification_server: impl Into<String>,
        session_id: impl Into<String>,
        hex_encryption_key: Option<String>,
        is_gcm: bool,
    ) -> Self {
        Self::new(
            verification_server.into(),
            session_id.into(),
            hex_encryption_key,
            is_gcm,
        )
    }

    fn new(
        base_url: String,
        session_id: String,
        hex_encryption_key: Option<String>,
        is_gcm: bool,
    ) -> Self {
        Self {
            base_url,
            session_id,
            hex_encryption_key,
            is_gcm,
            message_id: None,
            counter: 0,
            http: reqwest::Client::new(),
        }
    }

    /// Set the `message_id` header sent with every subsequent message.
    pub fn set_message_id(&mut self, message_id: impl Into<String>) {
        self.message_id = Some(message_id.into());
    }

    pub fn clear_message_id(&mut self) {
        self.message_id = None;
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Encrypt (if a key is configured), hash, and POST one message from
    /// `from` to `to`. Increments the envelope's sequence number on
    /// success.
    pub async fn send(&mut self, from: &str, to: &str, body: &str) -> Result<(), RelayError> {
        let wire_body = match &self.hex_encryption_key {
            Some(key) if !key.is_empty() => {
                let encrypted = if self.is_gcm {
                    cipher::encrypt_gcm(body.as_bytes(), key)?
                } else {
                    cipher::encrypt_cbc(body.as_bytes(), key)?
                };
                base64::engine::general_purpose::STANDARD.encode(encrypted)
            }
            _ => body.to_string(),
        };

        if wire_body.is_empty() {
            return Err(RelayError::EmptyBody);
        }

        let hash = hex::encode(Md5::digest(wire_body.as_bytes()));

        let envelope = Envelope {
            session_id: Some(self.session_id.as_str()),
            from: Some(from),
            to: vec![to],
            body: Some(wire_body.as_str()),
            hash: Some(hash.as_str()),
            sequence_no: self.counter,
        };

        let url = format!("{}/message/{}", self.base_url, self.session_id);
        let mut request = self.http.post(url).json(&envelope);
        if let Some(message_id) = &self.message_id {
            request = request.header("message_id", message_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::ACCEPTED {
            return Err(RelayError::UnexpectedStatus(status));
        }

        self.counter += 1;
        tracing::info!(from, to, hash = %hash, "message sent");
        Ok(())
    }
}
