//! Request validation helpers shared by the admission surface and the
//! worker's payload parsing. Kept dependency-light (no axum/http types) so
//! both crates can use it without pulling in a web framework.

/// `public_key_ecdsa` must be exactly 66 hex characters.
pub const PUBLIC_KEY_ECDSA_HEX_LEN: usize = 66;

/// `true` iff `s` is exactly `PUBLIC_KEY_ECDSA_HEX_LEN` hex characters.
pub fn is_valid_public_key_ecdsa(s: &str) -> bool {
    s.len() == PUBLIC_KEY_ECDSA_HEX_LEN && is_hex_string(s)
}

/// `true` iff every character of `s` is a hex digit and `s` is nonempty.
pub fn is_hex_string(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `true` iff `s` parses as a UUID (any version).
pub fn is_valid_session_id(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}

/// Extract the vault backup password from the `x-password` header value.
///
/// Per the admission spec: if the header is base64-decodable to a nonempty
/// byte string, the decoded bytes (interpreted as UTF-8, lossily) are the
/// password; otherwise the raw header value is used verbatim.
pub fn extract_password(header_value: &str) -> String {
    use base64::Engine as _;
    match base64::engine::general_purpose::STANDARD.decode(header_value) {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
        _ => header_value.to_string(),
    }
}
