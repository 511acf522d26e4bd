//! Control-plane request signing.
//!
//! Every control-plane call carries a time-scoped HMAC-SHA256 signature over a
//! canonical rendering of the request. The remote service recomputes the same
//! value, so the output here must be bit-exact:
//!
//! ```text
//! canonicalRequest = METHOD \n path \n query \n headerBlock \n \n signedHeaders \n bodyDigest
//! stringToSign     = algorithm \n x-date \n yyyymmdd/service/terminator \n sha256(canonicalRequest)
//! kDate    = HMAC(secretPrefix + secret, yyyymmdd)
//! kService = HMAC(kDate, service)
//! kSigning = HMAC(kService, terminator)
//! signature = hex(HMAC(kSigning, stringToSign))
//! ```
//!
//! The two deployed variants differ only in constants and are modelled as
//! [`SigningProfile`] values rather than separate code paths.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::defaults;
use crate::types::Credential;

type HmacSha256 = Hmac<Sha256>;

/// `x-date` format: compact ISO-8601 basic, UTC.
const X_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("HMAC key rejected: {0}")]
    InvalidKey(String),
}

// ============================================================================
// Profiles
// ============================================================================

/// Constants that distinguish one signing variant from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningProfile {
    pub host: String,
    pub content_type: String,
    pub algorithm: String,
    pub service: String,
    pub scope_terminator: String,
    /// Prepended to the secret before deriving `kDate`.
    pub secret_prefix: String,
}

impl SigningProfile {
    /// PaaS endpoints under `/vsphone/api/padApi/*`.
    pub fn armcloud_paas() -> Self {
        Self {
            host: defaults::API_HOST.to_string(),
            content_type: "application/json;charset=UTF-8".to_string(),
            algorithm: "HMAC-SHA256".to_string(),
            service: "armcloud-paas".to_string(),
            scope_terminator: "request".to_string(),
            secret_prefix: String::new(),
        }
    }

    /// SDK endpoints.
    pub fn vsphone_sdk() -> Self {
        Self {
            host: defaults::API_HOST.to_string(),
            content_type: "application/json".to_string(),
            algorithm: "SDK-HMAC-SHA256".to_string(),
            service: "vsphone".to_string(),
            scope_terminator: "sdk_request".to_string(),
            secret_prefix: "SDK".to_string(),
        }
    }
}

impl Default for SigningProfile {
    fn default() -> Self {
        Self::armcloud_paas()
    }
}

// ============================================================================
// Canonicalization
// ============================================================================

/// Canonical form of a request body.
///
/// Empty or whitespace-only bodies become empty. JSON bodies are
/// re-serialized with sorted object keys and no insignificant whitespace.
/// Anything else is used verbatim.
pub fn canonicalize_body(body: &[u8]) -> Vec<u8> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Vec::new();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_vec(&sorted(value)).unwrap_or_else(|_| body.to_vec()),
        Err(_) => body.to_vec(),
    }
}

/// Rebuild objects with keys in lexicographic order at every depth.
fn sorted(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<(String, serde_json::Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            serde_json::Value::Object(entries.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sorted).collect())
        }
        other => other,
    }
}

/// Percent-encoded query string with pairs sorted by key, then value.
pub fn canonical_query<K, V>(pairs: &[(K, V)]) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut encoded: Vec<(String, String)> = pairs
        .iter()
        .map(|(k, v)| {
            (
                urlencoding::encode(k.as_ref()).into_owned(),
                urlencoding::encode(v.as_ref()).into_owned(),
            )
        })
        .collect();
    encoded.sort();
    encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Lowercase hex SHA-256.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// The request exactly as the signature sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    pub method: String,
    pub uri_path: String,
    pub query: String,
    /// Sorted `name:value` lines joined by `\n`.
    pub header_block: String,
    /// Sorted header names joined by `;`.
    pub signed_headers: String,
    pub body_digest: String,
}

impl CanonicalRequest {
    pub fn to_canonical_string(&self) -> String {
        format!(
            "{}\n{}\n{}\n{}\n\n{}\n{}",
            self.method,
            self.uri_path,
            self.query,
            self.header_block,
            self.signed_headers,
            self.body_digest
        )
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Everything needed to put a signed request on the wire.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// Headers in send order: Content-Type, Host, X-Content-Sha256, X-Date, Authorization.
    pub headers: Vec<(String, String)>,
    /// Body bytes that were digested; send these, not the caller's original.
    pub body: Vec<u8>,
    pub canonical: CanonicalRequest,
    pub x_date: String,
    pub credential_scope: String,
    pub signature: String,
    pub authorization: String,
}

impl SignedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Sign one request.
///
/// Pure: the same inputs (including `now`) always produce the same output.
/// `method` is uppercased; `query` must already be canonical
/// (see [`canonical_query`]).
pub fn sign(
    profile: &SigningProfile,
    credential: &Credential,
    method: &str,
    path: &str,
    query: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<SignedRequest, SigningError> {
    let method = method.to_ascii_uppercase();
    let body = canonicalize_body(body);
    let body_digest = sha256_hex(&body);
    let x_date = now.format(X_DATE_FORMAT).to_string();
    let short_date = &x_date[..8];

    let mut signed: Vec<(&str, &str)> = vec![
        ("content-type", profile.content_type.as_str()),
        ("host", profile.host.as_str()),
        ("x-content-sha256", body_digest.as_str()),
        ("x-date", x_date.as_str()),
    ];
    signed.sort_by(|a, b| a.0.cmp(b.0));

    let header_block = signed
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed_headers = signed.iter().map(|(k, _)| *k).collect::<Vec<_>>().join(";");

    let canonical = CanonicalRequest {
        method,
        uri_path: path.to_string(),
        query: query.to_string(),
        header_block,
        signed_headers,
        body_digest: body_digest.clone(),
    };

    let credential_scope = format!(
        "{short_date}/{}/{}",
        profile.service, profile.scope_terminator
    );
    let string_to_sign = format!(
        "{}\n{x_date}\n{credential_scope}\n{}",
        profile.algorithm,
        sha256_hex(canonical.to_canonical_string().as_bytes())
    );

    let secret = format!("{}{}", profile.secret_prefix, credential.secret_key);
    let k_date = hmac_sha256(secret.as_bytes(), short_date.as_bytes())?;
    let k_service = hmac_sha256(&k_date, profile.service.as_bytes())?;
    let k_signing = hmac_sha256(&k_service, profile.scope_terminator.as_bytes())?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    let authorization = format!(
        "{} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        profile.algorithm, credential.access_key, canonical.signed_headers
    );

    let headers = vec![
        ("Content-Type".to_string(), profile.content_type.clone()),
        ("Host".to_string(), profile.host.clone()),
        ("X-Content-Sha256".to_string(), body_digest),
        ("X-Date".to_string(), x_date.clone()),
        ("Authorization".to_string(), authorization.clone()),
    ];

    Ok(SignedRequest {
        headers,
        body,
        canonical,
        x_date,
        credential_scope,
        signature,
        authorization,
    })
}
