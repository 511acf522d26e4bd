//! Signed HTTP client for the control plane.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{ControlPlane, ControlPlaneError, DeviceStatus};
use crate::config::{defaults, ApiConfig};
use crate::signing::{self, SigningProfile};
use crate::types::Credential;

/// Longest response excerpt carried in an error.
const ERROR_BODY_LIMIT: usize = 200;

/// Control-plane client bound to one account's credentials.
#[derive(Clone)]
pub struct HttpControlPlane {
    http: reqwest::Client,
    base_url: String,
    profile: SigningProfile,
    credential: Credential,
    list_path: String,
    detail_path: String,
    restart_path: String,
    prefer_get: bool,
    success_codes: Vec<i64>,
}

impl HttpControlPlane {
    pub fn new(api: &ApiConfig, credential: Credential) -> Result<Self, ControlPlaneError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(api.timeout_seconds))
            .build()
            .map_err(|e| ControlPlaneError::Unreachable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: api.base_url(),
            profile: api.signing_profile(),
            credential,
            list_path: api.list_path.clone(),
            detail_path: api.detail_path.clone(),
            restart_path: api.restart_path.clone(),
            prefer_get: api.prefers_get(),
            success_codes: api.success_codes.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one logical call: preferred verb, then the alternate verb once
    /// if the service answers 405.
    async fn call(&self, path: &str, payload: &Value) -> Result<Value, ControlPlaneError> {
        let (first, second) = if self.prefer_get {
            (Method::GET, Method::POST)
        } else {
            (Method::POST, Method::GET)
        };

        match self.send(&first, path, payload).await {
            Err(ControlPlaneError::Rejected { status: 405, .. }) => {
                debug!(path, from = %first, to = %second, "Method not allowed, retrying with alternate verb");
                self.send(&second, path, payload).await
            }
            other => other,
        }
    }

    async fn send(&self, method: &Method, path: &str, payload: &Value) -> Result<Value, ControlPlaneError> {
        let (query, body) = if *method == Method::GET {
            (signing::canonical_query(&query_pairs(payload)), Vec::new())
        } else {
            (String::new(), serde_json::to_vec(payload).unwrap_or_default())
        };

        let signed = signing::sign(
            &self.profile,
            &self.credential,
            method.as_str(),
            path,
            &query,
            &body,
            Utc::now(),
        )?;

        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }

        let mut request = self.http.request(method.clone(), &url);
        for (name, value) in &signed.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if *method != Method::GET {
            request = request.body(signed.body.clone());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ControlPlaneError::Unreachable(e.to_string()))?;

        let status = resp.status();
        check_clock_skew(resp.headers())?;

        let text = resp
            .text()
            .await
            .map_err(|e| ControlPlaneError::Unreachable(e.to_string()))?;

        debug!(%method, path, status = status.as_u16(), "Control-plane response");

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ControlPlaneError::Unauthorized {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }
        if status.is_server_error() {
            return Err(ControlPlaneError::Unreachable(format!(
                "HTTP {}: {}",
                status.as_u16(),
                excerpt(&text)
            )));
        }
        if !status.is_success() {
            return Err(ControlPlaneError::Rejected {
                status: status.as_u16(),
                body: excerpt(&text),
            });
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ControlPlaneError::Malformed(format!("{e}: {}", excerpt(&text))))?;
        let code = application_code(&value).ok_or_else(|| {
            ControlPlaneError::Malformed(format!(
                "no 'code' or 'status' field: {}",
                excerpt(&text)
            ))
        })?;

        if self.success_codes.contains(&code) {
            Ok(value)
        } else {
            let message = value
                .get("msg")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Err(ControlPlaneError::Api { code, message })
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn list_devices(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<DeviceStatus>, ControlPlaneError> {
        let response = self
            .call(&self.list_path, &json!({"page": page, "rows": page_size}))
            .await?;
        Ok(DeviceStatus::from_response(&response))
    }

    async fn device_detail(&self, device_id: &str) -> Result<Value, ControlPlaneError> {
        let response = self
            .call(&self.detail_path, &json!({"padCode": device_id}))
            .await?;
        Ok(response.get("data").cloned().unwrap_or(Value::Null))
    }

    async fn request_restart(&self, device_id: &str) -> Result<bool, ControlPlaneError> {
        let payload = json!({"padCodes": [device_id], "changeIpFlag": false});
        match self.call(&self.restart_path, &payload).await {
            Ok(_) => Ok(true),
            Err(ControlPlaneError::Api { code, message }) => {
                warn!(device = device_id, code, message = %message, "Control plane refused device restart");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Top-level fields of a JSON payload as query pairs. Strings are used as-is,
/// everything else as compact JSON text.
fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    payload
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Embedded status code (`code`, else `status`); numeric strings are accepted.
fn application_code(value: &Value) -> Option<i64> {
    match value.get("code").or_else(|| value.get("status"))? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn check_clock_skew(headers: &reqwest::header::HeaderMap) -> Result<(), ControlPlaneError> {
    let Some(server_time) = headers
        .get(reqwest::header::DATE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v).ok())
    else {
        return Ok(());
    };
    let skew_secs = (Utc::now() - server_time.with_timezone(&Utc)).num_seconds();
    if skew_secs.abs() > defaults::MAX_CLOCK_SKEW_SECS {
        return Err(ControlPlaneError::ClockSkew { skew_secs });
    }
    Ok(())
}

fn excerpt(text: &str) -> String {
    if text.len() <= ERROR_BODY_LIMIT {
        return text.to_string();
    }
    let mut end = ERROR_BODY_LIMIT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
