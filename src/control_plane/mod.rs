//! Control-plane API client.
//!
//! The control plane is the remote service that owns the cloud phones. It is
//! only used for best-effort online/offline hints and for asking it to reboot
//! a device; app recovery itself runs over the device-control channel.

mod client;
mod device_status;

pub use client::HttpControlPlane;
pub use device_status::{extract_records, DeviceStatus, OnlineHints};

use async_trait::async_trait;

/// Control-plane call failures. None of these are retried by the client
/// except the single verb fallback on HTTP 405.
#[derive(Debug, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("unauthorized (HTTP {status}): {body}")]
    Unauthorized { status: u16, body: String },
    #[error("control plane unreachable: {0}")]
    Unreachable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("local clock is {skew_secs}s away from the server clock; signatures will be rejected")]
    ClockSkew { skew_secs: i64 },
    #[error("signing failed: {0}")]
    Signing(#[from] crate::signing::SigningError),
}

/// Operations the supervisor needs from the control plane.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// One page of the device listing (1-based).
    async fn list_devices(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<DeviceStatus>, ControlPlaneError>;

    /// Raw detail record of one device.
    async fn device_detail(&self, device_id: &str) -> Result<serde_json::Value, ControlPlaneError>;

    /// Ask the control plane to reboot a device. `Ok(false)` when the service
    /// answered but refused.
    async fn request_restart(&self, device_id: &str) -> Result<bool, ControlPlaneError>;

    /// Every page of the listing, stopping at the first short page or after
    /// `max_pages`.
    async fn list_all_devices(
        &self,
        page_size: u32,
        max_pages: u32,
    ) -> Result<Vec<DeviceStatus>, ControlPlaneError> {
        let mut all = Vec::new();
        for page in 1..=max_pages {
            let batch = self.list_devices(page, page_size).await?;
            let short = (batch.len() as u64) < u64::from(page_size);
            all.extend(batch);
            if short {
                break;
            }
        }
        Ok(all)
    }
}
