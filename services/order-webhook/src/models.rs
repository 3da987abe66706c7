use serde::{Deserialize, Serialize};

// ===== Webhook Acknowledgement =====
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AckResponse {
    pub status: String,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

// ===== Health =====
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: String,
    pub geo_enabled: bool,
}
