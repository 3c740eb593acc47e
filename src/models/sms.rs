use serde::{Deserialize, Serialize};

/// Form body for the gateway's `Messages.json` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SmsRequest {
    #[serde(rename = "To")]
    pub to: String,

    #[serde(rename = "From")]
    pub from: String,

    #[serde(rename = "Body")]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmsResponse {
    pub sid: String,

    #[serde(default)]
    pub status: Option<String>,
}
