use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity toolkit
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OobCodeRequest<'a> {
    pub request_type: &'a str,
    pub email: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: u16,
    pub message: String,
}

impl ErrorBody {
    /// Provider messages look like `"WEAK_PASSWORD : Password should be ..."`;
    /// only the leading code is meaningful.
    pub fn code_str(&self) -> &str {
        self.message.split(" : ").next().unwrap_or_default().trim()
    }
}

// ---------------------------------------------------------------------------
// Realtime database stream
// ---------------------------------------------------------------------------

/// Body of `put` and `patch` stream events.
#[derive(Debug, Deserialize)]
pub struct StreamPayload {
    pub path: String,
    #[serde(default)]
    pub data: serde_json::Value,
}
