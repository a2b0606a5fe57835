use serde::Deserialize;

/// Payload of a successful `POST /access/ticket`.
///
/// Both fields are optional on the wire; the login service treats either
/// being absent as an authentication failure, because every subsequent
/// mutating call needs both.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub data: LoginData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub ticket: Option<String>,
    #[serde(default, rename = "CSRFPreventionToken")]
    pub csrf_token: Option<String>,
}
