use serde::Serialize;

/// Form body for `POST /access/ticket`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
