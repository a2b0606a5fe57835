use crate::{
    auth::application::{
        request::login_request::LoginRequest, response::login_response::LoginResponse,
    },
    config::ConnectionOptions,
    core::domain::error::{PveError, PveResult},
};
use reqwest::{Client, StatusCode};

/// The ticket stored after a successful login. Both halves must accompany
/// every subsequent request: the ticket as the `PVEAuthCookie` cookie, the
/// CSRF token as its own header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketAuth {
    pub ticket: String,
    pub csrf_token: String,
}

impl TicketAuth {
    pub fn as_cookie_header(&self) -> String {
        format!("PVEAuthCookie={}", self.ticket)
    }
}

/// Performs the ticket login against `POST /access/ticket`.
pub struct LoginService;

impl LoginService {
    pub fn new() -> Self {
        Self
    }

    /// Logs in with the username/password held by `options`.
    ///
    /// # Errors
    ///
    /// * `PveError::Authentication` for rejected credentials, or a response
    ///   missing the ticket or CSRF token
    /// * `PveError::Transport` when the endpoint is unreachable
    pub async fn execute(
        &self,
        client: &Client,
        options: &ConnectionOptions,
    ) -> PveResult<TicketAuth> {
        let (username, password) = match &options.credentials {
            crate::config::Credentials::UserPass { username, password } => {
                (username.clone(), password.clone())
            }
            crate::config::Credentials::Token(_) => {
                return Err(PveError::Authentication(
                    "ticket login is not applicable to token credentials".to_string(),
                ));
            }
        };

        let url = format!(
            "{}/api2/json/access/ticket",
            options.endpoint.as_str().trim_end_matches('/')
        );
        let request = LoginRequest { username, password };
        let response = client
            .post(&url)
            .form(&request)
            .send()
            .await
            .map_err(|e| PveError::Transport(format!("login request failed: {}", e)))?;

        match response.status() {
            StatusCode::OK => Self::handle_successful_login(response).await,
            StatusCode::UNAUTHORIZED => Err(PveError::Authentication(
                "invalid credentials provided".to_string(),
            )),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(PveError::Api {
                    status: status.as_u16(),
                    message: format!("unexpected login response status {}", status),
                    body,
                })
            }
        }
    }

    async fn handle_successful_login(response: reqwest::Response) -> PveResult<TicketAuth> {
        let login: LoginResponse = response.json().await.map_err(|e| {
            PveError::Transport(format!("failed to parse login response: {}", e))
        })?;
        let ticket = login.data.ticket.ok_or_else(|| {
            PveError::Authentication("login response did not contain a ticket".to_string())
        })?;
        let csrf_token = login.data.csrf_token.ok_or_else(|| {
            PveError::Authentication(
                "login response did not contain a CSRF prevention token".to_string(),
            )
        })?;
        Ok(TicketAuth { ticket, csrf_token })
    }
}

impl Default for LoginService {
    fn default() -> Self {
        Self::new()
    }
}
