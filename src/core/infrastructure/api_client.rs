//! Shared HTTP client for the PVE API.
//!
//! All requests target `{endpoint}/api2/json`. Writes are form-encoded,
//! reads come back in the `{data: ...}` envelope. Under ticket credentials
//! a `401` after a previously successful call triggers exactly one ticket
//! refresh and one retry before the error surfaces.

use crate::{
    auth::application::service::login_service::{LoginService, TicketAuth},
    config::{ConnectionOptions, Credentials},
    core::domain::error::{PveError, PveResult},
};
use governor::{DefaultDirectRateLimiter, Quota};
use log::debug;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The `{data: ...}` envelope every read endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Authenticated HTTP client shared by every reconciler for the lifetime
/// of the process.
#[derive(Debug)]
pub struct ApiClient {
    http_client: Client,
    options: Arc<ConnectionOptions>,
    ticket: Arc<RwLock<Option<TicketAuth>>>,
    rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl ApiClient {
    /// Creates a new `ApiClient`. Ticket credentials log in lazily on the
    /// first request.
    ///
    /// # Errors
    /// Returns `PveError::Transport` if the HTTP client cannot be built.
    pub fn new(options: ConnectionOptions) -> PveResult<Self> {
        let http_client = Client::builder()
            .danger_accept_invalid_certs(options.insecure_tls)
            .pool_max_idle_per_host(10)
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| PveError::Transport(e.to_string()))?;

        let rate_limiter = options.rate_limit.map(|rl| {
            let quota = Quota::per_second(NonZeroU32::new(rl.requests_per_second).unwrap())
                .allow_burst(NonZeroU32::new(rl.burst_size).unwrap());
            Arc::new(DefaultDirectRateLimiter::direct(quota))
        });

        Ok(Self {
            http_client,
            options: Arc::new(options),
            ticket: Arc::new(RwLock::new(None)),
            rate_limiter,
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.options.credentials
    }

    /// Performs a GET and unwraps the `data` envelope.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> PveResult<T> {
        self.execute(Method::GET, path, None::<&()>).await
    }

    /// Performs a form-encoded POST and unwraps the `data` envelope.
    pub async fn post<B, T>(&self, path: &str, body: Option<&B>) -> PveResult<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, body).await
    }

    /// Performs a form-encoded PUT and unwraps the `data` envelope.
    pub async fn put<B, T>(&self, path: &str, body: Option<&B>) -> PveResult<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        self.execute(Method::PUT, path, body).await
    }

    /// Performs a DELETE and unwraps the `data` envelope.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> PveResult<T> {
        self.execute(Method::DELETE, path, None::<&()>).await
    }

    async fn execute<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> PveResult<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        if let Some(limiter) = &self.rate_limiter {
            limiter.until_ready().await;
        }
        self.ensure_ticket().await?;

        let response = self.send_once(method.clone(), path, body).await?;

        // A 401 after a previously successful login means the ticket aged
        // out: refresh once and retry once.
        if response.status() == StatusCode::UNAUTHORIZED {
            match self.options.credentials {
                Credentials::UserPass { .. } => {
                    debug!("ticket rejected on {} {}, refreshing once", method, path);
                    self.refresh_ticket().await?;
                    let retried = self.send_once(method, path, body).await?;
                    return Self::handle_response(retried).await;
                }
                Credentials::Token(_) => {
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(PveError::Authentication(format!(
                        "API token rejected: {}",
                        body_text
                    )));
                }
            }
        }

        Self::handle_response(response).await
    }

    async fn send_once<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> PveResult<reqwest::Response>
    where
        B: serde::Serialize,
    {
        let base = self.options.endpoint.as_str().trim_end_matches('/');
        let url = format!("{}/api2/json/{}", base, path.trim_start_matches('/'));

        let mut request = self.http_client.request(method, &url);

        match &self.options.credentials {
            Credentials::Token(token) => {
                request = request.header("Authorization", format!("PVEAPIToken={}", token));
            }
            Credentials::UserPass { .. } => {
                let guard = self.ticket.read().await;
                if let Some(auth) = guard.as_ref() {
                    request = request
                        .header("Cookie", auth.as_cookie_header())
                        .header("CSRFPreventionToken", &auth.csrf_token);
                }
            }
        }

        if let Some(body) = body {
            request = request.form(body);
        }

        request
            .send()
            .await
            .map_err(|e| PveError::Transport(format!("HTTP request failed: {}", e)))
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> PveResult<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = Self::upstream_message(status, &body);
            if status == StatusCode::UNAUTHORIZED {
                return Err(PveError::Authentication(message));
            }
            if status == StatusCode::BAD_REQUEST || status == StatusCode::CONFLICT {
                return Err(PveError::Conflict {
                    status: status.as_u16(),
                    message,
                });
            }
            return Err(PveError::Api {
                status: status.as_u16(),
                message,
                body,
            });
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| PveError::Transport(format!("failed to parse response: {}", e)))?;
        Ok(envelope.data)
    }

    /// Pulls the per-field reasons out of the error body when PVE provides
    /// them; otherwise falls back to the raw body or the status line.
    fn upstream_message(status: StatusCode, body: &str) -> String {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(errors) = value.get("errors").and_then(|e| e.as_object()) {
                let rendered: Vec<String> = errors
                    .iter()
                    .map(|(field, message)| {
                        format!("{}: {}", field, message.as_str().unwrap_or_default())
                    })
                    .collect();
                if !rendered.is_empty() {
                    return rendered.join("; ");
                }
            }
            if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
                return message.trim().to_string();
            }
        }
        if !body.is_empty() {
            return body.to_string();
        }
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    }

    async fn ensure_ticket(&self) -> PveResult<()> {
        if !matches!(self.options.credentials, Credentials::UserPass { .. }) {
            return Ok(());
        }
        let missing = self.ticket.read().await.is_none();
        if missing {
            self.refresh_ticket().await?;
        }
        Ok(())
    }

    async fn refresh_ticket(&self) -> PveResult<()> {
        let auth = LoginService::new()
            .execute(&self.http_client, &self.options)
            .await?;
        let mut guard = self.ticket.write().await;
        *guard = Some(auth);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_string_contains, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn token_client(uri: &str) -> ApiClient {
        let options = ConnectionOptions::new(
            uri,
            Credentials::Token("automation@pve!tf=uuid".to_string()),
        )
        .unwrap();
        ApiClient::new(options).unwrap()
    }

    fn ticket_client(uri: &str) -> ApiClient {
        let options = ConnectionOptions::new(
            uri,
            Credentials::UserPass {
                username: "automation@pve".to_string(),
                password: "secret".to_string(),
            },
        )
        .unwrap();
        ApiClient::new(options).unwrap()
    }

    fn login_mock() -> wiremock::Mock {
        Mock::given(method("POST"))
            .and(path("/api2/json/access/ticket"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {
                    "ticket": "PVE:automation@pve:4EEC61E2::sig",
                    "CSRFPreventionToken": "4EEC61E2:abc123"
                }
            })))
    }

    #[tokio::test]
    async fn token_auth_sets_authorization_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .and(header("Authorization", "PVEAPIToken=automation@pve!tf=uuid"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": [{"node": "pve1", "status": "online"}]})),
            )
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let nodes: Vec<serde_json::Value> = client.get("nodes").await.unwrap();
        assert_eq!(nodes[0]["node"], "pve1");
    }

    #[tokio::test]
    async fn ticket_auth_logs_in_and_sends_both_headers() {
        let server = MockServer::start().await;
        login_mock().mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .and(header("Cookie", "PVEAuthCookie=PVE:automation@pve:4EEC61E2::sig"))
            .and(header("CSRFPreventionToken", "4EEC61E2:abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let client = ticket_client(&server.uri());
        let nodes: Vec<serde_json::Value> = client.get("nodes").await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_triggers_single_ticket_refresh() {
        let server = MockServer::start().await;
        login_mock().expect(2).mount(&server).await;

        // First call is rejected once, then succeeds on retry.
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let client = ticket_client(&server.uri());
        let nodes: Vec<serde_json::Value> = client.get("nodes").await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn token_unauthorized_is_terminal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let result: PveResult<Vec<serde_json::Value>> = client.get("nodes").await;
        assert!(matches!(result, Err(PveError::Authentication(_))));
    }

    #[tokio::test]
    async fn api_error_surfaces_status_message_and_body() {
        let server = MockServer::start().await;
        let error_body = serde_json::json!({
            "data": null,
            "message": "storage does not exist"
        });
        Mock::given(method("GET"))
            .and(path("/api2/json/storage/missing"))
            .respond_with(ResponseTemplate::new(500).set_body_json(error_body.clone()))
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let result: PveResult<serde_json::Value> = client.get("storage/missing").await;
        match result {
            Err(PveError::Api {
                status,
                message,
                body,
            }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "storage does not exist");
                assert!(body.contains("storage does not exist"));
            }
            other => panic!("expected api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bad_request_becomes_conflict_with_field_errors() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api2/json/nodes/pve1/qemu/100/config"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "data": null,
                "errors": { "net0": "invalid bridge" }
            })))
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let body = [("net0", "virtio=x,bridge=nope")];
        let result: PveResult<Option<String>> = client
            .put("nodes/pve1/qemu/100/config", Some(&body))
            .await;
        match result {
            Err(PveError::Conflict { status, message }) => {
                assert_eq!(status, 400);
                assert!(message.contains("net0: invalid bridge"));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn writes_are_form_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve1/qemu"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("vmid=100"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"data": "UPID:pve1:000"})),
            )
            .mount(&server)
            .await;

        let client = token_client(&server.uri());
        let body = [("vmid", "100")];
        let upid: String = client
            .post("nodes/pve1/qemu", Some(&body))
            .await
            .unwrap();
        assert!(upid.starts_with("UPID:"));
    }
}
