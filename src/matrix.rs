//! Minimal Matrix client-server API client.
//!
//! Only what the ping-pong exchange needs: password login, room
//! create/join/leave, sending text messages and long-poll sync.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::cli::Credentials;
use crate::extract::SyncResponse;

/// How long the server may hold a sync request open.
const SYNC_TIMEOUT_MS: u64 = 30_000;

/// Client-side request timeout, comfortably above [`SYNC_TIMEOUT_MS`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

// ============================================================================
// Errors
// ============================================================================

/// Failure of a single client-server API call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid homeserver {homeserver:?}: {reason}")]
    Homeserver { homeserver: String, reason: String },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server responded with {status}: {errcode} {message}")]
    Server {
        status: u16,
        errcode: String,
        message: String,
    },
}

// ============================================================================
// Transport seams
// ============================================================================

/// Sending side of the transport, as seen by the ping-pong driver.
pub trait Transport: Send + Sync + 'static {
    /// Fully qualified id of the logged-in user.
    fn user_id(&self) -> &str;

    /// Posts `body` to `room_id` and returns the event id the server assigned.
    fn send_text(
        &self,
        room_id: &str,
        body: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Receiving side of the transport, as seen by the listeners.
pub trait Timeline: Transport {
    /// Long-polls for new events. `since` is the `next_batch` of the previous
    /// response, `None` for the first call.
    fn sync(
        &self,
        since: Option<&str>,
    ) -> impl Future<Output = Result<SyncResponse, TransportError>> + Send;
}

/// Room membership and session lifetime of one logged-in account.
pub trait Account: Timeline {
    /// Invalidates the access token.
    fn logout(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Creates a public room, joined by this account, and returns its id.
    fn create_room(&self) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Joins `room_id`, an id or an alias.
    fn join_room(&self, room_id: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn leave_room(&self, room_id: &str)
        -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Turns credentials into a logged-in [`Account`].
pub trait Connector {
    type Client: Account;

    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Client, TransportError>> + Send;
}

/// Password login against the homeserver named in the credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordLogin;

impl Connector for PasswordLogin {
    type Client = MatrixClient;

    async fn login(&self, credentials: &Credentials) -> Result<MatrixClient, TransportError> {
        MatrixClient::login(credentials).await
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errcode: String,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct RoomIdResponse {
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct EventIdResponse {
    event_id: String,
}

#[derive(Debug, Deserialize)]
struct Empty {}

// ============================================================================
// HTTP client
// ============================================================================

/// A logged-in account on one homeserver.
#[derive(Debug)]
pub struct MatrixClient {
    http: reqwest::Client,
    homeserver: Url,
    user_id: String,
    access_token: String,
    txn_counter: AtomicU64,
}

/// `matrix.org` becomes `https://matrix.org/`; explicit schemes are kept.
pub fn homeserver_url(homeserver: &str) -> Result<Url, TransportError> {
    let raw = if homeserver.contains("://") {
        homeserver.to_string()
    } else {
        format!("https://{homeserver}")
    };
    let url = Url::parse(&raw).map_err(|e| TransportError::Homeserver {
        homeserver: homeserver.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(TransportError::Homeserver {
            homeserver: homeserver.to_string(),
            reason: "not a base URL".to_string(),
        });
    }
    Ok(url)
}

fn endpoint(homeserver: &Url, segments: &[&str]) -> Url {
    let mut url = homeserver.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty()
            .extend(["_matrix", "client", "v3"])
            .extend(segments);
    }
    url
}

/// Sends `request` and decodes a success body, or the standard Matrix error
/// body into [`TransportError::Server`].
async fn call<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, TransportError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body: ErrorBody = response.json().await.unwrap_or_default();
        return Err(TransportError::Server {
            status: status.as_u16(),
            errcode: body.errcode,
            message: body.error,
        });
    }
    Ok(response.json().await?)
}

impl MatrixClient {
    /// Logs in with `m.login.password`; the returned client carries the
    /// access token for every later request.
    pub async fn login(credentials: &Credentials) -> Result<Self, TransportError> {
        let homeserver = homeserver_url(&credentials.homeserver)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let request = http
            .post(endpoint(&homeserver, &["login"]))
            .json(&json!({
                "type": "m.login.password",
                "identifier": {
                    "type": "m.id.user",
                    "user": credentials.username,
                },
                "password": credentials.password,
            }));
        let LoginResponse { access_token } = call(request).await?;

        Ok(Self {
            http,
            homeserver,
            user_id: credentials.user_id(),
            access_token,
            txn_counter: AtomicU64::new(0),
        })
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http
            .request(method, endpoint(&self.homeserver, segments))
            .bearer_auth(&self.access_token)
    }

    fn next_txn_id(&self) -> String {
        let n = self.txn_counter.fetch_add(1, Ordering::Relaxed);
        format!("pingpong.{}.{n}", std::process::id())
    }
}

impl Timeline for MatrixClient {
    async fn sync(&self, since: Option<&str>) -> Result<SyncResponse, TransportError> {
        let timeout = SYNC_TIMEOUT_MS.to_string();
        let mut query = vec![("timeout", timeout.as_str())];
        if let Some(since) = since {
            query.push(("since", since));
        }
        call(self.request(Method::GET, &["sync"]).query(&query)).await
    }
}

impl Account for MatrixClient {
    async fn logout(&self) -> Result<(), TransportError> {
        let _: Empty = call(self.request(Method::POST, &["logout"]).json(&json!({}))).await?;
        Ok(())
    }

    async fn create_room(&self) -> Result<String, TransportError> {
        let request = self
            .request(Method::POST, &["createRoom"])
            .json(&json!({ "preset": "public_chat" }));
        let RoomIdResponse { room_id } = call(request).await?;
        Ok(room_id)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), TransportError> {
        let request = self
            .request(Method::POST, &["join", room_id])
            .json(&json!({}));
        let _: RoomIdResponse = call(request).await?;
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<(), TransportError> {
        let request = self
            .request(Method::POST, &["rooms", room_id, "leave"])
            .json(&json!({}));
        let _: Empty = call(request).await?;
        Ok(())
    }
}

impl Transport for MatrixClient {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn send_text(&self, room_id: &str, body: &str) -> Result<String, TransportError> {
        let txn_id = self.next_txn_id();
        let request = self
            .request(
                Method::PUT,
                &["rooms", room_id, "send", "m.room.message", &txn_id],
            )
            .json(&json!({ "msgtype": "m.text", "body": body }));
        let EventIdResponse { event_id } = call(request).await?;
        Ok(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_homeserver_defaults_to_https() {
        let url = homeserver_url("matrix.org").expect("valid");
        assert_eq!(url.as_str(), "https://matrix.org/");
    }

    #[test]
    fn explicit_scheme_is_kept() {
        let url = homeserver_url("http://localhost:8008").expect("valid");
        assert_eq!(url.as_str(), "http://localhost:8008/");
    }

    #[test]
    fn endpoint_escapes_room_ids() {
        let homeserver = homeserver_url("matrix.org").expect("valid");
        let url = endpoint(&homeserver, &["join", "#room:matrix.org"]);
        assert_eq!(
            url.as_str(),
            "https://matrix.org/_matrix/client/v3/join/%23room:matrix.org"
        );
    }

    #[test]
    fn endpoint_keeps_homeserver_prefix() {
        let homeserver = homeserver_url("https://example.com/matrix/").expect("valid");
        let url = endpoint(&homeserver, &["login"]);
        assert_eq!(
            url.as_str(),
            "https://example.com/matrix/_matrix/client/v3/login"
        );
    }
}
