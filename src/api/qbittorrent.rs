use reqwest::header::{HeaderMap, COOKIE, REFERER, SET_COOKIE};
use reqwest::{Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::core::error::QbtError;
use crate::core::poller::SpeedLimiter;
use crate::models::policy::SpeedLimit;

const LOGIN_PATH: &str = "auth/login";
const UPLOAD_LIMIT_PATH: &str = "transfer/setUploadLimit";
const DOWNLOAD_LIMIT_PATH: &str = "transfer/setDownloadLimit";
const SESSION_COOKIE: &str = "SID";

/// Client for the qBittorrent Web API
pub struct QbtClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    sid: Option<String>,
}

#[derive(Debug, Serialize)]
struct LoginForm<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct LimitForm {
    limit: i64,
}

impl QbtClient {
    pub fn new(host: &str, username: String, password: String) -> Result<Self, QbtError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(QbtError::Client)?;

        Ok(Self {
            client,
            base_url: normalize_host(host),
            username,
            password,
            sid: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.sid.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{}", self.base_url, path)
    }

    /// Authenticate and keep the session cookie for later calls
    pub async fn login(&mut self) -> Result<(), QbtError> {
        self.sid = None;

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .header(REFERER, &self.base_url)
            .form(&LoginForm {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(QbtError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(QbtError::Status {
                endpoint: LOGIN_PATH,
                status,
            });
        }

        let sid = session_cookie(response.headers());
        let body = response.text().await.map_err(QbtError::Request)?;
        if body.trim() != "Ok." {
            return Err(QbtError::LoginFailed);
        }

        self.sid = Some(sid.ok_or(QbtError::MissingSessionCookie)?);
        info!(host = %self.base_url, "Logged in to qBittorrent");

        Ok(())
    }

    /// Set the global upload limit in bytes per second, `-1` for unlimited
    pub async fn set_upload_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError> {
        self.set_limit(UPLOAD_LIMIT_PATH, limit).await
    }

    /// Set the global download limit in bytes per second, `-1` for unlimited
    pub async fn set_download_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError> {
        self.set_limit(DOWNLOAD_LIMIT_PATH, limit).await
    }

    async fn set_limit(
        &mut self,
        endpoint: &'static str,
        limit: SpeedLimit,
    ) -> Result<(), QbtError> {
        if self.sid.is_none() {
            self.login().await?;
        }

        let mut response = self.post_limit(endpoint, limit).await?;

        // qBittorrent answers 403 once the session cookie has expired
        if response.status() == StatusCode::FORBIDDEN {
            debug!(endpoint, "qBittorrent session expired, logging in again");
            self.login().await?;
            response = self.post_limit(endpoint, limit).await?;
        }

        let status = response.status();
        if !status.is_success() {
            return Err(QbtError::Status { endpoint, status });
        }

        debug!(endpoint, limit = limit.as_i64(), "qBittorrent limit applied");
        Ok(())
    }

    async fn post_limit(
        &self,
        endpoint: &'static str,
        limit: SpeedLimit,
    ) -> Result<Response, QbtError> {
        let mut request = self
            .client
            .post(self.url(endpoint))
            .header(REFERER, &self.base_url)
            .form(&LimitForm {
                limit: limit.as_i64(),
            });

        if let Some(sid) = &self.sid {
            request = request.header(COOKIE, format!("{}={}", SESSION_COOKIE, sid));
        }

        request.send().await.map_err(QbtError::Request)
    }
}

impl SpeedLimiter for QbtClient {
    async fn set_upload_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError> {
        QbtClient::set_upload_limit(self, limit).await
    }

    async fn set_download_limit(&mut self, limit: SpeedLimit) -> Result<(), QbtError> {
        QbtClient::set_download_limit(self, limit).await
    }
}

/// Accept `host:port` as well as full URLs
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE).then(|| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Form, State};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::post;
    use axum::Router;
    use reqwest::header::HeaderValue;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeQbt {
        logins: usize,
        sid: Option<String>,
        calls: Vec<(String, i64)>,
        fail_setters: bool,
    }

    type Shared = Arc<Mutex<FakeQbt>>;

    async fn login_handler(
        State(state): State<Shared>,
        Form(form): Form<HashMap<String, String>>,
    ) -> AxumResponse {
        let mut state = state.lock().unwrap();
        let valid = form.get("username").map(String::as_str) == Some("admin")
            && form.get("password").map(String::as_str) == Some("adminadmin");

        if !valid {
            return "Fails.".into_response();
        }

        state.logins += 1;
        let sid = format!("session{}", state.logins);
        state.sid = Some(sid.clone());

        (
            [(SET_COOKIE, format!("SID={}; HttpOnly; SameSite=Strict; path=/", sid))],
            "Ok.",
        )
            .into_response()
    }

    async fn upload_handler(
        State(state): State<Shared>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> AxumResponse {
        record_limit(&state, &headers, &form, "upload")
    }

    async fn download_handler(
        State(state): State<Shared>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> AxumResponse {
        record_limit(&state, &headers, &form, "download")
    }

    fn record_limit(
        state: &Shared,
        headers: &HeaderMap,
        form: &HashMap<String, String>,
        name: &str,
    ) -> AxumResponse {
        let mut state = state.lock().unwrap();
        let expected = state.sid.as_ref().map(|sid| format!("SID={}", sid));
        let cookie = headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if expected.is_none() || cookie != expected {
            return StatusCode::FORBIDDEN.into_response();
        }
        if state.fail_setters {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }

        let limit: i64 = form["limit"].parse().unwrap();
        state.calls.push((name.to_string(), limit));
        StatusCode::OK.into_response()
    }

    async fn spawn_fake() -> (String, Shared) {
        let state = Shared::default();
        let app = Router::new()
            .route("/api/v2/auth/login", post(login_handler))
            .route("/api/v2/transfer/setUploadLimit", post(upload_handler))
            .route("/api/v2/transfer/setDownloadLimit", post(download_handler))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}", addr), state)
    }

    fn client(base: &str, password: &str) -> QbtClient {
        QbtClient::new(base, "admin".to_string(), password.to_string()).unwrap()
    }

    #[test]
    fn test_new_client_is_unauthenticated() {
        let qbt: Result<QbtClient, QbtError> =
            QbtClient::new("nas.lan:8080/", "admin".to_string(), "adminadmin".to_string());
        let qbt = qbt.unwrap();

        assert_eq!(qbt.base_url(), "http://nas.lan:8080");
        assert!(!qbt.is_authenticated());
    }

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("localhost:8080"), "http://localhost:8080");
        assert_eq!(normalize_host("http://nas.lan:8080/"), "http://nas.lan:8080");
        assert_eq!(normalize_host(" https://qbt.example.com "), "https://qbt.example.com");
    }

    #[test]
    fn test_session_cookie_extraction() {
        let mut headers = HeaderMap::new();
        headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark; path=/"));
        headers.append(SET_COOKIE, HeaderValue::from_static("SID=abc123; HttpOnly; path=/"));
        assert_eq!(session_cookie(&headers), Some("abc123".to_string()));

        assert_eq!(session_cookie(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_first_call_logs_in_lazily() {
        let (base, state) = spawn_fake().await;
        let mut qbt = client(&base, "adminadmin");
        assert!(!qbt.is_authenticated());

        qbt.set_upload_limit(SpeedLimit::from_bytes_per_sec(2_097_152)).await.unwrap();
        qbt.set_download_limit(SpeedLimit::UNLIMITED).await.unwrap();

        assert!(qbt.is_authenticated());
        let state = state.lock().unwrap();
        assert_eq!(state.logins, 1);
        assert_eq!(
            state.calls,
            vec![("upload".to_string(), 2_097_152), ("download".to_string(), -1)]
        );
    }

    #[tokio::test]
    async fn test_expired_session_is_renewed_once() {
        let (base, state) = spawn_fake().await;
        let mut qbt = client(&base, "adminadmin");
        qbt.set_upload_limit(SpeedLimit::UNLIMITED).await.unwrap();

        // Server forgets the session
        state.lock().unwrap().sid = Some("rotated".to_string());

        qbt.set_upload_limit(SpeedLimit::from_bytes_per_sec(1024)).await.unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.logins, 2);
        assert_eq!(state.calls.len(), 2);
        assert_eq!(state.calls[1], ("upload".to_string(), 1024));
    }

    #[tokio::test]
    async fn test_wrong_password_fails_login() {
        let (base, state) = spawn_fake().await;
        let mut qbt = client(&base, "hunter2");

        let err = qbt.login().await.unwrap_err();
        assert!(matches!(err, QbtError::LoginFailed));

        let err = qbt.set_download_limit(SpeedLimit::UNLIMITED).await.unwrap_err();
        assert!(matches!(err, QbtError::LoginFailed));
        assert!(!qbt.is_authenticated());
        assert!(state.lock().unwrap().calls.is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let (base, state) = spawn_fake().await;
        state.lock().unwrap().fail_setters = true;
        let mut qbt = client(&base, "adminadmin");

        let err = qbt.set_upload_limit(SpeedLimit::UNLIMITED).await.unwrap_err();
        assert!(matches!(
            err,
            QbtError::Status { endpoint: UPLOAD_LIMIT_PATH, status }
                if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut qbt = client(&addr.to_string(), "adminadmin");
        let err = qbt.set_upload_limit(SpeedLimit::UNLIMITED).await.unwrap_err();
        assert!(matches!(err, QbtError::Request(_)));
    }
}
