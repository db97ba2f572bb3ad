//! HTTP client for the bookstore backend.
//!
//! Every request reads the current token from the session store and sends
//! it as a bearer credential. The client keeps a cookie store so
//! server-set cookies travel with later requests.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Client, Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::SessionStore;
use crate::config::ApiConfig;

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// API client for the bookstore backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    origin: String,
    store: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a new API client reading its token from `store`
    pub fn new(config: &ApiConfig, store: Arc<SessionStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            origin: config.origin().to_string(),
            store,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// URL for a path under the API base.
    pub fn url(&self, path: &str) -> Result<Url, ApiError> {
        join(&self.base_url, path)
    }

    /// URL for a path under the server origin.
    pub fn origin_url(&self, path: &str) -> Result<Url, ApiError> {
        join(&self.origin, path)
    }

    /// Send a request to `path` under the API base and decode the JSON reply.
    pub async fn request<T, B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        self.send(method, url, body).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.request::<T, ()>(Method::GET, path, None).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Send a request to an absolute URL.
    pub(crate) async fn send<T, B>(&self, method: Method, url: Url, body: Option<&B>) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let headers = self.auth_headers()?;
        self.execute(method, url, body, headers).await
    }

    /// Send a request without the stored bearer token, for the sign-in
    /// endpoints.
    pub(crate) async fn send_without_auth<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(method, url, body, header::HeaderMap::new()).await
    }

    async fn execute<T, B>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        headers: header::HeaderMap,
    ) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        debug!(%method, %url, "Sending request");

        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .headers(headers)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            warn!(%method, %url, error = %e, "Request failed to send");
            ApiError::from(e)
        })?;
        let response = Self::check_response(response).await?;

        let bytes = response.bytes().await?;
        // An empty 2xx body decodes as JSON null
        let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(bytes).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.store.token() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidToken)?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with the server message if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, body = %ApiError::truncate_body(&body), "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }
}

fn join(prefix: &str, path: &str) -> Result<Url, ApiError> {
    let full = format!("{}/{}", prefix.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&full).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", full, e)))
}
