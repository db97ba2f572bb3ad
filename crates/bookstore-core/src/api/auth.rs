//! Authentication endpoints.
//!
//! The backend answers standard login/registration with
//! `{ user, accessToken }` and admin login with `{ token }`. Both shapes
//! are folded into `AuthGrant` here so nothing past this module sees the
//! difference.

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{ApiClient, ApiError};
use crate::models::UserIdentity;

/// Registration endpoint, relative to the API base
const REGISTER_PATH: &str = "/auth/register";

/// Login endpoint, relative to the API base
const LOGIN_PATH: &str = "/auth/login";

/// Admin login endpoint, relative to the server origin
const ADMIN_LOGIN_PATH: &str = "/api/auth/admin";

#[derive(Debug, Serialize)]
struct EmailCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct AdminCredentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(default)]
    user: Option<Value>,
    #[serde(default, rename = "accessToken")]
    access_token: Option<String>,
    #[serde(default)]
    token: Option<String>,
}

/// Result of a successful authentication: the token plus whatever
/// identity the backend returned with it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthGrant {
    pub identity: Option<UserIdentity>,
    pub token: String,
}

impl AuthResponse {
    fn into_grant(self) -> Result<AuthGrant, ApiError> {
        let token = self
            .access_token
            .or(self.token)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)?;

        let identity = match self.user {
            None | Some(Value::Null) => None,
            Some(value) => {
                let identity = UserIdentity::from_value(value);
                if identity.is_none() {
                    warn!("Auth response user is not an object, ignoring it");
                }
                identity
            }
        };

        Ok(AuthGrant { identity, token })
    }
}

impl ApiClient {
    /// Create an account and return the session grant
    pub async fn register(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let url = self.url(REGISTER_PATH)?;
        let grant = self
            .post_credentials(url, &EmailCredentials { email, password })
            .await?;
        info!(email = %email, "Registered");
        Ok(grant)
    }

    /// Authenticate with email and password
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let url = self.url(LOGIN_PATH)?;
        let grant = self
            .post_credentials(url, &EmailCredentials { email, password })
            .await?;
        info!(email = %email, "Logged in");
        Ok(grant)
    }

    /// Authenticate against the admin endpoint
    pub async fn admin_login(&self, username: &str, password: &str) -> Result<AuthGrant, ApiError> {
        let url = self.origin_url(ADMIN_LOGIN_PATH)?;
        let grant = self
            .post_credentials(url, &AdminCredentials { username, password })
            .await?;
        info!(username = %username, "Admin logged in");
        Ok(grant)
    }

    /// Sign-in requests never carry the token of the session they replace.
    async fn post_credentials<B: Serialize>(&self, url: Url, credentials: &B) -> Result<AuthGrant, ApiError> {
        let response: AuthResponse = self
            .send_without_auth(Method::POST, url, Some(credentials))
            .await?;
        response.into_grant()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::SessionStore;
    use crate::config::{ApiConfig, Environment};
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn grant_from(json: Value) -> Result<AuthGrant, ApiError> {
        serde_json::from_value::<AuthResponse>(json).unwrap().into_grant()
    }

    async fn client_for(server: &MockServer) -> ApiClient {
        client_with_store(server, Arc::new(SessionStore::in_memory()))
    }

    fn client_with_store(server: &MockServer, store: Arc<SessionStore>) -> ApiClient {
        let config =
            ApiConfig::resolve(Environment::Development, Some(&server.uri()), None).unwrap();
        ApiClient::new(&config, store).unwrap()
    }

    #[test]
    fn test_grant_from_access_token_shape() {
        let grant = grant_from(json!({"user": {"email": "a@b.com"}, "accessToken": "x.y.z"})).unwrap();
        assert_eq!(grant.token, "x.y.z");
        assert_eq!(grant.identity, Some(UserIdentity::with_email("a@b.com")));
    }

    #[test]
    fn test_grant_from_admin_shape() {
        let grant = grant_from(json!({"message": "ok", "token": "admin.jwt.sig"})).unwrap();
        assert_eq!(grant.token, "admin.jwt.sig");
        assert_eq!(grant.identity, None);
    }

    #[test]
    fn test_grant_prefers_access_token() {
        let grant = grant_from(json!({"accessToken": "a", "token": "b"})).unwrap();
        assert_eq!(grant.token, "a");
    }

    #[test]
    fn test_grant_without_token_is_error() {
        assert!(matches!(grant_from(json!({"user": {}})), Err(ApiError::MissingToken)));
        assert!(matches!(grant_from(json!({"token": ""})), Err(ApiError::MissingToken)));
    }

    #[test]
    fn test_grant_ignores_non_object_user() {
        let grant = grant_from(json!({"user": "a@b.com", "accessToken": "t"})).unwrap();
        assert_eq!(grant.identity, None);
        let grant = grant_from(json!({"user": null, "accessToken": "t"})).unwrap();
        assert_eq!(grant.identity, None);
    }

    #[tokio::test]
    async fn test_login_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(json!({"email": "a@b.com", "password": "secret"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"user": {"email": "a@b.com"}, "accessToken": "x.y.z"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client_for(&server).await.login("a@b.com", "secret").await.unwrap();
        assert_eq!(grant.token, "x.y.z");
    }

    #[tokio::test]
    async fn test_register_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/register"))
            .and(body_json(json!({"email": "new@b.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(
                json!({"user": {"email": "new@b.com", "name": "New"}, "accessToken": "r.e.g"}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client_for(&server).await.register("new@b.com", "pw").await.unwrap();
        assert_eq!(grant.token, "r.e.g");
        assert_eq!(grant.identity.unwrap().name(), Some("New"));
    }

    #[tokio::test]
    async fn test_admin_login_uses_origin_route() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/admin"))
            .and(body_json(json!({"username": "admin", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "adm.in.tok"})))
            .expect(1)
            .mount(&server)
            .await;

        let grant = client_for(&server).await.admin_login("admin", "pw").await.unwrap();
        assert_eq!(grant.token, "adm.in.tok");
        assert!(grant.identity.is_none());
    }

    #[tokio::test]
    async fn test_sign_in_ignores_stored_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "adm.in.tok"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": "x.y.z"})))
            .mount(&server)
            .await;

        let store = Arc::new(SessionStore::in_memory());
        store.save(None, "old.session.token").unwrap();
        let client = client_with_store(&server, Arc::clone(&store));
        assert_eq!(client.admin_login("admin", "pw").await.unwrap().token, "adm.in.tok");
        assert_eq!(client.login("a@b.com", "pw").await.unwrap().token, "x.y.z");

        // A token that cannot be sent as a header does not block signing in again
        store.save(None, "broken\ntoken").unwrap();
        assert_eq!(client.login("a@b.com", "pw").await.unwrap().token, "x.y.z");
        assert!(matches!(
            client.get::<Value>("/books").await,
            Err(ApiError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_admin_login_missing_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
            .mount(&server)
            .await;

        let err = client_for(&server).await.admin_login("admin", "pw").await.unwrap_err();
        assert!(matches!(err, ApiError::MissingToken));
        assert_eq!(err.to_string(), "No token in response");
    }

    #[tokio::test]
    async fn test_admin_login_rejection_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/admin"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Admin not found!"})))
            .mount(&server)
            .await;

        let err = client_for(&server).await.admin_login("root", "pw").await.unwrap_err();
        assert_eq!(err.server_message(), Some("Admin not found!"));
    }
}
