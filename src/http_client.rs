use anyhow::anyhow;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{
    self, Claims, CredentialPair, CredentialStore, LoginRequest, RefreshCoordinator, TokenResponse,
};
use crate::config::AuthConfig;
use crate::error::{ApiError, Result};
use crate::session::{PreferenceCache, SessionController};

/// Per-request metadata consulted by both interceptors
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestContext {
    /// True for the login/refresh endpoints themselves; exempts the request
    /// from credential attachment and from 401 recovery
    pub auth_endpoint: bool,
    /// How many times this request has been resubmitted after a recovery
    pub retries: u32,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_auth_endpoint() -> Self {
        Self {
            auth_endpoint: true,
            retries: 0,
        }
    }
}

/// Authenticated HTTP client for the Flashdeck backend
///
/// Every request passes through a pre-request interceptor (proactive token
/// refresh, bearer attachment) and a post-response interceptor (reactive 401
/// recovery with a capped resubmission). Recoverable authorization failures
/// are invisible to callers; unrecoverable ones tear the session down.
pub struct ApiClient {
    client: Client,
    store: CredentialStore,
    refresher: RefreshCoordinator,
    session: Arc<SessionController>,
    config: AuthConfig,
}

impl ApiClient {
    /// Create a client whose sign-in redirects assume the root path
    pub fn new(config: AuthConfig) -> Result<Self> {
        Self::with_path_provider(config, Arc::new(|| "/".to_string()))
    }

    /// Create a client with a UI-shell-provided current-path callback, used
    /// to compute the sign-in redirect on teardown
    pub fn with_path_provider(
        config: AuthConfig,
        current_path: Arc<dyn Fn() -> String + Send + Sync>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let store = CredentialStore::open(
            config.storage_file.clone(),
            &config.access_token_key,
            &config.refresh_token_key,
        )?;

        let session = Arc::new(SessionController::new(
            store.clone(),
            PreferenceCache::new(),
            current_path,
            config.sign_in_route.clone(),
            config.locales.clone(),
            store.has_credentials(),
        ));

        // The coordinator talks to the refresh endpoint directly on the
        // pooled client, bypassing both interceptors: a failing refresh must
        // never trigger another refresh.
        let refresher = RefreshCoordinator::new(store.clone(), client.clone(), config.refresh_url());

        Ok(Self {
            client,
            store,
            refresher,
            session,
            config,
        })
    }

    /// Execute a request through both interceptors
    ///
    /// Returns the response untouched for every outcome except a qualifying
    /// 401, which is recovered by refreshing and resubmitting the original
    /// request at most `max_auth_retries` times. A 401 that survives recovery
    /// is returned unchanged after the session is torn down.
    pub async fn execute(&self, request: Request, ctx: RequestContext) -> Result<Response> {
        let mut ctx = ctx;
        let method = request.method().clone();
        let url = request.url().clone();

        loop {
            // The original request stays untouched so it can be resubmitted
            let mut attempt = request
                .try_clone()
                .ok_or_else(|| ApiError::Internal(anyhow!("Request body is not cloneable")))?;

            if !ctx.auth_endpoint {
                self.attach_credentials(&mut attempt).await?;
            }

            tracing::debug!(
                method = %method,
                url = %url,
                retries = ctx.retries,
                "Sending request"
            );
            let response = self.client.execute(attempt).await?;
            let status = response.status();

            if status != StatusCode::UNAUTHORIZED
                || ctx.auth_endpoint
                || ctx.retries >= self.config.max_auth_retries
            {
                // Success, a non-401 error, or an exhausted/exempt 401: the
                // caller sees exactly what the server sent
                return Ok(response);
            }

            // Reactive recovery: one refresh, one resubmission
            tracing::warn!(url = %url, "Received 401, attempting token refresh");
            ctx.retries += 1;
            match self.refresher.refresh().await {
                // The fresh token is attached on the next pass
                Some(_) => continue,
                None => {
                    self.session.teardown();
                    return Ok(response);
                }
            }
        }
    }

    /// Pre-request interceptor: proactive refresh and bearer attachment
    ///
    /// A token already past, or within the configured buffer of, its expiry
    /// is refreshed before the request goes out; the request is never sent
    /// with a credential known to be invalid.
    async fn attach_credentials(&self, request: &mut Request) -> Result<()> {
        let Some(token) = self.store.access_token() else {
            // Unauthenticated request; the server decides what it allows
            return Ok(());
        };

        let token = if auth::is_expired(&token, self.config.expiry_buffer_ms) {
            tracing::debug!("Access token expired or expiring, refreshing before send");
            match self.refresher.refresh().await {
                Some(fresh) => fresh,
                None => {
                    self.session.teardown();
                    return Err(ApiError::Auth(
                        "Session expired and could not be refreshed".to_string(),
                    ));
                }
            }
        } else {
            token
        };

        let header = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ApiError::Internal(anyhow!("Invalid bearer token: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, header);
        Ok(())
    }

    /// Authenticate and store the resulting credential pair
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let request = self
            .client
            .post(self.config.login_url())
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .build()?;

        let response = self
            .execute(request, RequestContext::for_auth_endpoint())
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Auth(format!("Login failed with status {}", status)));
        }

        let data: TokenResponse = response.json().await?;
        if data.access_token.is_empty() {
            return Err(ApiError::Auth(
                "Login response does not contain access_token".to_string(),
            ));
        }

        self.store.replace(CredentialPair {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
        });
        self.session.mark_active();
        tracing::info!("Login successful");
        Ok(())
    }

    /// Explicit user sign-out
    pub fn sign_out(&self) {
        self.session.teardown();
    }

    /// Claims of the signed-in user, decoded on demand from the stored token
    pub fn current_user(&self) -> Option<Claims> {
        self.store.access_token().and_then(|t| auth::decode(&t))
    }

    /// Request builder for a backend path, to be passed to [`Self::execute`]
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, self.config.endpoint_url(path))
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// The underlying HTTP client
    pub fn http(&self) -> &Client {
        &self.client
    }
}
