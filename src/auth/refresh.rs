// Refresh coordination
// Exchanges the refresh token for a new credential pair, single-flight

use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::CredentialStore;
use super::types::{CredentialPair, TokenResponse};

type SharedRefresh = Shared<BoxFuture<'static, Option<String>>>;

/// Coordinates refresh exchanges so at most one is in flight at a time
///
/// Every caller that needs a refresh while one is outstanding awaits the same
/// exchange and observes the same result. Failure is reported as None, never
/// as an error: callers branch uniformly on nullability, and the credential
/// pair is cleared on failure so the client fails closed.
pub struct RefreshCoordinator {
    store: CredentialStore,
    client: Client,
    refresh_url: String,
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
}

impl RefreshCoordinator {
    pub fn new(store: CredentialStore, client: Client, refresh_url: String) -> Self {
        Self {
            store,
            client,
            refresh_url,
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Obtain a fresh access token, joining an in-flight exchange if one exists
    ///
    /// Resolves None without touching the network when no refresh token is
    /// stored. The in-flight slot is cleared only after the exchange settles,
    /// on success and failure alike, so the next need starts a fresh one.
    pub async fn refresh(&self) -> Option<String> {
        let operation = {
            let mut slot = self.in_flight.lock().await;
            if let Some(existing) = slot.clone() {
                tracing::debug!("Joining in-flight token refresh");
                existing
            } else {
                if self.store.refresh_token().is_none() {
                    tracing::debug!("No refresh token stored, nothing to exchange");
                    return None;
                }

                // The exchange runs as its own task so it always settles,
                // even if every waiter is dropped mid-await.
                let coordinator = self.clone();
                let task = tokio::spawn(async move {
                    let outcome = coordinator.exchange().await;
                    *coordinator.in_flight.lock().await = None;
                    outcome
                });

                let operation: SharedRefresh =
                    async move { task.await.unwrap_or(None) }.boxed().shared();
                *slot = Some(operation.clone());
                operation
            }
        };

        operation.await
    }

    async fn exchange(&self) -> Option<String> {
        let Some(refresh_token) = self.store.refresh_token() else {
            return None;
        };

        match self.request_new_pair(&refresh_token).await {
            Ok(response) => {
                let access_token = response.access_token.clone();
                let pair = CredentialPair {
                    access_token: response.access_token,
                    // Keep the old refresh token when the server does not rotate it
                    refresh_token: response.refresh_token.or(Some(refresh_token)),
                };
                self.store.replace(pair);
                tracing::info!("Access token refreshed");
                Some(access_token)
            }
            Err(e) => {
                tracing::warn!("Token refresh failed, clearing credentials: {}", e);
                self.store.clear();
                None
            }
        }
    }

    async fn request_new_pair(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = self
            .client
            .post(&self.refresh_url)
            .query(&[("refresh_token", refresh_token)])
            .send()
            .await
            .context("Failed to send refresh request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Refresh endpoint returned {}: {}", status, body);
        }

        let data: TokenResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;

        if data.access_token.is_empty() {
            anyhow::bail!("Refresh response does not contain access_token");
        }

        Ok(data)
    }
}

impl Clone for RefreshCoordinator {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            client: self.client.clone(),
            refresh_url: self.refresh_url.clone(),
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}
