use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{AuthBackend, LoginResponse};
use crate::config::{Endpoints, PortalConfig};
use crate::error::AuthError;
use crate::realtime::NotificationEvent;
use crate::session::AuthorizationGrant;

/// Module code of ticketing notifications in the backlog endpoint.
const TICKET_MODULE: &str = "TKT";

/// [`AuthBackend`] over the portal's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base: Url,
    endpoints: Endpoints,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &PortalConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self::with_client(config, client))
    }

    /// Uses a caller-supplied client, e.g. one with its own timeout policy.
    pub fn with_client(config: &PortalConfig, client: reqwest::Client) -> Self {
        Self {
            base: config.api_base().clone(),
            endpoints: config.endpoints().clone(),
            client,
        }
    }

    fn url(&self, path: &str) -> Result<Url, AuthError> {
        self.base
            .join(path)
            .map_err(|e| AuthError::Protocol(format!("invalid endpoint `{path}`: {e}")))
    }

    /// Unread-and-read notification backlog for ticketing.
    pub async fn fetch_notifications(
        &self,
        token: &str,
    ) -> Result<Vec<NotificationEvent>, AuthError> {
        let resp = self
            .client
            .get(self.url(&self.endpoints.notifications)?)
            .bearer_auth(token)
            .send()
            .await?;
        let resp = check(resp).await?;

        let all: Vec<NotificationEvent> = resp.json().await?;
        Ok(all
            .into_iter()
            .filter(|n| n.module_code.as_deref() == Some(TICKET_MODULE))
            .collect())
    }

    /// Marks every notification of the session as read on the server.
    pub async fn mark_all_notifications_read(&self, token: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .put(self.url(&self.endpoints.mark_all_read)?)
            .bearer_auth(token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, AuthError> {
        let resp = self
            .client
            .post(self.url(&self.endpoints.login)?)
            .json(&serde_json::json!({ "username": identifier, "password": secret }))
            .send()
            .await?;

        // a 401 here means bad credentials, which the caller sees verbatim
        if !resp.status().is_success() {
            return Err(rejection(resp).await);
        }

        let body: LoginResponse = resp.json().await?;
        if body.token.is_empty() {
            return Err(AuthError::Protocol("login response carries no token".to_string()));
        }
        Ok(body)
    }

    async fn verify_identity(
        &self,
        id_number: &str,
        email: &str,
    ) -> Result<Option<String>, AuthError> {
        let resp = self
            .client
            .get(self.url(&self.endpoints.verify_identity)?)
            .query(&[("IDNo", id_number), ("EmailID", email)])
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            debug!("identity lookup found no employee");
            return Ok(None);
        }
        let resp = check(resp).await?;

        let body: VerifyResponse = resp.json().await?;
        Ok(body.token.filter(|t| !t.is_empty()))
    }

    async fn fetch_grants(&self, token: &str) -> Result<Vec<AuthorizationGrant>, AuthError> {
        let resp = self
            .client
            .get(self.url(&self.endpoints.grants)?)
            .bearer_auth(token)
            .send()
            .await?;
        let resp = check(resp).await?;

        Ok(resp.json().await?)
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        let resp = self
            .client
            .post(self.url(&self.endpoints.logout)?)
            .bearer_auth(token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Passes 2xx responses through; maps 401 to `Unauthorized` and anything
/// else to `Rejected`.
async fn check(resp: Response) -> Result<Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else if status == StatusCode::UNAUTHORIZED {
        Err(AuthError::Unauthorized)
    } else {
        Err(rejection(resp).await)
    }
}

async fn rejection(resp: Response) -> AuthError {
    let status = resp.status().as_u16();
    let payload = match resp.text().await {
        Ok(text) => serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text)),
        Err(e) => {
            warn!(status, error = %e, "failed to read error body");
            serde_json::Value::Null
        }
    };
    AuthError::Rejected { status, payload }
}
