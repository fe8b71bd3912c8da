//! The authentication collaborator.
//!
//! The session store never speaks HTTP itself; it goes through
//! [`AuthBackend`], which [`HttpBackend`] implements against the portal API.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::AuthError;
use crate::session::{AuthorizationGrant, UserProfile};

mod http;

pub use http::HttpBackend;

/// Successful credential login.
///
/// Elevated logins carry `menus` (possibly empty) and usually `user`;
/// standard logins carry only the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    #[serde(alias = "accessToken")]
    pub token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default, alias = "userMenus")]
    pub menus: Option<Vec<AuthorizationGrant>>,
}

impl LoginResponse {
    /// Whether the response has the elevated shape.
    pub fn is_elevated(&self) -> bool {
        self.menus.is_some()
    }
}

/// Remote operations the session store depends on.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    /// Exchanges credentials for a token.
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, AuthError>;

    /// Looks up an employee by id number and email. `Ok(None)` means not found.
    async fn verify_identity(
        &self,
        id_number: &str,
        email: &str,
    ) -> Result<Option<String>, AuthError>;

    /// Fetches the grants of the session behind `token`.
    ///
    /// Must return [`AuthError::Unauthorized`] when the token is refused.
    async fn fetch_grants(&self, token: &str) -> Result<Vec<AuthorizationGrant>, AuthError>;

    /// Tells the server the elevated session behind `token` is over.
    async fn logout(&self, token: &str) -> Result<(), AuthError>;
}

#[async_trait]
impl<T: AuthBackend> AuthBackend for std::sync::Arc<T> {
    async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, AuthError> {
        (**self).login(identifier, secret).await
    }

    async fn verify_identity(
        &self,
        id_number: &str,
        email: &str,
    ) -> Result<Option<String>, AuthError> {
        (**self).verify_identity(id_number, email).await
    }

    async fn fetch_grants(&self, token: &str) -> Result<Vec<AuthorizationGrant>, AuthError> {
        (**self).fetch_grants(token).await
    }

    async fn logout(&self, token: &str) -> Result<(), AuthError> {
        (**self).logout(token).await
    }
}
