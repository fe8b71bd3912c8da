//! Portal configuration.

use std::env;

use reqwest::Url;
use thiserror::Error;

use crate::realtime::ReconnectPolicy;
use crate::session::RoleModel;

const DEFAULT_API_BASE: &str = "https://localhost:7100";

/// Invalid configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid URL `{value}`: {reason}")]
    InvalidUrl { value: String, reason: String },
}

/// Screens the route guard redirects to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    /// Public entry screen for unauthenticated actors.
    pub public_entry: String,
    pub admin_login: String,
    pub admin_home: String,
    pub employee_home: String,
    pub access_denied: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public_entry: "/Ticket".to_string(),
            admin_login: "/Admin-Login".to_string(),
            admin_home: "/admin/dashboard".to_string(),
            employee_home: "/Ticket".to_string(),
            access_denied: "/access-denied".to_string(),
        }
    }
}

/// Backend endpoint paths, relative to the API base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub login: String,
    pub logout: String,
    pub grants: String,
    pub verify_identity: String,
    pub notifications: String,
    pub mark_all_read: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "/api/auth/login".to_string(),
            logout: "/api/auth/logout".to_string(),
            grants: "/api/auth/menus".to_string(),
            verify_identity: "/api/Ticket/GetEmployeeByIDNo".to_string(),
            notifications: "/api/Ticket/GetNotificationListByUser".to_string(),
            mark_all_read: "/api/Ticket/MarkAllAsRead".to_string(),
        }
    }
}

/// Everything the session layer needs to talk to one deployment.
///
/// ```
/// use portal_session::PortalConfig;
///
/// let config = PortalConfig::default()
///     .with_elevated_roles(["admin", "nurse"])
///     .with_token_slot("portalToken");
/// assert_eq!(config.token_slot(), "portalToken");
/// ```
#[derive(Debug, Clone)]
pub struct PortalConfig {
    api_base: Url,
    endpoints: Endpoints,
    hub_path: String,
    join_method: String,
    token_slot: String,
    roles: RoleModel,
    routes: RouteTable,
    reconnect: ReconnectPolicy,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            api_base: Url::parse(DEFAULT_API_BASE).expect("default API base is a valid URL"),
            endpoints: Endpoints::default(),
            hub_path: "/notificationHub".to_string(),
            join_method: "JoinGroup".to_string(),
            token_slot: "accessToken".to_string(),
            roles: RoleModel::default(),
            routes: RouteTable::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl PortalConfig {
    /// Builds a configuration from `PORTAL_*` environment variables.
    ///
    /// Unset variables keep their defaults. `PORTAL_ELEVATED_ROLES` is a
    /// comma-separated list.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(base) = env::var("PORTAL_API_BASE") {
            config = config.with_api_base(&base)?;
        }
        if let Ok(path) = env::var("PORTAL_HUB_PATH") {
            config = config.with_hub_path(path);
        }
        if let Ok(slot) = env::var("PORTAL_TOKEN_SLOT") {
            config = config.with_token_slot(slot);
        }
        if let Ok(roles) = env::var("PORTAL_ELEVATED_ROLES") {
            let names: Vec<&str> = roles
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .collect();
            if !names.is_empty() {
                config = config.with_elevated_roles(names);
            }
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self, ConfigError> {
        self.api_base = Url::parse(base).map_err(|e| ConfigError::InvalidUrl {
            value: base.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_hub_path(mut self, path: impl Into<String>) -> Self {
        self.hub_path = path.into();
        self
    }

    /// Hub method invoked with the subject id after every (re)connect.
    pub fn with_join_method(mut self, method: impl Into<String>) -> Self {
        self.join_method = method.into();
        self
    }

    pub fn with_token_slot(mut self, slot: impl Into<String>) -> Self {
        self.token_slot = slot.into();
        self
    }

    pub fn with_elevated_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        let default_role = self.roles.default_role().as_str().to_string();
        self.roles = RoleModel::new(roles, default_role);
        self
    }

    pub fn with_roles(mut self, roles: RoleModel) -> Self {
        self.roles = roles;
        self
    }

    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn join_method(&self) -> &str {
        &self.join_method
    }

    pub fn token_slot(&self) -> &str {
        &self.token_slot
    }

    pub fn roles(&self) -> &RoleModel {
        &self.roles
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn reconnect(&self) -> &ReconnectPolicy {
        &self.reconnect
    }

    /// Absolute URL of an endpoint path.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, ConfigError> {
        self.api_base.join(path).map_err(|e| ConfigError::InvalidUrl {
            value: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Websocket URL of the push hub carrying `token` as `access_token`.
    pub fn hub_url(&self, token: &str) -> Result<Url, ConfigError> {
        let mut url = self.endpoint_url(&self.hub_path)?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|()| ConfigError::InvalidUrl {
            value: url.to_string(),
            reason: "cannot switch to a websocket scheme".to_string(),
        })?;
        url.query_pairs_mut().append_pair("access_token", token);
        Ok(url)
    }
}
