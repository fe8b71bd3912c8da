//! Session and authorization data model.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::token::Identity;

/// Role name carried by a session. Comparison ignores ASCII case.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Role {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Role {}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self.0)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which role names are elevated, and what role a token without one gets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleModel {
    elevated: Vec<Role>,
    default_role: Role,
}

impl RoleModel {
    pub fn new<I, R>(elevated: I, default_role: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        Self {
            elevated: elevated.into_iter().map(Role::new).collect(),
            default_role: Role::new(default_role),
        }
    }

    /// Elevated roles are governed by authorization grants.
    pub fn is_elevated(&self, role: &Role) -> bool {
        self.elevated.iter().any(|r| r == role)
    }

    pub fn default_role(&self) -> &Role {
        &self.default_role
    }
}

impl Default for RoleModel {
    fn default() -> Self {
        Self::new(["admin"], "employee")
    }
}

/// The current authenticated actor.
///
/// Built only from a decoded [`Identity`], so every field is populated.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    subject_id: String,
    display_name: String,
    email: Option<String>,
    role: Role,
    token: String,
    expires_at: OffsetDateTime,
    grants: Arc<[AuthorizationGrant]>,
}

impl Session {
    pub(crate) fn new(identity: Identity, token: String, grants: Vec<AuthorizationGrant>) -> Self {
        Self {
            subject_id: identity.subject_id,
            display_name: identity.display_name,
            email: identity.email,
            role: identity.role,
            token,
            expires_at: identity.expires_at,
            grants: grants.into(),
        }
    }

    /// Overlay profile fields returned next to an elevated login.
    pub(crate) fn with_profile(mut self, profile: &UserProfile) -> Self {
        if let Some(name) = profile.display_name.as_deref().filter(|n| !n.is_empty()) {
            self.display_name = name.to_string();
        }
        if let Some(email) = profile.email.as_deref().filter(|e| !e.is_empty()) {
            self.email = Some(email.to_string());
        }
        if let Some(role) = profile.role.as_deref().filter(|r| !r.is_empty()) {
            self.role = Role::new(role);
        }
        self
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Bearer token backing this session.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }

    /// Grants in the order the backend returned them. Empty for standard roles.
    pub fn grants(&self) -> &[AuthorizationGrant] {
        &self.grants
    }

    /// Capabilities on `path`, all false when nothing matches.
    pub fn permissions(&self, path: &str) -> Permissions {
        find_grant(&self.grants, path)
            .map(AuthorizationGrant::permissions)
            .unwrap_or_default()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("subject_id", &self.subject_id)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("grants", &self.grants.len())
            .finish()
    }
}

/// Profile block of an elevated login response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    #[serde(default, alias = "name", alias = "fullName", alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "emailAddress")]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// One menu-level permission row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationGrant {
    #[serde(alias = "route")]
    pub resource_path: String,
    #[serde(default, alias = "menuName", alias = "label")]
    pub display_label: String,
    #[serde(default)]
    pub can_view: bool,
    #[serde(default)]
    pub can_create: bool,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
    #[serde(default, alias = "subMenus", deserialize_with = "null_as_empty")]
    pub children: Vec<AuthorizationGrant>,
}

impl AuthorizationGrant {
    pub fn permissions(&self) -> Permissions {
        Permissions {
            can_view: self.can_view,
            can_create: self.can_create,
            can_edit: self.can_edit,
            can_delete: self.can_delete,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<AuthorizationGrant>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<AuthorizationGrant>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Capabilities resolved for one resource path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permissions {
    pub can_view: bool,
    pub can_create: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

/// Finds the grant for `path`.
///
/// All top-level grants are checked before any child, then children level by
/// level, each in backend order. Matching is exact; the first match wins even
/// if it does not allow viewing.
pub fn find_grant<'a>(
    grants: &'a [AuthorizationGrant],
    path: &str,
) -> Option<&'a AuthorizationGrant> {
    let mut level: Vec<&AuthorizationGrant> = grants.iter().collect();
    while !level.is_empty() {
        if let Some(hit) = level.iter().copied().find(|g| g.resource_path == path) {
            return Some(hit);
        }
        level = level
            .iter()
            .copied()
            .flat_map(|g: &'a AuthorizationGrant| g.children.iter())
            .collect();
    }
    None
}

/// Whether `grants` let the actor open `path`.
pub fn can_view(grants: &[AuthorizationGrant], path: &str) -> bool {
    find_grant(grants, path).is_some_and(|g| g.can_view)
}
