//! Route guarding.
//!
//! [`RouteGuard`] decides, for one navigation, whether a screen may render.
//! It is a pure function of the [`AuthState`] it is handed and is meant to be
//! consulted on every navigation; nothing is cached between calls.

use time::OffsetDateTime;

use crate::config::{PortalConfig, RouteTable};
use crate::session::{can_view, Role, RoleModel, Session};
use crate::store::AuthState;

/// What a protected screen demands of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenRequirement {
    /// Role the session must hold, compared ignoring case.
    pub role: Option<Role>,
    /// Resource path whose grant must allow viewing.
    pub resource: Option<String>,
}

impl ScreenRequirement {
    /// Any authenticated session may open the screen.
    pub fn any_session() -> Self {
        Self::default()
    }

    pub fn for_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(Role::new(role)),
            resource: None,
        }
    }

    /// Any session holding a viewable grant on `path`.
    pub fn for_resource(path: impl Into<String>) -> Self {
        Self::any_session().with_resource(path)
    }

    pub fn with_resource(mut self, path: impl Into<String>) -> Self {
        self.resource = Some(path.into());
        self
    }
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// The session is still being restored; show a placeholder.
    Loading,
    Render,
    Redirect(String),
}

/// Navigation gate for protected screens.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    routes: RouteTable,
    roles: RoleModel,
}

impl RouteGuard {
    pub fn new(config: &PortalConfig) -> Self {
        Self {
            routes: config.routes().clone(),
            roles: config.roles().clone(),
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decides whether `screen` may render under `state`.
    ///
    /// Checks apply in order: restoration pending, no session, role mismatch,
    /// elevated session without any grant, then the resource grant. Only
    /// elevated sessions are subject to grant checks.
    pub fn evaluate(&self, state: &AuthState, screen: &ScreenRequirement) -> GuardDecision {
        let session = match state {
            AuthState::Initializing => return GuardDecision::Loading,
            AuthState::Unauthenticated | AuthState::Failed(_) => {
                return GuardDecision::Redirect(self.routes.public_entry.clone())
            }
            AuthState::Authenticated(session) => session,
        };
        if session.is_expired_at(OffsetDateTime::now_utc()) {
            return GuardDecision::Redirect(self.routes.public_entry.clone());
        }

        if let Some(required) = &screen.role {
            if session.role() != required {
                return GuardDecision::Redirect(self.home_for(session).to_string());
            }
        }

        if !self.roles.is_elevated(session.role()) {
            return GuardDecision::Render;
        }
        if session.grants().is_empty() {
            return GuardDecision::Redirect(self.routes.access_denied.clone());
        }
        match &screen.resource {
            Some(path) if !can_view(session.grants(), path) => {
                GuardDecision::Redirect(self.routes.access_denied.clone())
            }
            _ => GuardDecision::Render,
        }
    }

    /// Decides what the admin login screen does: an existing session is
    /// sent to its landing page instead of seeing the form again.
    pub fn evaluate_login_screen(&self, state: &AuthState) -> GuardDecision {
        match state {
            AuthState::Initializing => GuardDecision::Loading,
            AuthState::Authenticated(session)
                if !session.is_expired_at(OffsetDateTime::now_utc()) =>
            {
                GuardDecision::Redirect(self.landing_for(session))
            }
            _ => GuardDecision::Render,
        }
    }

    /// Where a freshly signed-in session should go.
    ///
    /// Elevated sessions land on their first viewable top-level grant, or on
    /// the access-denied screen when they have none.
    pub fn landing_for(&self, session: &Session) -> String {
        if !self.roles.is_elevated(session.role()) {
            return self.routes.employee_home.clone();
        }
        session
            .grants()
            .iter()
            .find(|g| g.can_view)
            .map(|g| g.resource_path.clone())
            .unwrap_or_else(|| self.routes.access_denied.clone())
    }

    /// Where `session` goes once it has signed out: elevated sessions return
    /// to the admin login screen, everyone else to the public entry.
    pub fn signed_out_destination(&self, session: &Session) -> &str {
        if self.roles.is_elevated(session.role()) {
            &self.routes.admin_login
        } else {
            &self.routes.public_entry
        }
    }

    fn home_for(&self, session: &Session) -> &str {
        if self.roles.is_elevated(session.role()) {
            &self.routes.admin_home
        } else {
            &self.routes.employee_home
        }
    }
}
