//! Database entity models for portal-session.
//!
//! This module contains the Sea-ORM entity definitions used by
//! [`SeaOrmTokenStorage`](crate::SeaOrmTokenStorage).

/// Persisted bearer-token slot.
pub mod persisted_token;
