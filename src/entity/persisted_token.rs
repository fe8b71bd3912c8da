//! Persisted token entity model for Sea-ORM database interaction.
//!
//! This module defines the database schema representation of the durable
//! bearer-token slot. One row exists per slot name; an absent row means the
//! client is logged out.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model representing one persisted bearer token.
///
/// # Database Schema
///
/// | Column      | Type               | Description                          |
/// |-------------|--------------------|--------------------------------------|
/// | slot        | TEXT (Primary Key) | Storage slot name, e.g. `accessToken` |
/// | token       | TEXT               | Opaque bearer token                  |
/// | expiry_date | TIMESTAMPTZ        | Expiry decoded from the token claims |
/// | updated_at  | TIMESTAMPTZ        | Last time the slot was written       |
///
/// The expiry column only serves cleanup; whether a loaded token is still
/// valid is decided by the session store from the token itself.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "portal_token")]
pub struct Model {
    /// The slot name, used as the primary key.
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub slot: String,

    /// The bearer token exactly as issued by the backend.
    #[sea_orm(column_type = "Text")]
    pub token: String,

    /// The token's expiry instant.
    pub expiry_date: DateTimeWithTimeZone,

    /// When this slot was last saved.
    pub updated_at: DateTimeWithTimeZone,
}

/// Required enum for Sea-ORM entity relations.
///
/// The token slot has no relations to other entities.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
