//! Durable storage of the bearer token.
//!
//! The token slot is the only state that survives a reload. It is written by
//! login, identity verification and logout, and read once at initialization.

use std::fmt::Debug;

use async_trait::async_trait;
use parking_lot::Mutex;
use time::OffsetDateTime;

use crate::error::StorageError;

mod seaorm;

pub use seaorm::SeaOrmTokenStorage;

/// A single persistent key-value slot holding the current bearer token.
#[async_trait]
pub trait TokenStorage: Debug + Send + Sync + 'static {
    /// Returns the stored token, or `None` when logged out.
    async fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replaces the stored token.
    async fn save(&self, token: &str, expires_at: OffsetDateTime) -> Result<(), StorageError>;

    /// Erases the slot. Clearing an empty slot succeeds.
    async fn clear(&self) -> Result<(), StorageError>;
}

/// In-process token slot.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot pre-filled with `token`, as if persisted by an earlier run.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }

    /// Current contents without going through the async trait.
    pub fn peek(&self) -> Option<String> {
        self.slot.lock().clone()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.slot.lock().clone())
    }

    async fn save(&self, token: &str, _expires_at: OffsetDateTime) -> Result<(), StorageError> {
        *self.slot.lock() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.slot.lock().take();
        Ok(())
    }
}

#[async_trait]
impl<T: TokenStorage> TokenStorage for std::sync::Arc<T> {
    async fn load(&self) -> Result<Option<String>, StorageError> {
        (**self).load().await
    }

    async fn save(&self, token: &str, expires_at: OffsetDateTime) -> Result<(), StorageError> {
        (**self).save(token, expires_at).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        (**self).clear().await
    }
}
