//! # sessionkit store
//!
//! Persistence for session credentials, permission grants and activation
//! flags, keyed by smart account.
//!
//! ## Key Types
//!
//! - [`CredentialStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage with sealed secrets
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`SealingKey`] - Key that encrypts session secrets at rest
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sessionkit_store::{CredentialStore, CredentialStoreExt, SealingKey, SqliteStore};
//! use sessionkit_core::{Address, ChainId, SmartAccountHandle};
//!
//! async fn example() {
//!     let store = SqliteStore::open("sessions.db", SealingKey::generate()).unwrap();
//!     let account = SmartAccountHandle::new(ChainId::BASE, Address::ZERO);
//!
//!     // Generate and persist a session key
//!     let redeemer = store.provision(&account).await.unwrap();
//!
//!     // A missing grant is `None`, not an error
//!     assert!(store.load_grant(&account).await.unwrap().is_none());
//!     # let _ = redeemer;
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Last write wins**: persisting a credential or grant replaces the old one
//! - **Exact chain ids**: chain ids are stored as decimal text
//! - **Sealed secrets**: session secrets never touch the database in clear

pub mod error;
pub mod memory;
pub mod migration;
pub mod sealed;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sealed::{SealedSecret, SealingKey};
pub use sqlite::SqliteStore;
pub use traits::{CredentialStore, CredentialStoreExt};

/// Current time in Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
