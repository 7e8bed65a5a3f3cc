//! SQLite implementation of the CredentialStore trait.
//!
//! Uses rusqlite with bundled SQLite, wrapped in async via
//! tokio::spawn_blocking. Session secrets are sealed before they reach the
//! connection and opened only after they leave it.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use sessionkit_core::{Address, GrantId, PermissionGrant, SessionCredential, SmartAccountHandle};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::now_millis;
use crate::sealed::{SealedSecret, SealingKey};
use crate::traits::CredentialStore;

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    sealing_key: SealingKey,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if needed.
    pub fn open(path: impl AsRef<Path>, sealing_key: SealingKey) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sealing_key,
        })
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory(sealing_key: SealingKey) -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            sealing_key,
        })
    }

    /// Run a blocking closure against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("sealing_key", &self.sealing_key)
            .finish_non_exhaustive()
    }
}

fn address_column(bytes: &[u8], column: &str) -> Result<Address> {
    Address::try_from(bytes)
        .map_err(|_| StoreError::InvalidData(format!("{} has length {}", column, bytes.len())))
}

#[async_trait]
impl CredentialStore for SqliteStore {
    async fn persist_credential(
        &self,
        account: &SmartAccountHandle,
        credential: &SessionCredential,
    ) -> Result<()> {
        let sealed = {
            let secret = credential.expose_secret();
            SealedSecret::seal(&secret, &self.sealing_key, account)?
        };
        let sealed_bytes = sealed.to_bytes()?;
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();
        let address = credential.address().0.to_vec();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_keys
                    (chain_id, account, address, sealed_secret, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![chain_id, account_bytes, address, sealed_bytes, now_millis()],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(account = %account, address = %credential.address(), "persisted session key");
        Ok(())
    }

    async fn load_credential(&self, account: &SmartAccountHandle) -> Result<Option<SessionCredential>> {
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();

        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT address, sealed_secret FROM session_keys
                     WHERE chain_id = ?1 AND account = ?2",
                    params![chain_id, account_bytes],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        let Some((address_bytes, sealed_bytes)) = row else {
            return Ok(None);
        };

        let expected = address_column(&address_bytes, "session key address")?;
        let secret = SealedSecret::from_bytes(&sealed_bytes)?.open(&self.sealing_key, account)?;
        let credential = SessionCredential::from_secret_bytes(&secret)?;

        if credential.address() != expected {
            return Err(StoreError::InvalidData(format!(
                "session key for {} does not match its recorded address",
                account
            )));
        }
        Ok(Some(credential))
    }

    async fn persist_grant(&self, account: &SmartAccountHandle, grant: &PermissionGrant) -> Result<()> {
        if grant.account() != account {
            return Err(StoreError::InvalidData(format!(
                "grant for {} cannot be stored under {}",
                grant.account(),
                account
            )));
        }

        let grant_cbor = grant.to_bytes()?;
        let grant_id = grant.id()?;
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();
        let redeemer = grant.redeemer().0.to_vec();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO session_grants
                    (chain_id, account, grant_id, redeemer, grant_cbor, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    chain_id,
                    account_bytes,
                    grant_id.0.as_slice(),
                    redeemer,
                    grant_cbor,
                    now_millis()
                ],
            )?;
            Ok(())
        })
        .await?;

        tracing::debug!(account = %account, grant = %grant_id, "persisted grant");
        Ok(())
    }

    async fn load_grant(&self, account: &SmartAccountHandle) -> Result<Option<PermissionGrant>> {
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();

        let bytes: Option<Vec<u8>> = self
            .run(move |conn| {
                conn.query_row(
                    "SELECT grant_cbor FROM session_grants WHERE chain_id = ?1 AND account = ?2",
                    params![chain_id, account_bytes],
                    |row| row.get(0),
                )
                .optional()
                .map_err(StoreError::from)
            })
            .await?;

        match bytes {
            Some(bytes) => Ok(Some(PermissionGrant::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn mark_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<()> {
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();
        let redeemer = redeemer.0.to_vec();
        let grant = grant.0.to_vec();

        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO activations
                    (chain_id, account, redeemer, grant_id, activated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![chain_id, account_bytes, redeemer, grant, now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn is_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<bool> {
        let chain_id = account.chain_id.to_string();
        let account_bytes = account.address.0.to_vec();
        let redeemer = redeemer.0.to_vec();
        let grant = grant.0.to_vec();

        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM activations
                     WHERE chain_id = ?1 AND account = ?2 AND redeemer = ?3 AND grant_id = ?4",
                    params![chain_id, account_bytes, redeemer, grant],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}
