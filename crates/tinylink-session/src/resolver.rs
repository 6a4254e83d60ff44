use crate::codec::{SessionCodec, SessionKey};
use crate::error::SessionError;
use std::collections::HashMap;
use std::sync::Arc;
use tinylink_core::{Storage, UrlTable, UserId};
use tracing::debug;

/// Identity bound to the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    /// Set when a new identity was minted; the caller hands it back to the client.
    pub issued_token: Option<String>,
}

impl Session {
    pub fn is_new(&self) -> bool {
        self.issued_token.is_some()
    }
}

/// Maps presented session tokens onto user partitions.
#[derive(Clone)]
pub struct SessionResolver {
    codec: SessionCodec,
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver").finish_non_exhaustive()
    }
}

impl SessionResolver {
    pub fn new(key: &SessionKey, storage: Arc<dyn Storage>) -> Self {
        Self {
            codec: SessionCodec::new(key),
            storage,
        }
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    /// Resolves the identity behind `token`.
    ///
    /// A token is accepted only if it decrypts under the server key and names
    /// an existing partition. In every other case a fresh identity is minted,
    /// its empty partition saved, and the encrypted token returned in
    /// [`Session::issued_token`].
    pub async fn resolve(&self, token: Option<&str>) -> Result<Session, SessionError> {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            match self.codec.decrypt(token) {
                Ok(user_id) if self.storage.has_user(&user_id).await? => {
                    return Ok(Session {
                        user_id,
                        issued_token: None,
                    });
                }
                Ok(user_id) => {
                    debug!(user_id = %user_id, "session names an unknown user, minting a new one");
                }
                Err(err) => {
                    debug!(error = %err, "discarding undecodable session token");
                }
            }
        }

        self.mint().await
    }

    async fn mint(&self) -> Result<Session, SessionError> {
        let user_id = UserId::mint();
        self.storage
            .save(UrlTable::from([(user_id.clone(), HashMap::new())]))
            .await?;
        let token = self.codec.encrypt(&user_id)?;

        debug!(user_id = %user_id, "issued new session");
        Ok(Session {
            user_id,
            issued_token: Some(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KEY_LEN;
    use tinylink_storage::InMemoryStorage;

    fn resolver(storage: Arc<InMemoryStorage>, key_byte: u8) -> SessionResolver {
        SessionResolver::new(&SessionKey::from_bytes([key_byte; KEY_LEN]), storage)
    }

    #[tokio::test]
    async fn missing_token_mints_and_saves_partition() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = resolver(storage.clone(), 1);

        let session = resolver.resolve(None).await.unwrap();

        assert!(session.is_new());
        assert!(storage.has_user(&session.user_id).await.unwrap());
        let token = session.issued_token.unwrap();
        assert_eq!(resolver.codec().decrypt(&token).unwrap(), session.user_id);
    }

    #[tokio::test]
    async fn valid_token_is_accepted() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = resolver(storage, 1);
        let first = resolver.resolve(None).await.unwrap();
        let token = first.issued_token.clone().unwrap();

        let second = resolver.resolve(Some(&token)).await.unwrap();

        assert_eq!(second.user_id, first.user_id);
        assert!(!second.is_new());
    }

    #[tokio::test]
    async fn token_for_unknown_user_is_replaced() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = resolver(storage, 1);
        let stranger = resolver.codec().encrypt(&UserId::new("ghost")).unwrap();

        let session = resolver.resolve(Some(&stranger)).await.unwrap();

        assert_ne!(session.user_id, UserId::new("ghost"));
        assert!(session.is_new());
    }

    #[tokio::test]
    async fn garbage_token_is_replaced() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = resolver(storage.clone(), 1);

        let session = resolver.resolve(Some("definitely-not-a-token")).await.unwrap();

        assert!(session.is_new());
        assert_eq!(storage.statistics().await.unwrap().users, 1);
    }

    #[tokio::test]
    async fn token_under_another_key_is_replaced() {
        let storage = Arc::new(InMemoryStorage::new());
        let old = resolver(storage.clone(), 1).resolve(None).await.unwrap();

        let session = resolver(storage, 2)
            .resolve(old.issued_token.as_deref())
            .await
            .unwrap();

        assert_ne!(session.user_id, old.user_id);
        assert!(session.is_new());
    }
}
