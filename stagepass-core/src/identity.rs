use serde::{Deserialize, Serialize};
use async_trait::async_trait;
use stagepass_shared::{Masked, User, UserId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::{CoreError, CoreResult};

/// Bearer token issued by the identity service
pub type Credential = Masked<String>;

/// Body of `POST /users`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: Masked<String>,
    pub name: String,
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// `POST /login`
    async fn login(&self, email: &str, password: &Masked<String>) -> CoreResult<Credential>;

    /// `POST /users`
    async fn register(&self, registration: &Registration) -> CoreResult<User>;

    /// `GET /users/me`
    async fn current_user(&self, token: &Credential) -> CoreResult<User>;
}

/// Durable slot holding the bearer token between runs
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self) -> CoreResult<Option<Credential>>;
    async fn save(&self, token: &Credential) -> CoreResult<()>;
    async fn remove(&self) -> CoreResult<()>;
}

/// Non-durable store, for tests and for running without a credential file
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            slot: Mutex::new(Some(Masked::from(token))),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> CoreResult<Option<Credential>> {
        Ok(self.slot.lock().await.clone())
    }

    async fn save(&self, token: &Credential) -> CoreResult<()> {
        *self.slot.lock().await = Some(token.clone());
        Ok(())
    }

    async fn remove(&self) -> CoreResult<()> {
        *self.slot.lock().await = None;
        Ok(())
    }
}

/// Snapshot of the signed-in session taken at the start of an operation.
///
/// `generation` identifies the session; any login or logout after the
/// snapshot makes it stale (see [`Session::is_current`]).
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub token: Credential,
    pub user: User,
    pub generation: u64,
}

impl SessionTicket {
    pub fn user_id(&self) -> UserId {
        self.user.id
    }
}

/// The signed-in user, shared by every component that calls a service.
///
/// Single writer (login, register, logout, restore), many readers.
pub struct Session {
    current: RwLock<Option<(Credential, User)>>,
    generation: AtomicU64,
    store: Arc<dyn CredentialStore>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            store,
        }
    }

    /// Re-establish the session from the stored token at startup.
    ///
    /// A token the identity service no longer accepts is removed from the
    /// store. Other failures leave the stored token for a later attempt.
    pub async fn restore(&self, identity: &dyn IdentityService) -> CoreResult<Option<User>> {
        let token = match self.store.load().await? {
            Some(token) => token,
            None => return Ok(None),
        };

        match identity.current_user(&token).await {
            Ok(user) => {
                info!("Session restored for user {}", user.id);
                self.install(token, user.clone()).await;
                Ok(Some(user))
            }
            Err(CoreError::Unauthenticated(reason)) => {
                warn!("Stored credential rejected, discarding it: {}", reason);
                self.store.remove().await?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Exchange email and password for a token, then load the profile.
    /// Any failure leaves the session signed out.
    pub async fn login(&self, identity: &dyn IdentityService, email: &str, password: &Masked<String>) -> CoreResult<User> {
        let attempt = async {
            let token = identity.login(email, password).await?;
            let user = identity.current_user(&token).await?;
            Ok::<_, CoreError>((token, user))
        };

        match attempt.await {
            Ok((token, user)) => {
                if let Err(err) = self.store.save(&token).await {
                    warn!("Could not persist credential, session will not survive a restart: {}", err);
                }
                info!("User {} signed in", user.id);
                self.install(token, user.clone()).await;
                Ok(user)
            }
            Err(err) => {
                self.clear().await;
                match err {
                    CoreError::ServiceUnavailable(msg) => Err(CoreError::ServiceUnavailable(msg)),
                    _ => Err(CoreError::Unauthenticated("invalid credentials".to_string())),
                }
            }
        }
    }

    /// Create the account, then sign in with the same credentials
    pub async fn register(&self, identity: &dyn IdentityService, registration: &Registration) -> CoreResult<User> {
        identity.register(registration).await?;
        self.login(identity, &registration.email, &registration.password).await
    }

    pub async fn logout(&self) {
        self.clear().await;
        info!("Session cleared");
    }

    /// Current credentials, or `Unauthenticated` when signed out
    pub async fn ticket(&self) -> CoreResult<SessionTicket> {
        let current = self.current.read().await;
        match current.as_ref() {
            Some((token, user)) => Ok(SessionTicket {
                token: token.clone(),
                user: user.clone(),
                generation: self.generation.load(Ordering::SeqCst),
            }),
            None => Err(CoreError::Unauthenticated("no active session".to_string())),
        }
    }

    pub async fn user(&self) -> Option<User> {
        self.current.read().await.as_ref().map(|(_, user)| user.clone())
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// False once the session the ticket was taken from has ended
    pub fn is_current(&self, ticket: &SessionTicket) -> bool {
        self.generation() == ticket.generation
    }

    async fn install(&self, token: Credential, user: User) {
        let mut current = self.current.write().await;
        *current = Some((token, user));
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn clear(&self) {
        {
            let mut current = self.current.write().await;
            *current = None;
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
        if let Err(err) = self.store.remove().await {
            warn!("Could not remove stored credential: {}", err);
        }
    }
}
