//! Accounts and cookie sessions.
//!
//! Passwords are stored as argon2 PHC strings. A session token has the form
//! `<session id>.<secret>`; only the SHA-256 of the secret is persisted and
//! it is compared in constant time.

use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::forms::{
    BAD_CREDENTIALS, FormErrors, LoginInput, NON_FIELD, SignupInput, USERNAME_TAKEN,
    validate_login, validate_signup,
};
use crate::application::repos::{CreateUserParams, RepoError, SessionsRepo, UsersRepo};
use crate::domain::entities::{SessionRecord, UserRecord};
use crate::domain::users::validate_username;

const TOKEN_SEPARATOR: char = '.';
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid submission: {0}")]
    Invalid(FormErrors),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    sessions: Arc<dyn SessionsRepo>,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        sessions: Arc<dyn SessionsRepo>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            users,
            sessions,
            session_ttl,
        }
    }

    /// Create an account without the signup form's confirmation checks.
    pub async fn register(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        validate_username(username)
            .map_err(|err| AuthError::Invalid(FormErrors::single("username", err.to_string())))?;
        let password_hash = hash_password(password.to_string()).await?;
        let user = self
            .users
            .create_user(CreateUserParams {
                username: username.to_string(),
                password_hash,
            })
            .await
            .map_err(|err| match err {
                RepoError::Duplicate { .. } => {
                    AuthError::Invalid(FormErrors::single("username", USERNAME_TAKEN))
                }
                other => AuthError::Repo(other),
            })?;

        info!(
            target = "application::auth::register",
            user_id = user.id,
            username = %user.username,
            "user registered"
        );
        Ok(user)
    }

    pub async fn signup(&self, input: &SignupInput) -> Result<UserRecord, AuthError> {
        let username = validate_signup(input).map_err(AuthError::Invalid)?;
        if self.users.find_user_by_username(&username).await?.is_some() {
            return Err(AuthError::Invalid(FormErrors::single(
                "username",
                USERNAME_TAKEN,
            )));
        }
        self.register(&username, &input.password1).await
    }

    pub async fn login(&self, input: &LoginInput) -> Result<(UserRecord, IssuedSession), AuthError> {
        validate_login(input).map_err(AuthError::Invalid)?;

        let bad_credentials = || AuthError::Invalid(FormErrors::single(NON_FIELD, BAD_CREDENTIALS));
        let user = self
            .users
            .find_user_by_username(input.username.trim())
            .await?
            .ok_or_else(bad_credentials)?;

        if !verify_password(input.password.clone(), user.password_hash.clone()).await? {
            warn!(
                target = "application::auth::login",
                username = %user.username,
                "rejected login with wrong password"
            );
            return Err(bad_credentials());
        }

        let session = self.start_session(&user).await?;
        Ok((user, session))
    }

    pub async fn start_session(&self, user: &UserRecord) -> Result<IssuedSession, AuthError> {
        let id = Uuid::new_v4();
        let secret = generate_secret();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.session_ttl;

        self.sessions
            .create_session(SessionRecord {
                id,
                user_id: user.id,
                secret_hash: hash_secret(&secret),
                created_at: now,
                expires_at,
            })
            .await?;

        Ok(IssuedSession {
            token: format!("{}{TOKEN_SEPARATOR}{secret}", id.simple()),
            expires_at,
        })
    }

    /// Resolve a session cookie to its user. Malformed, unknown, expired and
    /// forged tokens all resolve to `None`.
    pub async fn authenticate(&self, token: &str) -> Result<Option<UserRecord>, AuthError> {
        let Some(parsed) = parse_token(token) else {
            return Ok(None);
        };
        let Some(session) = self.sessions.find_session(parsed.id).await? else {
            return Ok(None);
        };

        if session.expires_at <= OffsetDateTime::now_utc() {
            self.sessions.delete_session(session.id).await?;
            return Ok(None);
        }

        let hashed_input = hash_secret(parsed.secret);
        if session.secret_hash.ct_eq(&hashed_input).unwrap_u8() == 0 {
            return Ok(None);
        }

        Ok(self.users.find_user(session.user_id).await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if let Some(parsed) = parse_token(token) {
            self.sessions.delete_session(parsed.id).await?;
        }
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, AuthError> {
        Ok(self
            .sessions
            .purge_expired_sessions(OffsetDateTime::now_utc())
            .await?)
    }

    pub async fn delete_user(&self, username: &str) -> Result<bool, AuthError> {
        let deleted = self.users.delete_user(username).await?;
        if deleted {
            info!(
                target = "application::auth::delete_user",
                username, "user deleted with their posts, comments and follows"
            );
        }
        Ok(deleted)
    }
}

struct ParsedToken<'a> {
    id: Uuid,
    secret: &'a str,
}

fn parse_token(token: &str) -> Option<ParsedToken<'_>> {
    let (id, secret) = token.split_once(TOKEN_SEPARATOR)?;
    if secret.len() < MIN_SECRET_LEN {
        return None;
    }
    let id = Uuid::parse_str(id).ok()?;
    Some(ParsedToken { id, secret })
}

fn generate_secret() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

fn hash_secret(secret: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.finalize().to_vec()
}

async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::Hashing(err.to_string()))
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))?
}

async fn verify_password(password: String, stored_hash: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || {
        let Ok(parsed) = PasswordHash::new(&stored_hash) else {
            return false;
        };
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
    .await
    .map_err(|err| AuthError::Hashing(err.to_string()))
}
