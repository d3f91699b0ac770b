//! User accounts and credential checks
//!
//! This is the credential store the session layer talks to: registration
//! rules, password hashing, login verification, and seeding of the designated
//! admin account.

use crate::{
    entities::{User, user},
    errors::{Error, Result},
};
use hmac::{Hmac, Mac};
use regex::Regex;
use sea_orm::{Set, prelude::*};
use sha2::Sha256;
use std::sync::LazyLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[allow(clippy::expect_used)]
static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{3,20}$").expect("valid username pattern"));

const MIN_PASSWORD_LEN: usize = 8;
/// Longer passwords are rejected before hashing.
pub const MAX_PASSWORD_LEN: usize = 128;

/// Why a registration request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationRejection {
    /// Username does not match the allowed pattern
    InvalidUsername,
    /// Username is the configured admin account
    ReservedUsername,
    /// Password shorter than eight characters
    PasswordTooShort,
    /// Password longer than [`MAX_PASSWORD_LEN`]
    PasswordTooLong,
    /// Password lacks a letter or a digit
    PasswordTooWeak,
}

impl RegistrationRejection {
    /// User-facing explanation
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidUsername => {
                "Username must be 3-20 characters long and contain only letters, numbers, underscores, and hyphens"
            }
            Self::ReservedUsername => {
                "This username is reserved and cannot be registered publicly."
            }
            Self::PasswordTooShort => "Password must be at least 8 characters long",
            Self::PasswordTooLong => "Password must not exceed 128 characters",
            Self::PasswordTooWeak => "Password must contain at least one letter and one number",
        }
    }
}

/// Checks a registration request against the account rules.
pub fn validate_registration(
    username: &str,
    password: &str,
    admin_username: Option<&str>,
) -> std::result::Result<(), RegistrationRejection> {
    if !USERNAME_PATTERN.is_match(username) {
        return Err(RegistrationRejection::InvalidUsername);
    }
    if admin_username == Some(username) {
        return Err(RegistrationRejection::ReservedUsername);
    }
    let length = password.chars().count();
    if length < MIN_PASSWORD_LEN {
        return Err(RegistrationRejection::PasswordTooShort);
    }
    if length > MAX_PASSWORD_LEN {
        return Err(RegistrationRejection::PasswordTooLong);
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(RegistrationRejection::PasswordTooWeak);
    }
    Ok(())
}

/// Hashes and verifies passwords with a server-wide secret.
#[derive(Clone)]
pub struct PasswordHasher {
    secret: String,
    dummy_hash: String,
}

impl std::fmt::Debug for PasswordHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher {
    /// Creates a hasher keyed by `secret`.
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        let secret = secret.into();
        let dummy_hash = hash_with(&secret, "dummy_password_for_timing_mitigation")?;
        Ok(Self { secret, dummy_hash })
    }

    /// Produces a `salt$digest` hash for `password`.
    pub fn hash(&self, password: &str) -> Result<String> {
        hash_with(&self.secret, password)
    }

    /// Checks `password` against a stored hash in constant time.
    #[must_use]
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt, digest_hex)) = stored.split_once('$') else {
            return false;
        };
        let Ok(expected) = hex::decode(digest_hex) else {
            return false;
        };
        mac_for(&self.secret, salt, password).is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }
}

fn mac_for(secret: &str, salt: &str, password: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::Auth {
        message: format!("Invalid hashing key: {e}"),
    })?;
    mac.update(salt.as_bytes());
    mac.update(password.as_bytes());
    Ok(mac)
}

fn hash_with(secret: &str, password: &str) -> Result<String> {
    let salt = Uuid::new_v4().simple().to_string();
    let digest = mac_for(secret, &salt, password)?.finalize().into_bytes();
    Ok(format!("{salt}${}", hex::encode(digest)))
}

/// Finds a user by exact username.
pub async fn find_by_username(db: &DatabaseConnection, username: &str) -> Result<Option<user::Model>> {
    User::find()
        .filter(user::Column::Username.eq(username))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Creates a new account. Returns `None` if the username is already taken.
#[instrument(skip(db, hasher, password))]
pub async fn create_user(
    db: &DatabaseConnection,
    hasher: &PasswordHasher,
    username: &str,
    password: &str,
) -> Result<Option<user::Model>> {
    if find_by_username(db, username).await?.is_some() {
        return Ok(None);
    }

    let new_user = user::ActiveModel {
        username: Set(username.to_string()),
        password_hash: Set(hasher.hash(password)?),
        bio: Set(None),
        is_public: Set(false),
        ..Default::default()
    };
    let created = new_user.insert(db).await?;
    info!("Registered user '{}' (id {})", created.username, created.id);
    Ok(Some(created))
}

/// Verifies a username/password pair.
///
/// A verification is performed even for unknown usernames so response timing
/// does not reveal which accounts exist.
#[instrument(skip(db, hasher, password))]
pub async fn authenticate(
    db: &DatabaseConnection,
    hasher: &PasswordHasher,
    username: &str,
    password: &str,
) -> Result<Option<user::Model>> {
    let found = find_by_username(db, username).await?;
    let target_hash = found
        .as_ref()
        .map_or(hasher.dummy_hash.as_str(), |u| u.password_hash.as_str());
    let matches = hasher.verify(password, target_hash);

    Ok(found.filter(|_| matches))
}

/// Creates the admin account from `ADMIN_PASSWORD` if it does not exist yet.
pub async fn seed_admin(
    db: &DatabaseConnection,
    hasher: &PasswordHasher,
    admin_username: Option<&str>,
    admin_password: Option<&str>,
) -> Result<()> {
    let Some(username) = admin_username else {
        return Ok(());
    };

    if find_by_username(db, username).await?.is_some() {
        info!("Admin account already exists.");
        return Ok(());
    }

    match admin_password {
        Some(password) => {
            create_user(db, hasher, username, password).await?;
            info!("Admin account created using ADMIN_PASSWORD.");
        }
        None => warn!(
            "ADMIN_USERNAME is set but ADMIN_PASSWORD is not set. Admin account was NOT seeded. Public registration for this username is blocked."
        ),
    }
    Ok(())
}
