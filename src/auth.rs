//! Authentication module.

use crate::db::{Database, NewAccount, now_timestamp};
use crate::error::{AppError, Result};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hash a password using Argon2.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
}

/// Verify a password against a hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Account kind a token was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Publisher account.
    Publisher,
    /// Reader account.
    Reader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Reader => f.write_str("reader"),
        }
    }
}

/// Access token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account ID, as a string.
    pub sub: String,
    /// Account kind.
    pub role: Role,
    /// Issued-at timestamp.
    pub iat: i64,
    /// Expiry timestamp.
    pub exp: i64,
}

/// Identity extracted from a valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Account kind.
    pub role: Role,
    /// Publisher or reader ID.
    pub id: i64,
}

/// Registration input shared by both account kinds.
#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    /// Display name.
    pub name: String,
    /// Login email.
    pub email: String,
    /// Plaintext password.
    pub password: String,
    /// Contact phone.
    pub phone: String,
    /// Free-form location.
    pub geo_location: String,
    /// Postal address.
    pub address: String,
}

/// Authentication service.
pub struct AuthService {
    db: Database,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_days: u32,
}

impl AuthService {
    /// Create a new auth service.
    pub fn new(db: Database, jwt_secret: &str, token_days: u32) -> Self {
        Self {
            db,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_days,
        }
    }

    /// Register a new account of the given kind, returning its ID.
    pub fn register(&self, role: Role, registration: &Registration) -> Result<i64> {
        let email = registration.email.trim();

        if registration.name.trim().is_empty() || email.is_empty() {
            return Err(AppError::BadRequest("Missing required fields".to_string()));
        }

        if !email.contains('@') {
            return Err(AppError::BadRequest("Invalid email address".to_string()));
        }

        if registration.password.len() < 4 {
            return Err(AppError::BadRequest(
                "Password must be at least 4 characters".to_string(),
            ));
        }

        let account = NewAccount {
            name: registration.name.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password(&registration.password)?,
            phone: registration.phone.clone(),
            geo_location: Some(registration.geo_location.clone()),
            address: Some(registration.address.clone()),
        };

        let id = match role {
            Role::Publisher => self.db.create_publisher(&account)?,
            Role::Reader => self.db.create_reader(&account)?,
        };

        tracing::info!(role = %role, id, "Registered account");
        Ok(id)
    }

    /// Check credentials and issue an access token.
    pub fn login(&self, role: Role, email: &str, password: &str) -> Result<String> {
        let invalid = || AppError::Unauthorized("Invalid email or password".to_string());
        let email = email.trim();

        let (id, password_hash) = match role {
            Role::Publisher => self
                .db
                .get_publisher_by_email(email)?
                .map(|p| (p.publisher_id, p.password_hash)),
            Role::Reader => self
                .db
                .get_reader_by_email(email)?
                .map(|r| (r.reader_id, r.password_hash)),
        }
        .ok_or_else(invalid)?;

        if !verify_password(password, &password_hash)? {
            return Err(invalid());
        }

        self.issue_token(Identity { role, id })
    }

    /// Sign an access token for an identity.
    pub fn issue_token(&self, identity: Identity) -> Result<String> {
        let now = now_timestamp();
        let claims = Claims {
            sub: identity.id.to_string(),
            role: identity.role,
            iat: now,
            exp: now + i64::from(self.token_days) * 24 * 60 * 60,
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Validate a token and return the identity it carries.
    pub fn validate_token(&self, token: &str) -> Result<Identity> {
        let data = jsonwebtoken::decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected token");
            AppError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(Identity {
            role: data.claims.role,
            id,
        })
    }
}
