//! JWT token generation and validation.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AuthError, AuthResult, DEFAULT_JWT_EXPIRATION_HOURS, DEFAULT_JWT_ISSUER,
    DEFAULT_RESET_TOKEN_MINUTES,
};

/// What a token may be used for. A token is only accepted for its own purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    /// Authenticates API requests and relay connections.
    Session,
    /// Authorizes exactly one password reset.
    PasswordReset,
}

/// JWT claims for Taskboard tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Token purpose.
    pub purpose: TokenPurpose,
    /// Issued at timestamp.
    pub iat: i64,
    /// Expiration timestamp.
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// JWT ID.
    pub jti: String,
}

impl Claims {
    /// Creates new claims for a user.
    pub fn new(user_id: Uuid, purpose: TokenPurpose, lifetime: Duration, issuer: &str) -> Self {
        let now = Utc::now();
        let exp = now + lifetime;

        Self {
            sub: user_id.to_string(),
            purpose,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: issuer.to_string(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the user ID.
    pub fn user_id(&self) -> AuthResult<Uuid> {
        self.sub.parse().map_err(|_| AuthError::InvalidToken)
    }

    /// Returns true if the token is expired.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// JWT configuration.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens.
    pub secret: String,
    /// Session token expiration in hours.
    pub expiration_hours: u64,
    /// Password reset token expiration in minutes.
    pub reset_expiration_minutes: u64,
    /// Token issuer.
    pub issuer: String,
}

impl JwtConfig {
    /// Creates a new JWT configuration.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            expiration_hours: DEFAULT_JWT_EXPIRATION_HOURS,
            reset_expiration_minutes: DEFAULT_RESET_TOKEN_MINUTES,
            issuer: DEFAULT_JWT_ISSUER.to_string(),
        }
    }

    /// Sets the session expiration time in hours.
    pub fn with_expiration_hours(mut self, hours: u64) -> Self {
        self.expiration_hours = hours;
        self
    }

    /// Sets the password reset expiration time in minutes.
    pub fn with_reset_expiration_minutes(mut self, minutes: u64) -> Self {
        self.reset_expiration_minutes = minutes;
        self
    }

    /// Sets the issuer.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// JWT token manager.
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl std::fmt::Debug for JwtManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtManager")
            .field("issuer", &self.config.issuer)
            .field("expiration_hours", &self.config.expiration_hours)
            .finish_non_exhaustive()
    }
}

impl JwtManager {
    /// Creates a new JWT manager.
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Generates a session token for a user.
    pub fn generate_token(&self, user_id: Uuid) -> AuthResult<String> {
        let lifetime = Duration::hours(self.config.expiration_hours as i64);
        self.sign(Claims::new(
            user_id,
            TokenPurpose::Session,
            lifetime,
            &self.config.issuer,
        ))
    }

    /// Generates a short-lived password reset token for a user.
    pub fn generate_reset_token(&self, user_id: Uuid) -> AuthResult<String> {
        let lifetime = Duration::minutes(self.config.reset_expiration_minutes as i64);
        self.sign(Claims::new(
            user_id,
            TokenPurpose::PasswordReset,
            lifetime,
            &self.config.issuer,
        ))
    }

    /// Signs arbitrary claims with this manager's key.
    pub fn sign(&self, claims: Claims) -> AuthResult<String> {
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::JwtEncoding(e.to_string()))
    }

    /// Validates a session token.
    pub fn validate_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate_for(token, TokenPurpose::Session)
    }

    /// Validates a password reset token.
    pub fn validate_reset_token(&self, token: &str) -> AuthResult<Claims> {
        self.validate_for(token, TokenPurpose::PasswordReset)
    }

    /// Validates and decodes a token issued for `purpose`.
    pub fn validate_for(&self, token: &str, purpose: TokenPurpose) -> AuthResult<Claims> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        if token_data.claims.purpose != purpose {
            tracing::debug!(
                expected = ?purpose,
                actual = ?token_data.claims.purpose,
                "Rejected token issued for another purpose"
            );
            return Err(AuthError::WrongPurpose);
        }

        Ok(token_data.claims)
    }

    /// Returns the session expiration time in seconds.
    pub fn expiration_seconds(&self) -> u64 {
        self.config.expiration_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-must-be-long-enough-for-security";

    #[test]
    fn test_jwt_generation_and_validation() {
        let manager = JwtManager::new(JwtConfig::new(SECRET));
        let user_id = Uuid::new_v4();

        let token = manager.generate_token(user_id).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.purpose, TokenPurpose::Session);
        assert!(!claims.is_expired());
    }

    #[test]
    fn test_invalid_token() {
        let manager = JwtManager::new(JwtConfig::new(SECRET));

        let result = manager.validate_token("invalid-token");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let manager1 = JwtManager::new(JwtConfig::new("secret-one-must-be-long-enough"));
        let manager2 = JwtManager::new(JwtConfig::new("secret-two-must-be-long-enough"));

        let token = manager1.generate_token(Uuid::new_v4()).unwrap();

        let result = manager2.validate_token(&token);
        assert!(result.is_err());
    }

    #[test]
    fn test_purposes_are_not_interchangeable() {
        let manager = JwtManager::new(JwtConfig::new(SECRET));
        let user_id = Uuid::new_v4();

        let reset = manager.generate_reset_token(user_id).unwrap();
        assert!(matches!(
            manager.validate_token(&reset),
            Err(AuthError::WrongPurpose)
        ));
        assert_eq!(
            manager.validate_reset_token(&reset).unwrap().user_id().unwrap(),
            user_id
        );

        let session = manager.generate_token(user_id).unwrap();
        assert!(matches!(
            manager.validate_reset_token(&session),
            Err(AuthError::WrongPurpose)
        ));
    }

    #[test]
    fn test_expired_token() {
        let manager = JwtManager::new(JwtConfig::new(SECRET));
        let claims = Claims::new(
            Uuid::new_v4(),
            TokenPurpose::Session,
            Duration::hours(-2),
            DEFAULT_JWT_ISSUER,
        );
        let token = manager.sign(claims).unwrap();

        assert!(matches!(
            manager.validate_token(&token),
            Err(AuthError::TokenExpired)
        ));
    }

    #[test]
    fn test_reset_token_lifetime() {
        let manager = JwtManager::new(JwtConfig::new(SECRET));
        let token = manager.generate_reset_token(Uuid::new_v4()).unwrap();
        let claims = manager.validate_reset_token(&token).unwrap();

        assert_eq!(claims.exp - claims.iat, 60 * 60);
    }
}
