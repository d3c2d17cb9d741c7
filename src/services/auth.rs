use chrono::{Duration, Utc};
use jsonwebtoken::{errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

use crate::config::JwtConfig;
use crate::models::Role;

const SPECIAL_CHARS: &str = "!@#$%^&*()_-+=[]{};:'\",.<>/?\\|`~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    PasswordReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub token_type: TokenType,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Seconds until the token expires, zero once it has.
    pub fn remaining_seconds(&self) -> u64 {
        (self.exp - Utc::now().timestamp()).max(0) as u64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Invalid token type")]
    WrongType,
}

/// Issues and checks the HS256 tokens handed to clients.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
    reset_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        TokenService {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            access_ttl: Duration::minutes(config.access_ttl_minutes),
            refresh_ttl: Duration::hours(config.refresh_ttl_hours),
            reset_ttl: Duration::minutes(config.password_reset_ttl_minutes),
        }
    }

    pub fn issue_pair(&self, user_id: Uuid, role: Role) -> Result<TokenPair, jsonwebtoken::errors::Error> {
        Ok(TokenPair {
            refresh: self.issue(user_id, role, TokenType::Refresh, self.refresh_ttl)?,
            access: self.issue(user_id, role, TokenType::Access, self.access_ttl)?,
        })
    }

    pub fn issue_access(&self, user_id: Uuid, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(user_id, role, TokenType::Access, self.access_ttl)
    }

    pub fn issue_password_reset(&self, user_id: Uuid, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(user_id, role, TokenType::PasswordReset, self.reset_ttl)
    }

    fn issue(
        &self,
        user_id: Uuid,
        role: Role,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            token_type,
            jti: Uuid::new_v4().simple().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    /// Decodes `token` and checks that it is of the `expected` type.
    pub fn decode(&self, token: &str, expected: TokenType) -> Result<Claims, TokenError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })?;

        if data.claims.token_type != expected {
            return Err(TokenError::WrongType);
        }
        Ok(data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

// A malformed stored hash counts as a mismatch
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < 8 {
        return Err(rule("password_length", "Password must be at least 8 characters"));
    }
    if !password.chars().next().is_some_and(char::is_uppercase) {
        return Err(rule("password_capital", "Password must start with a capital letter"));
    }
    if !password.chars().any(|c| SPECIAL_CHARS.contains(c)) {
        return Err(rule("password_special", "Password must contain at least one special character"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(rule("password_digit", "Password must contain at least one digit"));
    }
    Ok(())
}

/// Nigerian local format: 11 digits starting with 0. Surrounding whitespace is ignored.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let phone = phone.trim();
    if phone.is_empty() || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(rule("phone_digits", "Phone must contain digits only"));
    }
    if phone.len() != 11 {
        return Err(rule("phone_length", "Phone number must be 11 digits"));
    }
    if !phone.starts_with('0') {
        return Err(rule("phone_prefix", "Phone number must start with 0"));
    }
    Ok(())
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(rule("blank", "Field cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(&JwtConfig {
            secret: "test-secret".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_hours: 24,
            password_reset_ttl_minutes: 30,
        })
    }

    fn message(err: ValidationError) -> String {
        err.message.map(|m| m.to_string()).unwrap_or_default()
    }

    #[test]
    fn pair_round_trip() {
        let tokens = service();
        let user_id = Uuid::new_v4();
        let pair = tokens.issue_pair(user_id, Role::Corper).unwrap();

        let access = tokens.decode(&pair.access, TokenType::Access).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(access.role, Role::Corper);

        let refresh = tokens.decode(&pair.refresh, TokenType::Refresh).unwrap();
        assert_ne!(access.jti, refresh.jti);
        assert!(refresh.exp > access.exp);
        assert!(refresh.remaining_seconds() > 23 * 3600);
    }

    #[test]
    fn wrong_type_is_rejected() {
        let tokens = service();
        let pair = tokens.issue_pair(Uuid::new_v4(), Role::Vendor).unwrap();
        assert_eq!(
            tokens.decode(&pair.access, TokenType::Refresh).unwrap_err(),
            TokenError::WrongType
        );

        let reset = tokens.issue_password_reset(Uuid::new_v4(), Role::Vendor).unwrap();
        assert!(tokens.decode(&reset, TokenType::PasswordReset).is_ok());
        assert_eq!(tokens.decode(&reset, TokenType::Access).unwrap_err(), TokenError::WrongType);
    }

    #[test]
    fn expired_token() {
        let tokens = service();
        let token = tokens
            .issue(Uuid::new_v4(), Role::Corper, TokenType::PasswordReset, Duration::minutes(-5))
            .unwrap();
        let err = tokens.decode(&token, TokenType::PasswordReset).unwrap_err();
        assert_eq!(err, TokenError::Expired);
        assert_eq!(err.to_string(), "Token has expired");
    }

    #[test]
    fn garbage_and_foreign_tokens() {
        let tokens = service();
        assert_eq!(tokens.decode("not-a-jwt", TokenType::Access).unwrap_err(), TokenError::Invalid);

        let other = TokenService::new(&JwtConfig {
            secret: "another-secret".to_string(),
            access_ttl_minutes: 60,
            refresh_ttl_hours: 24,
            password_reset_ttl_minutes: 30,
        });
        let foreign = other.issue_access(Uuid::new_v4(), Role::Corper).unwrap();
        assert_eq!(tokens.decode(&foreign, TokenType::Access).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn password_hashing() {
        let hash = hash_password("Secret#123").unwrap();
        assert!(verify_password("Secret#123", &hash));
        assert!(!verify_password("Secret#124", &hash));
        assert!(!verify_password("Secret#123", "not-a-hash"));
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("Abcdef#1").is_ok());
        assert_eq!(message(validate_password("Ab#1").unwrap_err()), "Password must be at least 8 characters");
        assert_eq!(message(validate_password("abcdef#12").unwrap_err()), "Password must start with a capital letter");
        assert_eq!(
            message(validate_password("Abcdefg12").unwrap_err()),
            "Password must contain at least one special character"
        );
        assert_eq!(message(validate_password("Abcdefg#x").unwrap_err()), "Password must contain at least one digit");
        assert!(validate_password("Pass\\word1").is_ok());
    }

    #[test]
    fn phone_rules() {
        assert!(validate_phone("08031234567").is_ok());
        assert!(validate_phone(" 08031234567 ").is_ok());
        assert_eq!(message(validate_phone("0803-123-4567").unwrap_err()), "Phone must contain digits only");
        assert_eq!(message(validate_phone("0803123456").unwrap_err()), "Phone number must be 11 digits");
        assert_eq!(message(validate_phone("18031234567").unwrap_err()), "Phone number must start with 0");
    }

    #[test]
    fn blank_fields() {
        assert!(validate_not_blank("Ade Motors").is_ok());
        assert!(validate_not_blank("   ").is_err());
    }
}
