//! Authenticated actor passed into ledger operations

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

/// Actor role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Librarian,
}

/// Already-authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn member(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    pub fn librarian(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Librarian,
        }
    }

    pub fn is_privileged(&self) -> bool {
        self.role == Role::Librarian
    }

    /// Owner of the resource or a librarian
    pub fn can_act_for(&self, user_id: Uuid) -> bool {
        self.user_id == user_id || self.is_privileged()
    }

    pub fn require_librarian(&self) -> Result<(), AppError> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(AppError::Forbidden("Librarian role required".to_string()))
        }
    }
}

/// JWT claims carried by bearer tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorClaims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl ActorClaims {
    pub fn new(actor: Actor, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: actor.user_id,
            role: actor.role,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    /// Sign the claims (tokens are issued by the auth service; used here by tooling and tests)
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Validate and decode a bearer token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<ActorClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.sub,
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ownership_rules() {
        let owner = Uuid::new_v4();
        assert!(Actor::member(owner).can_act_for(owner));
        assert!(!Actor::member(Uuid::new_v4()).can_act_for(owner));
        assert!(Actor::librarian(Uuid::new_v4()).can_act_for(owner));
        assert!(Actor::member(owner).require_librarian().is_err());
    }

    #[test]
    fn test_token_roundtrip() {
        let actor = Actor::librarian(Uuid::new_v4());
        let token = ActorClaims::new(actor, chrono::Duration::hours(1))
            .create_token("secret")
            .unwrap();
        let claims = ActorClaims::from_token(&token, "secret").unwrap();
        assert_eq!(claims.actor(), actor);
        assert!(ActorClaims::from_token(&token, "other").is_err());
    }
}
