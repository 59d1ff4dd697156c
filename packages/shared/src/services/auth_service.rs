use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::player::{PlayerIdentity, PlayerProfile};
use crate::repositories::user_repository::UserRepository;
use crate::services::errors::auth_service_errors::AuthServiceError;

const GUEST_NAME_MIN: usize = 2;
const GUEST_NAME_MAX: usize = 24;
const GUEST_ID_PREFIX: &str = "guest_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

pub struct AuthService {
    user_repository: Arc<dyn UserRepository>,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(user_repository: Arc<dyn UserRepository>, jwt_secret: &str) -> Self {
        AuthService {
            user_repository,
            jwt_secret: jwt_secret.to_string(),
        }
    }

    /// Verifies the token and loads the account it names.
    pub async fn authenticate_account(&self, token: &str) -> Result<PlayerProfile, AuthServiceError> {
        if token.trim().is_empty() {
            return Err(AuthServiceError::MissingToken);
        }
        let claims = self.verify_token(token)?;
        let user = self.user_repository.get_user_by_id(&claims.sub).await?;
        Ok(user.profile())
    }

    /// Mints a guest identity, or reuses the one the client presents so a
    /// dropped guest can resume its room.
    pub fn authenticate_guest(
        &self,
        name: &str,
        guest_id: Option<&str>,
    ) -> Result<PlayerProfile, AuthServiceError> {
        let name = name.trim();
        let length = name.chars().count();
        if length < GUEST_NAME_MIN {
            return Err(AuthServiceError::InvalidGuestName(format!(
                "Name must be at least {} characters",
                GUEST_NAME_MIN
            )));
        }
        if length > GUEST_NAME_MAX {
            return Err(AuthServiceError::InvalidGuestName(format!(
                "Name must be at most {} characters",
                GUEST_NAME_MAX
            )));
        }

        let guest_id = match guest_id {
            Some(id) if is_guest_id(id) => id.to_string(),
            _ => PlayerIdentity::new_guest_id(),
        };
        Ok(PlayerProfile::guest(&guest_id, name))
    }

    pub fn generate_token(&self, user_id: &str) -> Result<String, AuthServiceError> {
        let now = Utc::now();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            exp: (now + Duration::hours(24)).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )
        .map_err(|e| AuthServiceError::JwtError(format!("{:#?}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<TokenClaims, AuthServiceError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_ref());
        let validation = Validation::default();

        match decode::<TokenClaims>(token, &decoding_key, &validation) {
            Ok(token_data) => {
                let now = Utc::now().timestamp() as usize;
                if token_data.claims.exp < now {
                    Err(AuthServiceError::ExpiredToken)
                } else {
                    Ok(token_data.claims)
                }
            }
            Err(err) => match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    Err(AuthServiceError::ExpiredToken)
                }
                _ => Err(AuthServiceError::InvalidToken),
            },
        }
    }
}

fn is_guest_id(id: &str) -> bool {
    id.len() <= 64
        && id
            .strip_prefix(GUEST_ID_PREFIX)
            .map(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::repositories::errors::RepositoryError;
    use crate::repositories::user_repository::MockUserRepository;

    fn service_with(mock_repo: MockUserRepository) -> AuthService {
        AuthService::new(Arc::new(mock_repo), "test-secret-key")
    }

    #[test]
    fn test_token_generation_and_verification_roundtrip() {
        let auth_service = service_with(MockUserRepository::new());

        let token = auth_service.generate_token("roundtrip-user-id").unwrap();
        let claims = auth_service.verify_token(&token).unwrap();

        assert_eq!(claims.sub, "roundtrip-user-id");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_verify_token_invalid() {
        let auth_service = service_with(MockUserRepository::new());

        let result = auth_service.verify_token("invalid-token");
        assert!(matches!(result, Err(AuthServiceError::InvalidToken)));
    }

    #[test]
    fn test_different_secrets_produce_different_tokens() {
        let auth_service1 = AuthService::new(Arc::new(MockUserRepository::new()), "secret1");
        let auth_service2 = AuthService::new(Arc::new(MockUserRepository::new()), "secret2");

        let token1 = auth_service1.generate_token("same-user-id").unwrap();

        assert!(auth_service1.verify_token(&token1).is_ok());
        assert!(auth_service2.verify_token(&token1).is_err());
    }

    #[tokio::test]
    async fn test_authenticate_account_loads_profile() {
        let mut user = User::new("magnus".to_string());
        user.rating = 1850;
        let user_id = user.id.clone();

        let mut mock_repo = MockUserRepository::new();
        let stored = user.clone();
        mock_repo
            .expect_get_user_by_id()
            .returning(move |_| Ok(stored.clone()));
        let auth_service = service_with(mock_repo);

        let token = auth_service.generate_token(&user_id).unwrap();
        let profile = auth_service.authenticate_account(&token).await.unwrap();

        assert_eq!(profile.identity, PlayerIdentity::Account(user_id));
        assert_eq!(profile.rating, 1850);
    }

    #[tokio::test]
    async fn test_authenticate_account_unknown_user() {
        let mut mock_repo = MockUserRepository::new();
        mock_repo
            .expect_get_user_by_id()
            .returning(|_| Err(RepositoryError::NotFound));
        let auth_service = service_with(mock_repo);

        let token = auth_service.generate_token("deleted-user").unwrap();
        let result = auth_service.authenticate_account(&token).await;

        assert!(matches!(result, Err(AuthServiceError::UnknownAccount)));
    }

    #[tokio::test]
    async fn test_authenticate_account_missing_token() {
        let auth_service = service_with(MockUserRepository::new());

        let result = auth_service.authenticate_account("  ").await;
        assert!(matches!(result, Err(AuthServiceError::MissingToken)));
    }

    #[test]
    fn test_guest_name_bounds() {
        let auth_service = service_with(MockUserRepository::new());

        assert!(matches!(
            auth_service.authenticate_guest(" a ", None),
            Err(AuthServiceError::InvalidGuestName(_))
        ));
        assert!(matches!(
            auth_service.authenticate_guest(&"x".repeat(25), None),
            Err(AuthServiceError::InvalidGuestName(_))
        ));
        assert!(auth_service.authenticate_guest("Al", None).is_ok());
    }

    #[test]
    fn test_guest_id_is_reused_when_well_formed() {
        let auth_service = service_with(MockUserRepository::new());

        let first = auth_service.authenticate_guest("Visitor", None).unwrap();
        let PlayerIdentity::Guest(id) = first.identity.clone() else {
            panic!("expected a guest identity");
        };
        let again = auth_service.authenticate_guest("Visitor", Some(&id)).unwrap();
        let forged = auth_service
            .authenticate_guest("Visitor", Some("account:admin"))
            .unwrap();

        assert_eq!(again.identity, first.identity);
        assert_ne!(forged.identity, PlayerIdentity::Guest("account:admin".to_string()));
    }
}
