use super::handlers::{LoginRequest, RegisterRequest};
use super::password::PasswordHasher;
use super::tokens::{TokenPair, TokenService};
use crate::db::{IdentityStore, NewUser, UserProfile, UserStatus, UserSummary};
use crate::error::AppError;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Orchestrates registration, login, token refresh and profile lookup over
/// the identity store, the password adapter and the token service.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn IdentityStore>,
    tokens: TokenService,
    passwords: PasswordHasher,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        tokens: TokenService,
        passwords: PasswordHasher,
    ) -> Self {
        Self {
            store,
            tokens,
            passwords,
        }
    }

    pub async fn register(
        &self,
        req: RegisterRequest,
    ) -> Result<(UserSummary, TokenPair), AppError> {
        let email = non_empty(req.email.as_deref());
        let password = non_empty(req.password.as_deref());
        let first_name = non_empty(req.first_name.as_deref());
        let last_name = non_empty(req.last_name.as_deref());

        let (email, password, role, first_name, last_name) =
            match (email, password, req.role, first_name, last_name) {
                (Some(e), Some(p), Some(r), Some(f), Some(l)) => (e, p, r, f, l),
                _ => {
                    return Err(AppError::Validation("Missing required fields".to_string()));
                }
            };

        if self.store.email_exists(email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self.passwords.hash(password)?;
        let user = self
            .store
            .create_identity(NewUser {
                email: email.to_string(),
                password_hash,
                role,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                phone: req.phone,
                date_of_birth: req.date_of_birth,
                gender: req.gender,
            })
            .await?;

        info!("registered {} account for {}", user.role, user.email);
        let tokens = self.tokens.issue_pair(&user)?;
        Ok((UserSummary::from(&user), tokens))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<(UserSummary, TokenPair), AppError> {
        let (email, password) = match (
            non_empty(req.email.as_deref()),
            non_empty(req.password.as_deref()),
        ) {
            (Some(e), Some(p)) => (e, p),
            _ => {
                return Err(AppError::Validation(
                    "Email and password are required".to_string(),
                ));
            }
        };

        // Unknown email and wrong password produce the same error, so the
        // response cannot be used to probe which emails are registered.
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid credentials".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AppError::Forbidden(
                "Account is suspended or inactive".to_string(),
            ));
        }

        if !self.passwords.verify(password, &user.password_hash) {
            return Err(AppError::Authentication("Invalid credentials".to_string()));
        }

        self.store.record_login(user.id).await?;
        info!("login for {} ({})", user.email, user.role);

        let tokens = self.tokens.issue_pair(&user)?;
        Ok((UserSummary::from(&user), tokens))
    }

    /// Mint a fresh access/refresh pair. Both tokens are rotated; the old
    /// refresh token is not revoked and stays valid until its own expiry.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.tokens.verify_refresh_token(refresh_token)?;

        let user = self
            .store
            .find_by_id(claims.sub)
            .await?
            .filter(|u| u.status == UserStatus::Active)
            .ok_or_else(|| AppError::Authentication("Invalid refresh token".to_string()))?;

        self.tokens.issue_pair(&user)
    }

    pub async fn current_user(&self, id: Uuid) -> Result<UserProfile, AppError> {
        let user = self
            .store
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        Ok(UserProfile::from(&user))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{MemoryIdentityStore, UserRole};
    use chrono::Duration;

    fn service_with_store() -> (AuthService, Arc<MemoryIdentityStore>) {
        let settings = Settings::new_for_test().expect("test settings");
        let store = Arc::new(MemoryIdentityStore::new());
        let tokens = TokenService::new(
            settings.auth.access_token_secret.clone(),
            settings.auth.refresh_token_secret.clone(),
            Duration::hours(1),
            Duration::days(7),
        );
        let service = AuthService::new(
            store.clone(),
            tokens,
            PasswordHasher::new(settings.auth.bcrypt_cost),
        );
        (service, store)
    }

    fn register_request(email: &str, role: UserRole) -> RegisterRequest {
        RegisterRequest {
            email: Some(email.to_string()),
            password: Some("secret123".to_string()),
            role: Some(role),
            first_name: Some("A".to_string()),
            last_name: Some("B".to_string()),
            phone: None,
            date_of_birth: None,
            gender: None,
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_register_then_login_preserves_role() {
        let (service, _) = service_with_store();

        let (user, _) = service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Patient);

        let (user, pair) = service
            .login(login_request("a@x.com", "secret123"))
            .await
            .unwrap();
        assert_eq!(user.role, UserRole::Patient);

        let claims = service.tokens.verify_access_token(&pair.token).unwrap();
        assert_eq!(claims.role, UserRole::Patient);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_register_missing_fields() {
        let (service, _) = service_with_store();
        let mut req = register_request("a@x.com", UserRole::Patient);
        req.last_name = Some("   ".to_string());

        let err = service.register(req).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (service, _) = service_with_store();
        service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();

        let err = service
            .register(register_request("a@x.com", UserRole::Doctor))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_indistinguishable() {
        let (service, _) = service_with_store();
        service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();

        let unknown = service
            .login(login_request("nobody@x.com", "secret123"))
            .await
            .unwrap_err();
        let wrong = service
            .login(login_request("a@x.com", "wrongpass"))
            .await
            .unwrap_err();

        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, AppError::Authentication(_)));
        assert!(matches!(wrong, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_suspended_account_is_forbidden() {
        let (service, store) = service_with_store();
        service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();
        assert!(store.set_status("a@x.com", UserStatus::Suspended).await);

        let err = service
            .login(login_request("a@x.com", "secret123"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_refresh_rotates_both_tokens() {
        let (service, _) = service_with_store();
        let (_, pair) = service
            .register(register_request("a@x.com", UserRole::Nurse))
            .await
            .unwrap();

        // iat has one-second resolution; make sure the rotated pair differs.
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        let rotated = service.refresh(&pair.refresh_token).await.unwrap();
        assert_ne!(rotated.token, pair.token);
        assert_ne!(rotated.refresh_token, pair.refresh_token);

        let claims = service.tokens.verify_access_token(&rotated.token).unwrap();
        assert_eq!(claims.role, UserRole::Nurse);
    }

    #[tokio::test]
    async fn test_two_valid_refresh_tokens_both_work() {
        // No revocation list: rotation does not invalidate the older token.
        let (service, _) = service_with_store();
        let (_, pair) = service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();

        let second = service.refresh(&pair.refresh_token).await.unwrap();
        assert!(service.refresh(&pair.refresh_token).await.is_ok());
        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_requires_active_identity() {
        let (service, store) = service_with_store();
        let (_, pair) = service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();
        store.set_status("a@x.com", UserStatus::Suspended).await;

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let (service, _) = service_with_store();
        let (_, pair) = service
            .register(register_request("a@x.com", UserRole::Patient))
            .await
            .unwrap();

        let err = service.refresh(&pair.token).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }
}
