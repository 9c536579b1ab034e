use super::models::{NewUser, User, UserStatus};
use super::IdentityStore;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// In-memory identity store for tests and local development. Matches the
/// transactional semantics of the Postgres store at the level callers can
/// observe: duplicate emails are rejected, everything else is atomic per
/// call.
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
        }
    }

    /// Directly set an account's status, standing in for the admin actions
    /// that are out of scope here. Returns false when the email is unknown.
    pub async fn set_status(&self, email: &str, status: UserStatus) -> bool {
        let mut users = self.users.write().await;
        for user in users.values_mut() {
            if user.email == email {
                user.status = status;
                user.updated_at = Utc::now();
                return true;
            }
        }
        false
    }
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let users = self.users.read().await;
        Ok(users.values().any(|u| u.email == email))
    }

    async fn create_identity(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email == new_user.email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            status: UserStatus::Active,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            phone: new_user.phone,
            date_of_birth: new_user.date_of_birth,
            gender: new_user.gender,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn record_login(&self, id: Uuid) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        if let Some(user) = users.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}
