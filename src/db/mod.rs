//! Identity persistence.
//!
//! Components depend on the [`IdentityStore`] trait, not on a concrete
//! backend: production wires in [`PgIdentityStore`], tests and local
//! development use [`MemoryIdentityStore`].

pub mod memory;
mod models;
mod operations;

pub use memory::MemoryIdentityStore;
pub use models::{
    license_number, medical_record_number, NewUser, User, UserProfile, UserRole, UserStatus,
    UserSummary,
};
pub use operations::PgIdentityStore;

use crate::error::AppError;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    /// Create the identity row and its role-specific profile row (patient or
    /// medical staff) atomically: both succeed or both roll back.
    async fn create_identity(&self, new_user: NewUser) -> Result<User, AppError>;

    async fn record_login(&self, id: Uuid) -> Result<(), AppError>;
}
