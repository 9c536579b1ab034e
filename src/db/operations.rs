use super::models::{license_number, medical_record_number, NewUser, User, UserRole, UserStatus};
use super::IdentityStore;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str = "id, email, password_hash, role, status, first_name, last_name, \
                            phone, date_of_birth, gender, last_login, created_at, updated_at";

/// Postgres-backed identity store.
pub struct PgIdentityStore {
    pool: Arc<PgPool>,
}

impl PgIdentityStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(user)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AppError> {
        let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(self.pool.as_ref())
            .await?;

        Ok(found.is_some())
    }

    async fn create_identity(&self, new_user: NewUser) -> Result<User, AppError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users \
             (id, email, password_hash, role, status, first_name, last_name, \
              phone, date_of_birth, gender, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .bind(new_user.role)
        .bind(UserStatus::Active)
        .bind(&new_user.first_name)
        .bind(&new_user.last_name)
        .bind(&new_user.phone)
        .bind(new_user.date_of_birth)
        .bind(&new_user.gender)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        match user.role {
            UserRole::Patient => {
                sqlx::query(
                    "INSERT INTO patients (user_id, medical_record_number) VALUES ($1, $2)",
                )
                .bind(user.id)
                .bind(medical_record_number())
                .execute(&mut *tx)
                .await?;
            }
            UserRole::Doctor | UserRole::Nurse => {
                sqlx::query(
                    "INSERT INTO medical_staff (user_id, license_number) VALUES ($1, $2)",
                )
                .bind(user.id)
                .bind(license_number())
                .execute(&mut *tx)
                .await?;
            }
            UserRole::Admin => {}
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn record_login(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }
}
