use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Closed set of roles. Allowed-roles-per-route checks are sets over this
/// enum rather than string comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
    Nurse,
    Patient,
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserRole::Admin => "admin",
            UserRole::Doctor => "doctor",
            UserRole::Nurse => "nurse",
            UserRole::Patient => "patient",
        };
        f.write_str(name)
    }
}

/// Accounts are soft-deleted: status changes, the row stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "user_status", rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    Deleted,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to create an identity; the password is already hashed
/// by the time this struct exists.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
}

/// The identity summary embedded in auth responses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Full profile returned by `GET /auth/me`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
            status: user.status,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            phone: user.phone.clone(),
            date_of_birth: user.date_of_birth,
            gender: user.gender.clone(),
            created_at: user.created_at,
        }
    }
}

fn random_suffix(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_uppercase()
}

/// Medical record number assigned to a new patient profile.
pub fn medical_record_number() -> String {
    format!("MRN-{:X}-{}", Utc::now().timestamp_millis(), random_suffix(6))
}

/// License number assigned to a new medical-staff profile.
pub fn license_number() -> String {
    format!("LIC-{}-{}", Utc::now().timestamp_millis(), random_suffix(5))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serialization_is_lowercase() {
        assert_eq!(serde_json::to_string(&UserRole::Doctor).unwrap(), "\"doctor\"");
        assert_eq!(
            serde_json::from_str::<UserRole>("\"patient\"").unwrap(),
            UserRole::Patient
        );
        assert!(serde_json::from_str::<UserRole>("\"superuser\"").is_err());
    }

    #[test]
    fn test_generated_numbers_have_expected_shape() {
        let mrn = medical_record_number();
        assert!(mrn.starts_with("MRN-"));
        assert_eq!(mrn.split('-').count(), 3);

        let lic = license_number();
        assert!(lic.starts_with("LIC-"));
        assert_ne!(license_number(), lic);
    }

    #[test]
    fn test_user_serialization_hides_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@x.com".into(),
            password_hash: "secret-digest".into(),
            role: UserRole::Patient,
            status: UserStatus::Active,
            first_name: "A".into(),
            last_name: "B".into(),
            phone: None,
            date_of_birth: None,
            gender: None,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-digest"));
        assert!(json.contains("\"status\":\"active\""));
    }
}
