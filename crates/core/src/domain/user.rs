use std::fmt;

use chrono::NaiveDate;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::errors::WorkflowError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    #[serde(alias = "OPS_COORDINATOR")]
    Coordinator,
    Approver,
    Vendor,
    Finance,
    Admin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Employee,
        Role::Coordinator,
        Role::Approver,
        Role::Vendor,
        Role::Finance,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "EMPLOYEE",
            Self::Coordinator => "COORDINATOR",
            Self::Approver => "APPROVER",
            Self::Vendor => "VENDOR",
            Self::Finance => "FINANCE",
            Self::Admin => "ADMIN",
        }
    }

    /// Resolves a caller-supplied role label. The operational coordinator
    /// label collapses onto `Coordinator`; anything else unknown is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "EMPLOYEE" => Some(Self::Employee),
            "COORDINATOR" | "OPS_COORDINATOR" => Some(Self::Coordinator),
            "APPROVER" => Some(Self::Approver),
            "VENDOR" => Some(Self::Vendor),
            "FINANCE" => Some(Self::Finance),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Employee => "Employee",
            Self::Coordinator => "Coordinator",
            Self::Approver => "Approver",
            Self::Vendor => "External Vendor",
            Self::Finance => "Finance",
            Self::Admin => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Suspended,
}

/// Plain-text credential kept out of `Debug` output.
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Compares fixed-length SHA-256 digests of both sides.
    pub fn matches(&self, candidate: &str) -> bool {
        let stored = Sha256::digest(self.0.expose_secret().as_bytes());
        let candidate = Sha256::digest(candidate.as_bytes());
        stored.iter().zip(candidate.iter()).fold(0u8, |acc, (left, right)| acc | (left ^ right)) == 0
    }

    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other.0.expose_secret())
    }
}

impl Serialize for Password {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.expose_secret())
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Password::new)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: Password,
    pub role: Role,
    pub status: UserStatus,
    #[serde(default)]
    pub company: Option<String>,
    pub created: NaiveDate,
    #[serde(default)]
    pub version: u64,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn email_matches(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }

    /// Suspension is checked before the password so a suspended account
    /// never yields a session, even with correct credentials.
    pub fn verify_login(&self, password: &str) -> Result<(), AuthError> {
        if self.status == UserStatus::Suspended {
            return Err(AuthError::AccountSuspended);
        }
        if !self.password.matches(password) {
            return Err(AuthError::InvalidPassword);
        }
        Ok(())
    }
}

/// Admin-supplied fields for a new account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: Password,
    pub role: Role,
    #[serde(default)]
    pub company: Option<String>,
}

impl NewUser {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::validation("user name is required"));
        }
        let email = self.email.trim();
        let well_formed = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !well_formed {
            return Err(WorkflowError::validation(format!("`{email}` is not a valid email")));
        }
        if self.password.is_blank() {
            return Err(WorkflowError::validation("password must not be blank"));
        }
        Ok(())
    }

    pub fn into_user(self, created: NaiveDate) -> User {
        User {
            id: UserId(String::new()),
            name: self.name.trim().to_string(),
            email: self.email.trim().to_ascii_lowercase(),
            password: self.password,
            role: self.role,
            status: UserStatus::Active,
            company: self.company.filter(|company| !company.trim().is_empty()),
            created,
            version: 0,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,
    #[error("Account suspended")]
    AccountSuspended,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Authentication unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{AuthError, NewUser, Password, Role, User, UserId, UserStatus};

    fn user(status: UserStatus) -> User {
        User {
            id: UserId("USR-003".to_string()),
            name: "Sarah".to_string(),
            email: "sarah@example.org".to_string(),
            password: Password::new("demo123"),
            role: Role::Employee,
            status,
            company: None,
            created: NaiveDate::from_ymd_opt(2025, 6, 15).expect("valid date"),
            version: 0,
        }
    }

    #[test]
    fn ops_coordinator_label_is_normalized() {
        assert_eq!(Role::from_label("OPS_COORDINATOR"), Some(Role::Coordinator));
        assert_eq!(Role::from_label(" coordinator "), Some(Role::Coordinator));
        assert_eq!(Role::from_label("SUPERUSER"), None);
        assert_eq!(Role::from_label(""), None);
    }

    #[test]
    fn ops_coordinator_alias_deserializes() {
        let role: Role = serde_json::from_str("\"OPS_COORDINATOR\"").expect("alias parses");
        assert_eq!(role, Role::Coordinator);
        assert!(serde_json::from_str::<Role>("\"ROOT\"").is_err());
    }

    #[test]
    fn suspended_user_with_correct_password_is_refused() {
        let error = user(UserStatus::Suspended).verify_login("demo123").expect_err("suspended");
        assert_eq!(error, AuthError::AccountSuspended);
        assert_eq!(error.to_string(), "Account suspended");
    }

    #[test]
    fn wrong_password_is_refused() {
        let error = user(UserStatus::Active).verify_login("demo124").expect_err("bad password");
        assert_eq!(error, AuthError::InvalidPassword);
        user(UserStatus::Active).verify_login("demo123").expect("valid login");
    }

    #[test]
    fn password_match_handles_prefixes_and_length_mismatch() {
        let password = Password::new("demo123");
        assert!(password.matches("demo123"));
        assert!(!password.matches("demo12"));
        assert!(!password.matches("demo1234"));
        assert!(!password.matches(""));
        assert!(Password::new("").matches(""));
        assert_eq!(password, Password::new("demo123"));
        assert_ne!(password, Password::new("Demo123"));
    }

    #[test]
    fn password_is_redacted_in_debug() {
        let debug = format!("{:?}", user(UserStatus::Active));
        assert!(!debug.contains("demo123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn new_user_requires_a_plausible_email() {
        let mut draft = NewUser {
            name: "Frank".to_string(),
            email: "frank-at-example".to_string(),
            password: Password::new("demo123"),
            role: Role::Finance,
            company: None,
        };
        assert!(draft.validate().is_err());

        draft.email = " Frank@Example.org ".to_string();
        draft.validate().expect("valid draft");
        let created = draft.into_user(NaiveDate::from_ymd_opt(2026, 1, 2).expect("valid date"));
        assert_eq!(created.email, "frank@example.org");
        assert!(created.is_active());
    }

    #[test]
    fn email_match_ignores_case() {
        assert!(user(UserStatus::Active).email_matches("SARAH@Example.org"));
    }
}
