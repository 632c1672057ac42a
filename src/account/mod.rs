/// Syndicate member accounts
///
/// Members sign in with Apple; a verified identity token maps to a user
/// row by its stable `sub` and yields a signed session token.

mod apple_sign_in;
mod session;
mod store;

pub use apple_sign_in::{AppleSignInService, SignInOutcome};
pub use session::{SessionClaims, SessionTokenIssuer};
pub use store::SqliteUserStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// User role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Manager,
    #[default]
    Owner,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Manager => "manager",
            UserRole::Owner => "owner",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    /// Apple `sub`, the stable external identity
    pub apple_user_id: Option<String>,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub country: Option<String>,
    pub role: UserRole,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile fields the client sends alongside an identity token.
/// Apple only shares the name on the very first authorization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignInProfile {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub country: Option<String>,
}

/// User persistence
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_apple_subject(&self, subject: &str) -> Result<Option<User>, sqlx::Error>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, sqlx::Error>;

    async fn create_user(&self, user: &User) -> Result<(), sqlx::Error>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), sqlx::Error>;
}
