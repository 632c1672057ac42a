/// Sign in with Apple
use crate::{
    account::{SessionTokenIssuer, SignInProfile, User, UserRole, UserStore},
    apple::{AppleIdentityClaims, AppleTokenVerifier},
    error::AppResult,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Result of a successful sign-in
#[derive(Debug, Clone, Serialize)]
pub struct SignInOutcome {
    pub user: User,
    pub token: String,
    /// Whether this sign-in created the user
    pub created: bool,
}

/// Turns a verified Apple identity token into a user and session token
pub struct AppleSignInService {
    verifier: Arc<AppleTokenVerifier>,
    users: Arc<dyn UserStore>,
    sessions: Arc<SessionTokenIssuer>,
}

impl AppleSignInService {
    pub fn new(
        verifier: Arc<AppleTokenVerifier>,
        users: Arc<dyn UserStore>,
        sessions: Arc<SessionTokenIssuer>,
    ) -> Self {
        Self {
            verifier,
            users,
            sessions,
        }
    }

    pub async fn sign_in(&self, identity_token: &str, profile: SignInProfile) -> AppResult<SignInOutcome> {
        self.sign_in_at(identity_token, profile, Utc::now()).await
    }

    pub async fn sign_in_at(
        &self,
        identity_token: &str,
        profile: SignInProfile,
        now: DateTime<Utc>,
    ) -> AppResult<SignInOutcome> {
        let claims = self.verifier.verify_at(identity_token, now).await?;

        let (mut user, created) = match self.users.find_by_apple_subject(&claims.subject).await? {
            Some(user) => (user, false),
            None => self.create_user(&claims, profile, now).await?,
        };

        self.users.record_login(user.id, now).await?;
        user.last_login_at = Some(now);
        user.updated_at = now;

        let token = self.sessions.issue_at(&user, now)?;

        info!(
            "Apple sign-in for user {} ({})",
            user.id,
            if created { "new" } else { "returning" }
        );

        Ok(SignInOutcome { user, token, created })
    }

    async fn create_user(
        &self,
        claims: &AppleIdentityClaims,
        profile: SignInProfile,
        now: DateTime<Utc>,
    ) -> AppResult<(User, bool)> {
        let user = User {
            id: Uuid::new_v4(),
            apple_user_id: Some(claims.subject.clone()),
            email: claims.email.clone().filter(|e| !e.is_empty()),
            first_name: profile.first_name,
            last_name: profile.last_name,
            country: profile.country.filter(|c| !c.is_empty()),
            role: UserRole::Owner,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        };

        match self.users.create_user(&user).await {
            Ok(()) => Ok((user, true)),
            Err(e) => {
                // A concurrent first sign-in for the same subject won the insert
                let unique = e
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if unique {
                    if let Some(existing) = self.users.find_by_apple_subject(&claims.subject).await? {
                        return Ok((existing, false));
                    }
                }
                Err(e.into())
            }
        }
    }
}
