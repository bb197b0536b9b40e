use std::sync::Arc;

use r2d2::PooledConnection;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Deserialize;
use thiserror::Error;

use crate::models::db_operations::users_db_operations::{self, NewUser, ProfileUpdate};
use crate::models::db_operations::DbError;
use crate::models::{Role, User};
use crate::services::clock::Clock;
use crate::DbPool;

#[derive(Error, Debug)]
pub enum AuthError {
    /// Covers both unknown emails and wrong passwords.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email or username is already registered")]
    AlreadyExists,
    #[error("{0}")]
    InvalidInput(String),
    #[error("User not found")]
    UserNotFound,
    #[error("Password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error(transparent)]
    Storage(#[from] DbError),
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

pub const LANGUAGE_SETTING: &str = "language";

/// Accounts, credentials, profiles and follows, backed by the SQLite pool.
pub struct AuthService {
    pool: DbPool,
    hash_cost: u32,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    pub fn new(pool: DbPool, hash_cost: u32, clock: Arc<dyn Clock>) -> Self {
        AuthService { pool, hash_cost, clock }
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, AuthError> {
        self.pool.get().map_err(|e| AuthError::Storage(e.into()))
    }

    pub fn signup(&self, request: &SignupRequest) -> Result<User, AuthError> {
        let email = request.email.trim();
        let username = request.username.trim();
        if !email.contains('@') {
            return Err(AuthError::InvalidInput("A valid email is required".into()));
        }
        if username.is_empty() || request.name.trim().is_empty() {
            return Err(AuthError::InvalidInput("Name and username are required".into()));
        }
        if request.password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required".into()));
        }

        let conn = self.conn()?;
        if users_db_operations::email_or_username_taken(&conn, email, username).map_err(DbError::from)? {
            return Err(AuthError::AlreadyExists);
        }

        let new_user = NewUser {
            email,
            name: request.name.trim(),
            username,
            password: &request.password,
            role: Role::User,
        };
        let user_id = users_db_operations::create_user(&conn, &new_user, self.hash_cost, self.clock.now())
            .map_err(DbError::from)?;
        log::info!("New user '{}' signed up with id {}.", username, user_id);

        users_db_operations::read_user_by_id(&conn, user_id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let conn = self.conn()?;
        let user = users_db_operations::verify_credentials(&conn, email, password)
            .map_err(DbError::from)?
            .ok_or(AuthError::InvalidCredentials)?;

        if let Err(e) = users_db_operations::update_last_login_time(&conn, user.id, self.clock.now()) {
            log::error!("Failed to update last login time for user {}: {}", user.id, e);
        }
        log::info!("User '{}' logged in.", user.username);
        Ok(user)
    }

    pub fn current_user(&self, user_id: i64) -> Result<Option<User>, AuthError> {
        let conn = self.conn()?;
        Ok(users_db_operations::read_user_by_id(&conn, user_id).map_err(DbError::from)?)
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        let conn = self.conn()?;
        Ok(users_db_operations::read_user_by_username(&conn, username).map_err(DbError::from)?)
    }

    pub fn update_profile(&self, user_id: i64, changes: &ProfileChanges) -> Result<User, AuthError> {
        let conn = self.conn()?;
        let username = changes.username.as_deref().map(str::trim);
        if let Some(username) = username {
            if username.is_empty() {
                return Err(AuthError::InvalidInput("Username cannot be empty".into()));
            }
            let taken_by_other = users_db_operations::read_user_by_username(&conn, username)
                .map_err(DbError::from)?
                .map_or(false, |existing| existing.id != user_id);
            if taken_by_other {
                return Err(AuthError::AlreadyExists);
            }
        }

        let update = ProfileUpdate {
            name: changes.name.as_deref(),
            username,
            bio: changes.bio.as_deref(),
            avatar: changes.avatar.as_deref(),
        };
        if users_db_operations::update_profile(&conn, user_id, &update).map_err(DbError::from)? == 0 {
            return Err(AuthError::UserNotFound);
        }
        users_db_operations::read_user_by_id(&conn, user_id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn change_password(&self, user_id: i64, current: &str, new_password: &str) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required".into()));
        }
        let conn = self.conn()?;
        let user = users_db_operations::read_user_by_id(&conn, user_id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)?;
        users_db_operations::verify_credentials(&conn, &user.email, current)
            .map_err(DbError::from)?
            .ok_or(AuthError::InvalidCredentials)?;
        users_db_operations::update_password(&conn, user_id, new_password, self.hash_cost).map_err(DbError::from)?;
        Ok(())
    }

    /// Returns the followee on success. Following twice is a no-op.
    pub fn follow(&self, follower_id: i64, username: &str) -> Result<User, AuthError> {
        let conn = self.conn()?;
        let followee = users_db_operations::read_user_by_username(&conn, username)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)?;
        if followee.id == follower_id {
            return Err(AuthError::InvalidInput("You cannot follow yourself".into()));
        }
        users_db_operations::follow(&conn, follower_id, followee.id).map_err(DbError::from)?;
        users_db_operations::read_user_by_id(&conn, followee.id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn unfollow(&self, follower_id: i64, username: &str) -> Result<User, AuthError> {
        let conn = self.conn()?;
        let followee = users_db_operations::read_user_by_username(&conn, username)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)?;
        users_db_operations::unfollow(&conn, follower_id, followee.id).map_err(DbError::from)?;
        users_db_operations::read_user_by_id(&conn, followee.id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn set_role(&self, user_id: i64, role: Role) -> Result<User, AuthError> {
        let conn = self.conn()?;
        if users_db_operations::update_role(&conn, user_id, role).map_err(DbError::from)? == 0 {
            return Err(AuthError::UserNotFound);
        }
        log::info!("Role of user {} changed to {}.", user_id, role);
        users_db_operations::read_user_by_id(&conn, user_id)
            .map_err(DbError::from)?
            .ok_or(AuthError::UserNotFound)
    }

    pub fn list_users(&self) -> Result<Vec<User>, AuthError> {
        let conn = self.conn()?;
        Ok(users_db_operations::read_all_users(&conn).map_err(DbError::from)?)
    }

    pub fn delete_user(&self, user_id: i64) -> Result<(), AuthError> {
        let conn = self.conn()?;
        match users_db_operations::delete_user(&conn, user_id).map_err(DbError::from)? {
            0 => Err(AuthError::UserNotFound),
            _ => Ok(()),
        }
    }

    pub fn language_preference(&self, user_id: i64) -> Result<Option<String>, AuthError> {
        let conn = self.conn()?;
        Ok(users_db_operations::read_user_setting(&conn, user_id, LANGUAGE_SETTING).map_err(DbError::from)?)
    }

    pub fn save_language_preference(&self, user_id: i64, language: &str) -> Result<(), AuthError> {
        let conn = self.conn()?;
        users_db_operations::update_user_setting(&conn, user_id, LANGUAGE_SETTING, language).map_err(DbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::SystemClock;
    use crate::setup::db_setup;

    fn service() -> AuthService {
        let pool = r2d2::Pool::builder()
            .max_size(1)
            .build(SqliteConnectionManager::memory())
            .unwrap();
        db_setup::setup_app_db(&mut pool.get().unwrap()).unwrap();
        AuthService::new(pool, 4, Arc::new(SystemClock))
    }

    fn signup(auth: &AuthService, username: &str) -> User {
        auth.signup(&SignupRequest {
            email: format!("{username}@example.com"),
            name: username.to_uppercase(),
            username: username.into(),
            password: "Test1234!".into(),
        }).unwrap()
    }

    #[test]
    fn signup_then_login_round_trips() {
        let auth = service();
        let user = signup(&auth, "ana");
        assert_eq!(user.role, Role::User);

        let logged_in = auth.login("ANA@example.com", "Test1234!").unwrap();
        assert_eq!(logged_in.id, user.id);
    }

    #[test]
    fn login_failures_share_one_message() {
        let auth = service();
        signup(&auth, "ana");

        let wrong_password = auth.login("ana@example.com", "nope").unwrap_err();
        let unknown_email = auth.login("ghost@example.com", "Test1234!").unwrap_err();

        assert_eq!(wrong_password.to_string(), "Invalid email or password");
        assert_eq!(unknown_email.to_string(), wrong_password.to_string());
    }

    #[test]
    fn duplicate_signup_is_rejected() {
        let auth = service();
        signup(&auth, "ana");
        let again = auth.signup(&SignupRequest {
            email: "other@example.com".into(),
            name: "Other".into(),
            username: "ana".into(),
            password: "pw".into(),
        });
        assert!(matches!(again, Err(AuthError::AlreadyExists)));
    }

    #[test]
    fn follow_updates_counts() {
        let auth = service();
        let ana = signup(&auth, "ana");
        signup(&auth, "ben");

        let ben = auth.follow(ana.id, "ben").unwrap();
        assert_eq!(ben.followers, 1);
        assert_eq!(auth.current_user(ana.id).unwrap().unwrap().following, 1);

        let ben = auth.unfollow(ana.id, "ben").unwrap();
        assert_eq!(ben.followers, 0);
        assert!(matches!(auth.follow(ana.id, "ana"), Err(AuthError::InvalidInput(_))));
    }

    #[test]
    fn profile_update_rejects_taken_usernames() {
        let auth = service();
        let ana = signup(&auth, "ana");
        signup(&auth, "ben");

        let changes = ProfileChanges { username: Some("ben".into()), ..Default::default() };
        assert!(matches!(auth.update_profile(ana.id, &changes), Err(AuthError::AlreadyExists)));

        let changes = ProfileChanges { bio: Some("Writes about Rust".into()), ..Default::default() };
        assert_eq!(auth.update_profile(ana.id, &changes).unwrap().bio, "Writes about Rust");
    }

    #[test]
    fn change_password_requires_the_current_one() {
        let auth = service();
        let ana = signup(&auth, "ana");
        assert!(matches!(auth.change_password(ana.id, "wrong", "new"), Err(AuthError::InvalidCredentials)));
        auth.change_password(ana.id, "Test1234!", "new-pass").unwrap();
        assert!(auth.login("ana@example.com", "new-pass").is_ok());
    }

    #[test]
    fn language_preference_is_stored_per_user() {
        let auth = service();
        let ana = signup(&auth, "ana");
        assert_eq!(auth.language_preference(ana.id).unwrap(), None);
        auth.save_language_preference(ana.id, "en").unwrap();
        assert_eq!(auth.language_preference(ana.id).unwrap().as_deref(), Some("en"));
    }
}
