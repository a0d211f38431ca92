use crate::db::{is_unique_violation, Database};
use crate::error::{AppError, AppResult};
use crate::models::{User, UserResponse};
use crate::utils::password::{hash_password, verify_dummy_password, verify_password};
use crate::utils::time::current_timestamp_seconds;

/// Id reserved for the synthetic operator used when the access gate is disabled.
pub const OPERATOR_USER_ID: i64 = 0;
pub const OPERATOR_USERNAME: &str = "operator";

pub struct UserService<'a> {
    db: &'a Database,
}

impl<'a> UserService<'a> {
    pub fn new(db: &'a Database) -> Self {
        UserService { db }
    }

    /// Creates a user. The first user ever registered becomes admin; the
    /// count and the insert are one statement so concurrent first
    /// registrations cannot both win.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AppResult<User> {
        if username.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(AppError::Validation(
                "Username, email, and password are required".to_string(),
            ));
        }

        let password_hash = hash_password(password)?;
        let now = current_timestamp_seconds();

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, is_admin, created_at, updated_at)
            VALUES ($1, $2, $3, NOT EXISTS (SELECT 1 FROM users WHERE id <> $4), $5, $6)
            RETURNING id, username, email, password_hash, is_admin, created_at, updated_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(OPERATOR_USER_ID)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::UserAlreadyExists
            } else {
                AppError::from(e)
            }
        })?;

        if user.is_admin {
            tracing::info!("First user '{}' registered as admin", user.username);
        }

        Ok(user)
    }

    /// Unknown usernames and wrong passwords fail identically.
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<User> {
        let user = self.get_user_by_username(username).await?;

        match user {
            Some(user) if verify_password(password, &user.password_hash) => Ok(user),
            Some(_) => Err(AppError::InvalidCredentials),
            None => {
                verify_dummy_password(password);
                Err(AppError::InvalidCredentials)
            }
        }
    }

    pub async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let result = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_admin, created_at, updated_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db.pool)
        .await?;

        Ok(result)
    }

    pub async fn get_user_by_id(&self, id: i64) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, is_admin, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn list_users(&self) -> AppResult<Vec<UserResponse>> {
        let users = sqlx::query_as::<_, UserResponse>(
            r#"
            SELECT id, username, email, is_admin, created_at, updated_at
            FROM users
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.db.pool)
        .await?;

        Ok(users)
    }

    /// Notes and their tag associations go with the user via ON DELETE CASCADE.
    pub async fn delete_user(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }

        tracing::info!("Deleted user {}", id);
        Ok(())
    }

    /// Inserts the operator row (id 0) if missing. Its digest never verifies.
    pub async fn ensure_operator(&self) -> AppResult<()> {
        let now = current_timestamp_seconds();

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, username, email, password_hash, is_admin, created_at, updated_at)
            VALUES ($1, $2, $3, '!', TRUE, $4, $5)
            "#,
        )
        .bind(OPERATOR_USER_ID)
        .bind(OPERATOR_USERNAME)
        .bind("operator@localhost")
        .bind(now)
        .bind(now)
        .execute(&self.db.pool)
        .await?;

        Ok(())
    }
}
