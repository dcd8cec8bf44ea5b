//! User repository for database operations

use anyhow::Result;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::models::{NewUser, Role, User};

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new user with a hashed password. The account starts
    /// unverified.
    pub async fn create(&self, new_user: &NewUser) -> Result<User> {
        info!("Creating new user: {}", new_user.email);

        // Hash the password
        let salt = SaltString::generate(&mut rand::thread_rng());
        let argon2 = Argon2::default();
        let password_hash = argon2
            .hash_password(new_user.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        let row = sqlx::query(
            r#"
            INSERT INTO users (name, email, password_hash, role, department)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, role, department, is_verified,
                      otp_code, otp_expires_at, created_at, updated_at
            "#,
        )
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&password_hash)
        .bind(new_user.role.as_str())
        .bind(&new_user.department)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(&row)
    }

    /// Find a user by email
    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, password_hash, role, department, is_verified,
                   otp_code, otp_expires_at, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    /// Verify a user's password
    pub async fn verify_password(&self, user: &User, password: &str) -> Result<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| anyhow::anyhow!("Failed to parse password hash: {}", e))?;

        let argon2 = Argon2::default();
        let result = argon2.verify_password(password.as_bytes(), &parsed_hash);

        Ok(result.is_ok())
    }

    /// Store a fresh verification code for a user, replacing any
    /// outstanding one
    pub async fn store_otp(&self, id: Uuid, code: &str, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET otp_code = $2, otp_expires_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically consume an outstanding code: marks the user verified and
    /// clears the code so it cannot be used twice. Returns false when the
    /// code no longer matches (already consumed or replaced).
    pub async fn consume_otp(&self, id: Uuid, code: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET is_verified = TRUE, otp_code = NULL, otp_expires_at = NULL, updated_at = now()
            WHERE id = $1 AND otp_code = $2
            "#,
        )
        .bind(id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let role: String = row.get("role");
    let role = role
        .parse::<Role>()
        .map_err(|e| anyhow::anyhow!("Stored role is invalid: {}", e))?;

    Ok(User {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        role,
        department: row.get("department"),
        is_verified: row.get("is_verified"),
        otp_code: row.get("otp_code"),
        otp_expires_at: row.get("otp_expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
