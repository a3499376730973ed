use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{Subscription, User};

/// Fields persisted for a newly registered user. Everything else takes its
/// column default (unverified, starter plan, no session token).
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub avatar_url: &'a str,
    pub verification_token: &'a str,
}

/// True when the error is a unique-index violation, i.e. the store rejected
/// a second insert for an email that already exists.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

impl User {
    /// Find a user by email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, avatar_url, subscription,
                   verify, verification_token, token, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Find a user by an outstanding verification token.
    pub async fn find_by_verification_token(
        db: &PgPool,
        verification_token: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, avatar_url, subscription,
                   verify, verification_token, token, created_at
            FROM users
            WHERE verification_token = $1
            "#,
        )
        .bind(verification_token)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, email, password_hash, avatar_url, subscription,
                   verify, verification_token, token, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Create a new, unverified user.
    pub async fn create(db: &PgPool, new: &NewUser<'_>) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (name, email, password_hash, avatar_url, verification_token)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, email, password_hash, avatar_url, subscription,
                      verify, verification_token, token, created_at
            "#,
        )
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.avatar_url)
        .bind(new.verification_token)
        .fetch_one(db)
        .await?;
        Ok(user)
    }

    /// Flip the user to verified and consume the verification token.
    pub async fn mark_verified(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET verify = TRUE, verification_token = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Store the current bearer token, or clear it with `None` on logout.
    pub async fn set_token(db: &PgPool, id: Uuid, token: Option<&str>) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET token = $2 WHERE id = $1"#)
            .bind(id)
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_subscription(
        db: &PgPool,
        id: Uuid,
        subscription: Subscription,
    ) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET subscription = $2 WHERE id = $1"#)
            .bind(id)
            .bind(subscription)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn set_avatar_url(db: &PgPool, id: Uuid, avatar_url: &str) -> anyhow::Result<()> {
        sqlx::query(r#"UPDATE users SET avatar_url = $2 WHERE id = $1"#)
            .bind(id)
            .bind(avatar_url)
            .execute(db)
            .await?;
        Ok(())
    }
}
