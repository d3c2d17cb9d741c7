use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

text_enum!(Role {
    Corper => "corper",
    Vendor => "vendor",
    Admin => "admin",
});

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    #[sqlx(try_from = "String")]
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub otp_hash: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub full_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: Role,
}

impl User {
    pub async fn find_by_email<'e>(db: impl PgExecutor<'e>, email: &str) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(db)
            .await
    }

    pub async fn find_by_id<'e>(db: impl PgExecutor<'e>, id: Uuid) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(db)
            .await
    }

    pub async fn email_exists<'e>(db: impl PgExecutor<'e>, email: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))")
            .bind(email)
            .fetch_one(db)
            .await
    }

    pub async fn phone_exists<'e>(db: impl PgExecutor<'e>, phone: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE phone = $1)")
            .bind(phone)
            .fetch_one(db)
            .await
    }

    // New accounts stay inactive until the emailed OTP is verified
    pub async fn insert<'e>(db: impl PgExecutor<'e>, new: &NewUser<'_>) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (id, email, password_hash, full_name, phone, role, is_active, email_verified)
             VALUES ($1, $2, $3, $4, $5, $6, FALSE, FALSE)
             RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.full_name)
        .bind(new.phone)
        .bind(new.role.as_str())
        .fetch_one(db)
        .await
    }

    pub async fn store_otp<'e>(
        db: impl PgExecutor<'e>,
        user_id: Uuid,
        otp_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET otp_hash = $2, otp_expires_at = $3, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(otp_hash)
            .bind(expires_at)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn clear_otp<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET otp_hash = NULL, otp_expires_at = NULL, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn mark_verified<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE users
             SET otp_hash = NULL, otp_expires_at = NULL, email_verified = TRUE, is_active = TRUE, updated_at = NOW()
             WHERE id = $1"
        )
        .bind(user_id)
        .execute(db)
        .await?;
        Ok(())
    }

    pub async fn update_password<'e>(db: impl PgExecutor<'e>, user_id: Uuid, password_hash: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Wipes OTPs whose expiry has passed. Returns the number of users touched.
    pub async fn clear_expired_otps<'e>(db: impl PgExecutor<'e>, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET otp_hash = NULL, otp_expires_at = NULL
             WHERE otp_expires_at IS NOT NULL AND otp_expires_at < $1"
        )
        .bind(now)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!("corper".parse::<Role>().unwrap(), Role::Corper);
        assert_eq!(Role::Vendor.as_str(), "vendor");
        assert_eq!(Role::try_from("admin".to_string()).unwrap(), Role::Admin);
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = "driver".parse::<Role>().unwrap_err();
        assert_eq!(err.to_string(), "unknown Role value 'driver'");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_value(Role::Corper).unwrap(), "corper");
    }
}
