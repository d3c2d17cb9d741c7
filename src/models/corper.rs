use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CorperProfile {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub phone: String,
    pub state_code: String,
    pub call_up_number: String,
    pub deployment_state: String,
    pub camp_location: String,
    pub deployment_date: NaiveDate,
}

pub struct NewCorperProfile<'a> {
    pub user_id: Uuid,
    pub phone: &'a str,
    pub state_code: &'a str,
    pub call_up_number: &'a str,
    pub deployment_state: &'a str,
    pub camp_location: &'a str,
    pub deployment_date: NaiveDate,
}

// Partial update. state_code and call_up_number are fixed once issued.
#[derive(Debug, Default)]
pub struct CorperProfileChanges {
    pub phone: Option<String>,
    pub deployment_state: Option<String>,
    pub camp_location: Option<String>,
    pub deployment_date: Option<NaiveDate>,
}

impl CorperProfile {
    pub async fn find_by_user<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> Result<Option<CorperProfile>, sqlx::Error> {
        sqlx::query_as::<_, CorperProfile>("SELECT * FROM corper_profiles WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn insert<'e>(db: impl PgExecutor<'e>, new: &NewCorperProfile<'_>) -> Result<CorperProfile, sqlx::Error> {
        sqlx::query_as::<_, CorperProfile>(
            "INSERT INTO corper_profiles
                (id, user_id, phone, state_code, call_up_number, deployment_state, camp_location, deployment_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.phone)
        .bind(new.state_code)
        .bind(new.call_up_number)
        .bind(new.deployment_state)
        .bind(new.camp_location)
        .bind(new.deployment_date)
        .fetch_one(db)
        .await
    }

    pub async fn update<'e>(
        db: impl PgExecutor<'e>,
        user_id: Uuid,
        changes: &CorperProfileChanges,
    ) -> Result<Option<CorperProfile>, sqlx::Error> {
        sqlx::query_as::<_, CorperProfile>(
            "UPDATE corper_profiles SET
                phone = COALESCE($2, phone),
                deployment_state = COALESCE($3, deployment_state),
                camp_location = COALESCE($4, camp_location),
                deployment_date = COALESCE($5, deployment_date)
             WHERE user_id = $1
             RETURNING *"
        )
        .bind(user_id)
        .bind(changes.phone.as_deref())
        .bind(changes.deployment_state.as_deref())
        .bind(changes.camp_location.as_deref())
        .bind(changes.deployment_date)
        .fetch_optional(db)
        .await
    }
}
