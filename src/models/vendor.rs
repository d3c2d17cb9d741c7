use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

text_enum!(VerificationStatus {
    Pending => "pending",
    UnderReview => "under_review",
    Verified => "verified",
    Rejected => "rejected",
});

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VendorProfile {
    #[serde(skip)]
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: Uuid,
    pub phone: String,
    pub business_name: String,
    pub business_registration_number: String,
    pub years_in_operation: i32,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    #[serde(skip)]
    pub verification_documents: Option<serde_json::Value>,
    #[sqlx(try_from = "String")]
    pub verification_status: VerificationStatus,
    pub rejection_reason: Option<String>,
    pub rating_average: f64,
    pub payout_bank_name: String,
    pub payout_account_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewVendorProfile<'a> {
    pub user_id: Uuid,
    pub phone: &'a str,
    pub business_name: &'a str,
    pub business_registration_number: &'a str,
    pub years_in_operation: i32,
    pub description: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct VendorProfileChanges {
    pub business_name: Option<String>,
    pub business_registration_number: Option<String>,
    pub years_in_operation: Option<i32>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub payout_bank_name: Option<String>,
    pub payout_account_number: Option<String>,
}

impl VendorProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.business_name.is_none()
            && self.business_registration_number.is_none()
            && self.years_in_operation.is_none()
            && self.description.is_none()
            && self.logo_url.is_none()
            && self.payout_bank_name.is_none()
            && self.payout_account_number.is_none()
    }
}

impl VendorProfile {
    pub fn is_verified(&self) -> bool {
        self.verification_status == VerificationStatus::Verified
    }

    pub async fn find_by_user<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> Result<Option<VendorProfile>, sqlx::Error> {
        sqlx::query_as::<_, VendorProfile>("SELECT * FROM vendors WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn business_number_exists<'e>(db: impl PgExecutor<'e>, number: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM vendors WHERE business_registration_number = $1)")
            .bind(number)
            .fetch_one(db)
            .await
    }

    pub async fn insert<'e>(db: impl PgExecutor<'e>, new: &NewVendorProfile<'_>) -> Result<VendorProfile, sqlx::Error> {
        sqlx::query_as::<_, VendorProfile>(
            "INSERT INTO vendors
                (id, user_id, phone, business_name, business_registration_number, years_in_operation, description)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.phone)
        .bind(new.business_name)
        .bind(new.business_registration_number)
        .bind(new.years_in_operation)
        .bind(new.description)
        .fetch_one(db)
        .await
    }

    pub async fn update<'e>(
        db: impl PgExecutor<'e>,
        user_id: Uuid,
        changes: &VendorProfileChanges,
    ) -> Result<Option<VendorProfile>, sqlx::Error> {
        sqlx::query_as::<_, VendorProfile>(
            "UPDATE vendors SET
                business_name = COALESCE($2, business_name),
                business_registration_number = COALESCE($3, business_registration_number),
                years_in_operation = COALESCE($4, years_in_operation),
                description = COALESCE($5, description),
                logo_url = COALESCE($6, logo_url),
                payout_bank_name = COALESCE($7, payout_bank_name),
                payout_account_number = COALESCE($8, payout_account_number),
                updated_at = NOW()
             WHERE user_id = $1
             RETURNING *"
        )
        .bind(user_id)
        .bind(changes.business_name.as_deref())
        .bind(changes.business_registration_number.as_deref())
        .bind(changes.years_in_operation)
        .bind(changes.description.as_deref())
        .bind(changes.logo_url.as_deref())
        .bind(changes.payout_bank_name.as_deref())
        .bind(changes.payout_account_number.as_deref())
        .fetch_optional(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_status_text() {
        assert_eq!(VerificationStatus::UnderReview.as_str(), "under_review");
        assert_eq!("verified".parse::<VerificationStatus>().unwrap(), VerificationStatus::Verified);
        assert!("approved".parse::<VerificationStatus>().is_err());
    }

    #[test]
    fn only_verified_status_counts() {
        let now = Utc::now();
        let mut profile = VendorProfile {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            phone: "+2348012345678".into(),
            business_name: "Ade Motors".into(),
            business_registration_number: "RC123456".into(),
            years_in_operation: 3,
            description: None,
            logo_url: None,
            verification_documents: None,
            verification_status: VerificationStatus::UnderReview,
            rejection_reason: None,
            rating_average: 0.0,
            payout_bank_name: String::new(),
            payout_account_number: None,
            created_at: now,
            updated_at: now,
        };
        assert!(!profile.is_verified());

        profile.verification_status = VerificationStatus::Verified;
        assert!(profile.is_verified());
    }

    #[test]
    fn empty_changes() {
        assert!(VendorProfileChanges::default().is_empty());

        let changes = VendorProfileChanges { years_in_operation: Some(4), ..Default::default() };
        assert!(!changes.is_empty());
    }
}
