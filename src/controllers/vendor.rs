use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::db_error;
use crate::error::{unique_violation, ApiError, ApiResult};
use crate::middleware::VendorUser;
use crate::models::vendor::VendorProfileChanges;
use crate::models::VendorProfile;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vendor/profile", get(get_profile).patch(update_profile))
}

/// GET /api/vendor/profile
async fn get_profile(
    State(state): State<Arc<AppState>>,
    VendorUser(user): VendorUser,
) -> ApiResult<impl IntoResponse> {
    let profile = VendorProfile::find_by_user(&state.db.pool, user.id)
        .await
        .map_err(db_error("get_vendor_profile"))?
        .ok_or_else(|| ApiError::not_found("Vendor profile not found"))?;

    Ok(Json(json!({
        "email": user.email,
        "full_name": user.full_name,
        "role": user.role,
        "phone": profile.phone,
        "business_name": profile.business_name,
        "business_registration_number": profile.business_registration_number,
        "years_in_operation": profile.years_in_operation,
        "description": profile.description,
        "logo_url": profile.logo_url,
        "verification_status": profile.verification_status,
        "is_verified": profile.is_verified(),
        "rating_average": profile.rating_average,
    })))
}

#[derive(Debug, Default, Deserialize, Validate)]
struct UpdateVendorProfileRequest {
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    business_name: Option<String>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    business_registration_number: Option<String>,
    #[validate(range(min = 0, message = "Years in operation cannot be negative"))]
    years_in_operation: Option<i32>,
    description: Option<String>,
    #[validate(url(message = "Logo URL must be a valid URL"))]
    logo_url: Option<String>,
    payout_bank_name: Option<String>,
    payout_account_number: Option<String>,
}

impl From<UpdateVendorProfileRequest> for VendorProfileChanges {
    fn from(req: UpdateVendorProfileRequest) -> Self {
        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());
        VendorProfileChanges {
            business_name: trimmed(req.business_name),
            business_registration_number: trimmed(req.business_registration_number),
            years_in_operation: req.years_in_operation,
            description: req.description,
            logo_url: trimmed(req.logo_url),
            payout_bank_name: trimmed(req.payout_bank_name),
            payout_account_number: trimmed(req.payout_account_number),
        }
    }
}

/// PATCH /api/vendor/profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    VendorUser(user): VendorUser,
    Json(req): Json<UpdateVendorProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let changes = VendorProfileChanges::from(req);
    let pool = &state.db.pool;

    // Nothing to change, hand back what is stored
    let profile = if changes.is_empty() {
        VendorProfile::find_by_user(pool, user.id)
            .await
            .map_err(db_error("get_vendor_profile"))?
    } else {
        VendorProfile::update(pool, user.id, &changes).await.map_err(|e| {
            if unique_violation(&e).is_some() {
                ApiError::bad_request("This business registration number is already in use")
            } else {
                db_error("update_vendor_profile")(e)
            }
        })?
    };

    let profile = profile.ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_means_no_changes() {
        let req: UpdateVendorProfileRequest = serde_json::from_value(json!({})).unwrap();
        assert!(req.validate().is_ok());
        assert!(VendorProfileChanges::from(req).is_empty());
    }

    #[test]
    fn partial_update() {
        let req: UpdateVendorProfileRequest = serde_json::from_value(json!({
            "business_name": " Ade Motors Ltd ",
            "years_in_operation": 7,
        }))
        .unwrap();
        let changes = VendorProfileChanges::from(req);
        assert_eq!(changes.business_name.as_deref(), Some("Ade Motors Ltd"));
        assert_eq!(changes.years_in_operation, Some(7));
        assert!(changes.logo_url.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let req: UpdateVendorProfileRequest = serde_json::from_value(json!({ "years_in_operation": -2 })).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateVendorProfileRequest = serde_json::from_value(json!({ "logo_url": "not a url" })).unwrap();
        assert!(req.validate().is_err());

        let req: UpdateVendorProfileRequest = serde_json::from_value(json!({ "business_name": "  " })).unwrap();
        assert!(req.validate().is_err());
    }
}
