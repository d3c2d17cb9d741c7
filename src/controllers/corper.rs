use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::db_error;
use crate::error::{ApiError, ApiResult};
use crate::middleware::CorperUser;
use crate::models::corper::CorperProfileChanges;
use crate::models::CorperProfile;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/corper/profile", get(get_profile).patch(update_profile))
}

/// GET /api/corper/profile
async fn get_profile(
    State(state): State<Arc<AppState>>,
    CorperUser(user): CorperUser,
) -> ApiResult<impl IntoResponse> {
    let profile = CorperProfile::find_by_user(&state.db.pool, user.id)
        .await
        .map_err(db_error("get_corper_profile"))?
        .ok_or_else(|| ApiError::not_found("Corper profile not found"))?;

    Ok(Json(json!({
        "email": user.email,
        "full_name": user.full_name,
        "role": user.role,
        "user_phone": user.phone,
        "corper_phone": profile.phone,
        "state_code": profile.state_code,
        "call_up_number": profile.call_up_number,
        "deployment_state": profile.deployment_state,
        "camp_location": profile.camp_location,
        "deployment_date": profile.deployment_date,
    })))
}

#[derive(Debug, Default, Deserialize, Validate)]
struct UpdateCorperProfileRequest {
    #[validate(custom(function = "crate::services::auth::validate_phone"))]
    phone: Option<String>,
    state_code: Option<String>,
    call_up_number: Option<String>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    deployment_state: Option<String>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    camp_location: Option<String>,
    deployment_date: Option<NaiveDate>,
}

impl UpdateCorperProfileRequest {
    // Both are issued by NYSC and stay fixed for the service year
    fn touches_fixed_fields(&self) -> bool {
        self.state_code.is_some() || self.call_up_number.is_some()
    }

    fn into_changes(self) -> CorperProfileChanges {
        CorperProfileChanges {
            phone: self.phone.map(|p| p.trim().to_string()),
            deployment_state: self.deployment_state.map(|s| s.trim().to_string()),
            camp_location: self.camp_location.map(|s| s.trim().to_string()),
            deployment_date: self.deployment_date,
        }
    }
}

/// PATCH /api/corper/profile
async fn update_profile(
    State(state): State<Arc<AppState>>,
    CorperUser(user): CorperUser,
    Json(req): Json<UpdateCorperProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.touches_fixed_fields() {
        return Err(ApiError::bad_request("State code and call-up number cannot be changed"));
    }
    req.validate()?;

    let profile = CorperProfile::update(&state.db.pool, user.id, &req.into_changes())
        .await
        .map_err(db_error("update_corper_profile"))?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;

    Ok(Json(profile))
}
