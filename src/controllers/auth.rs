use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

use crate::controllers::db_error;
use crate::error::{unique_violation, ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::corper::NewCorperProfile;
use crate::models::user::NewUser;
use crate::models::vendor::NewVendorProfile;
use crate::models::{CorperProfile, Role, User, VendorProfile};
use crate::services::auth::{hash_password, verify_password, TokenType};
use crate::services::mailer::{otp_message, password_reset_message, MailResult};
use crate::services::otp::{generate_otp, hash_otp, OtpCheck};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/corper/register", post(register_corper))
        .route("/vendor/register", post(register_vendor))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/token/refresh", post(refresh_token))
        .route("/verify-otp", post(verify_otp))
        .route("/resend-otp", post(resend_otp))
        .route("/user/me", get(current_user))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

const EMAIL_TAKEN: &str = "This email is already registered";
const PHONE_TAKEN: &str = "This phone number is already registered";
const CALL_UP_TAKEN: &str = "This call-up number is already registered";
const BUSINESS_NUMBER_TAKEN: &str = "This business registration number is already in use";
const BAD_REFRESH: &str = "Invalid or expired refresh token";
const FORGOT_PASSWORD_REPLY: &str = "If your email exists, a reset link has been sent";

/* ---------- helpers ---------- */

// Unique violations that slipped past the up-front checks (concurrent sign-ups)
fn registration_conflict(e: sqlx::Error) -> ApiError {
    match unique_violation(&e).as_deref() {
        Some("users_email_key") => ApiError::bad_request(EMAIL_TAKEN),
        Some("corper_profiles_call_up_number_key") => ApiError::bad_request(CALL_UP_TAKEN),
        Some("vendors_business_registration_number_key") => ApiError::bad_request(BUSINESS_NUMBER_TAKEN),
        _ => db_error("register")(e),
    }
}

// Issues a fresh code for `user` and stores its hash, replacing any previous one
async fn store_new_otp<'e>(
    db: impl sqlx::PgExecutor<'e>,
    state: &AppState,
    user: &User,
) -> ApiResult<String> {
    let otp = generate_otp(state.config.otp.length);
    let expires_at = Utc::now() + Duration::minutes(state.config.otp.ttl_minutes);
    User::store_otp(db, user.id, &hash_otp(&otp), expires_at)
        .await
        .map_err(db_error("store_otp"))?;
    Ok(otp)
}

// Mail trouble is logged; the request that triggered it still succeeds
async fn deliver(state: &AppState, to: &str, message: MailResult<lettre::Message>) {
    let sent = match message {
        Ok(message) => state.mailer.send(message).await,
        Err(e) => Err(e),
    };
    if let Err(e) = sent {
        error!("Failed to send email to {}: {}", to, e);
    }
}

async fn send_otp_email(state: &AppState, to: &str, otp: &str) {
    let message = otp_message(&state.config.app.mail_from, to, otp, state.config.otp.ttl_minutes);
    deliver(state, to, message).await;
}

fn passwords_match(password: &str, confirm_password: &str) -> ApiResult<()> {
    if password != confirm_password {
        return Err(ApiError::bad_request("Passwords do not match"));
    }
    Ok(())
}

/* ---------- REGISTRATION ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CorperRegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(custom(function = "crate::services::auth::validate_password"))]
    password: String,
    confirm_password: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    full_name: String,
    #[validate(custom(function = "crate::services::auth::validate_phone"))]
    phone: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    state_code: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    call_up_number: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    deployment_state: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    camp_location: String,
    deployment_date: NaiveDate,
}

/// POST /api/auth/corper/register
async fn register_corper(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CorperRegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    passwords_match(&req.password, &req.confirm_password)?;

    let pool = &state.db.pool;
    if User::email_exists(pool, &req.email).await.map_err(db_error("email_exists"))? {
        return Err(ApiError::bad_request(EMAIL_TAKEN));
    }

    let password_hash = hash_password(&req.password)?;
    let phone = req.phone.trim();

    let mut tx = pool.begin().await.map_err(db_error("register_corper"))?;

    let user = User::insert(
        &mut *tx,
        &NewUser {
            email: req.email.trim(),
            password_hash: &password_hash,
            full_name: req.full_name.trim(),
            phone: Some(phone),
            role: Role::Corper,
        },
    )
    .await
    .map_err(registration_conflict)?;

    CorperProfile::insert(
        &mut *tx,
        &NewCorperProfile {
            user_id: user.id,
            phone,
            state_code: req.state_code.trim(),
            call_up_number: req.call_up_number.trim(),
            deployment_state: req.deployment_state.trim(),
            camp_location: req.camp_location.trim(),
            deployment_date: req.deployment_date,
        },
    )
    .await
    .map_err(registration_conflict)?;

    let otp = store_new_otp(&mut *tx, &state, &user).await?;
    tx.commit().await.map_err(db_error("register_corper"))?;

    send_otp_email(&state, &user.email, &otp).await;
    let tokens = state.tokens.issue_pair(user.id, user.role)?;
    info!("Corper {} registered", user.id);

    let mut body = json!({
        "message": "Registration successful! Please verify your email.",
        "user": {
            "email": user.email,
            "full_name": user.full_name,
            "role": user.role,
            "email_verified": user.email_verified,
        },
        "tokens": tokens,
    });
    if state.config.app.debug {
        body["dev_otp"] = json!(otp);
        body["dev_message"] = json!("Development mode: Use this OTP to verify");
    }

    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize, Validate)]
struct VendorRegisterRequest {
    #[validate(email(message = "Enter a valid email address"))]
    email: String,
    #[validate(custom(function = "crate::services::auth::validate_password"))]
    password: String,
    confirm_password: String,
    #[validate(custom(function = "crate::services::auth::validate_phone"))]
    phone: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    business_name: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    business_registration_number: String,
    #[validate(range(min = 0, message = "Years in operation cannot be negative"))]
    years_in_operation: i32,
    #[serde(default)]
    description: String,
}

/// POST /api/auth/vendor/register
async fn register_vendor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VendorRegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    passwords_match(&req.password, &req.confirm_password)?;

    let pool = &state.db.pool;
    let phone = req.phone.trim();
    let business_number = req.business_registration_number.trim();

    if User::email_exists(pool, &req.email).await.map_err(db_error("email_exists"))? {
        return Err(ApiError::bad_request(EMAIL_TAKEN));
    }
    if User::phone_exists(pool, phone).await.map_err(db_error("phone_exists"))? {
        return Err(ApiError::bad_request(PHONE_TAKEN));
    }
    if VendorProfile::business_number_exists(pool, business_number)
        .await
        .map_err(db_error("business_number_exists"))?
    {
        return Err(ApiError::bad_request(BUSINESS_NUMBER_TAKEN));
    }

    let password_hash = hash_password(&req.password)?;
    let business_name = req.business_name.trim();

    let mut tx = pool.begin().await.map_err(db_error("register_vendor"))?;

    let user = User::insert(
        &mut *tx,
        &NewUser {
            email: req.email.trim(),
            password_hash: &password_hash,
            full_name: business_name,
            phone: Some(phone),
            role: Role::Vendor,
        },
    )
    .await
    .map_err(registration_conflict)?;

    let profile = VendorProfile::insert(
        &mut *tx,
        &NewVendorProfile {
            user_id: user.id,
            phone,
            business_name,
            business_registration_number: business_number,
            years_in_operation: req.years_in_operation,
            description: Some(req.description.trim()).filter(|d| !d.is_empty()),
        },
    )
    .await
    .map_err(registration_conflict)?;

    let otp = store_new_otp(&mut *tx, &state, &user).await?;
    tx.commit().await.map_err(db_error("register_vendor"))?;

    send_otp_email(&state, &user.email, &otp).await;
    let tokens = state.tokens.issue_pair(user.id, user.role)?;
    info!("Vendor {} registered", user.id);

    let mut body = json!({
        "message": "Vendor registration successful! Please check your email for a verification code (OTP).",
        "user": {
            "email": user.email,
            "full_name": user.full_name,
            "role": user.role,
            "phone": user.phone,
            "email_verified": user.email_verified,
        },
        "vendor_profile": {
            "business_name": profile.business_name,
            "business_registration_number": profile.business_registration_number,
            "years_in_operation": profile.years_in_operation,
        },
        "tokens": tokens,
    });
    if state.config.app.debug {
        body["dev_otp"] = json!(otp);
        body["dev_message"] = json!("Development mode: Use this OTP to verify");
    }

    Ok((StatusCode::CREATED, Json(body)))
}

/* ---------- SESSIONS ---------- */

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

/// POST /api/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db.pool, req.email.trim())
        .await
        .map_err(db_error("login"))?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash) {
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::Forbidden("Account is inactive. Please contact support.".to_string()));
    }

    let tokens = state.tokens.issue_pair(user.id, user.role)?;

    Ok(Json(json!({
        "message": "Login successful",
        "user": {
            "email": user.email,
            "role": user.role,
            "email_verified": user.email_verified,
        },
        "tokens": tokens,
    })))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh: String,
}

// A refresh token that decodes, is not blacklisted and is of the right type
async fn live_refresh_claims(state: &AppState, token: &str) -> ApiResult<crate::services::auth::Claims> {
    let claims = state
        .tokens
        .decode(token, TokenType::Refresh)
        .map_err(|_| ApiError::bad_request(BAD_REFRESH))?;

    let blacklisted = state.cache.is_blacklisted(&claims.jti).await.unwrap_or_else(|e| {
        warn!("Blacklist lookup failed, assuming token {} is live: {}", claims.jti, e);
        false
    });
    if blacklisted {
        return Err(ApiError::bad_request(BAD_REFRESH));
    }
    Ok(claims)
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = live_refresh_claims(&state, &req.refresh).await?;

    state
        .cache
        .blacklist_refresh(&claims.jti, claims.remaining_seconds())
        .await
        .map_err(|e| {
            error!("logout blacklist error: {:?}", e);
            ApiError::Cache(e)
        })?;

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

/// POST /api/auth/token/refresh
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = live_refresh_claims(&state, &req.refresh).await?;

    let user = User::find_by_id(&state.db.pool, claims.sub)
        .await
        .map_err(db_error("refresh_token"))?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::bad_request(BAD_REFRESH))?;

    let access = state.tokens.issue_access(user.id, user.role)?;
    Ok(Json(json!({ "access": access })))
}

/* ---------- OTP ---------- */

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    email: String,
    otp: String,
}

/// POST /api/auth/verify-otp
async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyOtpRequest>,
) -> ApiResult<impl IntoResponse> {
    let pool = &state.db.pool;
    let user = User::find_by_email(pool, req.email.trim())
        .await
        .map_err(db_error("verify_otp"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let check = OtpCheck::evaluate(user.otp_hash.as_deref(), user.otp_expires_at, &req.otp, Utc::now());
    match check {
        OtpCheck::Valid => {
            User::mark_verified(pool, user.id).await.map_err(db_error("verify_otp"))?;
            info!("User {} verified their email", user.id);
            Ok(Json(json!({ "message": check.message(), "success": true })))
        }
        OtpCheck::Expired => {
            User::clear_otp(pool, user.id).await.map_err(db_error("verify_otp"))?;
            Err(ApiError::bad_request(check.message()))
        }
        OtpCheck::Missing | OtpCheck::Mismatch => Err(ApiError::bad_request(check.message())),
    }
}

#[derive(Debug, Deserialize)]
struct EmailRequest {
    email: String,
}

/// POST /api/auth/resend-otp
async fn resend_otp(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = User::find_by_email(&state.db.pool, req.email.trim())
        .await
        .map_err(db_error("resend_otp"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if user.is_active {
        return Err(ApiError::bad_request("User already verified"));
    }

    let otp = store_new_otp(&state.db.pool, &state, &user).await?;
    send_otp_email(&state, &user.email, &otp).await;

    let mut body = json!({ "success": true, "message": "OTP resent successfully" });
    if state.config.app.debug {
        body["otp"] = json!(otp);
    }
    Ok(Json(body))
}

/* ---------- PROFILE ---------- */

#[derive(Debug, Serialize)]
struct CurrentUserResponse {
    id: uuid::Uuid,
    email: String,
    full_name: String,
    role: Role,
    phone: Option<String>,
    is_active: bool,
    email_verified: bool,
    corper_profile: Option<CorperProfile>,
    vendor_profile: Option<VendorProfile>,
}

/// GET /api/auth/user/me
async fn current_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let user = auth.user;
    let pool = &state.db.pool;

    let corper_profile = match user.role {
        Role::Corper => CorperProfile::find_by_user(pool, user.id).await.map_err(db_error("user_me"))?,
        _ => None,
    };
    let vendor_profile = match user.role {
        Role::Vendor => VendorProfile::find_by_user(pool, user.id).await.map_err(db_error("user_me"))?,
        _ => None,
    };

    Ok(Json(CurrentUserResponse {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        role: user.role,
        phone: user.phone,
        is_active: user.is_active,
        email_verified: user.email_verified,
        corper_profile,
        vendor_profile,
    }))
}

/* ---------- PASSWORD RESET ---------- */

/// POST /api/auth/forgot-password
async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> ApiResult<impl IntoResponse> {
    let mut body = json!({ "success": true, "message": FORGOT_PASSWORD_REPLY });

    // Same reply whether or not the address is known
    let Some(user) = User::find_by_email(&state.db.pool, req.email.trim())
        .await
        .map_err(db_error("forgot_password"))?
    else {
        return Ok(Json(body));
    };

    let token = state.tokens.issue_password_reset(user.id, user.role)?;
    let reset_link = format!("{}/reset-password?token={}", state.config.app.frontend_url, token);

    let message = password_reset_message(&state.config.app.mail_from, &user.email, &reset_link);
    deliver(&state, &user.email, message).await;

    if state.config.app.debug {
        body["token"] = json!(token);
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize, Validate)]
struct ResetPasswordRequest {
    token: String,
    #[validate(custom(function = "crate::services::auth::validate_password"))]
    new_password: String,
    confirm_password: String,
}

/// POST /api/auth/reset-password
async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<impl IntoResponse> {
    passwords_match(&req.new_password, &req.confirm_password)?;

    let claims = state
        .tokens
        .decode(&req.token, TokenType::PasswordReset)
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    req.validate()?;

    let user = User::find_by_id(&state.db.pool, claims.sub)
        .await
        .map_err(db_error("reset_password"))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let password_hash = hash_password(&req.new_password)?;
    User::update_password(&state.db.pool, user.id, &password_hash)
        .await
        .map_err(db_error("reset_password"))?;
    info!("Password reset for user {}", user.id);

    Ok(Json(json!({ "success": true, "message": "Password reset successfully" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corper_request() -> CorperRegisterRequest {
        CorperRegisterRequest {
            email: "ada@example.com".into(),
            password: "Secret#123".into(),
            confirm_password: "Secret#123".into(),
            full_name: "Ada Obi".into(),
            phone: "08031234567".into(),
            state_code: "LA/24A/1234".into(),
            call_up_number: "NYSC/UNILAG/2024/12345".into(),
            deployment_state: "Lagos".into(),
            camp_location: "Iyana-Ipaja".into(),
            deployment_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        }
    }

    #[test]
    fn valid_corper_request_passes() {
        assert!(corper_request().validate().is_ok());
    }

    #[test]
    fn corper_request_field_messages() {
        let mut req = corper_request();
        req.phone = "8031234567".into();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Phone number must be 11 digits");

        let mut req = corper_request();
        req.password = "secret#123".into();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Password must start with a capital letter");

        let mut req = corper_request();
        req.email = "not-an-email".into();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Enter a valid email address");
    }

    #[test]
    fn vendor_years_cannot_be_negative() {
        let req = VendorRegisterRequest {
            email: "motors@example.com".into(),
            password: "Secret#123".into(),
            confirm_password: "Secret#123".into(),
            phone: "08031234567".into(),
            business_name: "Ade Motors".into(),
            business_registration_number: "RC123456".into(),
            years_in_operation: -1,
            description: String::new(),
        };
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Years in operation cannot be negative");
    }

    #[test]
    fn password_mismatch() {
        assert!(passwords_match("Secret#123", "Secret#123").is_ok());
        let err = passwords_match("Secret#123", "Secret#124").unwrap_err();
        assert_eq!(err.to_string(), "Passwords do not match");
    }
}
