use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::controllers::db_error;
use crate::error::{is_foreign_key_violation, unique_violation, ApiError, ApiResult};
use crate::middleware::VendorUser;
use crate::models::vehicle::{NewVehicle, VehicleChanges};
use crate::models::{Vehicle, VehicleStatus};
use crate::services::booking::{change_vehicle, BookingError};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vendor/vehicles", get(list_vehicles).post(create_vehicle))
        .route(
            "/vendor/vehicles/{id}",
            get(get_vehicle).patch(update_vehicle).delete(delete_vehicle),
        )
}

const VEHICLE_MISSING: &str = "Vehicle does not exist";

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct VehicleTypeBody {
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VehicleResponse {
    pub id: Uuid,
    pub registration_number: String,
    pub vehicle_type: Option<VehicleTypeBody>,
    pub make_model: String,
    pub color: Option<String>,
    pub capacity: i16,
    pub year_manufactured: Option<i32>,
    pub amenities: Option<serde_json::Value>,
    pub status: VehicleStatus,
    pub is_insured: bool,
    pub insurance_expiry: Option<NaiveDate>,
    pub roadworthiness_expiry_date: Option<NaiveDate>,
    pub vehicle_images: Option<serde_json::Value>,
    pub insurance_valid: bool,
    pub roadworthy: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleResponse {
    fn new(vehicle: Vehicle, today: NaiveDate) -> Self {
        VehicleResponse {
            insurance_valid: vehicle.is_insurance_valid(today),
            roadworthy: vehicle.is_roadworthy(today),
            id: vehicle.id,
            registration_number: vehicle.registration_number,
            vehicle_type: vehicle.vehicle_type.map(|name| VehicleTypeBody {
                name,
                description: vehicle.vehicle_type_description,
            }),
            make_model: vehicle.make_model,
            color: vehicle.color,
            capacity: vehicle.capacity,
            year_manufactured: vehicle.year_manufactured,
            amenities: vehicle.amenities,
            status: vehicle.status,
            is_insured: vehicle.is_insured,
            insurance_expiry: vehicle.insurance_expiry,
            roadworthiness_expiry_date: vehicle.roadworthiness_expiry_date,
            vehicle_images: vehicle.vehicle_images,
            created_at: vehicle.created_at,
            updated_at: vehicle.updated_at,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateVehicleRequest {
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    registration_number: String,
    #[validate(nested)]
    vehicle_type: VehicleTypeBody,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    make_model: String,
    color: Option<String>,
    #[validate(range(min = 1, message = "Capacity must be greater than zero"))]
    capacity: i16,
    #[validate(range(min = 1950, max = 2100, message = "Year of manufacture is out of range"))]
    year_manufactured: Option<i32>,
    amenities: Option<serde_json::Value>,
    #[serde(default)]
    is_insured: bool,
    insurance_expiry: Option<NaiveDate>,
    roadworthiness_expiry_date: Option<NaiveDate>,
}

/// POST /api/vendor/vehicles
async fn create_vehicle(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Json(req): Json<CreateVehicleRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let new = NewVehicle {
        registration_number: req.registration_number.trim().to_uppercase(),
        vehicle_type: req.vehicle_type.name.trim().to_string(),
        vehicle_type_description: req.vehicle_type.description,
        make_model: req.make_model.trim().to_string(),
        color: req.color,
        capacity: req.capacity,
        year_manufactured: req.year_manufactured,
        amenities: req.amenities,
        is_insured: req.is_insured,
        insurance_expiry: req.insurance_expiry,
        roadworthiness_expiry_date: req.roadworthiness_expiry_date,
    };

    let mut tx = state.db.pool.begin().await.map_err(db_error("create_vehicle"))?;
    let vehicle = Vehicle::insert(&mut *tx, vendor.id, &new).await.map_err(|e| {
        if unique_violation(&e).is_some() {
            ApiError::bad_request("Could not create vehicle")
        } else {
            db_error("create_vehicle")(e)
        }
    })?;
    tx.commit().await.map_err(db_error("create_vehicle"))?;

    tracing::info!("Vendor {} added vehicle {}", vendor.id, vehicle.registration_number);
    Ok((StatusCode::CREATED, Json(VehicleResponse::new(vehicle, today()))))
}

/* ---------- READ ---------- */

/// GET /api/vendor/vehicles
async fn list_vehicles(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
) -> ApiResult<impl IntoResponse> {
    let today = today();
    let vehicles = Vehicle::list_for_vendor(&state.db.pool, vendor.id)
        .await
        .map_err(db_error("list_vehicles"))?
        .into_iter()
        .map(|v| VehicleResponse::new(v, today))
        .collect::<Vec<_>>();

    Ok(Json(vehicles))
}

/// GET /api/vendor/vehicles/{id}
async fn get_vehicle(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let vehicle = Vehicle::find_for_vendor(&state.db.pool, id, vendor.id)
        .await
        .map_err(db_error("get_vehicle"))?
        .ok_or_else(|| ApiError::not_found(VEHICLE_MISSING))?;

    Ok(Json(VehicleResponse::new(vehicle, today())))
}

/* ---------- UPDATE ---------- */

#[derive(Debug, Default, Deserialize, Validate)]
struct UpdateVehicleRequest {
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    registration_number: Option<String>,
    #[validate(nested)]
    vehicle_type: Option<VehicleTypeBody>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    make_model: Option<String>,
    color: Option<String>,
    #[validate(range(min = 1, message = "Capacity must be greater than zero"))]
    capacity: Option<i16>,
    #[validate(range(min = 1950, max = 2100, message = "Year of manufacture is out of range"))]
    year_manufactured: Option<i32>,
    amenities: Option<serde_json::Value>,
    status: Option<VehicleStatus>,
    is_insured: Option<bool>,
    insurance_expiry: Option<NaiveDate>,
    roadworthiness_expiry_date: Option<NaiveDate>,
}

impl From<UpdateVehicleRequest> for VehicleChanges {
    fn from(req: UpdateVehicleRequest) -> Self {
        VehicleChanges {
            registration_number: req.registration_number.map(|r| r.trim().to_uppercase()),
            vehicle_type: req.vehicle_type.map(|t| t.name.trim().to_string()),
            make_model: req.make_model.map(|m| m.trim().to_string()),
            color: req.color,
            capacity: req.capacity,
            year_manufactured: req.year_manufactured,
            amenities: req.amenities,
            status: req.status,
            is_insured: req.is_insured,
            insurance_expiry: req.insurance_expiry,
            roadworthiness_expiry_date: req.roadworthiness_expiry_date,
        }
    }
}

/// PATCH /api/vendor/vehicles/{id}
async fn update_vehicle(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateVehicleRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let changes = VehicleChanges::from(req);

    let vehicle = change_vehicle(&state.db.pool, vendor.id, id, &changes)
        .await
        .map_err(|e| match e {
            BookingError::Database(e) if unique_violation(&e).is_some() => {
                ApiError::bad_request("Could not update vehicle")
            }
            other => ApiError::from(other),
        })?;

    // Capacity feeds the seat pool of every trip on this vehicle
    if changes.capacity.is_some() {
        state.cache.invalidate_trip_search().await;
    }

    Ok(Json(VehicleResponse::new(vehicle, today())))
}

/* ---------- DELETE ---------- */

/// DELETE /api/vendor/vehicles/{id}
async fn delete_vehicle(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let deleted = Vehicle::delete(&state.db.pool, id, vendor.id).await.map_err(|e| {
        if is_foreign_key_violation(&e) {
            ApiError::bad_request("Could not delete vehicle")
        } else {
            db_error("delete_vehicle")(e)
        }
    })?;

    if !deleted {
        return Err(ApiError::not_found(VEHICLE_MISSING));
    }
    Ok(Json(json!({ "success": true, "message": "Vehicle deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_validation() {
        let body = json!({
            "registration_number": "lag-123ab",
            "vehicle_type": { "name": "Minibus" },
            "make_model": "Toyota Hiace",
            "capacity": 14,
        });
        let req: CreateVehicleRequest = serde_json::from_value(body.clone()).unwrap();
        assert!(req.validate().is_ok());
        assert!(!req.is_insured);

        let mut zero = body.clone();
        zero["capacity"] = json!(0);
        let req: CreateVehicleRequest = serde_json::from_value(zero).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Capacity must be greater than zero");

        let mut blank_type = body;
        blank_type["vehicle_type"] = json!({ "name": " " });
        let req: CreateVehicleRequest = serde_json::from_value(blank_type).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Field cannot be empty");
    }

    #[test]
    fn update_request_maps_to_changes() {
        let req: UpdateVehicleRequest = serde_json::from_value(json!({
            "registration_number": " abj-555xy ",
            "status": "maintenance",
        }))
        .unwrap();
        let changes = VehicleChanges::from(req);
        assert_eq!(changes.registration_number.as_deref(), Some("ABJ-555XY"));
        assert_eq!(changes.status, Some(VehicleStatus::Maintenance));
        assert!(changes.capacity.is_none());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let parsed = serde_json::from_value::<UpdateVehicleRequest>(json!({ "status": "scrapped" }));
        assert!(parsed.is_err());
    }
}
