use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::controllers::bookings::BookingResponse;
use crate::controllers::db_error;
use crate::error::{is_foreign_key_violation, ApiError, ApiResult};
use crate::middleware::VendorUser;
use crate::models::trip::{validate_schedule, NewTrip, TripChanges, TripSearch};
use crate::models::vehicle::RowLock;
use crate::models::{Booking, SeatPool, Trip, TripStatus, Vehicle};
use crate::services::booking::change_trip_status;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/vendor/trips", get(list_trips).post(create_trip))
        .route(
            "/vendor/trips/{id}",
            get(get_trip).patch(update_trip).delete(delete_trip),
        )
        .route("/vendor/trips/{id}/status", patch(update_trip_status))
        .route("/vendor/trips/{id}/bookings", get(trip_bookings))
        .route("/trips/search", get(search_trips))
}

const TRIP_MISSING: &str = "Trip does not exist";
const VEHICLE_MISSING: &str = "Vehicle does not exist";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: TripStatus,
    pub description: String,
    pub departure_state: String,
    pub departure_city: String,
    pub destination_camp: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub estimated_arrival_time: Option<NaiveTime>,
    pub price_per_seat: Decimal,
    pub available_seats: i16,
    pub total_seats_booked: i64,
    pub available_seats_remaining: i64,
    pub early_bird_discount_percentage: i16,
    pub early_bird_deadline: Option<NaiveDate>,
    pub early_bird_deadline_expired: bool,
    pub group_discount_percentage: i16,
    pub refund_policy: String,
    pub luggage_allowance: String,
    pub special_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TripResponse {
    pub fn new(trip: Trip, today: NaiveDate) -> Self {
        TripResponse {
            total_seats_booked: trip.total_seats_booked(),
            available_seats_remaining: trip.available_seats_remaining(),
            early_bird_deadline_expired: trip.pricing().early_bird_deadline_expired(today),
            id: trip.id,
            vendor_id: trip.vendor_id,
            vehicle_id: trip.vehicle_id,
            status: trip.status,
            description: trip.description,
            departure_state: trip.departure_state,
            departure_city: trip.departure_city,
            destination_camp: trip.destination_camp,
            departure_date: trip.departure_date,
            departure_time: trip.departure_time,
            estimated_arrival_time: trip.estimated_arrival_time,
            price_per_seat: trip.price_per_seat,
            available_seats: trip.available_seats,
            early_bird_discount_percentage: trip.early_bird_discount_percentage,
            early_bird_deadline: trip.early_bird_deadline,
            group_discount_percentage: trip.group_discount_percentage,
            refund_policy: trip.refund_policy,
            luggage_allowance: trip.luggage_allowance,
            special_notes: trip.special_notes,
            created_at: trip.created_at,
            updated_at: trip.updated_at,
        }
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

// Holds the vehicle's capacity fixed until the transaction ends
async fn share_vendor_vehicle(conn: &mut PgConnection, vehicle_id: Uuid, vendor_id: Uuid) -> ApiResult<Vehicle> {
    Vehicle::find_for_vendor_locked(conn, vehicle_id, vendor_id, RowLock::Share)
        .await
        .map_err(db_error("find_vehicle"))?
        .ok_or_else(|| ApiError::not_found(VEHICLE_MISSING))
}

/// Tells a JSON `null` (`Some(None)`, clear the value) apart from a missing field (`None`).
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/* ---------- CREATE ---------- */

#[derive(Debug, Deserialize, Validate)]
struct CreateTripRequest {
    vehicle_id: Uuid,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    departure_city: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    departure_state: String,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    destination_camp: String,
    departure_date: NaiveDate,
    departure_time: NaiveTime,
    estimated_arrival_time: Option<NaiveTime>,
    price_per_seat: Decimal,
    available_seats: i16,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Discount percentage must be between 0 and 100"))]
    early_bird_discount_percentage: i16,
    early_bird_deadline: Option<NaiveDate>,
    #[serde(default)]
    #[validate(range(min = 0, max = 100, message = "Discount percentage must be between 0 and 100"))]
    group_discount_percentage: i16,
    #[serde(default)]
    description: String,
    #[serde(default)]
    refund_policy: String,
    #[serde(default)]
    luggage_allowance: String,
    #[serde(default)]
    special_notes: String,
}

/// POST /api/vendor/trips
async fn create_trip(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Json(req): Json<CreateTripRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let mut tx = state.db.pool.begin().await.map_err(db_error("create_trip"))?;
    let vehicle = share_vendor_vehicle(&mut *tx, req.vehicle_id, vendor.id).await?;
    validate_schedule(
        req.available_seats,
        vehicle.capacity,
        req.departure_time,
        req.estimated_arrival_time,
        req.price_per_seat,
    )
    .map_err(ApiError::bad_request)?;

    let new = NewTrip {
        vehicle_id: vehicle.id,
        description: req.description,
        departure_state: req.departure_state.trim().to_string(),
        departure_city: req.departure_city.trim().to_string(),
        destination_camp: req.destination_camp.trim().to_string(),
        departure_date: req.departure_date,
        departure_time: req.departure_time,
        estimated_arrival_time: req.estimated_arrival_time,
        price_per_seat: req.price_per_seat,
        available_seats: req.available_seats,
        early_bird_discount_percentage: req.early_bird_discount_percentage,
        early_bird_deadline: req.early_bird_deadline,
        group_discount_percentage: req.group_discount_percentage,
        refund_policy: req.refund_policy,
        luggage_allowance: req.luggage_allowance,
        special_notes: req.special_notes,
    };

    let trip = Trip::insert(&mut *tx, vendor.id, &new).await.map_err(db_error("create_trip"))?;
    tx.commit().await.map_err(db_error("create_trip"))?;

    state.cache.invalidate_trip_search().await;
    tracing::info!("Vendor {} scheduled trip {}", vendor.id, trip.id);

    Ok((StatusCode::CREATED, Json(TripResponse::new(trip, today()))))
}

/* ---------- READ ---------- */

/// GET /api/vendor/trips
async fn list_trips(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
) -> ApiResult<impl IntoResponse> {
    let today = today();
    let trips = Trip::list_for_vendor(&state.db.pool, vendor.id)
        .await
        .map_err(db_error("list_trips"))?
        .into_iter()
        .map(|t| TripResponse::new(t, today))
        .collect::<Vec<_>>();

    Ok(Json(trips))
}

/// GET /api/vendor/trips/{id}
async fn get_trip(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let trip = Trip::find_for_vendor(&state.db.pool, id, vendor.id)
        .await
        .map_err(db_error("get_trip"))?
        .ok_or_else(|| ApiError::not_found(TRIP_MISSING))?;

    Ok(Json(TripResponse::new(trip, today())))
}

/// GET /api/vendor/trips/{id}/bookings
async fn trip_bookings(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let pool = &state.db.pool;
    let trip = Trip::find_for_vendor(pool, id, vendor.id)
        .await
        .map_err(db_error("trip_bookings"))?
        .ok_or_else(|| ApiError::not_found(TRIP_MISSING))?;

    let bookings = Booking::list_for_trip(pool, trip.id)
        .await
        .map_err(db_error("trip_bookings"))?
        .into_iter()
        .map(BookingResponse::from)
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "trip_id": trip.id,
        "total_seats_booked": trip.total_seats_booked(),
        "available_seats_remaining": trip.available_seats_remaining(),
        "bookings": bookings,
    })))
}

/* ---------- UPDATE ---------- */

#[derive(Debug, Default, Deserialize, Validate)]
struct UpdateTripRequest {
    vehicle_id: Option<Uuid>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    departure_city: Option<String>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    departure_state: Option<String>,
    #[validate(custom(function = "crate::services::auth::validate_not_blank"))]
    destination_camp: Option<String>,
    departure_date: Option<NaiveDate>,
    departure_time: Option<NaiveTime>,
    #[serde(default, deserialize_with = "explicit_null")]
    estimated_arrival_time: Option<Option<NaiveTime>>,
    price_per_seat: Option<Decimal>,
    available_seats: Option<i16>,
    #[validate(range(min = 0, max = 100, message = "Discount percentage must be between 0 and 100"))]
    early_bird_discount_percentage: Option<i16>,
    #[serde(default, deserialize_with = "explicit_null")]
    early_bird_deadline: Option<Option<NaiveDate>>,
    #[validate(range(min = 0, max = 100, message = "Discount percentage must be between 0 and 100"))]
    group_discount_percentage: Option<i16>,
    description: Option<String>,
    refund_policy: Option<String>,
    luggage_allowance: Option<String>,
    special_notes: Option<String>,
}

impl From<UpdateTripRequest> for TripChanges {
    fn from(req: UpdateTripRequest) -> Self {
        let trimmed = |v: Option<String>| v.map(|s| s.trim().to_string());
        TripChanges {
            vehicle_id: req.vehicle_id,
            description: req.description,
            departure_state: trimmed(req.departure_state),
            departure_city: trimmed(req.departure_city),
            destination_camp: trimmed(req.destination_camp),
            departure_date: req.departure_date,
            departure_time: req.departure_time,
            estimated_arrival_time: req.estimated_arrival_time,
            price_per_seat: req.price_per_seat,
            available_seats: req.available_seats,
            early_bird_discount_percentage: req.early_bird_discount_percentage,
            early_bird_deadline: req.early_bird_deadline,
            group_discount_percentage: req.group_discount_percentage,
            refund_policy: req.refund_policy,
            luggage_allowance: req.luggage_allowance,
            special_notes: req.special_notes,
        }
    }
}

/// PATCH /api/vendor/trips/{id}
async fn update_trip(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTripRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let changes = TripChanges::from(req);

    let pool = &state.db.pool;

    // The vehicle has to be locked before the trip, so find out which one it is first
    let vehicle_id = match changes.vehicle_id {
        Some(vehicle_id) => vehicle_id,
        None => {
            Trip::find_for_vendor(pool, id, vendor.id)
                .await
                .map_err(db_error("update_trip"))?
                .ok_or_else(|| ApiError::not_found(TRIP_MISSING))?
                .vehicle_id
        }
    };

    let mut tx = pool.begin().await.map_err(db_error("update_trip"))?;
    let vehicle = share_vendor_vehicle(&mut *tx, vehicle_id, vendor.id).await?;

    // Same lock bookings take, so the seat checks below see a stable count
    if !Trip::lock(&mut *tx, id).await.map_err(db_error("update_trip"))? {
        return Err(ApiError::not_found(TRIP_MISSING));
    }
    let current = Trip::find_for_vendor(&mut *tx, id, vendor.id)
        .await
        .map_err(db_error("update_trip"))?
        .ok_or_else(|| ApiError::not_found(TRIP_MISSING))?;

    if current.vehicle_id != vehicle.id && changes.vehicle_id.is_none() {
        return Err(ApiError::Conflict("Trip was changed meanwhile, try again".into()));
    }

    let available_seats = changes.available_seats.unwrap_or(current.available_seats);
    validate_schedule(
        available_seats,
        vehicle.capacity,
        changes.departure_time.unwrap_or(current.departure_time),
        changes.estimated_arrival_time.unwrap_or(current.estimated_arrival_time),
        changes.price_per_seat.unwrap_or(current.price_per_seat),
    )
    .map_err(ApiError::bad_request)?;

    let booked = current.total_seats_booked();
    if SeatPool::new(available_seats, vehicle.capacity, booked).is_overbooked() {
        return Err(ApiError::bad_request(format!("{} seats are already booked on this trip", booked)));
    }

    let trip = Trip::update(&mut *tx, id, vendor.id, &changes)
        .await
        .map_err(db_error("update_trip"))?
        .ok_or_else(|| ApiError::not_found(TRIP_MISSING))?;
    tx.commit().await.map_err(db_error("update_trip"))?;

    state.cache.invalidate_trip_search().await;
    Ok(Json(TripResponse::new(trip, today())))
}

#[derive(Debug, Deserialize)]
struct TripStatusRequest {
    status: TripStatus,
}

/// PATCH /api/vendor/trips/{id}/status
async fn update_trip_status(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
    Json(req): Json<TripStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let (trip, cancelled) = change_trip_status(&state.db.pool, vendor.id, id, req.status, Utc::now()).await?;
    state.cache.invalidate_trip_search().await;

    Ok(Json(json!({
        "trip": TripResponse::new(trip, today()),
        "cancelled_bookings": cancelled,
    })))
}

/* ---------- DELETE ---------- */

/// DELETE /api/vendor/trips/{id}
async fn delete_trip(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let deleted = Trip::delete(&state.db.pool, id, vendor.id).await.map_err(|e| {
        if is_foreign_key_violation(&e) {
            ApiError::bad_request("Could not delete trip")
        } else {
            db_error("delete_trip")(e)
        }
    })?;

    if !deleted {
        return Err(ApiError::not_found(TRIP_MISSING));
    }
    state.cache.invalidate_trip_search().await;
    Ok(Json(json!({ "success": true, "message": "Trip deleted" })))
}

/* ---------- SEARCH ---------- */

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub departure_city: Option<String>,
    pub departure_state: Option<String>,
    pub destination_camp: Option<String>,
    pub date: Option<NaiveDate>,
}

impl From<SearchQuery> for TripSearch {
    fn from(q: SearchQuery) -> Self {
        // `?departure_city=` means no filter
        let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        TripSearch {
            departure_city: present(q.departure_city),
            departure_state: present(q.departure_state),
            destination_camp: present(q.destination_camp),
            date: q.date,
        }
    }
}

/// GET /api/trips/search
async fn search_trips(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Response> {
    let filters = TripSearch::from(query);
    let generation = state.cache.search_generation().await;

    let cached = match generation {
        Some(generation) => state.cache.get_cached_search(generation, &filters).await,
        None => None,
    };
    if let Some(cached) = cached {
        return Ok((
            [(header::CONTENT_TYPE, "application/json"), (header::HeaderName::from_static("x-cache"), "HIT")],
            cached,
        )
            .into_response());
    }

    let today = today();
    let trips = Trip::search(&state.db.pool, &filters)
        .await
        .map_err(db_error("search_trips"))?
        .into_iter()
        .map(|t| TripResponse::new(t, today))
        .collect::<Vec<_>>();

    if let Some(generation) = generation {
        match serde_json::to_string(&trips) {
            Ok(body) => state.cache.cache_search_result(generation, &filters, &body).await,
            Err(e) => tracing::warn!("search result not cached: {}", e),
        }
    }

    Ok(Json(trips).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_params_are_dropped() {
        let filters = TripSearch::from(SearchQuery {
            departure_city: Some("  ".into()),
            departure_state: Some(" Oyo ".into()),
            destination_camp: None,
            date: None,
        });
        assert!(filters.departure_city.is_none());
        assert_eq!(filters.departure_state.as_deref(), Some("Oyo"));
    }

    #[test]
    fn create_request_defaults() {
        let req: CreateTripRequest = serde_json::from_value(json!({
            "vehicle_id": Uuid::new_v4(),
            "departure_city": "Ikeja",
            "departure_state": "Lagos",
            "destination_camp": "Iseyin",
            "departure_date": "2025-04-10",
            "departure_time": "06:30:00",
            "price_per_seat": "7500.00",
            "available_seats": 14,
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.early_bird_discount_percentage, 0);
        assert_eq!(req.group_discount_percentage, 0);
        assert_eq!(req.price_per_seat, Decimal::new(750000, 2));
        assert!(req.estimated_arrival_time.is_none());
    }

    #[test]
    fn discount_out_of_range() {
        let req: UpdateTripRequest =
            serde_json::from_value(json!({ "group_discount_percentage": 120 })).unwrap();
        let err: ApiError = req.validate().unwrap_err().into();
        assert_eq!(err.to_string(), "Discount percentage must be between 0 and 100");
    }

    #[test]
    fn null_clears_optional_fields() {
        let req: UpdateTripRequest = serde_json::from_value(json!({
            "estimated_arrival_time": null,
            "early_bird_deadline": "2025-03-20",
        }))
        .unwrap();
        let changes = TripChanges::from(req);
        assert_eq!(changes.estimated_arrival_time, Some(None));
        assert_eq!(changes.early_bird_deadline, Some(NaiveDate::from_ymd_opt(2025, 3, 20)));

        let req: UpdateTripRequest = serde_json::from_value(json!({ "price_per_seat": "6000" })).unwrap();
        let changes = TripChanges::from(req);
        assert_eq!(changes.estimated_arrival_time, None);
        assert_eq!(changes.early_bird_deadline, None);
    }

    #[test]
    fn status_body() {
        let req: TripStatusRequest = serde_json::from_value(json!({ "status": "ongoing" })).unwrap();
        assert_eq!(req.status, TripStatus::Ongoing);
        assert!(serde_json::from_value::<TripStatusRequest>(json!({ "status": "delayed" })).is_err());
    }
}
