use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::controllers::db_error;
use crate::controllers::trips::TripResponse;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{AuthUser, VendorUser};
use crate::models::{Booking, BookingStatus, PaymentStatus};
use crate::services::booking::{cancel_booking, change_booking_status, create_booking};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", post(book_trip).get(list_bookings))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", patch(cancel))
        .route("/vendor/bookings/{id}/status", patch(update_booking_status))
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub seat_number: Option<i16>,
    pub selected_seats: i16,
    pub total_price: Decimal,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_reference: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        BookingResponse {
            id: b.id,
            user_id: b.user_id,
            trip_id: b.trip_id,
            vehicle_id: b.vehicle_id,
            seat_number: b.seat_number,
            selected_seats: b.selected_seats,
            total_price: b.amount_paid,
            status: b.booking_status,
            payment_status: b.payment_status,
            payment_reference: b.payment_reference,
            notes: b.notes,
            created_at: b.booked_at,
            confirmed_at: b.confirmed_at,
            cancelled_at: b.cancelled_at,
        }
    }
}

fn default_seats() -> i16 {
    1
}

#[derive(Debug, Deserialize)]
struct CreateBookingRequest {
    trip_id: Uuid,
    #[serde(default = "default_seats", alias = "seats")]
    selected_seats: i16,
}

/// POST /api/bookings
async fn book_trip(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<impl IntoResponse> {
    let today = Utc::now().date_naive();
    let (booking, trip) = create_booking(&state.db.pool, user.id(), req.trip_id, req.selected_seats, today).await?;

    // Seats left changed for everyone searching
    state.cache.invalidate_trip_search().await;

    let trip = TripResponse::new(trip, today);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "booking": BookingResponse::from(booking),
            "trip": trip,
        })),
    ))
}

/// GET /api/bookings
async fn list_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let bookings = Booking::list_for_user(&state.db.pool, user.id())
        .await
        .map_err(db_error("list_bookings"))?
        .into_iter()
        .map(BookingResponse::from)
        .collect::<Vec<_>>();

    Ok(Json(bookings))
}

/// GET /api/bookings/{id}
async fn get_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = Booking::find_for_user(&state.db.pool, id, user.id())
        .await
        .map_err(db_error("get_booking"))?
        .ok_or_else(|| ApiError::not_found("Booking does not exist"))?;

    Ok(Json(BookingResponse::from(booking)))
}

/// PATCH /api/bookings/{id}/cancel
async fn cancel(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let booking = cancel_booking(&state.db.pool, user.id(), id, Utc::now()).await?;
    state.cache.invalidate_trip_search().await;

    Ok(Json(BookingResponse::from(booking)))
}

#[derive(Debug, Deserialize)]
struct BookingStatusRequest {
    status: BookingStatus,
}

/// PATCH /api/vendor/bookings/{id}/status
async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    VendorUser(vendor): VendorUser,
    Path(id): Path<Uuid>,
    Json(req): Json<BookingStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let booking = change_booking_status(&state.db.pool, vendor.id, id, req.status, Utc::now()).await?;
    if booking.booking_status == BookingStatus::Cancelled {
        state.cache.invalidate_trip_search().await;
    }

    Ok(Json(BookingResponse::from(booking)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selected_seats_defaults_to_one() {
        let trip_id = Uuid::new_v4();
        let req: CreateBookingRequest = serde_json::from_value(json!({ "trip_id": trip_id })).unwrap();
        assert_eq!(req.trip_id, trip_id);
        assert_eq!(req.selected_seats, 1);

        let req: CreateBookingRequest =
            serde_json::from_value(json!({ "trip_id": trip_id, "seats": 3 })).unwrap();
        assert_eq!(req.selected_seats, 3);
    }

    #[test]
    fn response_exposes_frozen_price() {
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            vehicle_id: None,
            seat_number: None,
            selected_seats: 2,
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            amount_paid: Decimal::new(1350000, 2),
            payment_reference: String::new(),
            booked_at: now,
            confirmed_at: None,
            cancelled_at: None,
            notes: String::new(),
        };

        let body = serde_json::to_value(BookingResponse::from(booking)).unwrap();
        assert_eq!(body["total_price"], json!("13500.00"));
        assert_eq!(body["status"], json!("pending"));
        assert_eq!(body["selected_seats"], json!(2));
    }

    #[test]
    fn status_body_uses_snake_case_names() {
        let req: BookingStatusRequest = serde_json::from_value(json!({ "status": "no_show" })).unwrap();
        assert_eq!(req.status, BookingStatus::NoShow);
    }
}
