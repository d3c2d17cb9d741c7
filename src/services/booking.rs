use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::booking::NewBooking;
use crate::models::vehicle::{RowLock, VehicleChanges};
use crate::models::{Booking, BookingStatus, SeatPool, Trip, TripStatus, Vehicle};

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Trip does not exist")]
    TripNotFound,
    #[error("Booking does not exist")]
    BookingNotFound,
    #[error("Vehicle does not exist")]
    VehicleNotFound,
    #[error("Selected seats must be greater than zero")]
    NoSeatsRequested,
    #[error("Only {0} seats left")]
    NotEnoughSeats(i64),
    #[error("Booking is already cancelled")]
    AlreadyCancelled,
    #[error("Cannot cancel a booking with status '{0}'")]
    NotCancellable(BookingStatus),
    #[error("Cannot change booking status from '{from}' to '{to}'")]
    IllegalBookingTransition { from: BookingStatus, to: BookingStatus },
    #[error("Capacity is too small, {0} seats are already booked on a trip using this vehicle")]
    CapacityBelowBooked(i64),
    #[error("Cannot change trip status from '{from}' to '{to}'")]
    IllegalTripTransition { from: TripStatus, to: TripStatus },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::TripNotFound | BookingError::BookingNotFound | BookingError::VehicleNotFound => {
                ApiError::NotFound(e.to_string())
            }
            BookingError::Database(e) => ApiError::Database(e),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/* ---------- seat allocation ---------- */

/// Books `selected_seats` seats on a scheduled trip for `user_id`.
///
/// The trip row stays locked from the availability check until the insert commits,
/// so concurrent requests for the same trip are served one at a time and the seat
/// pool can never go negative. The price is frozen into `amount_paid` here.
pub async fn create_booking(
    pool: &PgPool,
    user_id: Uuid,
    trip_id: Uuid,
    selected_seats: i16,
    today: NaiveDate,
) -> Result<(Booking, Trip), BookingError> {
    if selected_seats <= 0 {
        return Err(BookingError::NoSeatsRequested);
    }

    let mut tx = pool.begin().await?;

    if !Trip::lock(&mut *tx, trip_id).await? {
        return Err(BookingError::TripNotFound);
    }
    // Re-read under the lock, the booked seat count is now stable
    let trip = Trip::find(&mut *tx, trip_id)
        .await?
        .filter(Trip::is_scheduled)
        .ok_or(BookingError::TripNotFound)?;

    let seats = trip.seat_pool();
    if !seats.can_fit(i64::from(selected_seats)) {
        return Err(BookingError::NotEnoughSeats(seats.remaining()));
    }

    let booking = Booking::insert(
        &mut *tx,
        &NewBooking {
            user_id,
            trip_id,
            vehicle_id: Some(trip.vehicle_id),
            selected_seats,
            amount_paid: trip.pricing().total_price(selected_seats, today),
            notes: String::new(),
        },
    )
    .await?;

    tx.commit().await?;

    info!(
        "Booking {} created: trip {}, {} seat(s), {} left",
        booking.id,
        trip_id,
        selected_seats,
        seats.remaining() - i64::from(selected_seats)
    );
    Ok((booking, trip))
}

/// Cancels one of the caller's own bookings, which frees its seats immediately.
pub async fn cancel_booking(
    pool: &PgPool,
    user_id: Uuid,
    booking_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    let mut tx = pool.begin().await?;

    let booking = Booking::find_for_user(&mut *tx, booking_id, user_id)
        .await?
        .ok_or(BookingError::BookingNotFound)?;
    // Serialise with bookings being created on the same trip
    Trip::lock(&mut *tx, booking.trip_id).await?;

    let booking = lock_booking(&mut tx, booking.id).await?;
    check_cancellable(booking.booking_status)?;

    let cancelled = Booking::set_status(&mut *tx, booking.id, BookingStatus::Cancelled, now).await?;
    tx.commit().await?;

    info!("Booking {} cancelled by its owner", booking_id);
    Ok(cancelled)
}

/// Vendor-side move along the booking lifecycle, limited to bookings on the vendor's trips.
pub async fn change_booking_status(
    pool: &PgPool,
    vendor_id: Uuid,
    booking_id: Uuid,
    next: BookingStatus,
    now: DateTime<Utc>,
) -> Result<Booking, BookingError> {
    let mut tx = pool.begin().await?;

    let booking = Booking::find_for_vendor(&mut *tx, booking_id, vendor_id)
        .await?
        .ok_or(BookingError::BookingNotFound)?;
    Trip::lock(&mut *tx, booking.trip_id).await?;

    let booking = lock_booking(&mut tx, booking.id).await?;
    if !booking.booking_status.can_transition_to(next) {
        return Err(BookingError::IllegalBookingTransition { from: booking.booking_status, to: next });
    }

    let updated = Booking::set_status(&mut *tx, booking.id, next, now).await?;
    tx.commit().await?;

    info!("Booking {} moved from {} to {}", booking_id, booking.booking_status, next);
    Ok(updated)
}

/// Moves a trip along its lifecycle. Cancelling a trip cancels its live bookings in
/// the same transaction. Returns the updated trip and the number of bookings cancelled.
pub async fn change_trip_status(
    pool: &PgPool,
    vendor_id: Uuid,
    trip_id: Uuid,
    next: TripStatus,
    now: DateTime<Utc>,
) -> Result<(Trip, u64), BookingError> {
    let mut tx = pool.begin().await?;

    if !Trip::lock(&mut *tx, trip_id).await? {
        return Err(BookingError::TripNotFound);
    }
    let trip = Trip::find_for_vendor(&mut *tx, trip_id, vendor_id)
        .await?
        .ok_or(BookingError::TripNotFound)?;

    if !trip.status.can_transition_to(next) {
        return Err(BookingError::IllegalTripTransition { from: trip.status, to: next });
    }

    Trip::set_status(&mut *tx, trip_id, next).await?;
    let cancelled = if next == TripStatus::Cancelled {
        Booking::cancel_all_for_trip(&mut *tx, trip_id, now).await?
    } else {
        0
    };

    let trip = Trip::find(&mut *tx, trip_id).await?.ok_or(BookingError::TripNotFound)?;
    tx.commit().await?;

    info!("Trip {} moved to {}, {} booking(s) cancelled", trip_id, next, cancelled);
    Ok((trip, cancelled))
}

/// Applies a vendor's vehicle edits.
///
/// Locks the vehicle, then every scheduled or ongoing trip on it, so no booking can slip in
/// between the check and the write. A capacity that would leave any of those trips with more
/// seats sold than it can carry is refused.
pub async fn change_vehicle(
    pool: &PgPool,
    vendor_id: Uuid,
    vehicle_id: Uuid,
    changes: &VehicleChanges,
) -> Result<Vehicle, BookingError> {
    let mut tx = pool.begin().await?;

    Vehicle::find_for_vendor_locked(&mut *tx, vehicle_id, vendor_id, RowLock::Update)
        .await?
        .ok_or(BookingError::VehicleNotFound)?;

    if let Some(capacity) = changes.capacity {
        for trip in Trip::lock_active_for_vehicle(&mut *tx, vehicle_id).await? {
            if SeatPool::new(trip.available_seats, capacity, trip.seats_booked).is_overbooked() {
                return Err(BookingError::CapacityBelowBooked(trip.seats_booked));
            }
        }
    }

    let vehicle = Vehicle::update(&mut *tx, vehicle_id, vendor_id, changes)
        .await?
        .ok_or(BookingError::VehicleNotFound)?;
    tx.commit().await?;

    if let Some(capacity) = changes.capacity {
        info!("Vehicle {} capacity set to {}", vehicle_id, capacity);
    }
    Ok(vehicle)
}

/* ---------- helpers ---------- */

fn check_cancellable(status: BookingStatus) -> Result<(), BookingError> {
    match status {
        BookingStatus::Cancelled => Err(BookingError::AlreadyCancelled),
        s if s.is_cancellable() => Ok(()),
        s => Err(BookingError::NotCancellable(s)),
    }
}

// Fresh copy of the booking row, held until the transaction ends
async fn lock_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking_id: Uuid,
) -> Result<Booking, BookingError> {
    sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
        .bind(booking_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(BookingError::BookingNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn cancellation_rules() {
        assert!(check_cancellable(BookingStatus::Pending).is_ok());
        assert!(check_cancellable(BookingStatus::Confirmed).is_ok());
        assert_eq!(
            check_cancellable(BookingStatus::Cancelled).unwrap_err().to_string(),
            "Booking is already cancelled"
        );
        assert_eq!(
            check_cancellable(BookingStatus::Completed).unwrap_err().to_string(),
            "Cannot cancel a booking with status 'completed'"
        );
        assert_eq!(
            check_cancellable(BookingStatus::NoShow).unwrap_err().to_string(),
            "Cannot cancel a booking with status 'no_show'"
        );
    }

    #[test]
    fn errors_map_to_http() {
        let not_found: ApiError = BookingError::TripNotFound.into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let seats: ApiError = BookingError::NotEnoughSeats(2).into();
        assert_eq!(seats.status(), StatusCode::BAD_REQUEST);
        assert_eq!(seats.to_string(), "Only 2 seats left");

        let transition: ApiError = BookingError::IllegalTripTransition {
            from: TripStatus::Completed,
            to: TripStatus::Ongoing,
        }
        .into();
        assert_eq!(transition.to_string(), "Cannot change trip status from 'completed' to 'ongoing'");

        let vehicle: ApiError = BookingError::VehicleNotFound.into();
        assert_eq!(vehicle.status(), StatusCode::NOT_FOUND);

        let shrink: ApiError = BookingError::CapacityBelowBooked(4).into();
        assert_eq!(shrink.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            shrink.to_string(),
            "Capacity is too small, 4 seats are already booked on a trip using this vehicle"
        );
    }
}
