use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor};
use uuid::Uuid;

use super::booking::PricingTerms;

text_enum!(TripStatus {
    Scheduled => "scheduled",
    Ongoing => "ongoing",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl TripStatus {
    /// scheduled -> ongoing -> completed, and either of the first two may be cancelled.
    pub fn can_transition_to(self, next: TripStatus) -> bool {
        use TripStatus::*;
        matches!(
            (self, next),
            (Scheduled, Ongoing) | (Ongoing, Completed) | (Scheduled, Cancelled) | (Ongoing, Cancelled)
        )
    }
}

// seats_booked only counts bookings that still hold seats (anything but cancelled)
const TRIP_SELECT: &str =
    "SELECT t.*,
            v.capacity AS vehicle_capacity,
            COALESCE((
                SELECT SUM(b.selected_seats)
                FROM bookings b
                WHERE b.trip_id = t.id AND b.booking_status <> 'cancelled'
            ), 0)::BIGINT AS seats_booked
     FROM trips t
     JOIN vehicles v ON v.id = t.vehicle_id";

#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub vehicle_id: Uuid,
    #[sqlx(try_from = "String")]
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
    pub early_bird_discount_percentage: i16,
    pub early_bird_deadline: Option<NaiveDate>,
    pub group_discount_percentage: i16,
    pub refund_policy: String,
    pub luggage_allowance: String,
    pub special_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vehicle_capacity: i16,
    pub seats_booked: i64,
}

/// Seats a trip can still sell.
///
/// The ceiling is the smaller of what the vendor offered on the trip and what the
/// assigned vehicle physically holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeatPool {
    pub capacity: i64,
    pub booked: i64,
}

impl SeatPool {
    pub fn new(available_seats: i16, vehicle_capacity: i16, booked: i64) -> Self {
        let capacity = available_seats.min(vehicle_capacity).max(0) as i64;
        SeatPool { capacity, booked }
    }

    pub fn remaining(&self) -> i64 {
        (self.capacity - self.booked).max(0)
    }

    pub fn can_fit(&self, requested: i64) -> bool {
        requested > 0 && requested <= self.remaining()
    }

    /// More seats sold than the ceiling allows.
    pub fn is_overbooked(&self) -> bool {
        self.booked > self.capacity
    }
}

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub vehicle_id: Uuid,
    pub description: String,
    pub departure_state: String,
    pub departure_city: String,
    pub destination_camp: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub estimated_arrival_time: Option<NaiveTime>,
    pub price_per_seat: Decimal,
    pub available_seats: i16,
    pub early_bird_discount_percentage: i16,
    pub early_bird_deadline: Option<NaiveDate>,
    pub group_discount_percentage: i16,
    pub refund_policy: String,
    pub luggage_allowance: String,
    pub special_notes: String,
}

#[derive(Debug, Default, Clone)]
pub struct TripChanges {
    pub vehicle_id: Option<Uuid>,
    pub description: Option<String>,
    pub departure_state: Option<String>,
    pub departure_city: Option<String>,
    pub destination_camp: Option<String>,
    pub departure_date: Option<NaiveDate>,
    pub departure_time: Option<NaiveTime>,
    /// `Some(None)` clears the stored value.
    pub estimated_arrival_time: Option<Option<NaiveTime>>,
    pub price_per_seat: Option<Decimal>,
    pub available_seats: Option<i16>,
    pub early_bird_discount_percentage: Option<i16>,
    /// `Some(None)` clears the stored value.
    pub early_bird_deadline: Option<Option<NaiveDate>>,
    pub group_discount_percentage: Option<i16>,
    pub refund_policy: Option<String>,
    pub luggage_allowance: Option<String>,
    pub special_notes: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TripSearch {
    pub departure_city: Option<String>,
    pub departure_state: Option<String>,
    pub destination_camp: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Schedule and seat checks shared by create and update.
pub fn validate_schedule(
    available_seats: i16,
    vehicle_capacity: i16,
    departure_time: NaiveTime,
    estimated_arrival_time: Option<NaiveTime>,
    price_per_seat: Decimal,
) -> Result<(), &'static str> {
    if available_seats <= 0 {
        return Err("Available seats must be greater than zero");
    }
    if let Some(arrival) = estimated_arrival_time {
        if departure_time >= arrival {
            return Err("Estimated arrival time must be after departure time");
        }
    }
    if price_per_seat < Decimal::ZERO {
        return Err("Price cannot be negative.");
    }
    if available_seats > vehicle_capacity {
        return Err("Selected seats exceed vehicle capacity.");
    }
    Ok(())
}

impl Trip {
    pub fn pricing(&self) -> PricingTerms {
        PricingTerms {
            price_per_seat: self.price_per_seat,
            early_bird_discount_percentage: self.early_bird_discount_percentage,
            early_bird_deadline: self.early_bird_deadline,
            group_discount_percentage: self.group_discount_percentage,
        }
    }

    pub fn seat_pool(&self) -> SeatPool {
        SeatPool::new(self.available_seats, self.vehicle_capacity, self.seats_booked)
    }

    pub fn total_seats_booked(&self) -> i64 {
        self.seats_booked
    }

    pub fn available_seats_remaining(&self) -> i64 {
        self.seat_pool().remaining()
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == TripStatus::Scheduled
    }

    pub async fn find<'e>(db: impl PgExecutor<'e>, trip_id: Uuid) -> Result<Option<Trip>, sqlx::Error> {
        let sql = format!("{} WHERE t.id = $1", TRIP_SELECT);
        sqlx::query_as::<_, Trip>(&sql)
            .bind(trip_id)
            .fetch_optional(db)
            .await
    }

    pub async fn find_for_vendor<'e>(
        db: impl PgExecutor<'e>,
        trip_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Trip>, sqlx::Error> {
        let sql = format!("{} WHERE t.id = $1 AND t.vendor_id = $2", TRIP_SELECT);
        sqlx::query_as::<_, Trip>(&sql)
            .bind(trip_id)
            .bind(vendor_id)
            .fetch_optional(db)
            .await
    }

    pub async fn list_for_vendor<'e>(db: impl PgExecutor<'e>, vendor_id: Uuid) -> Result<Vec<Trip>, sqlx::Error> {
        let sql = format!(
            "{} WHERE t.vendor_id = $1 ORDER BY t.departure_date, t.departure_time",
            TRIP_SELECT
        );
        sqlx::query_as::<_, Trip>(&sql)
            .bind(vendor_id)
            .fetch_all(db)
            .await
    }

    /// Public search over scheduled trips. Text filters are case-insensitive "contains".
    pub async fn search<'e>(db: impl PgExecutor<'e>, filters: &TripSearch) -> Result<Vec<Trip>, sqlx::Error> {
        let mut q = format!("{} WHERE t.status = 'scheduled'", TRIP_SELECT);
        let mut bind_idx = 1;
        let text_filters = [
            ("t.departure_state", filters.departure_state.as_deref()),
            ("t.departure_city", filters.departure_city.as_deref()),
            ("t.destination_camp", filters.destination_camp.as_deref()),
        ];

        let mut patterns = Vec::new();
        for (column, value) in text_filters {
            if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
                q.push_str(&format!(" AND {} ILIKE ${} ESCAPE '\\'", column, bind_idx));
                bind_idx += 1;
                patterns.push(format!("%{}%", escape_like(value)));
            }
        }
        if filters.date.is_some() {
            q.push_str(&format!(" AND t.departure_date = ${}", bind_idx));
        }
        q.push_str(" ORDER BY t.departure_date, t.departure_time");

        let mut dbq = sqlx::query_as::<_, Trip>(&q);
        for pattern in patterns {
            dbq = dbq.bind(pattern);
        }
        if let Some(date) = filters.date {
            dbq = dbq.bind(date);
        }
        dbq.fetch_all(db).await
    }

    pub async fn insert(conn: &mut PgConnection, vendor_id: Uuid, new: &NewTrip) -> Result<Trip, sqlx::Error> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO trips
                (id, vendor_id, vehicle_id, description, departure_state, departure_city, destination_camp,
                 departure_date, departure_time, estimated_arrival_time, price_per_seat, available_seats,
                 early_bird_discount_percentage, early_bird_deadline, group_discount_percentage,
                 refund_policy, luggage_allowance, special_notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)"
        )
        .bind(id)
        .bind(vendor_id)
        .bind(new.vehicle_id)
        .bind(&new.description)
        .bind(&new.departure_state)
        .bind(&new.departure_city)
        .bind(&new.destination_camp)
        .bind(new.departure_date)
        .bind(new.departure_time)
        .bind(new.estimated_arrival_time)
        .bind(new.price_per_seat)
        .bind(new.available_seats)
        .bind(new.early_bird_discount_percentage)
        .bind(new.early_bird_deadline)
        .bind(new.group_discount_percentage)
        .bind(&new.refund_policy)
        .bind(&new.luggage_allowance)
        .bind(&new.special_notes)
        .execute(&mut *conn)
        .await?;

        Self::find(&mut *conn, id).await?.ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        conn: &mut PgConnection,
        trip_id: Uuid,
        vendor_id: Uuid,
        changes: &TripChanges,
    ) -> Result<Option<Trip>, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE trips SET
                vehicle_id = COALESCE($3, vehicle_id),
                description = COALESCE($4, description),
                departure_state = COALESCE($5, departure_state),
                departure_city = COALESCE($6, departure_city),
                destination_camp = COALESCE($7, destination_camp),
                departure_date = COALESCE($8, departure_date),
                departure_time = COALESCE($9, departure_time),
                estimated_arrival_time = CASE WHEN $19 THEN $10 ELSE estimated_arrival_time END,
                price_per_seat = COALESCE($11, price_per_seat),
                available_seats = COALESCE($12, available_seats),
                early_bird_discount_percentage = COALESCE($13, early_bird_discount_percentage),
                early_bird_deadline = CASE WHEN $20 THEN $14 ELSE early_bird_deadline END,
                group_discount_percentage = COALESCE($15, group_discount_percentage),
                refund_policy = COALESCE($16, refund_policy),
                luggage_allowance = COALESCE($17, luggage_allowance),
                special_notes = COALESCE($18, special_notes),
                updated_at = NOW()
             WHERE id = $1 AND vendor_id = $2"
        )
        .bind(trip_id)
        .bind(vendor_id)
        .bind(changes.vehicle_id)
        .bind(changes.description.as_deref())
        .bind(changes.departure_state.as_deref())
        .bind(changes.departure_city.as_deref())
        .bind(changes.destination_camp.as_deref())
        .bind(changes.departure_date)
        .bind(changes.departure_time)
        .bind(changes.estimated_arrival_time.flatten())
        .bind(changes.price_per_seat)
        .bind(changes.available_seats)
        .bind(changes.early_bird_discount_percentage)
        .bind(changes.early_bird_deadline.flatten())
        .bind(changes.group_discount_percentage)
        .bind(changes.refund_policy.as_deref())
        .bind(changes.luggage_allowance.as_deref())
        .bind(changes.special_notes.as_deref())
        .bind(changes.estimated_arrival_time.is_some())
        .bind(changes.early_bird_deadline.is_some())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        Self::find(&mut *conn, trip_id).await
    }

    pub async fn set_status<'e>(db: impl PgExecutor<'e>, trip_id: Uuid, status: TripStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE trips SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(trip_id)
            .bind(status.as_str())
            .execute(db)
            .await?;
        Ok(())
    }

    /// Takes the row lock that serialises every seat-changing operation on one trip.
    /// Returns false when the trip does not exist.
    pub async fn lock(conn: &mut PgConnection, trip_id: Uuid) -> Result<bool, sqlx::Error> {
        let row = sqlx::query_scalar::<_, Uuid>("SELECT id FROM trips WHERE id = $1 FOR UPDATE")
            .bind(trip_id)
            .fetch_optional(conn)
            .await?;
        Ok(row.is_some())
    }

    /// Locks every scheduled or ongoing trip on a vehicle, in id order, and returns them
    /// with seat counts read after the locks were granted.
    pub async fn lock_active_for_vehicle(conn: &mut PgConnection, vehicle_id: Uuid) -> Result<Vec<Trip>, sqlx::Error> {
        sqlx::query(
            "SELECT id FROM trips
             WHERE vehicle_id = $1 AND status IN ('scheduled', 'ongoing')
             ORDER BY id
             FOR UPDATE"
        )
        .bind(vehicle_id)
        .execute(&mut *conn)
        .await?;

        let sql = format!(
            "{} WHERE t.vehicle_id = $1 AND t.status IN ('scheduled', 'ongoing') ORDER BY t.id",
            TRIP_SELECT
        );
        sqlx::query_as::<_, Trip>(&sql)
            .bind(vehicle_id)
            .fetch_all(&mut *conn)
            .await
    }

    /// Fails with a foreign key violation while bookings still reference the trip.
    pub async fn delete<'e>(db: impl PgExecutor<'e>, trip_id: Uuid, vendor_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM trips WHERE id = $1 AND vendor_id = $2")
            .bind(trip_id)
            .bind(vendor_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn status_transitions() {
        use TripStatus::*;
        assert!(Scheduled.can_transition_to(Ongoing));
        assert!(Ongoing.can_transition_to(Completed));
        assert!(Scheduled.can_transition_to(Cancelled));
        assert!(Ongoing.can_transition_to(Cancelled));

        assert!(!Scheduled.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Scheduled));
        assert!(!Ongoing.can_transition_to(Scheduled));
    }

    #[test]
    fn seat_pool_uses_smaller_ceiling() {
        let pool = SeatPool::new(10, 14, 3);
        assert_eq!(pool.capacity, 10);
        assert_eq!(pool.remaining(), 7);

        let pool = SeatPool::new(18, 14, 3);
        assert_eq!(pool.capacity, 14);
        assert_eq!(pool.remaining(), 11);
    }

    #[test]
    fn seat_pool_fit() {
        let pool = SeatPool::new(10, 10, 8);
        assert!(pool.can_fit(2));
        assert!(!pool.can_fit(3));
        assert!(!pool.can_fit(0));
        assert!(!pool.can_fit(-1));
    }

    #[test]
    fn overbooked_pool_reports_zero() {
        // capacity lowered after seats were sold
        let pool = SeatPool::new(4, 4, 6);
        assert_eq!(pool.remaining(), 0);
        assert!(!pool.can_fit(1));
        assert!(pool.is_overbooked());

        assert!(!SeatPool::new(4, 4, 4).is_overbooked());
        assert!(SeatPool::new(6, 2, 4).is_overbooked());
    }

    #[test]
    fn schedule_rules() {
        let price = Decimal::new(5000, 0);
        assert!(validate_schedule(10, 14, time(8, 0), Some(time(12, 0)), price).is_ok());
        assert!(validate_schedule(10, 14, time(8, 0), None, price).is_ok());

        assert_eq!(
            validate_schedule(0, 14, time(8, 0), None, price),
            Err("Available seats must be greater than zero")
        );
        assert_eq!(
            validate_schedule(10, 14, time(12, 0), Some(time(12, 0)), price),
            Err("Estimated arrival time must be after departure time")
        );
        assert_eq!(
            validate_schedule(10, 14, time(8, 0), None, Decimal::new(-1, 0)),
            Err("Price cannot be negative.")
        );
        assert_eq!(
            validate_schedule(20, 14, time(8, 0), None, price),
            Err("Selected seats exceed vehicle capacity.")
        );
    }

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("Iyana-Ipaja"), "Iyana-Ipaja");
        assert_eq!(escape_like("100%_camp\\"), "100\\%\\_camp\\\\");
    }

    proptest! {
        #[test]
        fn remaining_never_exceeds_capacity(available in 0i16..200, capacity in 1i16..200, booked in 0i64..400) {
            let pool = SeatPool::new(available, capacity, booked);
            prop_assert!(pool.remaining() >= 0);
            prop_assert!(pool.remaining() <= pool.capacity);
            prop_assert!(pool.capacity <= available.min(capacity) as i64);
        }

        #[test]
        fn accepted_requests_never_overbook(available in 1i16..100, booked in 0i64..100, requested in 1i64..100) {
            let pool = SeatPool::new(available, available, booked);
            if pool.can_fit(requested) {
                prop_assert!(booked + requested <= pool.capacity);
            }
        }
    }
}
