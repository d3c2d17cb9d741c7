use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

text_enum!(BookingStatus {
    Pending => "pending",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
    NoShow => "no_show",
});

text_enum!(PaymentStatus {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

impl BookingStatus {
    /// pending -> confirmed -> completed | no_show; pending and confirmed may be cancelled.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, NoShow)
        )
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(BookingStatus::Cancelled)
    }
}

/// The pricing knobs of a trip, detached from the row so they can be reasoned about alone.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTerms {
    pub price_per_seat: Decimal,
    pub early_bird_discount_percentage: i16,
    pub early_bird_deadline: Option<NaiveDate>,
    pub group_discount_percentage: i16,
}

impl PricingTerms {
    pub fn group_discount_rate(&self) -> Decimal {
        Decimal::from(self.group_discount_percentage) / Decimal::ONE_HUNDRED
    }

    pub fn early_bird_discount_rate(&self) -> Decimal {
        Decimal::from(self.early_bird_discount_percentage) / Decimal::ONE_HUNDRED
    }

    /// No deadline means the early bird offer never lapses.
    pub fn early_bird_deadline_expired(&self, today: NaiveDate) -> bool {
        self.early_bird_deadline.is_some_and(|deadline| deadline < today)
    }

    /// Price of `selected_seats` seats after early bird and group discounts.
    ///
    /// Both discounts are taken off the undiscounted base and add up; the result
    /// never goes below zero.
    pub fn total_price(&self, selected_seats: i16, today: NaiveDate) -> Decimal {
        let base = Decimal::from(selected_seats) * self.price_per_seat;
        let mut discount = Decimal::ZERO;

        if self.early_bird_discount_percentage > 0 && !self.early_bird_deadline_expired(today) {
            discount += base * self.early_bird_discount_rate();
        }
        if selected_seats > 1 && self.group_discount_percentage > 0 {
            discount += base * self.group_discount_rate();
        }

        (base - discount).max(Decimal::ZERO).round_dp(2)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub seat_number: Option<i16>,
    pub selected_seats: i16,
    #[sqlx(try_from = "String")]
    pub booking_status: BookingStatus,
    #[sqlx(try_from = "String")]
    pub payment_status: PaymentStatus,
    pub amount_paid: Decimal,
    pub payment_reference: String,
    pub booked_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub notes: String,
}

pub struct NewBooking {
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub vehicle_id: Option<Uuid>,
    pub selected_seats: i16,
    pub amount_paid: Decimal,
    pub notes: String,
}

impl Booking {
    pub async fn insert<'e>(db: impl PgExecutor<'e>, new: &NewBooking) -> Result<Booking, sqlx::Error> {
        sqlx::query_as::<_, Booking>(
            "INSERT INTO bookings (id, user_id, trip_id, vehicle_id, selected_seats, amount_paid, notes)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *"
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.trip_id)
        .bind(new.vehicle_id)
        .bind(new.selected_seats)
        .bind(new.amount_paid)
        .bind(&new.notes)
        .fetch_one(db)
        .await
    }

    // Newest first
    pub async fn list_for_user<'e>(db: impl PgExecutor<'e>, user_id: Uuid) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE user_id = $1 ORDER BY booked_at DESC")
            .bind(user_id)
            .fetch_all(db)
            .await
    }

    pub async fn list_for_trip<'e>(db: impl PgExecutor<'e>, trip_id: Uuid) -> Result<Vec<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE trip_id = $1 ORDER BY booked_at DESC")
            .bind(trip_id)
            .fetch_all(db)
            .await
    }

    pub async fn find_for_user<'e>(
        db: impl PgExecutor<'e>,
        booking_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 AND user_id = $2")
            .bind(booking_id)
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    /// A booking on one of the vendor's trips.
    pub async fn find_for_vendor<'e>(
        db: impl PgExecutor<'e>,
        booking_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Booking>, sqlx::Error> {
        sqlx::query_as::<_, Booking>(
            "SELECT b.* FROM bookings b
             JOIN trips t ON t.id = b.trip_id
             WHERE b.id = $1 AND t.vendor_id = $2"
        )
        .bind(booking_id)
        .bind(vendor_id)
        .fetch_optional(db)
        .await
    }

    pub async fn set_status<'e>(
        db: impl PgExecutor<'e>,
        booking_id: Uuid,
        status: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Booking, sqlx::Error> {
        sqlx::query_as::<_, Booking>(
            "UPDATE bookings SET
                booking_status = $2,
                confirmed_at = CASE WHEN $2 = 'confirmed' THEN $3 ELSE confirmed_at END,
                cancelled_at = CASE WHEN $2 = 'cancelled' THEN $3 ELSE cancelled_at END
             WHERE id = $1
             RETURNING *"
        )
        .bind(booking_id)
        .bind(status.as_str())
        .bind(now)
        .fetch_one(db)
        .await
    }

    /// Cancels every booking of a trip that still holds seats and can be cancelled.
    pub async fn cancel_all_for_trip<'e>(
        db: impl PgExecutor<'e>,
        trip_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE bookings SET booking_status = 'cancelled', cancelled_at = $2
             WHERE trip_id = $1 AND booking_status IN ('pending', 'confirmed')"
        )
        .bind(trip_id)
        .bind(now)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn terms(price: &str, early_bird: i16, deadline: Option<NaiveDate>, group: i16) -> PricingTerms {
        PricingTerms {
            price_per_seat: Decimal::from_str(price).unwrap(),
            early_bird_discount_percentage: early_bird,
            early_bird_deadline: deadline,
            group_discount_percentage: group,
        }
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn no_discounts() {
        let t = terms("5000.00", 0, None, 0);
        assert_eq!(t.total_price(1, day(10)), dec("5000.00"));
        assert_eq!(t.total_price(3, day(10)), dec("15000.00"));
    }

    #[test]
    fn early_bird_before_deadline() {
        let t = terms("5000.00", 10, Some(day(15)), 0);
        assert_eq!(t.total_price(1, day(10)), dec("4500.00"));
        // deadline day itself still counts
        assert_eq!(t.total_price(1, day(15)), dec("4500.00"));
    }

    #[test]
    fn early_bird_after_deadline() {
        let t = terms("5000.00", 10, Some(day(5)), 0);
        assert!(t.early_bird_deadline_expired(day(10)));
        assert_eq!(t.total_price(1, day(10)), dec("5000.00"));
    }

    #[test]
    fn early_bird_without_deadline_never_expires() {
        let t = terms("5000.00", 20, None, 0);
        assert!(!t.early_bird_deadline_expired(day(31)));
        assert_eq!(t.total_price(2, day(31)), dec("8000.00"));
    }

    #[test]
    fn group_discount_needs_more_than_one_seat() {
        let t = terms("5000.00", 0, None, 15);
        assert_eq!(t.total_price(1, day(10)), dec("5000.00"));
        assert_eq!(t.total_price(2, day(10)), dec("8500.00"));
    }

    #[test]
    fn discounts_stack_on_base() {
        let t = terms("5000.00", 10, Some(day(20)), 15);
        // base 10000, 10% + 15% of base off
        assert_eq!(t.total_price(2, day(10)), dec("7500.00"));
    }

    #[test]
    fn total_is_clamped_at_zero() {
        let t = terms("5000.00", 70, None, 60);
        assert_eq!(t.total_price(2, day(10)), Decimal::ZERO);
    }

    #[test]
    fn rates() {
        let t = terms("1.00", 25, None, 5);
        assert_eq!(t.early_bird_discount_rate(), dec("0.25"));
        assert_eq!(t.group_discount_rate(), dec("0.05"));
    }

    #[test]
    fn booking_state_machine() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(NoShow));
        assert!(Pending.is_cancellable());
        assert!(Confirmed.is_cancellable());

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(NoShow));
        assert!(!Completed.is_cancellable());
        assert!(!NoShow.is_cancellable());
        assert!(!Cancelled.is_cancellable());
        assert!(!Cancelled.can_transition_to(Confirmed));
    }

    #[test]
    fn status_text() {
        assert_eq!(BookingStatus::NoShow.as_str(), "no_show");
        assert_eq!("refunded".parse::<PaymentStatus>().unwrap(), PaymentStatus::Refunded);
        assert_eq!(serde_json::to_value(BookingStatus::NoShow).unwrap(), "no_show");
    }

    proptest! {
        #[test]
        fn price_bounded_by_base(
            cents in 0i64..10_000_000,
            seats in 1i16..60,
            early_bird in 0i16..=100,
            group in 0i16..=100,
            offset in -30i64..30,
        ) {
            let t = PricingTerms {
                price_per_seat: Decimal::new(cents, 2),
                early_bird_discount_percentage: early_bird,
                early_bird_deadline: Some(day(15)),
                group_discount_percentage: group,
            };
            let today = day(15) + chrono::Duration::days(offset);
            let base = Decimal::from(seats) * t.price_per_seat;
            let total = t.total_price(seats, today);

            prop_assert!(total >= Decimal::ZERO);
            prop_assert!(total <= base);
        }

        #[test]
        fn single_seat_ignores_group_discount(cents in 0i64..10_000_000, group in 0i16..=100) {
            let with_group = PricingTerms {
                price_per_seat: Decimal::new(cents, 2),
                early_bird_discount_percentage: 0,
                early_bird_deadline: None,
                group_discount_percentage: group,
            };
            prop_assert_eq!(with_group.total_price(1, day(1)), Decimal::new(cents, 2));
        }
    }
}
