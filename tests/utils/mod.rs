use chrono::{Duration, NaiveTime, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rust_decimal::Decimal;
use sqlx::PgPool;

use corper_rides::models::trip::NewTrip;
use corper_rides::models::user::NewUser;
use corper_rides::models::vehicle::NewVehicle;
use corper_rides::models::{Role, Trip, User, Vehicle};

pub async fn create_user(pool: &PgPool, role: Role) -> User {
    let email: String = SafeEmail().fake();
    let full_name: String = Name().fake();
    User::insert(
        pool,
        &NewUser {
            email: &email,
            password_hash: "not-a-real-hash",
            full_name: &full_name,
            phone: None,
            role,
        },
    )
    .await
    .expect("insert user")
}

pub async fn create_vehicle(pool: &PgPool, vendor: &User, capacity: i16) -> Vehicle {
    let mut conn = pool.acquire().await.expect("acquire");
    Vehicle::insert(
        &mut *conn,
        vendor.id,
        &NewVehicle {
            registration_number: format!("LAG-{}", uuid::Uuid::new_v4().simple()),
            vehicle_type: "Minibus".to_string(),
            vehicle_type_description: None,
            make_model: "Toyota Hiace".to_string(),
            color: None,
            capacity,
            year_manufactured: Some(2018),
            amenities: None,
            is_insured: true,
            insurance_expiry: None,
            roadworthiness_expiry_date: None,
        },
    )
    .await
    .expect("insert vehicle")
}

pub async fn create_trip(pool: &PgPool, vendor: &User, vehicle: &Vehicle, available_seats: i16) -> Trip {
    let mut conn = pool.acquire().await.expect("acquire");
    Trip::insert(
        &mut *conn,
        vendor.id,
        &NewTrip {
            vehicle_id: vehicle.id,
            description: String::new(),
            departure_state: "Lagos".to_string(),
            departure_city: "Ikeja".to_string(),
            destination_camp: "Iseyin".to_string(),
            departure_date: Utc::now().date_naive() + Duration::days(30),
            departure_time: NaiveTime::from_hms_opt(6, 30, 0).expect("valid time"),
            estimated_arrival_time: None,
            price_per_seat: Decimal::new(5000, 0),
            available_seats,
            early_bird_discount_percentage: 0,
            early_bird_deadline: None,
            group_discount_percentage: 10,
            refund_policy: String::new(),
            luggage_allowance: String::new(),
            special_notes: String::new(),
        },
    )
    .await
    .expect("insert trip")
}
