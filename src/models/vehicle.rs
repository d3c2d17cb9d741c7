use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgExecutor};
use uuid::Uuid;

text_enum!(VehicleStatus {
    Active => "active",
    Maintenance => "maintenance",
    Inactive => "inactive",
});

const VEHICLE_SELECT: &str =
    "SELECT v.*, vt.name AS vehicle_type, vt.description AS vehicle_type_description
     FROM vehicles v
     LEFT JOIN vehicle_types vt ON vt.id = v.vehicle_type_id";

/// Row lock taken by `Vehicle::find_for_vendor_locked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLock {
    /// Capacity stays fixed until the transaction ends.
    Share,
    /// Exclusive against other writers and `Share` holders, for writes that change capacity.
    /// Foreign key checks from new trips and bookings still go through.
    Update,
}

impl RowLock {
    // Only the vehicles row; vehicle_types is on the nullable side of the join
    fn clause(self) -> &'static str {
        match self {
            RowLock::Share => "FOR SHARE OF v",
            RowLock::Update => "FOR NO KEY UPDATE OF v",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub registration_number: String,
    pub vehicle_type: Option<String>,
    pub vehicle_type_description: Option<String>,
    pub make_model: String,
    pub color: Option<String>,
    pub capacity: i16,
    pub year_manufactured: Option<i32>,
    pub amenities: Option<serde_json::Value>,
    #[sqlx(try_from = "String")]
    pub status: VehicleStatus,
    pub is_insured: bool,
    pub insurance_expiry: Option<NaiveDate>,
    pub roadworthiness_expiry_date: Option<NaiveDate>,
    pub vehicle_images: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct NewVehicle {
    pub registration_number: String,
    pub vehicle_type: String,
    pub vehicle_type_description: Option<String>,
    pub make_model: String,
    pub color: Option<String>,
    pub capacity: i16,
    pub year_manufactured: Option<i32>,
    pub amenities: Option<serde_json::Value>,
    pub is_insured: bool,
    pub insurance_expiry: Option<NaiveDate>,
    pub roadworthiness_expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Default)]
pub struct VehicleChanges {
    pub registration_number: Option<String>,
    pub vehicle_type: Option<String>,
    pub make_model: Option<String>,
    pub color: Option<String>,
    pub capacity: Option<i16>,
    pub year_manufactured: Option<i32>,
    pub amenities: Option<serde_json::Value>,
    pub status: Option<VehicleStatus>,
    pub is_insured: Option<bool>,
    pub insurance_expiry: Option<NaiveDate>,
    pub roadworthiness_expiry_date: Option<NaiveDate>,
}

impl Vehicle {
    pub fn is_active(&self) -> bool {
        self.status == VehicleStatus::Active
    }

    pub fn is_inactive(&self) -> bool {
        self.status == VehicleStatus::Inactive
    }

    pub fn is_under_maintenance(&self) -> bool {
        self.status == VehicleStatus::Maintenance
    }

    pub fn is_insurance_valid(&self, today: NaiveDate) -> bool {
        self.is_insured && self.insurance_expiry.is_some_and(|expiry| expiry >= today)
    }

    pub fn is_roadworthy(&self, today: NaiveDate) -> bool {
        self.roadworthiness_expiry_date.is_some_and(|expiry| expiry >= today)
    }

    pub async fn find_for_vendor<'e>(
        db: impl PgExecutor<'e>,
        vehicle_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<Option<Vehicle>, sqlx::Error> {
        let sql = format!("{} WHERE v.id = $1 AND v.vendor_id = $2", VEHICLE_SELECT);
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(vehicle_id)
            .bind(vendor_id)
            .fetch_optional(db)
            .await
    }

    /// Vehicle rows are always locked before trip rows.
    pub async fn find_for_vendor_locked(
        conn: &mut PgConnection,
        vehicle_id: Uuid,
        vendor_id: Uuid,
        lock: RowLock,
    ) -> Result<Option<Vehicle>, sqlx::Error> {
        let sql = format!("{} WHERE v.id = $1 AND v.vendor_id = $2 {}", VEHICLE_SELECT, lock.clause());
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(vehicle_id)
            .bind(vendor_id)
            .fetch_optional(conn)
            .await
    }

    // Newest first
    pub async fn list_for_vendor<'e>(db: impl PgExecutor<'e>, vendor_id: Uuid) -> Result<Vec<Vehicle>, sqlx::Error> {
        let sql = format!("{} WHERE v.vendor_id = $1 ORDER BY v.created_at DESC", VEHICLE_SELECT);
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(vendor_id)
            .fetch_all(db)
            .await
    }

    pub async fn insert(conn: &mut PgConnection, vendor_id: Uuid, new: &NewVehicle) -> Result<Vehicle, sqlx::Error> {
        let type_id = vehicle_type_id(&mut *conn, &new.vehicle_type, new.vehicle_type_description.as_deref()).await?;
        let id = Uuid::new_v4();

        sqlx::query(
            "INSERT INTO vehicles
                (id, vendor_id, registration_number, vehicle_type_id, make_model, color, capacity,
                 year_manufactured, amenities, is_insured, insurance_expiry, roadworthiness_expiry_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        )
        .bind(id)
        .bind(vendor_id)
        .bind(&new.registration_number)
        .bind(type_id)
        .bind(&new.make_model)
        .bind(new.color.as_deref())
        .bind(new.capacity)
        .bind(new.year_manufactured)
        .bind(&new.amenities)
        .bind(new.is_insured)
        .bind(new.insurance_expiry)
        .bind(new.roadworthiness_expiry_date)
        .execute(&mut *conn)
        .await?;

        Self::find_for_vendor(&mut *conn, id, vendor_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        conn: &mut PgConnection,
        vehicle_id: Uuid,
        vendor_id: Uuid,
        changes: &VehicleChanges,
    ) -> Result<Option<Vehicle>, sqlx::Error> {
        let type_id = match changes.vehicle_type.as_deref() {
            Some(name) => Some(vehicle_type_id(&mut *conn, name, None).await?),
            None => None,
        };

        let updated = sqlx::query(
            "UPDATE vehicles SET
                registration_number = COALESCE($3, registration_number),
                vehicle_type_id = COALESCE($4, vehicle_type_id),
                make_model = COALESCE($5, make_model),
                color = COALESCE($6, color),
                capacity = COALESCE($7, capacity),
                year_manufactured = COALESCE($8, year_manufactured),
                amenities = COALESCE($9, amenities),
                status = COALESCE($10, status),
                is_insured = COALESCE($11, is_insured),
                insurance_expiry = COALESCE($12, insurance_expiry),
                roadworthiness_expiry_date = COALESCE($13, roadworthiness_expiry_date),
                updated_at = NOW()
             WHERE id = $1 AND vendor_id = $2"
        )
        .bind(vehicle_id)
        .bind(vendor_id)
        .bind(changes.registration_number.as_deref())
        .bind(type_id)
        .bind(changes.make_model.as_deref())
        .bind(changes.color.as_deref())
        .bind(changes.capacity)
        .bind(changes.year_manufactured)
        .bind(&changes.amenities)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.is_insured)
        .bind(changes.insurance_expiry)
        .bind(changes.roadworthiness_expiry_date)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        Self::find_for_vendor(&mut *conn, vehicle_id, vendor_id).await
    }

    /// Fails with a foreign key violation while trips still reference the vehicle.
    pub async fn delete<'e>(db: impl PgExecutor<'e>, vehicle_id: Uuid, vendor_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM vehicles WHERE id = $1 AND vendor_id = $2")
            .bind(vehicle_id)
            .bind(vendor_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// Get-or-create a vehicle type by name
async fn vehicle_type_id(conn: &mut PgConnection, name: &str, description: Option<&str>) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar::<_, i32>(
        "INSERT INTO vehicle_types (name, description) VALUES ($1, $2)
         ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
         RETURNING id"
    )
    .bind(name.trim())
    .bind(description)
    .fetch_one(conn)
    .await
}
