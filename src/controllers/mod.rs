pub mod auth;
pub mod corper;
pub mod vendor;
pub mod vehicles;
pub mod trips;
pub mod bookings;

use axum::Router;
use std::sync::Arc;

use crate::error::ApiError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .nest("/auth", auth::routes())
        .merge(corper::routes())
        .merge(vendor::routes())
        .merge(vehicles::routes())
        .merge(trips::routes())
        .merge(bookings::routes())
}

/* ---------- helpers ---------- */

// Logs the failure before it is turned into a 500
pub(crate) fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> ApiError {
    move |e| {
        tracing::error!("{} sql error: {:?}", context, e);
        ApiError::Database(e)
    }
}
