// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::catalog::DoctorCatalog;

#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub supabase: Arc<SupabaseClient>,
    pub catalog: Arc<DoctorCatalog>,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, catalog: Arc<DoctorCatalog>) -> Self {
        let supabase = Arc::new(SupabaseClient::new(&config));
        Self { config, supabase, catalog }
    }

    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let catalog = Arc::new(DoctorCatalog::from_config(&config));
        Self::new(config, catalog)
    }
}

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", get(handlers::list_appointments))
        .route("/slots", get(handlers::get_slots))
        .route("/book", post(handlers::book_appointment))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

pub fn doctor_routes(state: AppointmentState) -> Router {
    let protected_routes = Router::new()
        .route("/{doctor_id}", get(handlers::get_doctor))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
