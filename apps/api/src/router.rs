use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::{appointment_routes, doctor_routes, AppointmentState};
use messaging_cell::router::{messaging_routes, MessagingState};
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    let appointments = AppointmentState::from_config(state.clone());
    let messaging = MessagingState::from_config(state);

    Router::new()
        .route("/", get(|| async { "CareLink API is running!" }))
        .nest("/conversations", messaging_routes(messaging))
        .nest("/appointments", appointment_routes(appointments.clone()))
        .nest("/doctors", doctor_routes(appointments))
}
