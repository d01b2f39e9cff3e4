// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use tracing::debug;

use shared_models::error::AppError;
use shared_utils::session::SessionContext;

use crate::models::{BookRequest, BookingError, ConsultationType, SlotsQuery};
use crate::router::AppointmentState;
use crate::services::booking::BookingOrchestrator;
use crate::services::slots::SlotCalendar;

fn orchestrator(state: &AppointmentState, session: Arc<SessionContext>) -> BookingOrchestrator {
    BookingOrchestrator::new(
        state.supabase.clone(),
        state.catalog.clone(),
        session,
        state.config.local_offset(),
    )
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<AppointmentState>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let today = Utc::now().with_timezone(&state.config.local_offset()).date_naive();
    let slots = SlotCalendar::slots_for(query.date, today)?;

    Ok(Json(json!({
        "date": query.date,
        "slots": slots,
    })))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<AppointmentState>,
    Extension(session): Extension<Arc<SessionContext>>,
    Json(request): Json<BookRequest>,
) -> Result<Json<Value>, AppError> {
    // Same order as the orchestrator: session, then slot, then modality.
    if !session.is_signed_in() {
        return Err(BookingError::AuthRequired.into());
    }

    let slot = request.slot.as_ref().ok_or(BookingError::SlotRequired)?;
    let today = Utc::now().with_timezone(&state.config.local_offset()).date_naive();
    SlotCalendar::check_available(slot, today)?;

    let modality: ConsultationType = request.consultation_type.parse()?;

    let outcome = orchestrator(&state, session)
        .book(&request.doctor_id, modality, request.slot)
        .await?;
    let (appointment, confirmation, notice) = outcome.into_parts();

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "confirmation": confirmation,
        "notice": notice,
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Extension(session): Extension<Arc<SessionContext>>,
) -> Result<Json<Value>, AppError> {
    let appointments = orchestrator(&state, session).list_appointments().await?;
    debug!("Returning {} appointments", appointments.len());

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len(),
    })))
}

// ==============================================================================
// DOCTOR CATALOG HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<AppointmentState>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor = state
        .catalog
        .get(&doctor_id)
        .ok_or(BookingError::DoctorNotFound(doctor_id))?;

    Ok(Json(json!(doctor)))
}
