use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Extension, Path, Query, State};
use axum::Json;
use chrono::{Datelike, Duration, NaiveDate, Utc, Weekday};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::handlers::*;
use appointment_cell::models::*;
use appointment_cell::router::AppointmentState;
use appointment_cell::services::catalog::DoctorCatalog;
use shared_utils::session::SessionContext;
use shared_models::error::AppError;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig, TestUser};

fn state_for(url: &str) -> AppointmentState {
    AppointmentState::new(TestConfig::with_url(url).to_arc(), Arc::new(DoctorCatalog::builtin()))
}

/// First date at least a week out that falls on `weekday`.
fn upcoming(weekday: Weekday) -> NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(7);
    while date.weekday() != weekday {
        date += Duration::days(1);
    }
    date
}

fn phone_request(slot: Option<SelectedSlot>) -> Json<BookRequest> {
    Json(BookRequest {
        doctor_id: "1".to_string(),
        consultation_type: "Phone".to_string(),
        slot,
    })
}

/// Fails the test if the handler reaches the appointments table.
async fn forbid_writes(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_slots_for_future_date() {
    let Json(body) = get_slots(
        State(state_for("http://localhost:54321")),
        Query(SlotsQuery { date: upcoming(Weekday::Mon) }),
    )
    .await
    .unwrap();

    assert_eq!(body["slots"].as_array().unwrap().len(), 12);
    assert_eq!(body["slots"][0]["time"], "09:00 AM");
}

#[tokio::test]
async fn test_slots_for_past_date_is_bad_request() {
    let result = get_slots(
        State(state_for("http://localhost:54321")),
        Query(SlotsQuery { date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_book_with_unknown_modality() {
    let result = book_appointment(
        State(state_for("http://localhost:54321")),
        Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
        Json(BookRequest {
            doctor_id: "1".to_string(),
            consultation_type: "Carrier pigeon".to_string(),
            slot: Some(SelectedSlot::new(upcoming(Weekday::Tue), "09:00 AM")),
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("Invalid consultation type"));
}

#[tokio::test]
async fn test_missing_slot_reported_before_unknown_modality() {
    let result = book_appointment(
        State(state_for("http://localhost:54321")),
        Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
        Json(BookRequest {
            doctor_id: "1".to_string(),
            consultation_type: "Carrier pigeon".to_string(),
            slot: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("select a date and time"));
}

#[tokio::test]
async fn test_book_without_session_is_rejected_first() {
    let result = book_appointment(
        State(state_for("http://localhost:54321")),
        Extension(Arc::new(SessionContext::new())),
        Json(BookRequest {
            doctor_id: "1".to_string(),
            consultation_type: "Carrier pigeon".to_string(),
            slot: None,
        }),
    )
    .await;

    assert_matches!(result, Err(AppError::Auth(_)));
}

#[tokio::test]
async fn test_book_phone_without_slot() {
    let result = book_appointment(
        State(state_for("http://localhost:54321")),
        Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
        phone_request(None),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("select a date and time"));
}

#[tokio::test]
async fn test_book_rejects_slots_outside_the_calendar() {
    let mock_server = MockServer::start().await;
    forbid_writes(&mock_server).await;

    let rejected = [
        // Booked in the template.
        SelectedSlot::new(upcoming(Weekday::Tue), "10:00 AM"),
        // Not a template time at all.
        SelectedSlot::new(upcoming(Weekday::Tue), "04:45 PM"),
        // Weekends only offer mornings.
        SelectedSlot::new(upcoming(Weekday::Sat), "01:00 PM"),
    ];

    for slot in rejected {
        let time = slot.time.clone();
        let result = book_appointment(
            State(state_for(&mock_server.uri())),
            Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
            phone_request(Some(slot)),
        )
        .await;

        assert_matches!(result, Err(AppError::Conflict(msg)) if msg.contains(&time));
    }
}

#[tokio::test]
async fn test_book_past_date_is_bad_request() {
    let mock_server = MockServer::start().await;
    forbid_writes(&mock_server).await;

    let result = book_appointment(
        State(state_for(&mock_server.uri())),
        Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
        phone_request(Some(SelectedSlot::new(NaiveDate::from_ymd_opt(2020, 1, 7).unwrap(), "09:00 AM"))),
    )
    .await;

    assert_matches!(result, Err(AppError::BadRequest(msg)) if msg.contains("past date"));
}

#[tokio::test]
async fn test_book_phone_consultation() {
    let mock_server = MockServer::start().await;
    let date = upcoming(Weekday::Wed);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_response("patient-1", "1", "phone", Utc::now() + Duration::days(7), 100.0)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let Json(body) = book_appointment(
        State(state_for(&mock_server.uri())),
        Extension(TestUser::with_id("patient-1", "patient").signed_in_context("token")),
        phone_request(Some(SelectedSlot::new(date, "01:30 PM"))),
    )
    .await
    .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["confirmation"]["view"], "phone");
    assert_eq!(body["confirmation"]["details"]["doctor_phone"], "9999999999");
    assert_eq!(body["notice"]["title"], "Appointment Booked");
}

#[tokio::test]
async fn test_get_doctor() {
    let Json(body) = get_doctor(State(state_for("http://localhost:54321")), Path("1".to_string()))
        .await
        .unwrap();
    assert_eq!(body["name"], "Dr. Emily Johnson");

    let missing = get_doctor(State(state_for("http://localhost:54321")), Path("404".to_string())).await;
    assert_matches!(missing, Err(AppError::NotFound(_)));
}
