// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_models::error::{AppError, Notice};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Consultation modality. Accepts the catalog spellings (`In-person`,
/// `Video`, `Phone`) in any case, plus `in_person` / `inperson`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum ConsultationType {
    InPerson,
    Video,
    Phone,
}

impl ConsultationType {
    /// Label as shown on a doctor's profile.
    pub fn label(&self) -> &'static str {
        match self {
            ConsultationType::InPerson => "In-person",
            ConsultationType::Video => "Video",
            ConsultationType::Phone => "Phone",
        }
    }
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationType::InPerson => write!(f, "in-person"),
            ConsultationType::Video => write!(f, "video"),
            ConsultationType::Phone => write!(f, "phone"),
        }
    }
}

impl FromStr for ConsultationType {
    type Err = BookingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "in-person" | "in_person" | "inperson" | "in person" => Ok(ConsultationType::InPerson),
            "video" => Ok(ConsultationType::Video),
            "phone" => Ok(ConsultationType::Phone),
            other => Err(BookingError::InvalidModality(format!("Unknown consultation type: {}", other))),
        }
    }
}

impl TryFrom<String> for ConsultationType {
    type Error = BookingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConsultationType> for String {
    fn from(value: ConsultationType) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub user_id: String,
    pub doctor_id: String,
    pub consultation_type: ConsultationType,
    pub appointment_date: DateTime<Utc>,
    #[serde(default)]
    pub status: AppointmentStatus,
    pub fee: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Row written on booking; id, status and timestamps come from the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewAppointment {
    pub user_id: String,
    pub doctor_id: String,
    pub consultation_type: ConsultationType,
    pub appointment_date: DateTime<Utc>,
    pub fee: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub time: String,
    pub available: bool,
}

/// Date and 12-hour time label picked by the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelectedSlot {
    pub date: NaiveDate,
    pub time: String,
}

impl SelectedSlot {
    pub fn new(date: NaiveDate, time: impl Into<String>) -> Self {
        Self { date, time: time.into() }
    }
}

// ==============================================================================
// DOCTOR CATALOG MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultationOffering {
    #[serde(alias = "type")]
    pub consultation_type: ConsultationType,
    pub price: String,
    pub duration: String,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default, alias = "phoneNumber")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DoctorProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default, alias = "image")]
    pub avatar_url: Option<String>,
    #[serde(default, alias = "consultationTypes")]
    pub consultation_types: Vec<ConsultationOffering>,
}

impl DoctorProfile {
    pub fn offering(&self, modality: ConsultationType) -> Option<&ConsultationOffering> {
        self.consultation_types
            .iter()
            .find(|offering| offering.consultation_type == modality)
    }

    pub fn offers(&self, modality: ConsultationType) -> bool {
        self.offering(modality).is_some()
    }
}

// ==============================================================================
// CONFIRMATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhoneConfirmation {
    pub doctor_name: String,
    pub doctor_phone: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoConfirmation {
    pub doctor_name: String,
    pub meeting_link: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
}

/// Where the patient goes after a successful booking.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "view", content = "details", rename_all = "snake_case")]
pub enum ConfirmationRoute {
    Phone(PhoneConfirmation),
    Video(VideoConfirmation),
    Profile,
}

/// Result of a booking. Consumed exactly once by whoever navigates to the
/// confirmation view.
#[derive(Debug)]
pub struct BookingOutcome {
    appointment: Appointment,
    route: ConfirmationRoute,
    notice: Notice,
}

impl BookingOutcome {
    pub fn new(appointment: Appointment, route: ConfirmationRoute) -> Self {
        let description = match &route {
            ConfirmationRoute::Phone(_) => {
                "Your phone consultation has been scheduled. Doctor will call you at your appointment time."
            }
            ConfirmationRoute::Video(_) => {
                "Your video consultation has been scheduled. Use the provided link at your appointment time."
            }
            ConfirmationRoute::Profile => "Your appointment has been successfully scheduled.",
        };

        Self {
            appointment,
            route,
            notice: Notice::new("Appointment Booked", description),
        }
    }

    pub fn appointment(&self) -> &Appointment {
        &self.appointment
    }

    pub fn route(&self) -> &ConfirmationRoute {
        &self.route
    }

    pub fn notice(&self) -> &Notice {
        &self.notice
    }

    pub fn into_parts(self) -> (Appointment, ConfirmationRoute, Notice) {
        (self.appointment, self.route, self.notice)
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookRequest {
    pub doctor_id: String,
    pub consultation_type: String,
    #[serde(default)]
    pub slot: Option<SelectedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Please log in to book an appointment")]
    AuthRequired,

    #[error("Please select a date and time for your appointment")]
    SlotRequired,

    #[error("Invalid consultation type: {0}")]
    InvalidModality(String),

    #[error("Failed to book appointment: {0}")]
    BookingFailed(String),

    #[error("Cannot book appointments on past date {0}")]
    PastDate(NaiveDate),

    #[error("The {0} slot is not available")]
    SlotUnavailable(String),

    #[error("Doctor not found: {0}")]
    DoctorNotFound(String),

    #[error("Failed to load appointments: {0}")]
    StorageError(String),
}

impl BookingError {
    pub fn notice(&self) -> Notice {
        match self {
            BookingError::AuthRequired => Notice::new("Authentication Required", self.to_string()),
            BookingError::SlotRequired => Notice::new("Select a Time Slot", self.to_string()),
            BookingError::PastDate(_) => Notice::new("Select a Time Slot", "Appointments cannot be booked in the past"),
            BookingError::SlotUnavailable(_) => Notice::new("Select a Time Slot", self.to_string()),
            BookingError::InvalidModality(_) => Notice::new("Error Booking Appointment", "Invalid consultation type"),
            BookingError::BookingFailed(cause) => Notice::new("Error Booking Appointment", cause.clone()),
            BookingError::DoctorNotFound(_) => Notice::new("Error", self.to_string()),
            BookingError::StorageError(cause) => Notice::new("Error loading appointments", cause.clone()),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::AuthRequired => AppError::Auth(err.to_string()),
            BookingError::SlotRequired
            | BookingError::InvalidModality(_)
            | BookingError::PastDate(_) => AppError::BadRequest(err.to_string()),
            BookingError::SlotUnavailable(_) => AppError::Conflict(err.to_string()),
            BookingError::DoctorNotFound(_) => AppError::NotFound(err.to_string()),
            BookingError::BookingFailed(msg) | BookingError::StorageError(msg) => AppError::Database(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfirmationError {
    #[error("Missing consultation information")]
    MissingDetails,
}

impl ConfirmationError {
    /// View to send the patient to instead.
    pub fn redirect(&self) -> &'static str {
        match self {
            ConfirmationError::MissingDetails => "/profile",
        }
    }

    pub fn notice(&self) -> Notice {
        Notice::new("Error", self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_consultation_type_parsing() {
        assert_eq!("In-person".parse::<ConsultationType>().unwrap(), ConsultationType::InPerson);
        assert_eq!("in_person".parse::<ConsultationType>().unwrap(), ConsultationType::InPerson);
        assert_eq!("VIDEO".parse::<ConsultationType>().unwrap(), ConsultationType::Video);
        assert_eq!(" phone ".parse::<ConsultationType>().unwrap(), ConsultationType::Phone);
        assert!(matches!("chat".parse::<ConsultationType>(), Err(BookingError::InvalidModality(_))));

        assert_eq!(json!(ConsultationType::InPerson), json!("in-person"));
        assert_eq!(ConsultationType::Video.label(), "Video");
    }

    #[test]
    fn test_appointment_status_defaults_to_pending() {
        let appointment: Appointment = serde_json::from_value(json!({
            "id": "a1",
            "user_id": "u1",
            "doctor_id": "D42",
            "consultation_type": "Video",
            "appointment_date": "2025-03-10T10:30:00Z",
            "fee": 120.0
        })).unwrap();

        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert_eq!(appointment.consultation_type, ConsultationType::Video);
    }

    #[test]
    fn test_catalog_spellings_deserialize() {
        let doctor: DoctorProfile = serde_json::from_value(json!({
            "id": "1",
            "name": "Dr. Emily Johnson",
            "image": "https://cdn.example.com/ej.jpg",
            "consultationTypes": [
                { "type": "Phone", "price": "$100", "duration": "20 minutes", "phoneNumber": "9999999999" }
            ]
        })).unwrap();

        let phone = doctor.offering(ConsultationType::Phone).unwrap();
        assert_eq!(phone.phone_number.as_deref(), Some("9999999999"));
        assert!(!doctor.offers(ConsultationType::Video));
    }

    #[test]
    fn test_booking_notice_per_route() {
        let appointment: Appointment = serde_json::from_value(json!({
            "id": "a1",
            "user_id": "u1",
            "doctor_id": "D42",
            "consultation_type": "in-person",
            "appointment_date": "2025-03-10T10:30:00Z",
            "fee": 150.0
        })).unwrap();

        let outcome = BookingOutcome::new(appointment, ConfirmationRoute::Profile);
        assert_eq!(outcome.notice().title, "Appointment Booked");

        let (appointment, route, _) = outcome.into_parts();
        assert_eq!(appointment.id, "a1");
        assert_eq!(route, ConfirmationRoute::Profile);
    }

    #[test]
    fn test_error_notices() {
        assert_eq!(BookingError::AuthRequired.notice().title, "Authentication Required");
        assert_eq!(
            BookingError::SlotRequired.notice().description,
            "Please select a date and time for your appointment"
        );
        assert_eq!(
            BookingError::SlotUnavailable("10:00 AM".to_string()).notice().description,
            "The 10:00 AM slot is not available"
        );
        assert_eq!(ConfirmationError::MissingDetails.redirect(), "/profile");
    }
}
