// libs/appointment-cell/src/services/booking.rs
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_utils::session::SessionContext;

use crate::models::{
    Appointment, BookingError, BookingOutcome, ConfirmationRoute, ConsultationOffering,
    ConsultationType, DoctorProfile, NewAppointment, PhoneConfirmation, SelectedSlot,
    VideoConfirmation,
};
use crate::services::catalog::DoctorCatalog;
use crate::services::pricing::consultation_fee;
use crate::services::slots::parse_slot_time;

pub const APPOINTMENTS_CACHE_PREFIX: &str = "appointments";

fn appointments_cache_key(user_id: &str) -> String {
    format!("{}:{}", APPOINTMENTS_CACHE_PREFIX, user_id)
}

/// Wall-clock `date` + `time` in the clinic's offset, as a UTC instant.
pub fn compose_appointment_date(date: NaiveDate, time: NaiveTime, offset: &FixedOffset) -> Option<DateTime<Utc>> {
    date.and_time(time)
        .and_local_timezone(*offset)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Confirmation payload for the modality. Missing catalog contact details
/// yield empty fields; the confirmation view rejects those.
pub fn confirmation_route(
    doctor: &DoctorProfile,
    offering: &ConsultationOffering,
    slot: &SelectedSlot,
) -> ConfirmationRoute {
    match offering.consultation_type {
        ConsultationType::Phone => ConfirmationRoute::Phone(PhoneConfirmation {
            doctor_name: doctor.name.clone(),
            doctor_phone: offering.phone_number.clone().unwrap_or_default(),
            appointment_date: slot.date,
            appointment_time: slot.time.clone(),
        }),
        ConsultationType::Video => ConfirmationRoute::Video(VideoConfirmation {
            doctor_name: doctor.name.clone(),
            meeting_link: offering.link.clone().unwrap_or_default(),
            appointment_date: slot.date,
            appointment_time: slot.time.clone(),
        }),
        ConsultationType::InPerson => ConfirmationRoute::Profile,
    }
}

pub struct BookingOrchestrator {
    supabase: Arc<SupabaseClient>,
    catalog: Arc<DoctorCatalog>,
    session: Arc<SessionContext>,
    local_offset: FixedOffset,
}

impl BookingOrchestrator {
    pub fn new(
        supabase: Arc<SupabaseClient>,
        catalog: Arc<DoctorCatalog>,
        session: Arc<SessionContext>,
        local_offset: FixedOffset,
    ) -> Self {
        Self {
            supabase,
            catalog,
            session,
            local_offset,
        }
    }

    pub fn from_config(config: &AppConfig, catalog: Arc<DoctorCatalog>, session: Arc<SessionContext>) -> Self {
        Self::new(
            Arc::new(SupabaseClient::new(config)),
            catalog,
            session,
            config.local_offset(),
        )
    }

    /// Reserve `slot` with `doctor_id` for the given modality.
    ///
    /// All validation happens before the single insert: a missing session,
    /// a missing or unreadable slot, or a modality the doctor does not
    /// offer never reach the backend.
    pub async fn book(
        &self,
        doctor_id: &str,
        modality: ConsultationType,
        slot: Option<SelectedSlot>,
    ) -> Result<BookingOutcome, BookingError> {
        let session = self.session.current().ok_or(BookingError::AuthRequired)?;
        let slot = slot.ok_or(BookingError::SlotRequired)?;
        let time = parse_slot_time(&slot.time).ok_or(BookingError::SlotRequired)?;

        let doctor = self
            .catalog
            .get(doctor_id)
            .ok_or_else(|| BookingError::InvalidModality(format!("Unknown doctor {}", doctor_id)))?;
        let offering = doctor.offering(modality).ok_or_else(|| {
            BookingError::InvalidModality(format!("{} does not offer {} consultations", doctor.name, modality))
        })?;
        let fee = consultation_fee(offering)?;

        let appointment_date =
            compose_appointment_date(slot.date, time, &self.local_offset).ok_or(BookingError::SlotRequired)?;

        let row = NewAppointment {
            user_id: session.user_id().to_string(),
            doctor_id: doctor_id.to_string(),
            consultation_type: modality,
            appointment_date,
            fee,
        };

        debug!("Booking {} consultation with {} at {}", modality, doctor_id, appointment_date);

        let body = serde_json::to_value(&row).map_err(|e| BookingError::BookingFailed(e.to_string()))?;
        let appointment: Appointment = self
            .supabase
            .insert_returning("appointments", body, &session.access_token)
            .await
            .map_err(|e| {
                error!("Failed to create appointment: {}", e);
                BookingError::BookingFailed(e.to_string())
            })?;

        self.session.invalidate(APPOINTMENTS_CACHE_PREFIX);

        info!("Appointment {} booked with doctor {} ({})", appointment.id, doctor_id, modality);
        Ok(BookingOutcome::new(appointment, confirmation_route(doctor, offering, &slot)))
    }

    /// The caller's appointments, earliest first. Served from the session
    /// cache until the next booking or sign-out.
    pub async fn list_appointments(&self) -> Result<Vec<Appointment>, BookingError> {
        let session = self.session.current().ok_or(BookingError::AuthRequired)?;
        let cache_key = appointments_cache_key(session.user_id());

        if let Some(cached) = self.session.cached::<Vec<Appointment>>(&cache_key) {
            debug!("Serving {} appointments from cache", cached.len());
            return Ok(cached);
        }

        let path = format!(
            "/rest/v1/appointments?select=*&user_id=eq.{}&order=appointment_date.asc",
            urlencoding::encode(session.user_id())
        );

        let mut appointments: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, Some(&session.access_token), None)
            .await
            .map_err(|e| {
                error!("Failed to fetch appointments: {}", e);
                BookingError::StorageError(e.to_string())
            })?;

        appointments.sort_by_key(|appointment| appointment.appointment_date);
        self.session.store(&cache_key, &appointments);

        Ok(appointments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_appointment_date_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        let time = NaiveTime::from_hms_opt(10, 30, 0).unwrap();

        let utc = FixedOffset::east_opt(0).unwrap();
        assert_eq!(
            compose_appointment_date(date, time, &utc).unwrap().to_rfc3339(),
            "2025-03-10T10:30:00+00:00"
        );

        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        assert_eq!(
            compose_appointment_date(date, time, &new_york).unwrap().to_rfc3339(),
            "2025-03-10T15:30:00+00:00"
        );
    }

    #[test]
    fn test_missing_contact_details_yield_empty_fields() {
        let doctor = DoctorProfile {
            id: "D7".to_string(),
            name: "Dr. Ana Ruiz".to_string(),
            specialty: None,
            avatar_url: None,
            consultation_types: vec![],
        };
        let offering = ConsultationOffering {
            consultation_type: ConsultationType::Phone,
            price: "$90".to_string(),
            duration: "20 minutes".to_string(),
            link: None,
            phone_number: None,
        };
        let slot = SelectedSlot::new(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(), "09:00 AM");

        match confirmation_route(&doctor, &offering, &slot) {
            ConfirmationRoute::Phone(details) => {
                assert_eq!(details.doctor_name, "Dr. Ana Ruiz");
                assert_eq!(details.doctor_phone, "");
            }
            other => panic!("expected phone route, got {:?}", other),
        }
    }
}
