// libs/appointment-cell/src/services/confirmation.rs
use chrono::NaiveDate;
use tracing::warn;

use crate::models::{ConfirmationError, PhoneConfirmation, VideoConfirmation};

const CONFIRMATION_DATE_FORMAT: &str = "%A, %B %-d, %Y";

fn present(value: &str) -> bool {
    !value.trim().is_empty()
}

fn format_confirmation_date(date: NaiveDate) -> String {
    date.format(CONFIRMATION_DATE_FORMAT).to_string()
}

/// Phone consultation confirmation. Only constructible from complete
/// details; anything else sends the patient back to their profile.
#[derive(Debug, Clone)]
pub struct PhoneConsultationView {
    details: PhoneConfirmation,
}

impl PhoneConsultationView {
    pub fn enter(details: Option<PhoneConfirmation>) -> Result<Self, ConfirmationError> {
        match details {
            Some(details) if present(&details.doctor_name) && present(&details.doctor_phone) => Ok(Self { details }),
            _ => {
                warn!("Phone confirmation entered without doctor contact details");
                Err(ConfirmationError::MissingDetails)
            }
        }
    }

    pub fn doctor_name(&self) -> &str {
        &self.details.doctor_name
    }

    /// Number the doctor will call from; offered for copying.
    pub fn doctor_phone(&self) -> &str {
        &self.details.doctor_phone
    }

    pub fn formatted_date(&self) -> String {
        format_confirmation_date(self.details.appointment_date)
    }

    pub fn appointment_time(&self) -> &str {
        &self.details.appointment_time
    }
}

#[derive(Debug, Clone)]
pub struct VideoConsultationView {
    details: VideoConfirmation,
}

impl VideoConsultationView {
    pub fn enter(details: Option<VideoConfirmation>) -> Result<Self, ConfirmationError> {
        match details {
            Some(details) if present(&details.doctor_name) && present(&details.meeting_link) => Ok(Self { details }),
            _ => {
                warn!("Video confirmation entered without a meeting link");
                Err(ConfirmationError::MissingDetails)
            }
        }
    }

    pub fn doctor_name(&self) -> &str {
        &self.details.doctor_name
    }

    pub fn meeting_link(&self) -> &str {
        &self.details.meeting_link
    }

    pub fn formatted_date(&self) -> String {
        format_confirmation_date(self.details.appointment_date)
    }

    pub fn appointment_time(&self) -> &str {
        &self.details.appointment_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn march_10() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn video(link: &str) -> VideoConfirmation {
        VideoConfirmation {
            doctor_name: "Dr. Emily Johnson".to_string(),
            meeting_link: link.to_string(),
            appointment_date: march_10(),
            appointment_time: "10:30 AM".to_string(),
        }
    }

    #[test]
    fn test_video_view_formats_details() {
        let view = VideoConsultationView::enter(Some(video("https://meet.google.com/abc-defg-hij"))).unwrap();

        assert_eq!(view.formatted_date(), "Monday, March 10, 2025");
        assert_eq!(view.appointment_time(), "10:30 AM");
        assert_eq!(view.meeting_link(), "https://meet.google.com/abc-defg-hij");
    }

    #[test]
    fn test_video_view_requires_link() {
        assert_matches!(VideoConsultationView::enter(Some(video("  "))), Err(ConfirmationError::MissingDetails));
        assert_matches!(VideoConsultationView::enter(None), Err(ConfirmationError::MissingDetails));
    }

    #[test]
    fn test_phone_view_requires_name_and_phone() {
        let complete = PhoneConfirmation {
            doctor_name: "Dr. Emily Johnson".to_string(),
            doctor_phone: "9999999999".to_string(),
            appointment_date: march_10(),
            appointment_time: "01:00 PM".to_string(),
        };

        let view = PhoneConsultationView::enter(Some(complete.clone())).unwrap();
        assert_eq!(view.doctor_phone(), "9999999999");
        assert_eq!(view.formatted_date(), "Monday, March 10, 2025");

        let nameless = PhoneConfirmation { doctor_name: String::new(), ..complete.clone() };
        let err = PhoneConsultationView::enter(Some(nameless)).unwrap_err();
        assert_eq!(err.redirect(), "/profile");

        let no_phone = PhoneConfirmation { doctor_phone: String::new(), ..complete };
        assert_matches!(PhoneConsultationView::enter(Some(no_phone)), Err(ConfirmationError::MissingDetails));
    }
}
