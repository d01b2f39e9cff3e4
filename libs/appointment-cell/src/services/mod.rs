pub mod booking;
pub mod catalog;
pub mod confirmation;
pub mod pricing;
pub mod slots;

pub use booking::BookingOrchestrator;
pub use catalog::DoctorCatalog;
pub use confirmation::{PhoneConsultationView, VideoConsultationView};
pub use slots::SlotCalendar;
