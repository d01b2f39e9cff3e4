// libs/appointment-cell/src/services/pricing.rs
use tracing::warn;

use crate::models::{BookingError, ConsultationOffering};

/// Parse a catalog price such as `"$120"` or `"$1,250.50"`.
pub fn parse_price(price: &str) -> Option<f64> {
    let amount: String = price
        .trim()
        .trim_start_matches(['$', '€', '£'])
        .chars()
        .filter(|c| *c != ',')
        .collect();

    match amount.trim().parse::<f64>() {
        Ok(fee) if fee.is_finite() && fee >= 0.0 => Some(fee),
        _ => None,
    }
}

/// Fee charged for an offering. An unreadable price makes the offering
/// unbookable.
pub fn consultation_fee(offering: &ConsultationOffering) -> Result<f64, BookingError> {
    parse_price(&offering.price).ok_or_else(|| {
        warn!("Unreadable price {:?} for {} consultation", offering.price, offering.consultation_type);
        BookingError::InvalidModality(format!("No valid price for {} consultation", offering.consultation_type))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConsultationType;

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$120"), Some(120.0));
        assert_eq!(parse_price(" $1,250.50 "), Some(1250.5));
        assert_eq!(parse_price("150"), Some(150.0));
        assert_eq!(parse_price("€80"), Some(80.0));
        assert_eq!(parse_price("free"), None);
        assert_eq!(parse_price("$-5"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_unreadable_price_is_invalid_modality() {
        let offering = ConsultationOffering {
            consultation_type: ConsultationType::Video,
            price: "Call for pricing".to_string(),
            duration: "30 minutes".to_string(),
            link: None,
            phone_number: None,
        };

        assert!(matches!(consultation_fee(&offering), Err(BookingError::InvalidModality(_))));
    }
}
