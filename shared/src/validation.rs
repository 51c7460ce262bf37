//! Validation utilities for the stock ledger
//!
//! Domain checks shared by the services and the HTTP layer, plus the
//! sequence-number format for workflow requests.

use rust_decimal::Decimal;

// ============================================================================
// Stock Validations
// ============================================================================

/// Movement and request quantities must be strictly positive
pub fn validate_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity <= 0 {
        return Err("Quantity must be greater than zero");
    }
    Ok(())
}

/// Initial quantity of a new product
pub fn validate_initial_quantity(quantity: i64) -> Result<(), &'static str> {
    if quantity < 0 {
        return Err("Initial quantity cannot be negative");
    }
    Ok(())
}

/// Unit prices may be zero (donations) but never negative
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Required free-text field such as a supplier or beneficiary name
pub fn validate_required_text(value: &str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err("Value is required");
    }
    if value.chars().count() > 255 {
        return Err("Value must be at most 255 characters");
    }
    Ok(())
}

/// Observations accompany holds and rejections
pub fn validate_observations(observations: Option<&str>) -> Result<(), &'static str> {
    match observations {
        Some(text) if !text.trim().is_empty() => Ok(()),
        _ => Err("Observations are required"),
    }
}

/// Phone numbers: digits with optional leading `+`, spaces or dashes
pub fn validate_phone(phone: &str) -> Result<(), &'static str> {
    let trimmed = phone.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-') {
        return Err("Phone number may only contain digits, spaces and dashes");
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    if !(8..=15).contains(&digits) {
        return Err("Phone number must have between 8 and 15 digits");
    }
    Ok(())
}

// ============================================================================
// Sequence Numbers
// ============================================================================

/// Fallback abbreviations when the directory has none
pub const DEFAULT_MINISTERE_ABBREVIATION: &str = "MIN";
pub const DEFAULT_STRUCTURE_ABBREVIATION: &str = "STR";

/// Prefix of replenishment numbers: `ALI-<year>-`
pub fn replenishment_prefix(year: i32) -> String {
    format!("ALI-{year}-")
}

/// Prefix of disbursement numbers: `OCT-<ministry>-<structure>-<year>-`
pub fn disbursement_prefix(
    ministere_abbreviation: Option<&str>,
    structure_abbreviation: Option<&str>,
    year: i32,
) -> String {
    let ministere = non_blank(ministere_abbreviation).unwrap_or(DEFAULT_MINISTERE_ABBREVIATION);
    let structure = non_blank(structure_abbreviation).unwrap_or(DEFAULT_STRUCTURE_ABBREVIATION);
    format!("OCT-{ministere}-{structure}-{year}-")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Full sequence number, counter padded to four digits
pub fn format_sequence_number(prefix: &str, counter: u32) -> String {
    format!("{prefix}{counter:04}")
}

/// Counter at the end of a sequence number, if it has one
pub fn sequence_counter(sequence_number: &str) -> Option<u32> {
    sequence_number.rsplit('-').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantities() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_initial_quantity(0).is_ok());
        assert!(validate_initial_quantity(-1).is_err());
    }

    #[test]
    fn test_unit_price() {
        assert!(validate_unit_price(Decimal::ZERO).is_ok());
        assert!(validate_unit_price(Decimal::new(1250, 2)).is_ok());
        assert!(validate_unit_price(Decimal::new(-1, 2)).is_err());
    }

    #[test]
    fn test_required_text() {
        assert!(validate_required_text("Société Sahel Fournitures").is_ok());
        assert!(validate_required_text("   ").is_err());
        assert!(validate_required_text(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_observations() {
        assert!(validate_observations(Some("Pièces manquantes")).is_ok());
        assert!(validate_observations(Some(" \t")).is_err());
        assert!(validate_observations(None).is_err());
    }

    #[test]
    fn test_phone() {
        assert!(validate_phone("+222 45 25 12 34").is_ok());
        assert!(validate_phone("22-45-25-12").is_ok());
        assert!(validate_phone("12345").is_err());
        assert!(validate_phone("45 25 AB 34").is_err());
    }

    #[test]
    fn test_replenishment_numbers() {
        let prefix = replenishment_prefix(2025);
        assert_eq!(prefix, "ALI-2025-");
        assert_eq!(format_sequence_number(&prefix, 1), "ALI-2025-0001");
        assert_eq!(format_sequence_number(&prefix, 12345), "ALI-2025-12345");
    }

    #[test]
    fn test_disbursement_numbers_fall_back() {
        assert_eq!(
            disbursement_prefix(Some("MS"), Some("DRH"), 2025),
            "OCT-MS-DRH-2025-"
        );
        assert_eq!(disbursement_prefix(None, Some(" "), 2025), "OCT-MIN-STR-2025-");
    }

    #[test]
    fn test_sequence_counter() {
        assert_eq!(sequence_counter("ALI-2025-0042"), Some(42));
        assert_eq!(sequence_counter("OCT-MS-DRH-2025-0107"), Some(107));
        assert_eq!(sequence_counter("ALI-2025-"), None);
    }
}
