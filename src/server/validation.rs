use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::server::dto::ScheduleSlotRequest;
use crate::server::response::ApiError;

const MAX_NAME_LEN: usize = 100;
const MAX_TEXT_LEN: usize = 500;
const MIN_PASSWORD_LEN: usize = 8;

pub const DAYS_OF_WEEK: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

/// Lowercases and trims an email address, then checks its shape.
pub fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_NAME_LEN || !EMAIL_RE.is_match(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    Ok(email)
}

/// Trims and collapses internal whitespace in a human name or title.
pub fn normalize_text(value: &str, field: &str) -> Result<String, ApiError> {
    let value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} cannot be empty")));
    }
    if value.len() > MAX_TEXT_LEN {
        return Err(ApiError::bad_request(format!(
            "{field} cannot exceed {MAX_TEXT_LEN} characters"
        )));
    }
    Ok(value)
}

/// Same normalization for optional fields; empty input maps to None.
pub fn normalize_optional(value: Option<&str>) -> Option<String> {
    let value = value?.split_whitespace().collect::<Vec<_>>().join(" ");
    if value.is_empty() { None } else { Some(value) }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Amounts must be strictly positive with at most two decimal places.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, ApiError> {
    if amount <= Decimal::ZERO {
        return Err(ApiError::bad_request("Amount must be greater than zero"));
    }
    if amount != amount.round_dp(2) {
        return Err(ApiError::bad_request(
            "Amount cannot have more than two decimal places",
        ));
    }
    Ok(amount)
}

fn parse_hhmm(value: &str) -> Option<(u32, u32)> {
    let (h, m) = value.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hours: u32 = h.parse().ok()?;
    let minutes: u32 = m.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some((hours, minutes))
}

/// Validates a schedule slot list: known lowercase day names, at most one
/// slot per day, HH:MM times with start before end.
pub fn validate_schedule(slots: &[ScheduleSlotRequest]) -> Result<(), ApiError> {
    let mut seen_days: Vec<&str> = Vec::new();

    for slot in slots {
        if !DAYS_OF_WEEK.contains(&slot.day_of_week.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Invalid day of week: {}",
                slot.day_of_week
            )));
        }
        if seen_days.contains(&slot.day_of_week.as_str()) {
            return Err(ApiError::bad_request(format!(
                "Duplicate schedule day: {}",
                slot.day_of_week
            )));
        }
        seen_days.push(&slot.day_of_week);

        let start = parse_hhmm(&slot.start_time)
            .ok_or_else(|| ApiError::bad_request("Invalid start time, expected HH:MM"))?;
        let end = parse_hhmm(&slot.end_time)
            .ok_or_else(|| ApiError::bad_request("Invalid end time, expected HH:MM"))?;
        if start >= end {
            return Err(ApiError::bad_request("Start time must be before end time"));
        }
    }

    Ok(())
}

/// A reaction is a single emoji: short, no whitespace. ZWJ sequences and
/// tag-based flags run 7+ scalars, so the cap is generous rather than exact;
/// what renders as one glyph is not checkable without Unicode segmentation
/// tables, and short plain text slipping through is harmless.
pub fn validate_emoji(emoji: &str) -> Result<String, ApiError> {
    let emoji = emoji.trim();
    if emoji.is_empty()
        || emoji.len() > 40
        || emoji.chars().count() > 10
        || emoji.chars().any(char::is_whitespace)
    {
        return Err(ApiError::bad_request("Invalid reaction"));
    }
    Ok(emoji.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(day: &str, start: &str, end: &str) -> ScheduleSlotRequest {
        ScheduleSlotRequest {
            day_of_week: day.to_string(),
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Ada@Example.COM ").unwrap(),
            "ada@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("a b@example.com").is_err());
    }

    #[test]
    fn test_normalize_text_collapses_whitespace() {
        assert_eq!(normalize_text("  Ada   Lovelace ", "Name").unwrap(), "Ada Lovelace");
        assert!(normalize_text("   ", "Name").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(Decimal::new(10050, 2)).is_ok());
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(Decimal::new(-5, 0)).is_err());
        assert!(validate_amount(Decimal::new(1005, 3)).is_err());
    }

    #[test]
    fn test_validate_schedule() {
        assert!(validate_schedule(&[slot("monday", "09:00", "10:30")]).is_ok());
        assert!(validate_schedule(&[slot("funday", "09:00", "10:30")]).is_err());
        assert!(validate_schedule(&[slot("monday", "10:30", "09:00")]).is_err());
        assert!(validate_schedule(&[slot("monday", "9:00", "10:30")]).is_err());
        assert!(
            validate_schedule(&[
                slot("monday", "09:00", "10:30"),
                slot("monday", "11:00", "12:00"),
            ])
            .is_err()
        );
    }

    #[test]
    fn test_validate_emoji() {
        assert!(validate_emoji("👍").is_ok());
        // ZWJ family sequence (7 scalars) and a tag-based flag (7 scalars).
        assert!(validate_emoji("👨‍👩‍👧‍👦").is_ok());
        assert!(validate_emoji("🏴󠁧󠁢󠁳󠁣󠁴󠁿").is_ok());
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji("hello world").is_err());
        assert!(validate_emoji("👍👍👍👍👍👍👍👍👍👍👍").is_err());
    }
}
