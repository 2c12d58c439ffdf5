//! Input validation helpers shared by the write path and the facade.

use chrono::{DateTime, Utc};

use calbridge_domain::{Attendee, CalbridgeError, Result};

/// Minimal structural email check: non-empty local part and a dotted
/// domain. Provider-grade validation stays upstream.
pub fn is_valid_email(email: &str) -> bool {
    let trimmed = email.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(CalbridgeError::Validation("title must not be empty".to_string()));
    }
    Ok(())
}

pub fn validate_time_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if end < start {
        return Err(CalbridgeError::Validation(format!(
            "end time {end} is before start time {start}"
        )));
    }
    Ok(())
}

pub fn validate_attendees(attendees: &[Attendee]) -> Result<()> {
    for attendee in attendees {
        if !is_valid_email(&attendee.email) {
            return Err(CalbridgeError::Validation(format!(
                "malformed attendee email: {}",
                attendee.email
            )));
        }
    }
    Ok(())
}
