//! Utility functions

use chrono::{DateTime, Utc};

/// Trim a form field, mapping blank input to `None`
pub fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Validate a machine id as typed into the forms
pub fn validate_machine_id(m_id: &str) -> crate::Result<String> {
    let m_id = m_id.trim();

    if m_id.is_empty() {
        return Err(crate::Error::InvalidArgument("Machine id is required".into()));
    }
    if m_id.len() > crate::MAX_MACHINE_ID_LENGTH {
        return Err(crate::Error::InvalidArgument(format!(
            "Machine id must be at most {} characters",
            crate::MAX_MACHINE_ID_LENGTH
        )));
    }
    if m_id.chars().any(|c| c.is_control() || c == '/') {
        return Err(crate::Error::InvalidArgument(
            "Machine id contains invalid characters".into(),
        ));
    }

    Ok(m_id.to_string())
}

/// Validate a free-text field length
pub fn validate_text(field: &str, value: &str) -> crate::Result<()> {
    if value.len() > crate::MAX_TEXT_LENGTH {
        return Err(crate::Error::InvalidArgument(format!(
            "{} must be at most {} characters",
            field,
            crate::MAX_TEXT_LENGTH
        )));
    }
    Ok(())
}

/// Format a log timestamp for display
pub fn format_log_time(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank("  lathe "), Some("lathe".to_string()));
        assert_eq!(non_blank("   "), None);
    }

    #[test]
    fn test_validate_machine_id() {
        assert_eq!(validate_machine_id(" CNC-01 ").unwrap(), "CNC-01");
        assert!(validate_machine_id("").is_err());
        assert!(validate_machine_id("a/b").is_err());
        assert!(validate_machine_id(&"x".repeat(65)).is_err());
    }
}
