//! Inbound frame validation.

use viewgate_core::error::AppError;

use super::types::InboundMessage;

/// Maximum allowed frame size in bytes.
pub const MAX_MESSAGE_SIZE: usize = 4_096;

/// Validates the raw frame before parsing.
pub fn validate_inbound(raw: &str) -> Result<(), AppError> {
    if raw.len() > MAX_MESSAGE_SIZE {
        return Err(AppError::validation(format!(
            "Message exceeds maximum size of {MAX_MESSAGE_SIZE} bytes"
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::validation("Empty message"));
    }

    Ok(())
}

/// Validate and parse a text frame into a command.
pub fn parse_inbound(raw: &str) -> Result<InboundMessage, AppError> {
    validate_inbound(raw)?;
    serde_json::from_str(raw)
        .map_err(|e| AppError::validation(format!("Failed to parse message: {e}")))
}
