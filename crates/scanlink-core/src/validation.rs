//! # Validation Module
//!
//! Checks run on device configurations before the manager accepts them and
//! when the configuration file is loaded.
//!
//! ## Usage
//! ```rust
//! use scanlink_core::validation::validate_device_config;
//! use scanlink_core::ScannerDeviceConfig;
//!
//! assert!(validate_device_config(&ScannerDeviceConfig::new("COM3")).is_ok());
//! assert!(validate_device_config(&ScannerDeviceConfig::new("  ")).is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::types::ScannerDeviceConfig;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest read timeout accepted, in milliseconds.
pub const MAX_READ_TIMEOUT_MS: u64 = 60_000;

// =============================================================================
// Device Validators
// =============================================================================

/// Validates a port name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must not contain whitespace or control characters
pub fn validate_port(port: &str) -> ValidationResult<()> {
    if port.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "port".to_string(),
        });
    }

    if port.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidFormat {
            field: "port".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates one device configuration.
///
/// ## Rules
/// - `port` passes [`validate_port`]
/// - `baud_rate` > 0
/// - `data_bits` in 5..=8
/// - `read_timeout_ms` in 1..=60000
pub fn validate_device_config(config: &ScannerDeviceConfig) -> ValidationResult<()> {
    validate_port(&config.port)?;

    if config.baud_rate == 0 {
        return Err(ValidationError::MustBePositive {
            field: "baud_rate".to_string(),
        });
    }

    if !(5..=8).contains(&config.data_bits) {
        return Err(ValidationError::OutOfRange {
            field: "data_bits".to_string(),
            min: 5,
            max: 8,
        });
    }

    if config.read_timeout_ms == 0 || config.read_timeout_ms > MAX_READ_TIMEOUT_MS {
        return Err(ValidationError::OutOfRange {
            field: "read_timeout_ms".to_string(),
            min: 1,
            max: MAX_READ_TIMEOUT_MS as i64,
        });
    }

    Ok(())
}

/// Validates a device list: every entry valid, no port twice.
pub fn validate_device_list(configs: &[ScannerDeviceConfig]) -> ValidationResult<()> {
    let mut ports = HashSet::new();
    for config in configs {
        validate_device_config(config)?;
        if !ports.insert(config.port.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "port".to_string(),
                value: config.port.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port() {
        assert!(validate_port("COM3").is_ok());
        assert!(validate_port("/dev/ttyACM0").is_ok());
        assert!(validate_port("").is_err());
        assert!(validate_port("COM 3").is_err());
    }

    #[test]
    fn test_validate_device_config_ranges() {
        let mut config = ScannerDeviceConfig::new("COM3");
        assert!(validate_device_config(&config).is_ok());

        config.data_bits = 9;
        assert!(matches!(
            validate_device_config(&config),
            Err(ValidationError::OutOfRange { .. })
        ));

        config.data_bits = 7;
        config.baud_rate = 0;
        assert!(matches!(
            validate_device_config(&config),
            Err(ValidationError::MustBePositive { .. })
        ));

        config.baud_rate = 115_200;
        config.read_timeout_ms = 0;
        assert!(validate_device_config(&config).is_err());
    }

    #[test]
    fn test_validate_device_list_rejects_duplicate_port() {
        let configs = vec![
            ScannerDeviceConfig::new("COM3"),
            ScannerDeviceConfig::new("COM4"),
            ScannerDeviceConfig::new("COM3"),
        ];
        let err = validate_device_list(&configs).unwrap_err();
        assert_eq!(err.to_string(), "port 'COM3' already exists");
    }
}
