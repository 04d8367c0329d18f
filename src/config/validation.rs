//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check backend identity (unique, non-empty ids)
//! - Validate value ranges (timeouts > 0, ratios in range, status codes valid)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::RouterConfig;
use crate::load_balancer::backend::parse_address;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let mut seen = HashSet::new();
    for (i, backend) in config.backends.iter().enumerate() {
        let field = format!("backends[{}]", i);
        if backend.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.id", field), "must not be empty"));
        } else if !seen.insert(backend.id.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.id", field),
                format!("duplicate backend id '{}'", backend.id),
            ));
        }
        if let Err(e) = parse_address(&backend.address) {
            errors.push(ValidationError::new(format!("{}.address", field), e.to_string()));
        }
    }

    let load = &config.load;
    if !(load.alpha > 0.0 && load.alpha <= 1.0) {
        errors.push(ValidationError::new("load.alpha", "must be in (0, 1]"));
    }
    if !(0.0..=1.0).contains(&load.error_weight) {
        errors.push(ValidationError::new("load.error_weight", "must be in [0, 1]"));
    }
    if !(0.0..=1.0).contains(&load.degraded_penalty) {
        errors.push(ValidationError::new("load.degraded_penalty", "must be in [0, 1]"));
    }
    if load.latency_ceiling_ms == 0 {
        errors.push(ValidationError::new("load.latency_ceiling_ms", "must be greater than 0"));
    }

    let circuit = &config.circuit;
    if circuit.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit.failure_threshold", "must be greater than 0"));
    }
    if circuit.cool_down_ms == 0 {
        errors.push(ValidationError::new("circuit.cool_down_ms", "must be greater than 0"));
    }
    if let Some(degraded) = circuit.degraded_threshold {
        if degraded >= circuit.failure_threshold {
            errors.push(ValidationError::new(
                "circuit.degraded_threshold",
                "must be lower than failure_threshold",
            ));
        }
    }

    for status in &config.retries.failure_statuses {
        if !(100..=599).contains(status) {
            errors.push(ValidationError::new(
                "retries.failure_statuses",
                format!("{} is not an HTTP status code", status),
            ));
        }
    }
    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed max_delay_ms",
        ));
    }

    let timeouts = &config.timeouts;
    if timeouts.connect_ms == 0 {
        errors.push(ValidationError::new("timeouts.connect_ms", "must be greater than 0"));
    }
    if timeouts.attempt_ms == 0 {
        errors.push(ValidationError::new("timeouts.attempt_ms", "must be greater than 0"));
    }
    if timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.health_check.enabled {
        if config.health_check.interval_secs == 0 {
            errors.push(ValidationError::new("health_check.interval_secs", "must be greater than 0"));
        }
        if !config.health_check.path.starts_with('/') {
            errors.push(ValidationError::new("health_check.path", "must start with '/'"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
        ));
    }

    if config.admin.enabled {
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new("admin.bind_address", "is not a socket address"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;

    fn backend(id: &str, address: &str) -> BackendConfig {
        BackendConfig {
            id: id.into(),
            address: address.into(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = RouterConfig::default();
        config.backends.push(backend("a", "http://127.0.0.1:8081"));
        config.backends.push(backend("a", "ftp://127.0.0.1:8082"));
        config.circuit.failure_threshold = 0;
        config.load.alpha = 0.0;
        config.retries.failure_statuses.push(999);

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"backends[1].id"));
        assert!(fields.contains(&"backends[1].address"));
        assert!(fields.contains(&"circuit.failure_threshold"));
        assert!(fields.contains(&"load.alpha"));
        assert!(fields.contains(&"retries.failure_statuses"));
    }

    #[test]
    fn test_degraded_threshold_below_trip() {
        let mut config = RouterConfig::default();
        config.circuit.degraded_threshold = Some(3);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "circuit.degraded_threshold");
    }
}
