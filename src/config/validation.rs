use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Broker host must not be empty")]
    EmptyBrokerHost,

    #[error("Broker port must not be 0")]
    InvalidBrokerPort,

    #[error("Broker heartbeat_interval must be positive")]
    InvalidHeartbeatInterval,

    #[error("number_of_workers must be between 1 and 65535, got {0}")]
    InvalidWorkerCount(u32),

    #[error("No backends enabled (enable services.cobalt and/or services.ytdl)")]
    NoBackendsEnabled,

    #[error("Cobalt api_url '{0}' must be an http(s) URL")]
    InvalidCobaltApiUrl(String),

    #[error("Ytdl bin must not be empty")]
    MissingYtdlBin,

    #[error("Ytdl timeout must be positive")]
    InvalidYtdlTimeout,

    #[error("Topology field '{0}' must not be empty")]
    EmptyTopologyName(&'static str),
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_broker(config)?;
    validate_worker(config)?;
    validate_services(config)?;
    validate_topology(config)?;
    Ok(())
}

fn validate_broker(config: &Config) -> Result<(), ValidationError> {
    if config.broker.host.trim().is_empty() {
        return Err(ValidationError::EmptyBrokerHost);
    }
    if config.broker.port == 0 {
        return Err(ValidationError::InvalidBrokerPort);
    }
    if config.broker.heartbeat_interval.is_zero() {
        return Err(ValidationError::InvalidHeartbeatInterval);
    }
    Ok(())
}

fn validate_worker(config: &Config) -> Result<(), ValidationError> {
    let count = config.worker.number_of_workers;
    if count == 0 || count > u32::from(u16::MAX) {
        return Err(ValidationError::InvalidWorkerCount(count));
    }
    Ok(())
}

fn validate_services(config: &Config) -> Result<(), ValidationError> {
    let services = &config.services;
    if !services.cobalt.enable && !services.ytdl.enable {
        return Err(ValidationError::NoBackendsEnabled);
    }

    if services.cobalt.enable {
        let api_url = &services.cobalt.api_url;
        let valid = url::Url::parse(api_url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !valid {
            return Err(ValidationError::InvalidCobaltApiUrl(api_url.clone()));
        }
    }

    if services.ytdl.enable {
        if services.ytdl.bin.as_os_str().is_empty() {
            return Err(ValidationError::MissingYtdlBin);
        }
        if services.ytdl.timeout.is_zero() {
            return Err(ValidationError::InvalidYtdlTimeout);
        }
    }

    Ok(())
}

fn validate_topology(config: &Config) -> Result<(), ValidationError> {
    let topology = &config.topology;
    let fields = [
        ("event_exchange", &topology.event_exchange),
        ("success_routing_key", &topology.success_routing_key),
        ("queue_exchange", &topology.queue_exchange),
        ("cobalt_queue", &topology.cobalt_queue),
        ("cobalt_routing_key", &topology.cobalt_routing_key),
        ("ytdl_queue", &topology.ytdl_queue),
        ("ytdl_routing_key", &topology.ytdl_routing_key),
    ];

    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyTopologyName(name));
        }
    }

    Ok(())
}
