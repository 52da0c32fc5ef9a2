use super::{
    types::{AuthMethod, Config},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - API key present when the api_key auth method is selected
/// - External tool commands are not empty
/// - Job timing knobs are non-zero
/// - Reference part indices fall inside the separator's part count
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.auth.method == AuthMethod::ApiKey
        && config.auth.api_key.as_deref().is_none_or(str::is_empty)
    {
        return Err(invalid("auth.api_key must be set when method = \"api_key\""));
    }

    if config.jobs.poll_interval_ms == 0 {
        return Err(invalid("jobs.poll_interval_ms cannot be 0"));
    }
    if config.jobs.heartbeat_ticks == 0 {
        return Err(invalid("jobs.heartbeat_ticks cannot be 0"));
    }
    if config.jobs.upload_chunk_bytes == 0 {
        return Err(invalid("jobs.upload_chunk_bytes cannot be 0"));
    }

    if config.separation.command.is_empty() {
        return Err(invalid("separation.command cannot be empty"));
    }
    if config.separation.part_count == 0 {
        return Err(invalid("separation.part_count cannot be 0"));
    }
    if config.alignment.command.is_empty() {
        return Err(invalid("alignment.command cannot be empty"));
    }

    let parts = config.separation.part_count;
    if config.alignment.vocals_part >= parts || config.alignment.instrumental_part >= parts {
        return Err(ConfigError::ValidationError(format!(
            "alignment reference parts must be below separation.part_count ({})",
            parts
        )));
    }

    if !config.storage.serve_path.starts_with('/') {
        return Err(invalid("storage.serve_path must start with '/'"));
    }

    Ok(())
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::ValidationError(reason.to_string())
}
