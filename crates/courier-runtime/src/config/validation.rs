//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{CourierConfig, LogOutput, LoggingConfig, PipelineConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &CourierConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_pipeline_config(&config.pipeline)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output = \"file\"",
        ));
    }

    if logging.max_files == 0 {
        return Err(ConfigError::validation(
            "logging.max_files must be greater than 0",
        ));
    }

    if logging.filters.keys().any(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(
            "logging.filters contains an empty target",
        ));
    }

    Ok(())
}

fn validate_pipeline_config(pipeline: &PipelineConfig) -> ConfigResult<()> {
    for (name, entry) in &pipeline.middleware {
        if name.trim().is_empty() {
            return Err(ConfigError::validation(
                "pipeline.middleware contains an empty middleware name",
            ));
        }

        // Overrides are shallow-merged into the registered configuration.
        if let Some(config) = entry.config.as_ref().filter(|c| !c.is_object()) {
            return Err(ConfigError::validation(format!(
                "pipeline.middleware.{name}.config must be a table, got {config}"
            )));
        }
    }

    Ok(())
}
