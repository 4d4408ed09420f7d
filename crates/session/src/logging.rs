use crate::error::SessionError;
use crate::settings::LoggingConfig;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber. Call once, from the binary.
pub fn init_logging(config: &LoggingConfig) -> Result<(), SessionError> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| SessionError::Logging(format!("unknown log level {:?}", config.level)))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|err| SessionError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_level_is_rejected() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            json: false,
        };
        assert!(matches!(init_logging(&config), Err(SessionError::Logging(_))));
    }
}
