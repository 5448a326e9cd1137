use ragmeter_core::config::OutputType;
use secrecy::{ExposeSecret, SecretString};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no API key found: pass --api-key or set {0}")]
    NoApiKey(String),

    #[error("unknown output type '{0}', expected json, csv or html")]
    UnknownOutputType(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Judge API key, in order of precedence:
/// - CLI argument (by clap)
/// - Environment variable (by clap)
/// - Dot-env file (by dotenv, loaded before clap parses)
/// - The variable named by `judge.api_key_env` in the config file
pub fn resolve_api_key(cli_key: Option<String>, api_key_env: &str) -> ConfigResult<SecretString> {
    if let Some(key) = cli_key {
        return Ok(SecretString::new(key.into_boxed_str()));
    }
    match std::env::var(api_key_env) {
        Ok(key) if !key.is_empty() => Ok(SecretString::new(key.into_boxed_str())),
        _ => Err(ConfigError::NoApiKey(api_key_env.to_string())),
    }
}

pub fn partial_show_secret(s: &SecretString) -> String {
    // show last 4 characters
    let chars = s.expose_secret().chars();
    if chars.clone().count() <= 4 {
        "**************************".to_string()
    } else {
        let last_4 = chars.rev().take(4).collect::<String>();
        format!(
            "**********************{}",
            last_4.chars().rev().collect::<String>()
        )
    }
}

pub fn parse_output_type(value: &str) -> ConfigResult<OutputType> {
    match value {
        "json" => Ok(OutputType::Json),
        "csv" => Ok(OutputType::Csv),
        "html" => Ok(OutputType::Html),
        other => Err(ConfigError::UnknownOutputType(other.to_string())),
    }
}
