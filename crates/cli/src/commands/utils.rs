use marketgate_core::config::AppConfig;
use std::{fmt, path::Path};

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Io(String),
    Upstream(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Upstream(msg) => write!(f, "Upstream error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Loads `file` with the same layering as the server (env and deployment variables on top).
///
/// A missing file is not an error: defaults plus environment still apply.
pub fn load_config(file: &str) -> CliResult<AppConfig> {
    if !Path::new(file).exists() {
        print_info(&format!("{file} not found, using defaults and environment"));
    }
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}
