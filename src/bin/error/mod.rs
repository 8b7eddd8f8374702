use std::error::Error;
use std::fmt;
use tocsin::AlarmError;

#[derive(Debug)]
pub enum CliError {
    NoCommand,
    UnknownCommand(String),
    ParseError { field: String, message: String },
    ConfigError(Vec<String>),
    ServiceError(AlarmError),
    IoError(std::io::Error),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NoCommand => write!(f, "No command specified"),
            CliError::UnknownCommand(cmd) => write!(f, "Unknown command: {}", cmd),
            CliError::ParseError { field, message } => {
                write!(f, "Parse error for {}: {}", field, message)
            }
            CliError::ConfigError(errors) => {
                write!(f, "Invalid configuration:")?;
                for error in errors {
                    write!(f, "\n  - {}", error)?;
                }
                Ok(())
            }
            CliError::ServiceError(e) => write!(f, "{}", e),
            CliError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::IoError(err)
    }
}

impl From<AlarmError> for CliError {
    fn from(err: AlarmError) -> Self {
        CliError::ServiceError(err)
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_lists_every_problem() {
        let error = CliError::ConfigError(vec!["first".to_string(), "second".to_string()]);
        assert_eq!(
            error.to_string(),
            "Invalid configuration:\n  - first\n  - second"
        );
    }
}
