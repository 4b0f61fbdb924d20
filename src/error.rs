//! Error type shared by every pipeline stage.
//!
//! Each failure carries the process exit code it maps to:
//!
//! - `2`: configuration, filesystem or input parsing
//! - `3`: not enough data for the requested operation
//! - `4`: external services, numeric failures, rendering

/// Configuration / filesystem / parse failures.
pub const EXIT_INPUT: u8 = 2;
/// Empty sources, too few rows for the fold layout, empty plot windows.
pub const EXIT_INSUFFICIENT: u8 = 3;
/// Download, numeric and rendering failures.
pub const EXIT_EXTERNAL: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::new(EXIT_INPUT, message)
    }

    pub fn insufficient(message: impl Into<String>) -> Self {
        Self::new(EXIT_INSUFFICIENT, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(EXIT_EXTERNAL, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_map_to_exit_codes() {
        assert_eq!(AppError::input("x").exit_code(), 2);
        assert_eq!(AppError::insufficient("x").exit_code(), 3);
        assert_eq!(AppError::external("x").exit_code(), 4);
        assert_eq!(AppError::external("boom").to_string(), "boom");
    }
}
