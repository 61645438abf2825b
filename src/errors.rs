use serde::Serialize;

/// All analyzer errors, categorized by domain.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Import ──
    #[error("Unrecognized report: {0}")]
    Parse(String),

    #[error("No valid data in report: {0}")]
    NoValidData(String),

    #[error("Unsupported data format: {0}")]
    UnsupportedFormat(String),

    #[error("Row {row}: {message}")]
    RowParse { row: usize, message: String },

    #[error("File too large: {size} bytes exceeds limit of {limit}")]
    FileTooLarge { size: usize, limit: usize },

    #[error("Too many rows: {count} exceeds limit of {limit}")]
    TooManyRows { count: usize, limit: usize },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read file: {0}")]
    FileRead(String),

    #[error("Failed to write file: {0}")]
    FileWrite(String),

    // ── Analysis ──
    #[error("Invalid input: {0}")]
    Validation(String),

    // ── Serialization ──
    #[error("Serialization error: {0}")]
    Serialization(String),

    // ── General ──
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Coarse category shown to the user next to the retry prompt.
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Parse(_)
            | AppError::UnsupportedFormat(_)
            | AppError::RowParse { .. }
            | AppError::FileTooLarge { .. }
            | AppError::TooManyRows { .. } => "parse",
            AppError::NoValidData(_) => "no_valid_data",
            AppError::Validation(_) => "validation",
            AppError::FileNotFound(_) | AppError::FileRead(_) | AppError::FileWrite(_) => "io",
            AppError::Serialization(_) | AppError::Internal(_) => "internal",
        }
    }
}

/// Serializable error response for the UI layer.
#[derive(Debug, Serialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub category: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::Parse(_) => "PARSE_ERROR",
            AppError::NoValidData(_) => "NO_VALID_DATA",
            AppError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            AppError::RowParse { .. } => "ROW_PARSE_ERROR",
            AppError::FileTooLarge { .. } => "FILE_TOO_LARGE",
            AppError::TooManyRows { .. } => "TOO_MANY_ROWS",
            AppError::FileNotFound(_) => "FILE_NOT_FOUND",
            AppError::FileRead(_) => "FILE_READ",
            AppError::FileWrite(_) => "FILE_WRITE",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION",
            AppError::Internal(_) => "INTERNAL",
        };
        ErrorResponse {
            code: code.to_string(),
            category: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let response = ErrorResponse::from(self);
        response.serialize(serializer)
    }
}

// ── Conversions from external errors ──

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => AppError::FileNotFound(err.to_string()),
            _ => AppError::FileRead(err.to_string()),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        AppError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_empty_are_distinct_categories() {
        let parse = AppError::Parse("not a report".into());
        let empty = AppError::NoValidData("0 rows".into());
        assert_eq!(parse.category(), "parse");
        assert_eq!(empty.category(), "no_valid_data");
    }

    #[test]
    fn test_error_response_serialization() {
        let err = AppError::Validation("initial balance must be positive".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["category"], "validation");
        assert!(json["message"].as_str().unwrap().contains("positive"));
    }

    #[test]
    fn test_io_not_found_maps_to_file_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.html");
        assert!(matches!(AppError::from(io), AppError::FileNotFound(_)));
    }
}
