use std::fmt;

use serde::Serialize;
use ts_rs::TS;

use crate::import::ImportError;
use crate::project::ProjectError;
use crate::store::StoreError;

/// Structured error type surfaced to the host and the CLI. The host matches
/// on `code` to pick the right UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum AppError {
    /// The input does not follow its format, or carries no usable data.
    FormatError { message: String },
    /// A commit failed; the patch is unchanged.
    PersistenceError { message: String },
    IoError { message: String },
    NotFound { what: String },
    ValidationError { message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::FormatError { message } => write!(f, "Format error: {message}"),
            AppError::PersistenceError { message } => {
                write!(f, "Failed to save patch: {message}")
            }
            AppError::IoError { message } => write!(f, "I/O error: {message}"),
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::ValidationError { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<ProjectError> for AppError {
    fn from(e: ProjectError) -> Self {
        match e {
            ProjectError::Io(io_err) => AppError::IoError {
                message: io_err.to_string(),
            },
            ProjectError::Json(json_err) => AppError::ValidationError {
                message: json_err.to_string(),
            },
            ProjectError::InvalidSnapshot(msg) => AppError::ValidationError { message: msg },
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownInstrument(id) => AppError::NotFound {
                what: format!("Instrument {id}"),
            },
            other => AppError::PersistenceError {
                message: other.to_string(),
            },
        }
    }
}

impl From<ImportError> for AppError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::Format(message) => AppError::FormatError { message },
            ImportError::Io(io_err) => io_err.into(),
            ImportError::Persistence(store_err) => AppError::PersistenceError {
                message: store_err.to_string(),
            },
        }
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::ValidationError { message: s }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::InstrumentId;

    #[test]
    fn import_errors_keep_their_kind() {
        let format: AppError = ImportError::Format("no header".into()).into();
        assert_eq!(
            format,
            AppError::FormatError {
                message: "no header".into()
            }
        );

        let persistence: AppError =
            ImportError::Persistence(StoreError::Rejected("disk full".into())).into();
        assert!(matches!(persistence, AppError::PersistenceError { .. }));

        let missing: AppError = StoreError::UnknownInstrument(InstrumentId(9)).into();
        assert_eq!(missing.to_string(), "Instrument 9 not found");
    }

    #[test]
    fn serializes_with_code_tag() {
        let err = AppError::NotFound {
            what: "Fixture type X".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "NotFound");
        assert_eq!(json["detail"]["what"], "Fixture type X");
    }
}
