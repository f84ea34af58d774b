use tabula_core::TabulaError;
use tabula_interchange::ExportError;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service-level errors with user-friendly messages
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Record store request failed: {0}")]
    Store(#[from] TabulaError),

    #[error("Preference storage failed: {0:#}")]
    Preferences(#[from] anyhow::Error),

    #[error("Workbook export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Workbook export is not configured")]
    ExportNotConfigured,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
