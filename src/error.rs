use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::models::AdStatus;
use crate::repo::RepoError;
use crate::rules::ValidationError;
use crate::storage::FileStoreError;

/// Failure kinds of the ad lifecycle engine.
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("invalid content: {0}")]
    InvalidContent(#[from] ValidationError),
    #[error("access denied")]
    AccessDenied,
    #[error("ad not found")]
    AdNotFound,
    #[error("attachment not found")]
    AttachmentNotFound,
    #[error("user does not have any ads")]
    NoAdsForUser,
    #[error("no ads found")]
    NoAds,
    #[error("file type not allowed for upload")]
    FileNotAllowed,
    #[error("attachment already exists")]
    DuplicateAttachment,
    #[error("ad is {from}, only pending ads can be moderated")]
    InvalidTransition { from: AdStatus },
    #[error("ad was modified concurrently")]
    Conflict,
    #[error("storage failure: {0}")]
    Storage(#[source] RepoError),
    #[error("file storage failure: {0}")]
    FileStore(#[source] FileStoreError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("unauthorized")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("payload too large")] PayloadTooLarge,
    #[error("internal error")] Internal,
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::InvalidContent(_) | ServiceError::FileNotAllowed => ApiError::BadRequest(e.to_string()),
            ServiceError::AccessDenied => ApiError::Forbidden,
            ServiceError::AdNotFound
            | ServiceError::AttachmentNotFound
            | ServiceError::NoAdsForUser
            | ServiceError::NoAds => ApiError::NotFound(e.to_string()),
            ServiceError::DuplicateAttachment
            | ServiceError::InvalidTransition { .. }
            | ServiceError::Conflict => ApiError::Conflict(e.to_string()),
            // cause already logged where it was detected
            ServiceError::Storage(_) | ServiceError::FileStore(_) => ApiError::Internal,
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
