use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use settlement_engine::{AuthApiError, LedgerQueryError, SettlementError, WalletLedgerError, WithdrawalError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Auth token invalid or not provided")]
    CouldNotDeserializeAuthToken,
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Authentication Error. {0}")]
    AuthenticationError(#[from] AuthError),
    #[error("Could not serialize access token. {0}")]
    CouldNotSerializeAccessToken(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("The request conflicts with the current state of the ledger. {0}")]
    StateConflict(String),
    #[error("There are not enough funds to carry out the request. {0}")]
    InsufficientFunds(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::CouldNotDeserializeAuthToken => StatusCode::UNAUTHORIZED,
            Self::AuthenticationError(e) => match e {
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::ValidationError(_) => StatusCode::UNAUTHORIZED,
                AuthError::PoorlyFormattedToken(_) => StatusCode::BAD_REQUEST,
                AuthError::Forbidden => StatusCode::FORBIDDEN,
                AuthError::ForbiddenPeer => StatusCode::FORBIDDEN,
                AuthError::AccountNotFound => StatusCode::FORBIDDEN,
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CouldNotSerializeAccessToken(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::StateConflict(_) => StatusCode::CONFLICT,
            Self::InsufficientFunds(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("No access token was provided.")]
    MissingToken,
    #[error("The access token has expired.")]
    TokenExpired,
    #[error("Access token is invalid. {0}")]
    ValidationError(String),
    #[error("Access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Insufficient permissions.")]
    Forbidden,
    #[error("This host is not authorised to use this endpoint.")]
    ForbiddenPeer,
    #[error("Admin account not found.")]
    AccountNotFound,
}

impl From<WalletLedgerError> for ServerError {
    fn from(e: WalletLedgerError) -> Self {
        match e {
            WalletLedgerError::WalletNotFound(_) => Self::NoRecordFound(e.to_string()),
            WalletLedgerError::InsufficientFunds { .. } => Self::InsufficientFunds(e.to_string()),
            WalletLedgerError::ValidationError(s) => Self::InvalidRequestBody(s),
            WalletLedgerError::ConcurrencyConflict(s) => Self::StateConflict(s),
            WalletLedgerError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<SettlementError> for ServerError {
    fn from(e: SettlementError) -> Self {
        match e {
            SettlementError::OrderNotFound(_)
            | SettlementError::SubOrderNotFound(_)
            | SettlementError::ReleaseNotFound(_)
            | SettlementError::ReturnNotFound(_)
            | SettlementError::DisputeNotFound(_) => Self::NoRecordFound(e.to_string()),
            SettlementError::WalletError(inner) => Self::from(inner),
            SettlementError::InvalidOrder(inner) => Self::InvalidRequestBody(inner.to_string()),
            SettlementError::ValidationError(s) => Self::InvalidRequestBody(s),
            SettlementError::InvalidStateTransition { .. } => Self::StateConflict(e.to_string()),
            SettlementError::ConcurrencyConflict(s) => Self::StateConflict(s),
            SettlementError::PolicyNotFound(_) => Self::BackendError(e.to_string()),
            SettlementError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<WithdrawalError> for ServerError {
    fn from(e: WithdrawalError) -> Self {
        match e {
            WithdrawalError::RequestNotFound(_) => Self::NoRecordFound(e.to_string()),
            WithdrawalError::WalletError(inner) => Self::from(inner),
            WithdrawalError::ValidationError(s) => Self::InvalidRequestBody(s),
            WithdrawalError::InvalidStateTransition { .. } => Self::StateConflict(e.to_string()),
            WithdrawalError::ConcurrencyConflict(s) => Self::StateConflict(s),
            WithdrawalError::DatabaseError(s) => Self::BackendError(s),
        }
    }
}

impl From<LedgerQueryError> for ServerError {
    fn from(e: LedgerQueryError) -> Self {
        Self::BackendError(e.to_string())
    }
}

impl From<AuthApiError> for ServerError {
    fn from(e: AuthApiError) -> Self {
        match e {
            AuthApiError::UnknownAdmin(_) => Self::AuthenticationError(AuthError::AccountNotFound),
            AuthApiError::InvalidApiKey => Self::AuthenticationError(AuthError::ValidationError(e.to_string())),
            AuthApiError::AdminAlreadyExists(_) => Self::InvalidRequestBody(e.to_string()),
            AuthApiError::ValidationError(s) => Self::InvalidRequestBody(s),
            AuthApiError::RoleNotFound(_) => {
                Self::BackendError(format!("Role definitions in Database and Code have diverged. {e}"))
            },
            AuthApiError::DatabaseError(e) => Self::BackendError(format!("Database error: {e}")),
        }
    }
}
