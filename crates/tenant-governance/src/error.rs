//! Error taxonomy for the governance pipeline

use thiserror::Error;

/// Closed set of error kinds a caller can observe.
///
/// Every kind maps to exactly one HTTP status and one wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or unusable credentials / tenant claim
    AuthError,
    /// Caller has no membership in the tenant
    UserNotFound,
    /// Caller's role does not satisfy the route policy
    InsufficientPermissions,
    /// Submitted role name outside the closed role set
    InvalidRole,
    /// Caller's stored role is outside the closed role set; shares the
    /// `INVALID_ROLE` code but denies with 403
    UnrecognizedRole,
    /// Caller tried to delete their own membership
    CannotRemoveSelf,
    /// Caller tried to change their own role
    CannotModifySelf,
    /// Tenant quota exhausted for the current window
    RateLimitExceeded,
    /// Downstream access-denied / unauthorized
    AccessDenied,
    /// Operation invalid because of a resource or plan limit
    PlanLimitExceeded,
    /// Resource not found
    NotFound,
    /// Missing or invalid argument
    InvalidInput,
    /// Feature not yet available
    NotImplemented,
    /// Operation timed out
    Timeout,
    /// Anything unclassified
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind
    pub fn status(&self) -> u16 {
        match self {
            Self::AuthError => 401,
            Self::UserNotFound
            | Self::UnrecognizedRole
            | Self::InsufficientPermissions
            | Self::AccessDenied
            | Self::PlanLimitExceeded => 403,
            Self::InvalidRole
            | Self::CannotRemoveSelf
            | Self::CannotModifySelf
            | Self::InvalidInput => 400,
            Self::NotFound => 404,
            Self::Timeout => 408,
            Self::RateLimitExceeded => 429,
            Self::NotImplemented => 501,
            Self::Internal => 500,
        }
    }

    /// Wire code carried in the error envelope
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthError => "AUTH_ERROR",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            Self::InvalidRole | Self::UnrecognizedRole => "INVALID_ROLE",
            Self::CannotRemoveSelf => "CANNOT_REMOVE_SELF",
            Self::CannotModifySelf => "CANNOT_MODIFY_SELF",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::PlanLimitExceeded => "PLAN_LIMIT_EXCEEDED",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Collaborator (role/tier store) failures
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Backing store unreachable or failed
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Stored role value is outside the closed role set
    #[error("stored role is not recognized: {0:?}")]
    InvalidRole(String),

    /// No record for the tenant
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
}

/// Errors raised by the governance components themselves
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// Authentication / claim extraction failed
    #[error("{0}")]
    Auth(String),

    /// Collaborator lookup failed
    #[error("collaborator lookup failed: {0}")]
    Store(#[from] StoreError),

    /// Configuration rejected
    #[error("config error: {0}")]
    Config(String),
}

impl GovernanceError {
    /// Kind used when this error reaches the normalizer
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(_) => ErrorKind::AuthError,
            Self::Store(_) | Self::Config(_) => ErrorKind::Internal,
        }
    }
}

/// Result type for governance operations
pub type GovernanceResult<T> = Result<T, GovernanceError>;

/// Failures a downstream handler reports back through the pipeline.
///
/// Expected business conditions are explicit variants; anything else is
/// `Unclassified`.
#[derive(Debug, Clone, Error)]
pub enum DownstreamError {
    /// Access denied / unauthorized
    #[error("{0}")]
    AccessDenied(String),

    /// Resource or plan limit reached
    #[error("{0}")]
    PlanLimitExceeded(String),

    /// Resource not found
    #[error("{0}")]
    NotFound(String),

    /// Required argument missing
    #[error("missing required argument: {0}")]
    MissingArgument(String),

    /// Argument value invalid
    #[error("{0}")]
    InvalidArgument(String),

    /// Feature not yet available
    #[error("{0}")]
    NotImplemented(String),

    /// Operation timed out
    #[error("{0}")]
    Timeout(String),

    /// Unclassified fault, with the full diagnostic chain
    #[error("{message}")]
    Unclassified {
        /// Top-level message
        message: String,
        /// Debug rendering including the source chain
        diagnostic: String,
    },
}

impl DownstreamError {
    /// Kind used by the normalizer's mapping table
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::PlanLimitExceeded(_) => ErrorKind::PlanLimitExceeded,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MissingArgument(_) | Self::InvalidArgument(_) => ErrorKind::InvalidInput,
            Self::NotImplemented(_) => ErrorKind::NotImplemented,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Unclassified { .. } => ErrorKind::Internal,
        }
    }
}

impl From<anyhow::Error> for DownstreamError {
    fn from(err: anyhow::Error) -> Self {
        Self::Unclassified {
            message: err.to_string(),
            diagnostic: format!("{err:?}"),
        }
    }
}

impl From<GovernanceError> for DownstreamError {
    fn from(err: GovernanceError) -> Self {
        Self::Unclassified {
            message: err.to_string(),
            diagnostic: format!("{err:?}"),
        }
    }
}
