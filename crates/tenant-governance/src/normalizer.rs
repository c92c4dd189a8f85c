//! Exception Normalization
//!
//! Backstop for the whole pipeline. Any residual fault (governance
//! failure, downstream error, panic) becomes one [`ErrorEnvelope`] with a
//! fresh correlation id and one structured log entry.

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Level;
use uuid::Uuid;

use crate::config::Environment;
use crate::context::TenantContext;
use crate::error::{DownstreamError, ErrorKind, GovernanceError};
use crate::pipeline::Rejection;

/// Marker logged in place of tenant and user for callers without context
pub const ANONYMOUS: &str = "anonymous";

const INTERNAL_MESSAGE: &str = "An unexpected error occurred";

/// Uniform error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Wire code
    pub code: String,
    /// Caller-facing message
    pub message: String,
    /// Fresh per failure
    pub correlation_id: String,
    /// Diagnostic trace; development only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorEnvelope {
    /// Envelope for `kind` with a new correlation id
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code: kind.code().to_string(),
            message: message.into(),
            correlation_id: Uuid::new_v4().to_string(),
            details: None,
        }
    }
}

/// A residual failure reaching the normalizer
#[derive(Debug)]
pub enum Fault {
    /// Raised by the governance stages
    Governance(GovernanceError),
    /// Returned by the downstream handler
    Downstream(DownstreamError),
    /// Handler panicked; carries the panic payload text
    Panic(String),
}

impl Fault {
    /// Kind used for status and code
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Governance(e) => e.kind(),
            Self::Downstream(e) => e.kind(),
            Self::Panic(_) => ErrorKind::Internal,
        }
    }

    /// Message returned to the caller
    fn public_message(&self) -> String {
        match self {
            _ if self.kind() == ErrorKind::Internal => INTERNAL_MESSAGE.to_string(),
            Self::Governance(e) => e.to_string(),
            Self::Downstream(e) => e.to_string(),
            Self::Panic(_) => INTERNAL_MESSAGE.to_string(),
        }
    }

    fn log_message(&self) -> String {
        match self {
            Self::Governance(e) => format!("governance failure: {e}"),
            Self::Downstream(e) => format!("downstream failure: {e}"),
            Self::Panic(_) => "downstream handler panicked".to_string(),
        }
    }

    /// Full diagnostic, always logged
    fn diagnostic(&self) -> String {
        match self {
            Self::Governance(e) => format!("{e:?}"),
            Self::Downstream(DownstreamError::Unclassified { diagnostic, .. }) => diagnostic.clone(),
            Self::Downstream(e) => format!("{e:?}"),
            Self::Panic(payload) => format!("panic: {payload}"),
        }
    }
}

impl From<GovernanceError> for Fault {
    fn from(err: GovernanceError) -> Self {
        Self::Governance(err)
    }
}

impl From<DownstreamError> for Fault {
    fn from(err: DownstreamError) -> Self {
        Self::Downstream(err)
    }
}

/// Request attributes attached to every log entry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogScope {
    tenant_id: Option<String>,
    user_id: Option<String>,
    path: String,
}

impl LogScope {
    /// Scope for a caller not yet identified
    pub fn anonymous(path: &str) -> Self {
        Self {
            tenant_id: None,
            user_id: None,
            path: path.to_string(),
        }
    }

    /// Record the caller once the context is known
    pub fn identify(&mut self, ctx: &TenantContext) {
        self.tenant_id = Some(ctx.tenant_id().to_string());
        self.user_id = Some(ctx.user_id().to_string());
    }

    /// Tenant id, or the anonymous marker
    pub fn tenant_id(&self) -> &str {
        self.tenant_id.as_deref().unwrap_or(ANONYMOUS)
    }

    /// User id, or the anonymous marker
    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS)
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Structured fields of one governance log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFields<'a> {
    /// Id echoed in the envelope
    pub correlation_id: &'a str,
    /// Tenant, or the anonymous marker before extraction
    pub tenant_id: &'a str,
    /// User, or the anonymous marker before extraction
    pub user_id: &'a str,
    /// Request path
    pub path: &'a str,
    /// Wire code
    pub code: &'a str,
    /// HTTP status
    pub status: u16,
    /// Full internal detail, never sent to production callers
    pub details: &'a str,
}

/// Server-side log sink
pub trait GovernanceLog: Send + Sync {
    /// Record one entry
    fn record(&self, level: Level, message: &str, fields: &LogFields<'_>);
}

/// [`GovernanceLog`] backed by `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

macro_rules! governance_event {
    ($level:expr, $message:expr, $f:expr) => {
        tracing::event!(
            $level,
            correlation_id = $f.correlation_id,
            tenant_id = $f.tenant_id,
            user_id = $f.user_id,
            path = $f.path,
            code = $f.code,
            status = $f.status,
            details = $f.details,
            "{}",
            $message
        )
    };
}

impl GovernanceLog for TracingLog {
    fn record(&self, level: Level, message: &str, fields: &LogFields<'_>) {
        // `tracing::event!` needs a constant level.
        match level {
            Level::ERROR => governance_event!(Level::ERROR, message, fields),
            Level::WARN => governance_event!(Level::WARN, message, fields),
            Level::INFO => governance_event!(Level::INFO, message, fields),
            Level::DEBUG => governance_event!(Level::DEBUG, message, fields),
            _ => governance_event!(Level::TRACE, message, fields),
        }
    }
}

/// Converts residual faults into envelopes
#[derive(Clone)]
pub struct ExceptionNormalizer {
    environment: Environment,
    log: Arc<dyn GovernanceLog>,
}

impl ExceptionNormalizer {
    /// Create normalizer logging through `tracing`
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            log: Arc::new(TracingLog),
        }
    }

    /// Replace the log sink
    pub fn with_log(mut self, log: Arc<dyn GovernanceLog>) -> Self {
        self.log = log;
        self
    }

    /// Whether details are returned to callers
    pub fn exposes_details(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Map `fault` to its terminal response and log it
    pub fn normalize(&self, fault: &Fault, scope: &LogScope) -> Rejection {
        let kind = fault.kind();
        let status = kind.status();
        let diagnostic = fault.diagnostic();

        let mut envelope = ErrorEnvelope::new(kind, fault.public_message());

        let level = if status >= 500 { Level::ERROR } else { Level::WARN };
        self.log.record(
            level,
            &fault.log_message(),
            &LogFields {
                correlation_id: &envelope.correlation_id,
                tenant_id: scope.tenant_id(),
                user_id: scope.user_id(),
                path: scope.path(),
                code: kind.code(),
                status,
                details: &diagnostic,
            },
        );

        if self.exposes_details() {
            envelope.details = Some(diagnostic);
        }

        Rejection {
            status,
            envelope,
            retry_after: None,
        }
    }

    /// Run `fut`, turning a panic into [`Fault::Panic`]
    pub async fn catch<F, T>(&self, fut: F) -> Result<T, Fault>
    where
        F: Future<Output = Result<T, Fault>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Fault::Panic(panic_message(payload.as_ref()))),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
