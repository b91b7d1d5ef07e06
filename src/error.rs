use serde::Serialize;

/// User-facing category of a terminal failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No response was received (connection refused, DNS, timeout, ...).
    Network,
    /// 5xx response.
    Server,
    /// 429 response.
    RateLimited,
    /// 408 response.
    RequestTimeout,
    /// 401 response. Callers should send the user back through authentication.
    Auth,
    /// Any other 4xx response.
    Client,
    /// Status outside the ranges above.
    Unknown,
}

/// Terminal, user-presentable result of a failed call.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    /// Message suitable for display.
    pub message: String,
    /// HTTP status of the last attempt, `None` when no response was received.
    pub status: Option<u16>,
    /// Full URL of the request.
    pub url: String,
    /// Number of physical attempts made, including the first one.
    pub attempts: u32,
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The call failed terminally. A notification was broadcast for it.
    #[error("{}", .0.message)]
    Request(ErrorDescriptor),
    /// The call was cancelled before completing. No notification is broadcast.
    #[error("request to {url} cancelled after {attempts} attempt(s)")]
    Cancelled { url: String, attempts: u32 },
    /// The request descriptor could not be turned into an HTTP request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A successful response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns the terminal descriptor when the call failed at the transport level.
    pub fn descriptor(&self) -> Option<&ErrorDescriptor> {
        match self {
            Self::Request(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.descriptor().map(|descriptor| descriptor.kind)
    }

    pub fn status(&self) -> Option<u16> {
        self.descriptor().and_then(|descriptor| descriptor.status)
    }

    /// True for 401 failures, which should trigger re-authentication upstream.
    pub fn is_auth_error(&self) -> bool {
        self.kind() == Some(ErrorKind::Auth)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
