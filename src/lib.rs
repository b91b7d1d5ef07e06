//! `dashboard-http` is the resilient async client through which the admin
//! dashboard talks to its backend.
//!
//! Every call goes through [`ApiClient`], which:
//! - attaches `Authorization: Bearer <token>` from a [`CredentialProvider`]
//!   before each attempt,
//! - retries network failures and transient statuses with exponential backoff
//!   (see [`RetryPolicy`]),
//! - turns terminal failures into an [`ErrorDescriptor`] with a user-facing
//!   message and publishes one [`ApiErrorEvent`] on the client's
//!   [`ErrorBroadcaster`].

mod augment;
mod classify;
mod client;
mod credentials;
mod error;
mod events;
mod options;
mod request;
mod retry;

pub use classify::{classify, Classification, FailureSignal};
pub use client::{ApiClient, API_BASE_PATH};
pub use credentials::{CredentialProvider, NoCredentials, StaticToken, TokenStore, AUTH_TOKEN_KEY};
pub use error::{ApiError, ErrorDescriptor, ErrorKind};
pub use events::{ApiErrorEvent, ErrorBroadcaster, SubscriptionId, API_ERROR_EVENT};
pub use options::{ClientOptions, RetryPolicy};
pub use request::{RequestDescriptor, IDEMPOTENCY_KEY_HEADER};
pub use retry::Attempt;
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
