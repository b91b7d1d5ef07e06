//! Maps raw failure signals to stable, user-presentable messages.

use crate::ErrorKind;

const NETWORK_MESSAGE: &str = "Impossible de contacter le serveur. Vérifiez votre connexion.";

/// What the transport observed when an attempt failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureSignal {
    /// No response was received.
    NoResponse { reason: String },
    /// A non-success response, with the server-supplied `message` field if any.
    Status { status: u16, message: Option<String> },
}

impl FailureSignal {
    pub fn no_response(reason: impl Into<String>) -> Self {
        Self::NoResponse {
            reason: reason.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Status {
            status,
            message: None,
        }
    }

    pub fn status_with_message(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: Some(message.into()),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NoResponse { .. } => None,
            Self::Status { status, .. } => Some(*status),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Classification {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
}

/// Classifies a failure signal.
///
/// A non-empty server message is used verbatim; otherwise the message comes
/// from a fixed table keyed by status code.
pub fn classify(signal: &FailureSignal) -> Classification {
    match signal {
        FailureSignal::NoResponse { .. } => Classification {
            kind: ErrorKind::Network,
            message: NETWORK_MESSAGE.to_owned(),
            status: None,
        },
        FailureSignal::Status { status, message } => {
            let message = message
                .as_deref()
                .filter(|text| !text.trim().is_empty())
                .map(str::to_owned)
                .unwrap_or_else(|| status_message(*status));
            Classification {
                kind: kind_for_status(*status),
                message,
                status: Some(*status),
            }
        }
    }
}

pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 => ErrorKind::Auth,
        408 => ErrorKind::RequestTimeout,
        429 => ErrorKind::RateLimited,
        400..=499 => ErrorKind::Client,
        500..=599 => ErrorKind::Server,
        _ => ErrorKind::Unknown,
    }
}

fn status_message(status: u16) -> String {
    let message = match status {
        400 => "Requête invalide.",
        401 => "Session expirée. Veuillez vous reconnecter.",
        403 => "Accès refusé.",
        404 => "Ressource introuvable.",
        408 => "La requête a expiré. Veuillez réessayer.",
        429 => "Trop de requêtes. Veuillez patienter avant de réessayer.",
        500 => "Erreur serveur. Réessayez plus tard.",
        502..=504 => "Service temporairement indisponible.",
        other => return format!("Une erreur inattendue s'est produite (statut {other})."),
    };
    message.to_owned()
}

/// Extracts a non-empty `message` string from a JSON error body.
pub(crate) fn server_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_owned)
}
