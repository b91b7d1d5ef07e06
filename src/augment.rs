use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::CredentialProvider;

/// Sets `Authorization: Bearer <credential>` when the provider has a credential.
///
/// Headers are left untouched when there is no credential or when it is not a
/// valid header value. Returns whether the header was set.
pub(crate) fn apply_credential(headers: &mut HeaderMap, provider: &dyn CredentialProvider) -> bool {
    let Some(credential) = provider.credential() else {
        return false;
    };

    match HeaderValue::from_str(&bearer_value(&credential)) {
        Ok(mut value) => {
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
            true
        }
        Err(_) => {
            #[cfg(feature = "tracing")]
            tracing::warn!("credential is not a valid header value, sending request without it");
            false
        }
    }
}

/// Stored session tokens are bare; some login flows persist `Bearer <jwt>`.
fn bearer_value(credential: &str) -> String {
    let credential = credential.trim();
    let token = match credential.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim_start(),
        _ => credential,
    };
    format!("Bearer {token}")
}
