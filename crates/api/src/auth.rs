//! Static API key middleware

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::{error::ApiError, state::AppState};

const API_KEY_HEADER: &str = "x-api-key";

/// Reject the request unless it carries the configured API key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if !constant_time_compare(provided, &state.config.api_key) {
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        // Dummy comparison so differing lengths still do constant-time work
        let dummy = vec![0u8; a.len()];
        let _ = a.as_bytes().ct_eq(&dummy);
        return false;
    }

    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_keys_match() {
        assert!(constant_time_compare("sk_test_abc", "sk_test_abc"));
    }

    #[test]
    fn different_keys_do_not_match() {
        assert!(!constant_time_compare("sk_test_abc", "sk_test_abd"));
        assert!(!constant_time_compare("short", "a-much-longer-key"));
        assert!(!constant_time_compare("", "sk_test_abc"));
    }
}
