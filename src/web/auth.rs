use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use subtle::ConstantTimeEq;
use tracing::debug;

use super::AppState;

pub const REALM: &str = "surface_report";

/// Decode `Basic <base64(user:pass)>` into its two halves. The scheme
/// name is matched case-insensitively.
pub fn parse_basic(header: &str) -> Option<(String, String)> {
    let (scheme, encoded) = header.trim_start().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn matches(expected: &(String, String), given: &(String, String)) -> bool {
    let user_ok = expected.0.as_bytes().ct_eq(given.0.as_bytes());
    let pass_ok = expected.1.as_bytes().ct_eq(given.1.as_bytes());
    (user_ok & pass_ok).into()
}

fn challenge() -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, "authentication required").into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("Basic realm=\"{}\"", REALM)) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, value);
    }
    response
}

/// Reject requests that don't carry the configured Basic credentials.
pub async fn require_basic_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let given = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_basic);

    match given {
        Some(given) if matches(&state.credentials, &given) => next.run(request).await,
        Some(_) => {
            debug!("Rejected credentials for {}", request.uri().path());
            challenge()
        }
        None => challenge(),
    }
}
