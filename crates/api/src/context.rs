use axum::http::HeaderMap;

use gallery_cart::IdentityContext;
use gallery_core::{DomainError, SessionId, UserId};

/// Opaque visitor session id, set by the session layer on every request.
pub const SESSION_HEADER: &str = "x-session-id";
/// Authenticated user id (UUID), present once the visitor has logged in.
pub const USER_HEADER: &str = "x-user-id";

/// Read the caller's identity from the request headers.
///
/// The session header is required; the user header is optional but must be
/// a valid id when present.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<IdentityContext, DomainError> {
    let session = header_str(headers, SESSION_HEADER)?
        .ok_or_else(|| DomainError::validation(format!("{SESSION_HEADER} header is required")))?;
    let session_id = SessionId::new(session)?;

    match header_str(headers, USER_HEADER)? {
        Some(user) if !user.trim().is_empty() => {
            let user_id: UserId = user.trim().parse()?;
            Ok(IdentityContext::authenticated(session_id, user_id))
        }
        _ => Ok(IdentityContext::guest(session_id)),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, DomainError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| DomainError::invalid_id(format!("{name} header is not valid text")))
        })
        .transpose()
}
