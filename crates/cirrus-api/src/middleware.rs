use std::net::SocketAddr;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::cookie::CookieJar;

use cirrus_core::CoreError;

use crate::AppState;
use crate::error::ApiError;

/// Session cookie name. HTTP-only; the token never touches response bodies.
pub const SESSION_COOKIE: &str = "sessionId";

/// Account resolved from a valid session, injected as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
}

/// Missing cookie, unknown token and expired token all produce the same
/// Unauthorized — callers cannot distinguish them.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let Some(account) = state.auth.account_for_session(&token)? else {
        return Err(ApiError(CoreError::Unauthorized));
    };

    req.extensions_mut().insert(CurrentAccount {
        id: account.id,
        username: account.username,
        name: account.name,
        email: account.email,
    });
    Ok(next.run(req).await)
}

/// Client address for the attempt ledger: the nearest proxy hop wins, the
/// socket peer is the fallback.
pub fn client_ip(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

pub fn user_agent(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_takes_precedence() {
        let addr: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, &addr), "127.0.0.1");

        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, &addr), "203.0.113.7");
    }
}
