use crate::error::Result;
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tinylink_session::SESSION_COOKIE;

/// Session token presented by the client, with any surrounding quotes removed.
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value_trimmed().to_owned())
}

/// The `Set-Cookie` entry handing a freshly minted token to the client.
pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token)).path("/").build()
}

/// Resolves the caller's identity and makes it available to handlers as
/// `Extension<UserId>`. A freshly minted identity is returned in `Set-Cookie`.
pub async fn session_middleware(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token(&jar);
    let session = state.sessions().resolve(token.as_deref()).await?;

    request.extensions_mut().insert(session.user_id.clone());
    let response = next.run(request).await;

    match session.issued_token {
        Some(token) => Ok((CookieJar::new().add(session_cookie(token)), response).into_response()),
        None => Ok(response),
    }
}
