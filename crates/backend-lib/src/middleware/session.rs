// crates/backend-lib/src/middleware/session.rs

//! Cookie session authentication.
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::cookies::{clear_session_cookie, intended_uri_cookie, SESSION_COOKIE_NAME};
use crate::error::{AppError, CryptoError};
use crate::AppState;

/// Identity resolved from the session cookie, available to handlers as an
/// `Extension<SessionContext>`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
}

/// Require a live cookie session.
///
/// * no cookie: remember the target and redirect to the login page
/// * undecryptable cookie: 401
/// * KV failure: 500, never treated as a missing session
/// * expired session: clear the cookie, remember the target, redirect
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let login_path = &state.settings.session.login_path;

    let Some(token) = jar.get(SESSION_COOKIE_NAME).map(|c| c.value().to_string()) else {
        let jar = jar.add(intended_uri_cookie(request.uri()));
        let target = format!("{login_path}?endpoint=protected");
        return Ok((jar, Redirect::to(&target)).into_response());
    };

    let sessions = &state.sessions;
    let plaintext = sessions.cipher().decode_decrypt(&token)?;
    let session_id = String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)?;

    let Some(user_id) = sessions.validate_session(&session_id).await? else {
        tracing::debug!("session expired or unknown");
        let jar = jar
            .add(clear_session_cookie())
            .add(intended_uri_cookie(request.uri()));
        let target = format!("{login_path}?session=expired");
        return Ok((jar, Redirect::to(&target)).into_response());
    };

    sessions.renew_session(&session_id, &user_id, true).await;

    request.extensions_mut().insert(SessionContext {
        session_id,
        user_id,
    });
    Ok(next.run(request).await)
}
