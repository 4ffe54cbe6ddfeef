// ============================
// crates/backend-lib/src/router.rs
// ============================
//! Login, logout and session introspection routes, plus the bearer-token
//! API identity route.
use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use sessiongate_common::{ApiIdentity, LoginRequest, SessionInfo};
use tower_http::trace::TraceLayer;

use crate::cookies::{
    clear_intended_uri_cookie, clear_session_cookie, resolve_intended_uri, session_cookie,
    INTENDED_URI_COOKIE_NAME,
};
use crate::error::{AppError, ConfigError};
use crate::middleware::{
    require_access_token, require_client_id, require_session, throttle_ip, throttle_session,
    AccessTokenContext, ClientGate, ClientId, SessionContext, ThrottleGroup,
};
use crate::AppState;

/// Bucket group guarding the login endpoint, keyed by client IP
pub const LOGIN_THROTTLE_GROUP: &str = "login";

/// Bucket group guarding authenticated endpoints, keyed by session id
pub const SESSION_THROTTLE_GROUP: &str = "session";

/// Create the router. Fails if a throttle group it needs is not configured.
pub fn create_router(state: AppState) -> Result<Router, ConfigError> {
    let login_throttle = ThrottleGroup::new(state.throttle.clone(), LOGIN_THROTTLE_GROUP)?
        .trust_proxy_headers(state.settings.throttle.trust_proxy_headers);
    let session_throttle = ThrottleGroup::new(state.throttle.clone(), SESSION_THROTTLE_GROUP)?;

    let login = Router::new()
        .route(&state.settings.session.login_path, post(login_handler))
        .route_layer(from_fn_with_state(login_throttle, throttle_ip));

    // Layers run outside-in: the session is resolved before it is throttled
    let protected = Router::new()
        .route("/me", get(me_handler))
        .route_layer(from_fn_with_state(session_throttle, throttle_session))
        .route("/logout", post(logout_handler))
        .route_layer(from_fn_with_state(state.clone(), require_session));

    // Client gate runs first, then the bearer token
    let client_gate = ClientGate::new(state.settings.api.client_ids.iter().cloned());
    let api = Router::new()
        .route("/api/whoami", get(whoami_handler))
        .route_layer(from_fn_with_state(state.access_tokens.clone(), require_access_token))
        .route_layer(from_fn_with_state(client_gate, require_client_id));

    Ok(Router::new()
        .merge(login)
        .merge(protected)
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Authenticate upstream, open a session and hand out the cookie
async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let identity = state.identity.authenticate(&request).await?;
    let tokens = (!identity.tokens.is_empty()).then_some(&identity.tokens);

    let sessions = &state.sessions;
    let session_id = sessions.create_session(&identity.user_id, tokens).await?;
    let token = sessions.cipher().encrypt_encode(session_id.as_bytes())?;
    tracing::info!(user_id = %identity.user_id, "login succeeded");

    let intended = resolve_intended_uri(&jar, &state.settings.session.login_path);
    let had_intended = jar.get(INTENDED_URI_COOKIE_NAME).is_some();

    let mut jar = jar.add(session_cookie(token, sessions.expire_in()));
    if had_intended {
        jar = jar.add(clear_intended_uri_cookie());
    }

    match intended {
        Some(target) => Ok((jar, Redirect::to(&target)).into_response()),
        None => {
            let info = SessionInfo {
                user_id: identity.user_id,
                expire_mode: sessions.expire_mode(),
            };
            Ok((jar, Json(info)).into_response())
        },
    }
}

/// Drop the session and its cookie
async fn logout_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    state
        .sessions
        .delete_session(&session.session_id, &session.user_id)
        .await?;
    tracing::info!(user_id = %session.user_id, "logged out");
    Ok((jar.add(clear_session_cookie()), StatusCode::NO_CONTENT).into_response())
}

async fn me_handler(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> Json<SessionInfo> {
    Json(SessionInfo {
        user_id: session.user_id,
        expire_mode: state.sessions.expire_mode(),
    })
}

async fn whoami_handler(
    Extension(token): Extension<AccessTokenContext>,
    Extension(ClientId(client_id)): Extension<ClientId>,
) -> Json<ApiIdentity> {
    Json(ApiIdentity {
        user_id: token.user_id,
        client_id,
    })
}
