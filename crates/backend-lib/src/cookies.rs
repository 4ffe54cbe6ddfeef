// ============================
// crates/backend-lib/src/cookies.rs
// ============================
//! Session and intended-destination cookies.
use axum::http::Uri;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Cookie carrying the encrypted session id
pub const SESSION_COOKIE_NAME: &str = "__Host-session";

/// Short-lived cookie remembering where to go after login
pub const INTENDED_URI_COOKIE_NAME: &str = "intended_uri";

/// Lifetime of the intended-destination cookie
pub const INTENDED_URI_MAX_AGE: Duration = Duration::seconds(60);

fn secure_cookie(name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(max_age)
        .build()
}

/// Create session cookie.
pub fn session_cookie(encrypted_session_id: String, max_age: std::time::Duration) -> Cookie<'static> {
    let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    secure_cookie(SESSION_COOKIE_NAME, encrypted_session_id, Duration::seconds(secs))
}

/// Create removal cookie for session. `__Host-` cookies keep their
/// attributes or browsers ignore the removal.
pub fn clear_session_cookie() -> Cookie<'static> {
    secure_cookie(SESSION_COOKIE_NAME, String::new(), Duration::ZERO)
}

/// Remember the request target so the login flow can send the browser back
pub fn intended_uri_cookie(uri: &Uri) -> Cookie<'static> {
    let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
    secure_cookie(
        INTENDED_URI_COOKIE_NAME,
        urlencoding::encode(target).into_owned(),
        INTENDED_URI_MAX_AGE,
    )
}

pub fn clear_intended_uri_cookie() -> Cookie<'static> {
    secure_cookie(INTENDED_URI_COOKIE_NAME, String::new(), Duration::ZERO)
}

/// Read the intended destination, if it is a safe local redirect target.
///
/// Targets that are empty, equal to the login page, or that would leave
/// the site (absolute, scheme-relative or backslash tricks) are rejected.
pub fn resolve_intended_uri(jar: &CookieJar, login_path: &str) -> Option<String> {
    let raw = jar.get(INTENDED_URI_COOKIE_NAME)?;
    let decoded = urlencoding::decode(raw.value()).ok()?;
    local_redirect_target(&decoded, login_path).map(str::to_string)
}

fn local_redirect_target<'a>(target: &'a str, login_path: &str) -> Option<&'a str> {
    if target.is_empty() || target == login_path {
        return None;
    }
    if !target.starts_with('/') || target.starts_with("//") || target.starts_with("/\\") {
        return None;
    }
    if target.chars().any(char::is_control) {
        return None;
    }
    Some(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jar_with(value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(INTENDED_URI_COOKIE_NAME, value.to_string()))
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok".to_string(), std::time::Duration::from_secs(3600));
        assert_eq!(cookie.name(), SESSION_COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(3600)));

        let removal = clear_session_cookie();
        assert_eq!(removal.max_age(), Some(Duration::ZERO));
        assert_eq!(removal.secure(), Some(true));
    }

    #[test]
    fn test_intended_uri_round_trip() {
        let uri: Uri = "/orders/42?tab=items&x=a%20b".parse().unwrap();
        let cookie = intended_uri_cookie(&uri);
        assert_eq!(cookie.max_age(), Some(INTENDED_URI_MAX_AGE));

        let jar = CookieJar::new().add(cookie);
        assert_eq!(
            resolve_intended_uri(&jar, "/login").as_deref(),
            Some("/orders/42?tab=items&x=a%20b")
        );
    }

    #[test]
    fn test_external_targets_are_rejected() {
        for target in [
            "https://evil.example/phish",
            "//evil.example/phish",
            "/\\evil.example",
            "javascript:alert(1)",
            "orders",
            "",
            "/login",
            "/ok\r\nSet-Cookie: x=y",
        ] {
            let jar = jar_with(&urlencoding::encode(target));
            assert_eq!(resolve_intended_uri(&jar, "/login"), None, "accepted {target:?}");
        }
    }

    #[test]
    fn test_missing_cookie() {
        assert_eq!(resolve_intended_uri(&CookieJar::new(), "/login"), None);
    }
}
