use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;

use crate::auth::session::user_for_token;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

impl CurrentUser {
    /// Staff and superusers may publish new posts.
    pub fn can_publish(&self) -> bool {
        self.is_staff || self.is_superuser
    }

    pub fn is_author_of(&self, author_id: &str) -> bool {
        self.id == author_id
    }
}

/// Extractor that requires authentication.
/// Anonymous requests are rejected with 403, matching the other
/// authorship checks on mutation endpoints.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        user.ok_or(AppError::PermissionDenied)
    }
}

/// Optional user extractor: None instead of a rejection when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = extract_session_token(parts, &state.config.auth.cookie_name) else {
            return Ok(MaybeUser(None));
        };

        let conn = state.db.get()?;
        Ok(MaybeUser(user_for_token(&conn, token)?))
    }
}

fn extract_session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name && !val.is_empty() {
                Some(val)
            } else {
                None
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_cookie(cookie: &str) -> Parts {
        let (parts, _) = Request::builder()
            .header(header::COOKIE, cookie)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn user(is_staff: bool, is_superuser: bool) -> CurrentUser {
        CurrentUser {
            id: "u1".into(),
            username: "u1".into(),
            is_staff,
            is_superuser,
        }
    }

    #[test]
    fn finds_named_cookie_among_others() {
        let parts = parts_with_cookie("theme=dark; folio_session=abc123; lang=ko");
        assert_eq!(extract_session_token(&parts, "folio_session"), Some("abc123"));
    }

    #[test]
    fn ignores_empty_or_missing_cookie() {
        let parts = parts_with_cookie("folio_session=");
        assert_eq!(extract_session_token(&parts, "folio_session"), None);
        let parts = parts_with_cookie("other=1");
        assert_eq!(extract_session_token(&parts, "folio_session"), None);
    }

    #[test]
    fn only_staff_or_superusers_publish() {
        assert!(!user(false, false).can_publish());
        assert!(user(true, false).can_publish());
        assert!(user(false, true).can_publish());
    }
}
