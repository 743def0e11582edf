use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_ID_HEADER: &str = "x-session-id";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
const EXPIRED_SESSION_HINT: &str =
    "Sessions expire a fixed time after creation, whether or not they are used. \
     Create a new one with POST /v1/sessions.";

/// Session resolved from the `x-session-id` / `x-session-token` header pair.
///
/// Every session-scoped handler takes this extractor; ownership checks on
/// uploads, analyses and conversations compare against `session_id`.
#[derive(Debug, Clone)]
pub struct SessionAuth {
    pub session_id: String,
}

fn header_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for SessionAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let (Some(session_id), Some(token)) = (
            header_value(parts, SESSION_ID_HEADER),
            header_value(parts, SESSION_TOKEN_HEADER),
        ) else {
            return Err(AppError::Unauthorized {
                message: "Missing session headers".to_string(),
                docs_hint: Some(
                    "Create a session with POST /v1/sessions and send it back as \
                     'x-session-id' and 'x-session-token' headers."
                        .to_string(),
                ),
            });
        };

        match state.sessions.validate_session(session_id, token) {
            Some(record) => Ok(SessionAuth {
                session_id: record.session_id,
            }),
            None => {
                tracing::warn!(session_id = %session_id, "session authentication failed");
                Err(AppError::Unauthorized {
                    message: "Invalid or expired session".to_string(),
                    docs_hint: Some(EXPIRED_SESSION_HINT.to_string()),
                })
            }
        }
    }
}

/// Reject access to a resource owned by another session.
pub fn require_owner(auth: &SessionAuth, owner_session_id: &str, resource: &str) -> Result<(), AppError> {
    if auth.session_id == owner_session_id {
        return Ok(());
    }
    tracing::warn!(
        session_id = %auth.session_id,
        resource = resource,
        decision = "deny",
        "ownership check"
    );
    Err(AppError::Forbidden {
        message: format!("{resource} belongs to a different session"),
        docs_hint: Some("Use the session that created this resource.".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;
    use crate::providers::ModelChain;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/v1/analysis");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).expect("request should build").into_parts().0
    }

    #[tokio::test]
    async fn valid_headers_resolve_the_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::for_tests(dir.path(), ModelChain::default());
        let issued = state.sessions.create_session();

        let mut parts = parts_with(&[
            (SESSION_ID_HEADER, issued.session_id.as_str()),
            (SESSION_TOKEN_HEADER, issued.session_token.as_str()),
        ]);
        let auth = SessionAuth::from_request_parts(&mut parts, &state)
            .await
            .expect("session should authenticate");
        assert_eq!(auth.session_id, issued.session_id);
    }

    #[tokio::test]
    async fn missing_or_wrong_token_is_unauthorized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::for_tests(dir.path(), ModelChain::default());
        let issued = state.sessions.create_session();

        let mut missing = parts_with(&[(SESSION_ID_HEADER, issued.session_id.as_str())]);
        assert!(matches!(
            SessionAuth::from_request_parts(&mut missing, &state).await,
            Err(AppError::Unauthorized { .. })
        ));

        let mut wrong = parts_with(&[
            (SESSION_ID_HEADER, issued.session_id.as_str()),
            (SESSION_TOKEN_HEADER, "not-the-token"),
        ]);
        assert!(matches!(
            SessionAuth::from_request_parts(&mut wrong, &state).await,
            Err(AppError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn expired_session_hint_describes_fixed_lifetime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = AppState::for_tests(dir.path(), ModelChain::default());
        let issued = state.sessions.create_session();
        state.stores.sessions.update(&issued.session_id, &mut |record: &mut crate::sessions::SessionRecord| {
            record.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        });

        let mut parts = parts_with(&[
            (SESSION_ID_HEADER, issued.session_id.as_str()),
            (SESSION_TOKEN_HEADER, issued.session_token.as_str()),
        ]);
        match SessionAuth::from_request_parts(&mut parts, &state).await {
            Err(AppError::Unauthorized { docs_hint, .. }) => {
                let hint = docs_hint.expect("hint");
                assert!(hint.contains("fixed time after creation"));
                assert!(!hint.contains("inactivity"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn require_owner_rejects_foreign_sessions() {
        let auth = SessionAuth {
            session_id: "s1".to_string(),
        };
        assert!(require_owner(&auth, "s1", "Upload").is_ok());
        assert!(matches!(
            require_owner(&auth, "s2", "Upload"),
            Err(AppError::Forbidden { .. })
        ));
    }
}
