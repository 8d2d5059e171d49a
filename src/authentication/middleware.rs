use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{verify_jwt_session, SessionData, SessionKey};

/// Accepts `Token <jwt>` as well as `Bearer <jwt>`.
fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    match scheme {
        "Token" | "Bearer" => Some(token.trim()).filter(|t| !t.is_empty()),
        _ => None,
    }
}

fn resolve_session(header: Option<String>, key: &SessionKey) -> Result<Option<SessionData>, ApiError> {
    let Some(header) = header else {
        return Ok(None);
    };

    let token = parse_authorization(&header).ok_or_else(|| {
        ApiError::Unauthorized(String::from("Invalid authorization header"))
    })?;

    Ok(Some(verify_jwt_session(token, key)?.into()))
}

pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move {
            match resolve_session(header, &key) {
                Ok(Some(session)) => Ok(session),
                Ok(None) => Err(Rejection::from(ApiError::Unauthorized(String::from(
                    "Authentication credentials were not provided.",
                )))),
                Err(e) => Err(Rejection::from(e)),
            }
        }
    })
}

/// Anonymous requests pass with `None`; a present but broken token is still rejected.
pub fn with_possible_session(
    key: SessionKey,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move { resolve_session(header, &key).map_err(Rejection::from) }
    })
}
