use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::error::ApiError;
use crate::schema::{Id, User, UserRole};

use super::permissions::ActionType;

#[derive(Clone)]
pub struct SessionKey {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKey {
    pub fn new(secret: &[u8], lifetime_hours: i64) -> Result<Self, ApiError> {
        let key = Hmac::new_from_slice(secret)
            .map_err(|e| ApiError::Internal(format!("Invalid session secret: {e}")))?;

        Ok(Self {
            key,
            lifetime: Duration::hours(lifetime_hours),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Utc::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }

    pub fn sign(&self, key: &SessionKey) -> Result<String, ApiError> {
        self.sign_with_key(&key.key)
            .map_err(|e| ApiError::Internal(format!("Could not sign session: {e}")))
    }
}

/// The authenticated requester, as seen by actions.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authenticate(self) {
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            is_admin: value.role == UserRole::Admin,
            role: value.role,
        }
    }
}

pub fn generate_jwt_session(user: &User, key: &SessionKey) -> Result<String, ApiError> {
    JwtSessionData::new(
        user.id,
        user.username.to_owned(),
        user.role.to_owned(),
        key.lifetime,
    )
    .sign(key)
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, ApiError> {
    let session: JwtSessionData = token
        .verify_with_key(&key.key)
        .map_err(|_| ApiError::Unauthorized(String::from("Invalid session; Invalid token")))?;

    if session.exp - Utc::now().timestamp() < 0 {
        return Err(ApiError::Unauthorized(String::from(
            "Invalid session; Token expired",
        )));
    }

    Ok(session)
}
