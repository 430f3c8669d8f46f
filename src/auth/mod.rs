/*!
 * # Request identity
 *
 * Authentication happens upstream: the gateway in front of this service
 * verifies the caller and forwards who they are in trusted headers.
 *
 * - `x-user-id`: the caller's user id (UUID)
 * - `x-user-role`: `admin` for staff, anything else is a customer
 * - `x-session-id`: anonymous shopping session, used by the cart routes
 */

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::errors::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Customer,
}

/// The user a request acts on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins see everything; customers only what they own.
    pub fn can_access(&self, owner_id: Uuid) -> bool {
        self.is_admin() || self.user_id == owner_id
    }

    /// Rejects non-admin callers.
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Admin role required".to_string()))
        }
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn user_id_from(parts: &Parts) -> Result<Option<Uuid>, ApiError> {
    header_str(parts, USER_ID_HEADER)
        .map(|raw| {
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::Unauthorized(format!("{} is not a valid UUID", USER_ID_HEADER)))
        })
        .transpose()
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from(parts)?
            .ok_or_else(|| ApiError::Unauthorized(format!("{} header is required", USER_ID_HEADER)))?;

        let role = header_str(parts, USER_ROLE_HEADER)
            .and_then(|raw| raw.parse::<Role>().ok())
            .unwrap_or(Role::Customer);

        Ok(Self { user_id, role })
    }
}

/// Who owns the cart a request touches: a signed-in user, an anonymous
/// session, or both right after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartOwner {
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for CartOwner
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = user_id_from(parts)?;
        let session_id = header_str(parts, SESSION_ID_HEADER).map(str::to_string);

        if user_id.is_none() && session_id.is_none() {
            return Err(ApiError::Unauthorized(format!(
                "{} or {} header is required",
                USER_ID_HEADER, SESSION_ID_HEADER
            )));
        }

        Ok(Self {
            user_id,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract_actor(builder: axum::http::request::Builder) -> Result<Actor, ApiError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        Actor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn actor_defaults_to_customer() {
        let id = Uuid::new_v4();
        let actor = extract_actor(Request::builder().header(USER_ID_HEADER, id.to_string()))
            .await
            .unwrap();
        assert_eq!(actor, Actor::customer(id));
        assert!(actor.can_access(id));
        assert!(!actor.can_access(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn admin_role_is_case_insensitive() {
        let id = Uuid::new_v4();
        let actor = extract_actor(
            Request::builder()
                .header(USER_ID_HEADER, id.to_string())
                .header(USER_ROLE_HEADER, "ADMIN"),
        )
        .await
        .unwrap();
        assert!(actor.is_admin());
        assert!(actor.can_access(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn missing_or_malformed_user_id_is_unauthorized() {
        assert!(matches!(
            extract_actor(Request::builder()).await,
            Err(ApiError::Unauthorized(_))
        ));
        assert!(matches!(
            extract_actor(Request::builder().header(USER_ID_HEADER, "nope")).await,
            Err(ApiError::Unauthorized(_))
        ));
    }
}
