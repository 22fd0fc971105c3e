// src/routes/actor.rs

use std::str::FromStr;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::ApiError;

pub const ACTOR_ID: &str = "x-actor-id";
pub const ACTOR_NAME: &str = "x-actor-name";
pub const ACTOR_ROLE: &str = "x-actor-role";

/// Access level, ordered `View < Edit < Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Role {
    View,
    Edit,
    Full,
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(Role::View),
            "edit" => Ok(Role::Edit),
            "full" => Ok(Role::Full),
            other => Err(ApiError::Unauthenticated(format!("unknown role {other:?}"))),
        }
    }
}

/// Caller identity, taken from headers set by the fronting auth proxy.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub role: Role,
}

impl Actor {
    pub fn require(&self, role: Role) -> Result<(), ApiError> {
        if self.role >= role {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("{role:?} access required")))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        let id = header(ACTOR_ID)
            .ok_or_else(|| ApiError::Unauthenticated(format!("missing {ACTOR_ID} header")))?;
        let name = header(ACTOR_NAME).unwrap_or_else(|| id.clone());
        let role = match header(ACTOR_ROLE) {
            Some(r) => r.parse()?,
            None => Role::View,
        };

        Ok(Actor { id, name, role })
    }
}
