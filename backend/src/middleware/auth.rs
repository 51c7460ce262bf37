//! Authentication middleware
//!
//! Sessions are issued by the identity provider; this layer only verifies
//! the JWT and turns its claims into a [`UserIdentity`]. Scope resolution
//! happens later, per call, in the permission service.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use shared::UserIdentity;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

/// JWT claims issued by the identity provider
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_approved: bool,
    #[serde(default)]
    pub structure_id: Option<String>,
    #[serde(default)]
    pub ministere_id: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Malformed organizational ids are dropped, which fails closed later.
    pub fn into_identity(self) -> Result<UserIdentity, String> {
        let user_id =
            Uuid::parse_str(&self.sub).map_err(|_| "Invalid user ID in token".to_string())?;
        let parse = |value: Option<String>| value.and_then(|v| Uuid::parse_str(&v).ok());

        Ok(UserIdentity {
            user_id,
            role_name: self.role,
            is_admin: self.is_admin,
            is_approved: self.is_approved,
            structure_id: parse(self.structure_id),
            ministere_id: parse(self.ministere_id),
        })
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => {
            return AppError::InvalidToken("Missing or invalid Authorization header".to_string())
                .into_response()
        }
    };

    let identity = match decode_jwt(token, &state.config.jwt.secret).and_then(Claims::into_identity)
    {
        Ok(identity) => identity,
        Err(msg) => return AppError::InvalidToken(msg).into_response(),
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> Result<Claims, String> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| format!("Invalid token: {}", e))
}

/// Extractor for the authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub UserIdentity);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserIdentity>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::InvalidToken("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(structure_id: Option<String>) -> Claims {
        Claims {
            sub: Uuid::new_v4().to_string(),
            role: Some("Agent de saisie".to_string()),
            is_admin: false,
            is_approved: true,
            structure_id,
            ministere_id: Some(Uuid::new_v4().to_string()),
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_claims_into_identity() {
        let structure_id = Uuid::new_v4();
        let identity = claims(Some(structure_id.to_string())).into_identity().unwrap();

        assert_eq!(identity.structure_id, Some(structure_id));
        assert_eq!(identity.role_name.as_deref(), Some("Agent de saisie"));
    }

    #[test]
    fn test_malformed_structure_is_dropped() {
        let identity = claims(Some("not-a-uuid".to_string())).into_identity().unwrap();
        assert_eq!(identity.structure_id, None);
    }

    #[test]
    fn test_invalid_subject_is_rejected() {
        let mut c = claims(None);
        c.sub = "nobody".to_string();
        assert!(c.into_identity().is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        use jsonwebtoken::{encode, EncodingKey, Header};

        let mut c = claims(None);
        c.exp = chrono::Utc::now().timestamp() + 600;
        let token = encode(&Header::default(), &c, &EncodingKey::from_secret(b"a")).unwrap();

        assert!(decode_jwt(&token, "a").is_ok());
        assert!(decode_jwt(&token, "b").is_err());
    }

    #[tokio::test]
    async fn test_missing_identity_rejects_with_invalid_token() {
        use axum::extract::FromRequestParts;
        use axum::http::StatusCode;

        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &()).await.unwrap_err();

        let (status, detail) = err.detail();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(detail.code, "INVALID_TOKEN");
        assert_eq!(detail.message_fr, "Session invalide ou expirée");
    }
}
