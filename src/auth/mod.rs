/*!
 * # Authentication
 *
 * Bearer-token identity resolution for customers and sellers.
 *
 * Tokens are HS256 JWTs carrying either a `customerId` or a `sellerId` claim. Handlers pick the
 * extractor matching the audience of the route:
 *
 * - [`AuthenticatedActor`] accepts either kind of actor
 * - [`CustomerActor`] and [`SellerActor`] narrow to one role and reject the other with 403
 */

use crate::entities::{Customer, Seller};
use crate::errors::ServiceError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const BEARER_PREFIX: &str = "Bearer ";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

/// Who is making the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Customer(Uuid),
    Seller(Uuid),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No authentication token provided")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Account not found")]
    UnknownActor,

    #[error("This action requires a {0} account")]
    WrongRole(&'static str),

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken
            | AuthError::InvalidToken
            | AuthError::TokenExpired
            | AuthError::UnknownActor => ServiceError::Unauthorized(err.to_string()),
            AuthError::WrongRole(_) => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(msg) => ServiceError::InternalError(msg),
            AuthError::Database(e) => ServiceError::DatabaseError(e),
        }
    }
}

/// Verifies bearer tokens and resolves them to existing actors.
pub struct AuthService {
    jwt_secret: String,
    token_ttl: ChronoDuration,
    db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(jwt_secret: String, db: Arc<DatabaseConnection>) -> Self {
        Self {
            jwt_secret,
            token_ttl: ChronoDuration::hours(24),
            db,
        }
    }

    pub fn with_token_ttl(mut self, ttl: ChronoDuration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Mints a token for `actor`; used by the account service and by tests.
    pub fn issue_token(&self, actor: Actor) -> Result<String, AuthError> {
        let now = Utc::now();
        let (customer_id, seller_id) = match actor {
            Actor::Customer(id) => (Some(id), None),
            Actor::Seller(id) => (None, Some(id)),
        };
        let claims = Claims {
            customer_id,
            seller_id,
            iat: now.timestamp(),
            exp: (now + self.token_ttl).timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Verifies `token` and checks that the actor it names still exists.
    pub async fn resolve(&self, token: &str) -> Result<Actor, AuthError> {
        let claims = self.validate_token(token)?;
        let actor = match (claims.customer_id, claims.seller_id) {
            (Some(id), None) => Actor::Customer(id),
            (None, Some(id)) => Actor::Seller(id),
            _ => return Err(AuthError::InvalidToken),
        };

        let exists = match actor {
            Actor::Customer(id) => Customer::find_by_id(id).one(&*self.db).await?.is_some(),
            Actor::Seller(id) => Seller::find_by_id(id).one(&*self.db).await?.is_some(),
        };
        if !exists {
            debug!(?actor, "token names an unknown account");
            return Err(AuthError::UnknownActor);
        }
        Ok(actor)
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Any authenticated customer or seller
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedActor
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);
        let token = bearer_token(parts)?;
        Ok(AuthenticatedActor(auth.resolve(token).await?))
    }
}

/// An authenticated customer; sellers get 403
#[derive(Debug, Clone, Copy)]
pub struct CustomerActor(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CustomerActor
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedActor::from_request_parts(parts, state).await?.0 {
            Actor::Customer(id) => Ok(CustomerActor(id)),
            Actor::Seller(_) => Err(AuthError::WrongRole("customer").into()),
        }
    }
}

/// An authenticated seller; customers get 403
#[derive(Debug, Clone, Copy)]
pub struct SellerActor(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for SellerActor
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedActor::from_request_parts(parts, state).await?.0 {
            Actor::Seller(id) => Ok(SellerActor(id)),
            Actor::Customer(_) => Err(AuthError::WrongRole("seller").into()),
        }
    }
}
