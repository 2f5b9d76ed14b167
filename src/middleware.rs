//! Request authentication.
//!
//! Two `from_fn_with_state` layers resolve the caller before any handler runs:
//! [`require_identity`] rejects requests without a valid session token, and
//! [`optional_identity`] lets anonymous requests through while still rejecting a token
//! that is present but invalid. Both attach a fresh [`RequestContext`] to the request
//! and clear it once the inner service has finished.
//!
//! Handlers read the caller back through the [`Caller`] and [`MaybeCaller`] extractors.

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, Method, header, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::{
    context::RequestContext,
    error::{AppError, AuthError},
    models::Identity,
    token::TokenService,
};

/// Reads the session token from the `Authorization` header. Both a bare token and the
/// `Bearer <token>` form are accepted.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim();
    (!token.is_empty()).then_some(token)
}

/// Verifies the presented token, if any. `Ok(None)` means no token was sent.
fn authenticate(tokens: &TokenService, headers: &HeaderMap) -> Result<Option<Identity>, AuthError> {
    match bearer_token(headers) {
        None => Ok(None),
        Some(token) => tokens.verify(token).map(Some),
    }
}

/// Runs `next` with a context holding `identity`. The guard outlives the inner future,
/// so the context is cleared on completion, on error responses, on cancellation and
/// while unwinding from a panic.
async fn run_with_context(
    identity: Option<Identity>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = RequestContext::new();
    if let Some(identity) = identity {
        tracing::debug!(username = %identity.username, role = %identity.role, "Caller authenticated");
        context.set(identity);
    }
    let guard = context.guard();
    request.extensions_mut().insert(Arc::clone(guard.context()));

    let response = next.run(request).await;
    drop(guard);
    response
}

/// require_identity
///
/// Guards authenticated routes. Pre-flight `OPTIONS` probes pass through untouched; any
/// other request without a valid token is rejected with `401` before reaching a handler.
pub async fn require_identity(
    State(tokens): State<TokenService>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let identity = authenticate(&tokens, request.headers())?.ok_or(AuthError::MissingToken)?;
    Ok(run_with_context(Some(identity), request, next).await)
}

/// optional_identity
///
/// Used on catalog routes where the caller's identity shapes visibility but is not
/// required. Anonymous requests get an empty context.
pub async fn optional_identity(
    State(tokens): State<TokenService>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity = authenticate(&tokens, request.headers())?;
    Ok(run_with_context(identity, request, next).await)
}

fn current_identity(parts: &Parts) -> Option<Identity> {
    parts
        .extensions
        .get::<Arc<RequestContext>>()
        .and_then(|context| context.get())
}

/// Caller
///
/// The authenticated caller of the current request. Rejects with `401` when the
/// request context is empty, so a handler taking `Caller` can never run anonymously.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        current_identity(parts)
            .map(Caller)
            .ok_or(AppError::Auth(AuthError::MissingToken))
    }
}

/// The caller of the current request, if one authenticated.
#[derive(Debug, Clone)]
pub struct MaybeCaller(pub Option<Identity>);

impl MaybeCaller {
    pub fn identity(&self) -> Option<&Identity> {
        self.0.as_ref()
    }
}

impl<S> FromRequestParts<S> for MaybeCaller
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(current_identity(parts)))
    }
}
