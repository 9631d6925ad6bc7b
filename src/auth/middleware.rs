//! Axum middleware wrapping the [`AuthGate`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::gate::AuthGate;
use crate::auth::session::AuthenticatedUser;

/// Reject unauthenticated requests; attach [`AuthenticatedUser`] otherwise.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return next.run(request).await;
    }

    let credentials = gate.credentials(request.headers());
    match gate.require_auth(credentials.as_ref()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Reject non-admins. Reuses a user attached by an outer `require_auth`
/// so the session is resolved once per request.
pub async fn require_admin(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Response {
    let result = match request.extensions().get::<AuthenticatedUser>().cloned() {
        Some(user) => gate.escalate_to_admin(user).await,
        None => {
            let credentials = gate.credentials(request.headers());
            gate.require_admin(credentials.as_ref()).await
        }
    };

    match result {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
