use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::request::Parts,
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    access::{AccessRequirement, StaffIdentity, is_permitted},
    auth::requested_path,
    config::AppConfig,
    error::AccessError,
    repository::RepositoryState,
};

/// GuardDecision
///
/// The three terminal states of a guarded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Delegate,
    RedirectToSignIn,
    Denied,
}

/// ViewGuard
///
/// Wraps a protected operation with its [`AccessRequirement`]. Authentication is checked
/// first, then the requirement; the wrapped operation only runs on `Delegate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewGuard {
    requirement: AccessRequirement,
}

impl ViewGuard {
    pub const fn new(requirement: AccessRequirement) -> Self {
        Self { requirement }
    }

    pub fn requirement(&self) -> &AccessRequirement {
        &self.requirement
    }

    pub fn decide(&self, identity: &StaffIdentity) -> GuardDecision {
        if !identity.is_authenticated {
            GuardDecision::RedirectToSignIn
        } else if is_permitted(identity, &self.requirement) {
            GuardDecision::Delegate
        } else {
            GuardDecision::Denied
        }
    }

    /// run
    ///
    /// Invokes `operation` if the identity passes, otherwise returns the matching
    /// [`AccessError`]. `requested` is the path the caller asked for and becomes the
    /// sign-in `next` target.
    pub fn run<T>(
        &self,
        identity: &StaffIdentity,
        requested: &str,
        operation: impl FnOnce() -> T,
    ) -> Result<T, AccessError> {
        match self.decide(identity) {
            GuardDecision::Delegate => Ok(operation()),
            GuardDecision::RedirectToSignIn => Err(AccessError::unauthenticated(requested)),
            GuardDecision::Denied => Err(AccessError::AccessDenied),
        }
    }
}

// --- Axum Integration ---

/// GuardState
///
/// The state handed to the guard middleware: the application state (for identity
/// resolution) plus the guard for the routes it wraps.
#[derive(Clone)]
pub struct GuardState {
    pub app: AppState,
    pub guard: ViewGuard,
}

impl FromRef<GuardState> for RepositoryState {
    fn from_ref(state: &GuardState) -> RepositoryState {
        state.app.repo.clone()
    }
}

impl FromRef<GuardState> for AppConfig {
    fn from_ref(state: &GuardState) -> AppConfig {
        state.app.config.clone()
    }
}

/// enforce
///
/// Middleware applying a [`ViewGuard`] before the wrapped handler. The resolved identity is
/// left in the request extensions so the handler's own `StaffIdentity` extractor reuses it.
async fn enforce(
    State(state): State<GuardState>,
    identity: StaffIdentity,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let requested = requested_path(&parts);

    match state.guard.run(&identity, &requested, || ()) {
        Ok(()) => {
            let mut request = Request::from_parts(parts, body);
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(AccessError::AccessDenied) => {
            log_denial(&identity, &parts);
            AccessError::AccessDenied.into_response()
        }
        Err(unauthenticated) => unauthenticated.into_response(),
    }
}

fn log_denial(identity: &StaffIdentity, parts: &Parts) {
    tracing::warn!(
        account_id = ?identity.account_id,
        role = ?identity.role_code(),
        category = ?identity.category(),
        path = %requested_path(parts),
        "access denied"
    );
}

/// guarded
///
/// Puts every route of `router` behind a [`ViewGuard`] for `requirement`. Applied as a
/// `route_layer`; unmatched paths still 404.
pub fn guarded(
    router: Router<AppState>,
    state: &AppState,
    requirement: AccessRequirement,
) -> Router<AppState> {
    let guard_state = GuardState {
        app: state.clone(),
        guard: ViewGuard::new(requirement),
    };
    router.route_layer(middleware::from_fn_with_state(guard_state, enforce))
}
