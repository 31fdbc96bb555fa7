//! Navigation signals emitted by session transitions.

use std::sync::{Mutex, PoisonError};

/// Screens a session transition can send the user to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Default screen after login or register.
    Home,
    /// Login screen after logout or a forced 401 expiry.
    Login,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Login => "login",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receives navigation signals. Navigating to the same route twice must be
/// harmless.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Logs each navigation; the CLI's views decide what to render themselves.
#[derive(Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        tracing::info!(route = %route, "navigate");
    }
}

/// Keeps every navigation in order.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<Route>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last(&self) -> Option<Route> {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .copied()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: Route) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route);
    }
}
