// Core traits for the Girder framework

use crate::{Application, ConfigRepository, Container, ControllerMethod, Error, Injectable, Router};

/// Trait for HTTP controllers.
///
/// A controller is built by the container like any other injectable type;
/// its actions are looked up by name when a route points at them.
pub trait Controller: Injectable {
    /// Returns the action registered under `name`, if any
    fn method(name: &str) -> Option<ControllerMethod<Self>>;
}

/// Boot-time extension point of an [`Application`].
///
/// Every provider's `register` runs before any provider's `routes`, and every
/// `routes` runs before any `boot`. The router is frozen once `routes` completes.
pub trait ServiceProvider: Send + Sync + 'static {
    /// Name used in boot logs
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Register bindings in the container
    fn register(&self, _container: &Container, _config: &dyn ConfigRepository) -> Result<(), Error> {
        Ok(())
    }

    /// Register routes, groups and middleware aliases
    fn routes(&self, _router: &mut Router) -> Result<(), Error> {
        Ok(())
    }

    /// Runs after the application has been assembled
    fn boot(&self, _app: &Application) -> Result<(), Error> {
        Ok(())
    }
}

/// HTTP methods
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    /// Synthetic bucket consulted after the request's own method
    ANY,
}

impl HttpMethod {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Some(HttpMethod::GET),
            "POST" => Some(HttpMethod::POST),
            "PUT" => Some(HttpMethod::PUT),
            "DELETE" => Some(HttpMethod::DELETE),
            "PATCH" => Some(HttpMethod::PATCH),
            "HEAD" => Some(HttpMethod::HEAD),
            "OPTIONS" => Some(HttpMethod::OPTIONS),
            "ANY" => Some(HttpMethod::ANY),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::ANY => "ANY",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
