// Girder - A service-container-driven HTTP framework for Rust
//
// This library wires an autowiring service container to a router with route
// groups, named routes, declarative route markers and middleware pipelines.

// Re-export core functionality
pub use girder_core::*;

// Re-export optional crates
#[cfg(feature = "config")]
pub use girder_config;

#[cfg(feature = "testing")]
pub use girder_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Action,
        Application,
        Arguments,
        ConfigRepository,
        ConfigRepositoryExt,
        Container,
        Controller,
        ControllerMethod,
        Error,
        HttpMethod,
        HttpRequest,
        HttpResponse,
        Injectable,
        Middleware,
        Next,
        Parameter,
        Parameters,
        REQUEST,
        RouteGroup,
        Router,
        ServiceKey,
        ServiceProvider,
        // Action helpers
        controller_method,
        handler,
        injected,
        // Route markers
        any,
        delete,
        get,
        injectable,
        patch,
        post,
        put,
    };
}
