// Core library for the Girder HTTP framework
// This module contains the dependency injection container, the router and the
// request pipeline that connects them

pub mod action;
pub mod application;
pub mod config;
pub mod container;
pub mod error;
pub mod http;
pub mod injection;
pub mod logging;
pub mod middleware;
pub mod registrar;
pub mod route_group;
pub mod route_registry;
pub mod routing;
pub mod traits;

// Re-export commonly used types
pub use action::*;
pub use application::*;
pub use config::*;
pub use container::*;
pub use error::*;
pub use http::*;
pub use injection::*;
pub use middleware::*;
pub use registrar::*;
pub use route_group::*;
pub use route_registry::*;
pub use routing::*;
pub use traits::*;

// Used by the `injectable!` and `route!` macros
pub use async_trait::async_trait;
#[doc(hidden)]
pub use inventory;
