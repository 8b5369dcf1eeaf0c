//! Declarative route markers collected at link time through `inventory`
//!
//! The `route!` family of macros attaches a [`RouteAttribute`] to a controller
//! action. [`Router::discover_routes`](crate::Router::discover_routes) later
//! registers every marker declared inside a module tree, exactly as the fluent
//! API would.
//!
//! ```
//! use girder_core::{Arguments, Controller, ControllerMethod, Error, Injectable, controller_method};
//!
//! pub struct StatusController;
//!
//! impl Injectable for StatusController {
//!     fn construct(_: Arguments) -> Result<Self, Error> {
//!         Ok(StatusController)
//!     }
//! }
//!
//! impl Controller for StatusController {
//!     fn method(name: &str) -> Option<ControllerMethod<Self>> {
//!         match name {
//!             "show" => Some(controller_method("show", vec![], |_this, _args| async { Ok("up") })),
//!             _ => None,
//!         }
//!     }
//! }
//!
//! girder_core::get!("/status" => StatusController, "show", name = "status");
//! # fn main() {}
//! ```

use crate::{Action, HttpMethod};

/// A route declared on a controller action
pub struct RouteAttribute {
    pub method: HttpMethod,
    pub path: &'static str,
    pub name: Option<&'static str>,
    pub middleware: &'static [&'static str],
    /// Fully-qualified controller type name
    pub controller: fn() -> &'static str,
    /// Controller method name
    pub handler: &'static str,
    /// Module the marker was declared in
    pub module_path: &'static str,
    pub line: u32,
    pub action: fn() -> Action,
}

inventory::collect!(RouteAttribute);

impl RouteAttribute {
    /// Whether the marker was declared in `namespace` or one of its submodules
    pub fn within(&self, namespace: &str) -> bool {
        let namespace = namespace.trim_end_matches("::");
        namespace.is_empty()
            || self.module_path == namespace
            || self
                .module_path
                .strip_prefix(namespace)
                .is_some_and(|rest| rest.starts_with("::"))
    }
}

impl std::fmt::Debug for RouteAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteAttribute")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("middleware", &self.middleware)
            .field("controller", &(self.controller)())
            .field("handler", &self.handler)
            .field("module_path", &self.module_path)
            .field("line", &self.line)
            .finish()
    }
}

/// Every marker declared inside `namespace`, in (module path, line) order
pub fn get_routes_in(namespace: &str) -> Vec<&'static RouteAttribute> {
    let mut routes: Vec<&'static RouteAttribute> = inventory::iter::<RouteAttribute>
        .into_iter()
        .filter(|attribute| attribute.within(namespace))
        .collect();
    routes.sort_by_key(|attribute| (attribute.module_path, attribute.line));
    routes
}

/// Declare a route on a controller action
///
/// `route!(GET "/users/{id}" => UserController, "show", name = "users.show", middleware = ["auth"])`
#[macro_export]
macro_rules! route {
    (
        $method:ident $path:literal => $controller:ty, $handler:literal
        $(, name = $name:literal)?
        $(, middleware = [$($middleware:literal),* $(,)?])?
        $(,)?
    ) => {
        $crate::inventory::submit! {
            $crate::RouteAttribute {
                method: $crate::HttpMethod::$method,
                path: $path,
                name: $crate::__route_name!($($name)?),
                middleware: &[$($($middleware),*)?],
                controller: ::std::any::type_name::<$controller>,
                handler: $handler,
                module_path: ::std::module_path!(),
                line: ::std::line!(),
                action: || $crate::Action::controller::<$controller>($handler),
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __route_name {
    () => {
        ::std::option::Option::None
    };
    ($name:literal) => {
        ::std::option::Option::Some($name)
    };
}

/// Declare a GET route on a controller action
#[macro_export]
macro_rules! get {
    ($($rest:tt)*) => { $crate::route!(GET $($rest)*); };
}

/// Declare a POST route on a controller action
#[macro_export]
macro_rules! post {
    ($($rest:tt)*) => { $crate::route!(POST $($rest)*); };
}

/// Declare a PUT route on a controller action
#[macro_export]
macro_rules! put {
    ($($rest:tt)*) => { $crate::route!(PUT $($rest)*); };
}

/// Declare a PATCH route on a controller action
#[macro_export]
macro_rules! patch {
    ($($rest:tt)*) => { $crate::route!(PATCH $($rest)*); };
}

/// Declare a DELETE route on a controller action
#[macro_export]
macro_rules! delete {
    ($($rest:tt)*) => { $crate::route!(DELETE $($rest)*); };
}

/// Declare a route answering every method
#[macro_export]
macro_rules! any {
    ($($rest:tt)*) => { $crate::route!(ANY $($rest)*); };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, HttpRequest, handler};

    fn attribute(module_path: &'static str) -> RouteAttribute {
        RouteAttribute {
            method: HttpMethod::GET,
            path: "/",
            name: None,
            middleware: &[],
            controller: std::any::type_name::<()>,
            handler: "index",
            module_path,
            line: 1,
            action: || Action::from(handler(|_req: HttpRequest| async { Ok("ok") })),
        }
    }

    #[test]
    fn test_within_namespace() {
        let marker = attribute("app::http::controllers::users");

        assert!(marker.within("app::http::controllers"));
        assert!(marker.within("app::http::controllers::users"));
        assert!(marker.within("app::"));
        assert!(marker.within(""));
        assert!(!marker.within("app::http::control"));
        assert!(!marker.within("other"));
    }
}
