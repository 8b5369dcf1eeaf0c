// Routing system for HTTP requests

use crate::logging::{debug, trace};
use crate::registrar::normalize_path;
use crate::route_registry::get_routes_in;
use crate::{
    Action, Container, Controller, ControllerRef, Error, HandlerFn, HttpMethod, HttpRequest,
    HttpResponse, Injectable, Middleware, MiddlewareChain, MiddlewareRef, Registrar, RouteGroup,
    ServiceKey,
};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Route table: method bucket, then path, in declaration order
pub type RouteTable = IndexMap<HttpMethod, IndexMap<String, Registrar>>;

/// Router for managing routes and dispatching requests
///
/// Routes are registered while the application boots. Once the router is
/// handed to an [`Application`](crate::Application) it is shared read-only
/// between requests.
#[derive(Default)]
pub struct Router {
    routes: RouteTable,
    groups: Vec<RouteGroup>,
    middleware: HashMap<String, MiddlewareRef>,
    controllers: HashMap<String, ControllerRef>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::GET, path, action)
    }

    pub fn post(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::POST, path, action)
    }

    pub fn put(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::PUT, path, action)
    }

    pub fn patch(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::PATCH, path, action)
    }

    pub fn delete(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::DELETE, path, action)
    }

    /// Register a route in the fallback bucket consulted for every method
    pub fn any(&mut self, path: &str, action: impl Into<Action>) -> &mut Registrar {
        self.add_route(HttpMethod::ANY, path, action)
    }

    /// Add a route under the current group stack.
    ///
    /// Registering the same method and path again replaces the earlier route
    /// but keeps its position in the table.
    pub fn add_route(
        &mut self,
        method: HttpMethod,
        path: &str,
        action: impl Into<Action>,
    ) -> &mut Registrar {
        let group = self.current_group();
        let mut registrar = Registrar::new(method, group.apply_prefix(path), action);
        registrar.middleware(group.get_middleware().iter().cloned());

        debug!(
            method = %method,
            path = %registrar.get_path(),
            action = %registrar.get_action().describe(),
            "Route registered"
        );

        let bucket = self.routes.entry(method).or_default();
        let (index, replaced) = bucket.insert_full(registrar.get_path().to_string(), registrar);
        if replaced.is_some() {
            trace!(method = %method, index, "Route replaced an earlier registration");
        }
        &mut bucket[index]
    }

    /// Register the routes added by `routes` under `group`
    ///
    /// ```
    /// use girder_core::{HttpRequest, RouteGroup, Router, handler};
    ///
    /// let mut router = Router::new();
    /// router.group(RouteGroup::new().prefix("api"), |router| {
    ///     router.group(RouteGroup::new().prefix("v1"), |router| {
    ///         router.get("/users", handler(|_req: HttpRequest| async { Ok("users") }));
    ///     });
    /// });
    /// assert!(router.has_route("/api/v1/users"));
    /// ```
    pub fn group<F>(&mut self, group: RouteGroup, routes: F) -> &mut Self
    where
        F: FnOnce(&mut Router),
    {
        self.groups.push(group);
        routes(self);
        self.groups.pop();
        self
    }

    /// The effective group: every frame on the stack, outermost first
    fn current_group(&self) -> RouteGroup {
        self.groups
            .iter()
            .fold(RouteGroup::new(), |parent, group| group.with_parent(&parent))
    }

    /// Register every route declared with the `route!` macros inside `namespace`.
    ///
    /// Markers are registered in (module path, line) order, under the current
    /// group stack; returns the number of routes registered.
    pub fn discover_routes(&mut self, namespace: &str) -> usize {
        let attributes = get_routes_in(namespace);
        for attribute in &attributes {
            let registrar = self.add_route(attribute.method, attribute.path, (attribute.action)());
            if let Some(name) = attribute.name {
                registrar.name(name);
            }
            registrar.middleware(attribute.middleware.iter().copied());
        }

        debug!(namespace, count = attributes.len(), "Discovered routes");
        attributes.len()
    }

    /// Register middleware `M` under `alias` and under its type name
    pub fn middleware<M: Middleware + Injectable>(&mut self, alias: impl Into<String>) -> &mut Self {
        let reference = MiddlewareRef::of::<M>();
        let alias = alias.into();
        debug!(alias = %alias, middleware = reference.name(), "Middleware alias registered");

        self.middleware
            .insert(reference.name().to_string(), reference.clone());
        self.middleware.insert(alias, reference);
        self
    }

    /// Find the middleware a route refers to by `name`.
    ///
    /// Aliases are consulted first; otherwise `name` must be a container key
    /// bound to an `Arc<dyn Middleware>`.
    pub fn resolve_middleware(
        &self,
        name: &str,
        container: &Container,
    ) -> Result<MiddlewareRef, Error> {
        if let Some(reference) = self.middleware.get(name) {
            return Ok(reference.clone());
        }
        if container.has(ServiceKey::named(name.to_string())) {
            return Ok(MiddlewareRef::keyed(name.to_string()));
        }
        Err(Error::TargetNotFound(format!("middleware [{}]", name)))
    }

    /// Make controller `C` addressable as `"name@method"`, and by its type name
    pub fn controller<C: Controller>(&mut self, name: impl Into<String>) -> &mut Self {
        let reference = ControllerRef::of::<C>();
        self.controllers
            .insert(reference.name().to_string(), reference);
        self.controllers.insert(name.into(), reference);
        self
    }

    /// Read-only view of the route table
    pub fn get_routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn route_count(&self) -> usize {
        self.routes.values().map(IndexMap::len).sum()
    }

    /// Whether any method bucket holds `path`
    pub fn has_route(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.routes.values().any(|bucket| bucket.contains_key(&path))
    }

    /// Look a route up by name; the latest registration wins
    pub fn route(&self, name: &str) -> Option<&Registrar> {
        self.routes
            .values()
            .flat_map(IndexMap::values)
            .filter(|registrar| registrar.get_name() == Some(name))
            .last()
    }

    /// Generate the URL of a named route
    pub fn url(&self, name: &str, params: &HashMap<String, String>) -> Result<String, Error> {
        self.route(name)
            .ok_or_else(|| Error::RouteNotDefined(name.to_string()))?
            .url(params)
    }

    /// Dispatch a request to the matching route
    ///
    /// Lookup order: exact path in the request's method bucket, exact path in
    /// the `ANY` bucket, templates in the method bucket, templates in the `ANY`
    /// bucket. Among templates the first registered match wins.
    pub async fn dispatch(
        &self,
        container: &Container,
        mut request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        let (path, query) = match request.path.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (request.path.clone(), None),
        };
        if let Some(query) = query {
            request.query_params.extend(parse_query_string(&query));
        }
        let path = normalize_path(&path);
        request.path = path.clone();

        let method = HttpMethod::from_str(&request.method);
        let (registrar, params) =
            self.find_route(method, &path)
                .ok_or_else(|| Error::RouteNotFound {
                    method: request.method.clone(),
                    path: path.clone(),
                })?;

        debug!(
            method = %request.method,
            path = %path,
            route = %registrar.get_path(),
            "Route matched"
        );
        request.path_params = params;

        self.run_route(container, registrar, request).await
    }

    fn find_route(
        &self,
        method: Option<HttpMethod>,
        path: &str,
    ) -> Option<(&Registrar, HashMap<String, String>)> {
        let own = method.and_then(|method| self.routes.get(&method));
        let any = self.routes.get(&HttpMethod::ANY);

        for bucket in [own, any].into_iter().flatten() {
            if let Some(registrar) = bucket.get(path) {
                return Some((registrar, HashMap::new()));
            }
        }

        for bucket in [own, any].into_iter().flatten() {
            for registrar in bucket.values() {
                if let Some(params) = registrar.captures(path) {
                    return Some((registrar, params));
                }
            }
        }

        None
    }

    /// Run a matched route through its middleware pipeline
    async fn run_route(
        &self,
        container: &Container,
        registrar: &Registrar,
        request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        let mut chain = MiddlewareChain::new();
        for name in registrar.get_middleware() {
            chain.use_deferred(container.clone(), self.resolve_middleware(name, container)?);
        }

        let action = registrar
            .get_action()
            .resolve_named(|name| self.controllers.get(name).copied())?;
        let container = container.clone();
        let terminal: HandlerFn = Arc::new(move |req| {
            let action = action.clone();
            let container = container.clone();
            Box::pin(async move { action.invoke(&container, req).await })
        });

        chain.apply(request, terminal).await
    }
}

/// Parse a query string into a map of percent-decoded parameters
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(component: &str) -> String {
    let component = component.replace('+', " ");
    urlencoding::decode(&component)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(component)
}
