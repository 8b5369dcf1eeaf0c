//! Route actions.
//!
//! An [`Action`] is what a route runs once its middleware pipeline has been
//! traversed: a closure, a method on a [`Controller`], or a `"Name@method"`
//! reference to a controller registered on the router. Every kind is invoked
//! through [`Container::call`], with the request injected as the parameter
//! named `request` alongside any other declared dependencies.
//!
//! ```
//! use girder_core::{Action, HttpRequest, handler};
//!
//! let ping: Action = handler(|_req: HttpRequest| async { Ok("pong") }).into();
//! assert_eq!(ping.describe(), "Closure");
//! ```

use crate::{
    Arguments, Callable, Container, Controller, Error, HttpRequest, HttpResponse, IntoResponse,
    Method, Parameter, Parameters,
};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Name under which the current request is injected into actions
pub const REQUEST: &str = "request";

/// Future produced by invoking an action
pub type ActionFuture = BoxFuture<'static, Result<HttpResponse, Error>>;

/// A closure action with its declared parameters
pub type Handler = Callable<ActionFuture>;

/// A controller action with its declared parameters
pub type ControllerMethod<C> = Method<C, ActionFuture>;

/// Wrap a closure that only needs the request
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + 'static,
{
    Callable::new(
        "Closure",
        vec![Parameter::service::<HttpRequest>(REQUEST)],
        move |args: Arguments| {
            let future = f(args.value::<HttpRequest>(REQUEST)?);
            Ok(respond(future))
        },
    )
}

/// Wrap a closure whose parameters are resolved by the container.
///
/// The request is always available as `args.value::<HttpRequest>("request")`.
pub fn injected<F, Fut, R>(parameters: Vec<Parameter>, f: F) -> Handler
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + 'static,
{
    Callable::new("Closure", with_request(parameters), move |args: Arguments| {
        Ok(respond(f(args)))
    })
}

/// Declare a controller action.
///
/// The receiver is the controller instance built by the container for the
/// current dispatch; `args` carries the request and the declared parameters.
pub fn controller_method<C, F, Fut, R>(
    name: &'static str,
    parameters: Vec<Parameter>,
    f: F,
) -> ControllerMethod<C>
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + 'static,
{
    Method::new(name, with_request(parameters), move |this: Arc<C>, args: Arguments| {
        Ok(respond(f(this, args)))
    })
}

fn with_request(mut parameters: Vec<Parameter>) -> Vec<Parameter> {
    if !parameters.iter().any(|parameter| parameter.name() == REQUEST) {
        parameters.insert(0, Parameter::service::<HttpRequest>(REQUEST));
    }
    parameters
}

fn respond<Fut, R>(future: Fut) -> ActionFuture
where
    Fut: Future<Output = Result<R, Error>> + Send + 'static,
    R: IntoResponse + 'static,
{
    Box::pin(async move { future.await?.into_response() })
}

/// Type-erased handle on a [`Controller`] implementation
#[derive(Clone, Copy)]
pub struct ControllerRef {
    name: fn() -> &'static str,
    handler: fn(&Container, &str) -> Result<Handler, Error>,
}

impl ControllerRef {
    pub fn of<C: Controller>() -> Self {
        Self {
            name: std::any::type_name::<C>,
            handler: controller_handler::<C>,
        }
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    /// Build the controller through the container and bind `method` to it
    pub fn handler(&self, container: &Container, method: &str) -> Result<Handler, Error> {
        (self.handler)(container, method)
    }
}

impl fmt::Debug for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ControllerRef").field(&self.name()).finish()
    }
}

fn controller_handler<C: Controller>(container: &Container, method: &str) -> Result<Handler, Error> {
    // Look the method up first so a typo does not cost a controller build
    let action = C::method(method).ok_or_else(|| {
        Error::TargetNotFound(format!("{}::{}", std::any::type_name::<C>(), method))
    })?;
    let controller = container.build::<C>(&Parameters::new())?;
    Ok(action.bind(controller))
}

/// What a route runs
#[derive(Clone)]
pub enum Action {
    Closure(Handler),
    Controller(ControllerRef, Cow<'static, str>),
    /// `"Name@method"`, resolved against the router's controller table
    Named(Cow<'static, str>),
}

impl Action {
    pub fn controller<C: Controller>(method: impl Into<Cow<'static, str>>) -> Self {
        Action::Controller(ControllerRef::of::<C>(), method.into())
    }

    /// Human-readable form used in logs and route listings
    pub fn describe(&self) -> String {
        match self {
            Action::Closure(_) => "Closure".to_string(),
            Action::Controller(controller, method) => format!("{}@{}", controller.name(), method),
            Action::Named(reference) => reference.to_string(),
        }
    }

    /// Replace a `"Name@method"` reference by the controller it names
    pub(crate) fn resolve_named<F>(&self, lookup: F) -> Result<Action, Error>
    where
        F: Fn(&str) -> Option<ControllerRef>,
    {
        let Action::Named(reference) = self else {
            return Ok(self.clone());
        };
        let (controller, method) = split_reference(reference)?;
        let controller = lookup(controller)
            .ok_or_else(|| Error::TargetNotFound(controller.to_string()))?;
        Ok(Action::Controller(controller, Cow::Owned(method.to_string())))
    }

    /// Run the action for `request`
    pub(crate) async fn invoke(
        &self,
        container: &Container,
        request: HttpRequest,
    ) -> Result<HttpResponse, Error> {
        let handler = match self {
            Action::Closure(handler) => handler.clone(),
            Action::Controller(controller, method) => controller.handler(container, method)?,
            Action::Named(reference) => {
                return Err(Error::InvalidAction(format!(
                    "unresolved controller reference {}",
                    reference
                )));
            }
        };
        let params = Parameters::new().with(REQUEST, request);
        container.call(&handler, &params)?.await
    }
}

fn split_reference(reference: &str) -> Result<(&str, &str), Error> {
    match reference.split_once('@') {
        Some((controller, method)) if !controller.is_empty() && !method.is_empty() => {
            Ok((controller, method))
        }
        _ => Err(Error::InvalidAction(format!(
            "[{}] is not a Controller@method reference",
            reference
        ))),
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl From<Handler> for Action {
    fn from(handler: Handler) -> Self {
        Action::Closure(handler)
    }
}

impl From<&'static str> for Action {
    fn from(reference: &'static str) -> Self {
        Action::Named(Cow::Borrowed(reference))
    }
}

impl From<String> for Action {
    fn from(reference: String) -> Self {
        Action::Named(Cow::Owned(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Injectable;

    struct Greeting;

    impl Injectable for Greeting {
        fn construct(_: Arguments) -> Result<Self, Error> {
            Ok(Greeting)
        }
    }

    impl Controller for Greeting {
        fn method(name: &str) -> Option<ControllerMethod<Self>> {
            match name {
                "hello" => Some(controller_method("hello", vec![], |_this, args| async move {
                    let request: HttpRequest = args.value(REQUEST)?;
                    Ok(format!("hello from {}", request.path))
                })),
                _ => None,
            }
        }
    }

    #[test]
    fn test_split_reference() {
        assert_eq!(split_reference("Users@show").unwrap(), ("Users", "show"));
        assert!(matches!(split_reference("Users"), Err(Error::InvalidAction(_))));
        assert!(matches!(split_reference("@show"), Err(Error::InvalidAction(_))));
    }

    #[test]
    fn test_with_request_is_not_duplicated() {
        let parameters = with_request(vec![Parameter::service::<HttpRequest>(REQUEST)]);
        assert_eq!(parameters.len(), 1);

        let parameters = with_request(vec![Parameter::primitive::<u32>("page").default(1u32)]);
        assert_eq!(parameters[0].name(), REQUEST);
        assert_eq!(parameters.len(), 2);
    }

    #[tokio::test]
    async fn test_controller_action_receives_request() {
        let container = Container::new();
        let action = Action::controller::<Greeting>("hello");

        let response = action
            .invoke(&container, HttpRequest::new("GET", "/greet"))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_string(), "hello from /greet");
    }

    #[tokio::test]
    async fn test_unknown_controller_method() {
        let container = Container::new();
        let action = Action::controller::<Greeting>("missing");

        let result = action.invoke(&container, HttpRequest::new("GET", "/")).await;
        assert!(matches!(result, Err(Error::TargetNotFound(_))));
    }

    #[test]
    fn test_resolve_named_reference() {
        let action = Action::from("Greeting@hello");
        let resolved = action
            .resolve_named(|name| (name == "Greeting").then(ControllerRef::of::<Greeting>))
            .unwrap();
        assert!(matches!(resolved, Action::Controller(_, ref method) if method == "hello"));

        let missing = Action::from("Nope@hello").resolve_named(|_| None);
        assert!(matches!(missing, Err(Error::TargetNotFound(name)) if name == "Nope"));
    }
}
