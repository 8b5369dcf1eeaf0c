// Dependency injection container

use crate::injection::{downcast_instance, into_instance, registered_reflector};
use crate::logging::{debug, trace};
use crate::{
    Callable, Error, Injectable, Instance, Method, Parameter, ParameterKind, Parameters, Reflector,
    ServiceKey, injection::Arguments,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

thread_local! {
    /// Singletons whose cell is being initialised on this thread, keyed by registry
    static BUILDING: RefCell<Vec<(usize, ServiceKey)>> = const { RefCell::new(Vec::new()) };
}

/// A factory receives the container and the caller's overrides
pub type Factory = Arc<dyn Fn(&Container, &Parameters) -> Result<Instance, Error> + Send + Sync>;

type Upcast = Arc<dyn Fn(Instance) -> Option<Instance> + Send + Sync>;

/// How long a resolved instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Built once on first resolution, then shared for the container's life
    Singleton,
    /// Built on every resolution
    Transient,
}

/// Construction strategy of a binding
#[derive(Clone)]
pub enum Concrete {
    /// Fully manual construction; the parameter walk is skipped
    Factory(Factory),
    /// Build another key, optionally converting the result to the bound type
    Type {
        key: ServiceKey,
        reflector: Option<Reflector>,
        upcast: Option<Upcast>,
    },
}

impl Concrete {
    pub fn factory<T, F>(factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Container, &Parameters) -> Result<Arc<T>, Error> + Send + Sync + 'static,
    {
        Concrete::Factory(Arc::new(
            move |container: &Container, params: &Parameters| {
                factory(container, params).map(into_instance)
            },
        ))
    }

    /// A no-argument factory
    pub fn from_fn<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Concrete::factory(move |_: &Container, _: &Parameters| Ok(Arc::new(factory())))
    }

    /// Autowire `T` through its declared parameters
    pub fn class<T: Injectable>() -> Self {
        Concrete::Type {
            key: ServiceKey::of::<T>(),
            reflector: Some(Reflector::of::<T>()),
            upcast: None,
        }
    }

    /// Autowire `C` and expose it as `I`, typically a `dyn Trait`
    ///
    /// ```
    /// use girder_core::{Arguments, Concrete, Container, Error, Injectable};
    /// use std::sync::Arc;
    ///
    /// trait Clock: Send + Sync {}
    /// struct SystemClock;
    /// impl Clock for SystemClock {}
    /// impl Injectable for SystemClock {
    ///     fn construct(_: Arguments) -> Result<Self, Error> {
    ///         Ok(SystemClock)
    ///     }
    /// }
    ///
    /// let container = Container::new();
    /// container.singleton(
    ///     girder_core::ServiceKey::of::<dyn Clock>(),
    ///     Concrete::implementation::<dyn Clock, SystemClock>(|clock| clock),
    /// );
    /// assert!(container.make::<dyn Clock>().is_ok());
    /// ```
    pub fn implementation<I, C>(upcast: fn(Arc<C>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: Injectable,
    {
        Concrete::Type {
            key: ServiceKey::of::<C>(),
            reflector: Some(Reflector::of::<C>()),
            upcast: Some(Arc::new(move |instance: Instance| {
                downcast_instance::<C>(&instance).map(|concrete| into_instance(upcast(concrete)))
            })),
        }
    }

    /// Resolve through another key of the same type
    pub fn key(key: impl Into<ServiceKey>) -> Self {
        Concrete::Type {
            key: key.into(),
            reflector: None,
            upcast: None,
        }
    }
}

impl fmt::Debug for Concrete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Concrete::Factory(_) => f.write_str("Factory"),
            Concrete::Type { key, .. } => write!(f, "Type({})", key),
        }
    }
}

/// Registry entry mapping an abstract key to a construction strategy
#[derive(Clone, Debug)]
pub struct Binding {
    concrete: Concrete,
    lifetime: Lifetime,
}

impl Binding {
    pub fn concrete(&self) -> &Concrete {
        &self.concrete
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }
}

#[derive(Default)]
struct Registry {
    bindings: RwLock<HashMap<ServiceKey, Binding>>,
    aliases: RwLock<HashMap<String, ServiceKey>>,
    instances: RwLock<HashMap<ServiceKey, Arc<OnceCell<Instance>>>>,
    reflectors: RwLock<HashMap<ServiceKey, Reflector>>,
    reflection_cache: RwLock<HashMap<ServiceKey, Arc<[Parameter]>>>,
}

/// The dependency injection container.
///
/// Bindings, aliases and reflectors are registered during boot and only read
/// while serving. The instance cache is the one structure written during
/// serving: each singleton key owns a compute-once cell, so concurrent first
/// resolutions build exactly one instance. A failed build leaves the cell empty.
#[derive(Clone, Default)]
pub struct Container {
    registry: Arc<Registry>,
}

impl Container {
    pub fn new() -> Self {
        debug!("Creating new DI container");
        Self::default()
    }

    /// Register a transient binding, replacing any previous one for `key`
    pub fn bind(&self, key: impl Into<ServiceKey>, concrete: Concrete) {
        self.bind_with(key, concrete, Lifetime::Transient);
    }

    /// Register a singleton binding, replacing any previous one for `key`
    pub fn singleton(&self, key: impl Into<ServiceKey>, concrete: Concrete) {
        self.bind_with(key, concrete, Lifetime::Singleton);
    }

    pub fn bind_with(&self, key: impl Into<ServiceKey>, concrete: Concrete, lifetime: Lifetime) {
        let key = key.into();

        if let Concrete::Type {
            key: concrete_key,
            reflector: Some(reflector),
            ..
        } = &concrete
        {
            self.registry
                .reflectors
                .write()
                .insert(concrete_key.clone(), *reflector);
        }

        // A stale instance must not outlive the binding it came from
        self.registry.instances.write().remove(&key);

        debug!(service = %key, concrete = ?concrete, lifetime = ?lifetime, "Binding registered");
        self.registry
            .bindings
            .write()
            .insert(key, Binding { concrete, lifetime });
    }

    /// Bind `T` to itself as a transient autowired type
    pub fn bind_type<T: Injectable>(&self) {
        self.bind(ServiceKey::of::<T>(), Concrete::class::<T>());
    }

    /// Bind `T` to itself as a lazily built singleton
    pub fn singleton_type<T: Injectable>(&self) {
        self.singleton(ServiceKey::of::<T>(), Concrete::class::<T>());
    }

    /// Make `T` autowirable in this container without binding it
    pub fn autowire<T: Injectable>(&self) {
        trace!(service = std::any::type_name::<T>(), "Registering reflector");
        self.registry
            .reflectors
            .write()
            .insert(ServiceKey::of::<T>(), Reflector::of::<T>());
    }

    /// Seed the instance cache directly
    pub fn instance<T: ?Sized + Send + Sync + 'static>(&self, key: impl Into<ServiceKey>, value: Arc<T>) {
        let key = key.into();
        debug!(service = %key, "Instance registered");
        self.registry
            .instances
            .write()
            .insert(key, Arc::new(OnceCell::with_value(into_instance(value))));
    }

    /// Seed the instance cache with a value keyed by its own type
    pub fn register<T: Send + Sync + 'static>(&self, value: T) {
        self.instance(ServiceKey::of::<T>(), Arc::new(value));
    }

    /// Make `alias` resolve to `key`
    pub fn alias(&self, key: impl Into<ServiceKey>, alias: impl Into<String>) {
        let key = key.into();
        let alias = alias.into();
        debug!(alias = %alias, service = %key, "Alias registered");
        self.registry.aliases.write().insert(alias, key);
    }

    /// Resolve `T` by type
    pub fn make<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>, Error> {
        self.make_key(ServiceKey::of::<T>(), &Parameters::new())
    }

    /// Resolve `T` by type with named overrides
    pub fn make_with<T: ?Sized + Send + Sync + 'static>(
        &self,
        params: &Parameters,
    ) -> Result<Arc<T>, Error> {
        self.make_key(ServiceKey::of::<T>(), params)
    }

    /// Resolve `key` and view the result as `T`
    pub fn make_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: impl Into<ServiceKey>,
        params: &Parameters,
    ) -> Result<Arc<T>, Error> {
        let key = key.into();
        let instance = self.resolve(&key, params)?;
        downcast_instance::<T>(&instance).ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    /// Resolve `T`, autowiring it from its own metadata when nothing is registered
    pub fn build<T: Injectable>(&self, params: &Parameters) -> Result<Arc<T>, Error> {
        let key = ServiceKey::of::<T>();
        let instance = self.resolve_in(&key, params, &mut Vec::new(), Some(Reflector::of::<T>()))?;
        downcast_instance::<T>(&instance).ok_or_else(|| Error::TypeMismatch {
            key: key.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    /// Untyped resolution
    pub fn resolve(&self, key: &ServiceKey, params: &Parameters) -> Result<Instance, Error> {
        self.resolve_in(key, params, &mut Vec::new(), None)
    }

    /// Invoke a callable, resolving each declared parameter
    pub fn call<R>(&self, callable: &Callable<R>, params: &Parameters) -> Result<R, Error> {
        trace!(callable = callable.name(), "Calling with injected parameters");
        let args =
            self.resolve_parameters(callable.name(), callable.parameters(), params, &mut Vec::new())?;
        callable.invoke(args)
    }

    /// Invoke `method` on `receiver`, resolving each declared parameter
    pub fn call_method<T: ?Sized + Send + Sync + 'static, R: 'static>(
        &self,
        receiver: Arc<T>,
        method: &Method<T, R>,
        params: &Parameters,
    ) -> Result<R, Error> {
        self.call(&method.bind(receiver), params)
    }

    /// Whether `key` has a binding, a cached instance, or is an alias
    pub fn has(&self, key: impl Into<ServiceKey>) -> bool {
        let key = key.into();
        if let ServiceKey::Name(name) = &key {
            if self.registry.aliases.read().contains_key(name.as_ref()) {
                return true;
            }
        }
        self.bound(&key) || self.resolved(&key)
    }

    pub fn bound(&self, key: &ServiceKey) -> bool {
        self.registry.bindings.read().contains_key(key)
    }

    /// Whether a cached instance exists for `key`
    pub fn resolved(&self, key: &ServiceKey) -> bool {
        self.registry
            .instances
            .read()
            .get(key)
            .is_some_and(|cell| cell.get().is_some())
    }

    pub fn is_singleton(&self, key: &ServiceKey) -> bool {
        self.registry
            .bindings
            .read()
            .get(key)
            .is_some_and(|binding| binding.lifetime == Lifetime::Singleton)
    }

    pub fn binding(&self, key: &ServiceKey) -> Option<Binding> {
        self.registry.bindings.read().get(key).cloned()
    }

    /// Drop the binding, cached instance and alias registered under `key`
    pub fn forget(&self, key: impl Into<ServiceKey>) {
        let key = key.into();
        let canonical = self.canonical(&key).unwrap_or_else(|_| key.clone());

        if let ServiceKey::Name(name) = &key {
            self.registry.aliases.write().remove(name.as_ref());
        }
        for key in [&key, &canonical] {
            self.registry.bindings.write().remove(key);
            self.registry.instances.write().remove(key);
        }
        debug!(service = %key, "Service forgotten");
    }

    /// Remove every binding, alias, instance and reflector
    pub fn clear(&self) {
        let count = self.registry.bindings.read().len();
        self.registry.bindings.write().clear();
        self.registry.aliases.write().clear();
        self.registry.instances.write().clear();
        self.registry.reflectors.write().clear();
        self.registry.reflection_cache.write().clear();

        debug!(binding_count = count, "Cleared container");
    }

    fn resolve_in(
        &self,
        key: &ServiceKey,
        params: &Parameters,
        stack: &mut Vec<ServiceKey>,
        fallback: Option<Reflector>,
    ) -> Result<Instance, Error> {
        let key = self.canonical(key)?;
        trace!(service = %key, "Resolving service");

        if let Some(instance) = self.cached(&key) {
            trace!(service = %key, "Returning cached instance");
            return Ok(instance);
        }

        if stack.contains(&key) {
            let chain = stack
                .iter()
                .chain(std::iter::once(&key))
                .map(ServiceKey::name)
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(Error::CircularDependency(chain));
        }

        let binding = self.registry.bindings.read().get(&key).cloned();
        let singleton = binding
            .as_ref()
            .is_some_and(|binding| binding.lifetime == Lifetime::Singleton);

        stack.push(key.clone());
        let result = if singleton {
            let cell = self
                .registry
                .instances
                .write()
                .entry(key.clone())
                .or_default()
                .clone();
            let marker = (Arc::as_ptr(&self.registry) as usize, key.clone());
            if BUILDING.with(|building| building.borrow().contains(&marker)) {
                stack.pop();
                let name = key.name();
                return Err(Error::CircularDependency(format!("{} -> {}", name, name)));
            }

            BUILDING.with(|building| building.borrow_mut().push(marker.clone()));
            let result = cell
                .get_or_try_init(|| {
                    self.build_binding(&key, binding.as_ref(), params, stack, fallback)
                })
                .cloned();
            BUILDING.with(|building| {
                let mut building = building.borrow_mut();
                if let Some(index) = building.iter().rposition(|entry| *entry == marker) {
                    building.remove(index);
                }
            });
            result
        } else {
            self.build_binding(&key, binding.as_ref(), params, stack, fallback)
        };
        stack.pop();

        if singleton && result.is_ok() {
            debug!(service = %key, "Singleton instance cached");
        }
        result
    }

    fn build_binding(
        &self,
        key: &ServiceKey,
        binding: Option<&Binding>,
        params: &Parameters,
        stack: &mut Vec<ServiceKey>,
        fallback: Option<Reflector>,
    ) -> Result<Instance, Error> {
        match binding.map(|binding| &binding.concrete) {
            Some(Concrete::Factory(factory)) => {
                trace!(service = %key, "Invoking factory");
                factory(self, params)
            }
            Some(Concrete::Type {
                key: concrete,
                upcast,
                ..
            }) if concrete != key => {
                let instance = self.resolve_in(concrete, params, stack, None)?;
                match upcast {
                    Some(upcast) => upcast(instance).ok_or_else(|| Error::TypeMismatch {
                        key: key.to_string(),
                        expected: concrete.to_string(),
                    }),
                    None => Ok(instance),
                }
            }
            _ => self.build_reflected(key, params, stack, fallback),
        }
    }

    fn build_reflected(
        &self,
        key: &ServiceKey,
        params: &Parameters,
        stack: &mut Vec<ServiceKey>,
        fallback: Option<Reflector>,
    ) -> Result<Instance, Error> {
        let reflector = self
            .reflector_for(key)
            .or(fallback)
            .ok_or_else(|| match key {
                ServiceKey::Type { name, .. } => Error::NotInstantiable(name.to_string()),
                ServiceKey::Name(name) => Error::TargetNotFound(name.to_string()),
            })?;

        let parameters = self.reflect(key, &reflector);
        let args = self.resolve_parameters(reflector.type_name(), &parameters, params, stack)?;

        debug!(service = %key, parameters = parameters.len(), "Building service");
        reflector.construct(args)
    }

    fn resolve_parameters(
        &self,
        target: &str,
        parameters: &[Parameter],
        params: &Parameters,
        stack: &mut Vec<ServiceKey>,
    ) -> Result<Arguments, Error> {
        let mut args = Arguments::new(target);
        for parameter in parameters {
            let value = self.resolve_parameter(target, parameter, params, stack)?;
            args.push(parameter.name(), value);
        }
        Ok(args)
    }

    fn resolve_parameter(
        &self,
        target: &str,
        parameter: &Parameter,
        params: &Parameters,
        stack: &mut Vec<ServiceKey>,
    ) -> Result<Instance, Error> {
        if let Some(value) = params.named(parameter.name()) {
            return Ok(value.clone());
        }

        let unresolvable = |reason: String| Error::UnresolvableDependency {
            target: target.to_string(),
            parameter: parameter.name().to_string(),
            reason,
        };

        match parameter.kind() {
            ParameterKind::Service(key) => {
                if let Some(value) = key.type_id().and_then(|id| params.find_by_type(id)) {
                    return Ok(value.clone());
                }
                match self.resolve_in(key, &Parameters::new(), stack, None) {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_missing_target() => parameter
                        .default_value()
                        .ok_or_else(|| unresolvable(err.to_string())),
                    Err(err) => Err(err),
                }
            }
            ParameterKind::Primitive(type_name) => parameter
                .default_value()
                .ok_or_else(|| unresolvable(format!("no value supplied for {}", type_name))),
        }
    }

    fn canonical(&self, key: &ServiceKey) -> Result<ServiceKey, Error> {
        let aliases = self.registry.aliases.read();
        let mut current = key.clone();
        let mut seen: Vec<String> = Vec::new();

        while let ServiceKey::Name(name) = &current {
            let Some(target) = aliases.get(name.as_ref()) else {
                break;
            };
            let looped = seen.iter().any(|previous| previous == name.as_ref());
            seen.push(name.to_string());
            if looped {
                return Err(Error::CircularAlias(seen.join(" -> ")));
            }
            current = target.clone();
        }

        Ok(current)
    }

    fn cached(&self, key: &ServiceKey) -> Option<Instance> {
        self.registry
            .instances
            .read()
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    fn reflector_for(&self, key: &ServiceKey) -> Option<Reflector> {
        self.registry
            .reflectors
            .read()
            .get(key)
            .copied()
            .or_else(|| registered_reflector(key))
    }

    fn reflect(&self, key: &ServiceKey, reflector: &Reflector) -> Arc<[Parameter]> {
        if let Some(parameters) = self.registry.reflection_cache.read().get(key) {
            return parameters.clone();
        }
        let parameters: Arc<[Parameter]> = reflector.parameters().into();
        self.registry
            .reflection_cache
            .write()
            .entry(key.clone())
            .or_insert(parameters)
            .clone()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.registry.bindings.read().len())
            .field("aliases", &self.registry.aliases.read().len())
            .field("instances", &self.registry.instances.read().len())
            .finish()
    }
}
