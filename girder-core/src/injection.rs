//! Injection metadata used by the container in place of runtime reflection.
//!
//! A type opts into autowiring by implementing [`Injectable`]: it declares its
//! constructor parameters as [`Parameter`] metadata and builds itself from the
//! resolved [`Arguments`]. The container walks the parameter list exactly the
//! way it would walk a reflected constructor.
//!
//! ```
//! use girder_core::{Arguments, Container, Error, Injectable, Parameter};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Injectable for Database {
//!     fn parameters() -> Vec<Parameter> {
//!         vec![Parameter::primitive::<String>("url").default("sqlite::memory:".to_string())]
//!     }
//!
//!     fn construct(args: Arguments) -> Result<Self, Error> {
//!         Ok(Self { url: args.value("url")? })
//!     }
//! }
//!
//! let container = Container::new();
//! let db: Arc<Database> = container.build::<Database>(&Default::default()).unwrap();
//! assert_eq!(db.url, "sqlite::memory:");
//! ```

use crate::Error;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A resolved value as stored by the container.
///
/// The payload is always an `Arc<T>` so that unsized service types
/// (`dyn Trait`) and sized ones are handled the same way.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Wrap a shared value into an [`Instance`]
pub fn into_instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Instance {
    Arc::new(value)
}

/// Recover the shared value from an [`Instance`]
pub fn downcast_instance<T: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Arc<T>> {
    instance.downcast_ref::<Arc<T>>().cloned()
}

/// Identifies a binding in the container: a type or a string name
#[derive(Clone)]
pub enum ServiceKey {
    Type { id: TypeId, name: &'static str },
    Name(Cow<'static, str>),
}

impl ServiceKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        ServiceKey::Type {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        ServiceKey::Name(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            ServiceKey::Type { name, .. } => name,
            ServiceKey::Name(name) => name,
        }
    }

    pub fn type_id(&self) -> Option<TypeId> {
        match self {
            ServiceKey::Type { id, .. } => Some(*id),
            ServiceKey::Name(_) => None,
        }
    }
}

impl PartialEq for ServiceKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ServiceKey::Type { id: a, .. }, ServiceKey::Type { id: b, .. }) => a == b,
            (ServiceKey::Name(a), ServiceKey::Name(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ServiceKey::Type { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            ServiceKey::Name(name) => {
                1u8.hash(state);
                name.hash(state);
            }
        }
    }
}

impl fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKey::Type { name, .. } => write!(f, "Type({})", name),
            ServiceKey::Name(name) => write!(f, "Name({})", name),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&'static str> for ServiceKey {
    fn from(name: &'static str) -> Self {
        ServiceKey::Name(Cow::Borrowed(name))
    }
}

impl From<String> for ServiceKey {
    fn from(name: String) -> Self {
        ServiceKey::Name(Cow::Owned(name))
    }
}

impl From<&ServiceKey> for ServiceKey {
    fn from(key: &ServiceKey) -> Self {
        key.clone()
    }
}

type DefaultValue = Arc<dyn Fn() -> Instance + Send + Sync>;

/// What a declared parameter expects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    /// A class or interface the container can resolve
    Service(ServiceKey),
    /// A scalar; only named overrides or a default can satisfy it
    Primitive(&'static str),
}

/// One declared constructor or method parameter
#[derive(Clone)]
pub struct Parameter {
    name: &'static str,
    kind: ParameterKind,
    default: Option<DefaultValue>,
}

impl Parameter {
    /// A parameter typed as service `T` (sized or `dyn Trait`)
    pub fn service<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            kind: ParameterKind::Service(ServiceKey::of::<T>()),
            default: None,
        }
    }

    /// A parameter resolved through an explicit container key
    pub fn keyed(name: &'static str, key: impl Into<ServiceKey>) -> Self {
        Self {
            name,
            kind: ParameterKind::Service(key.into()),
            default: None,
        }
    }

    pub fn primitive<T: ?Sized + 'static>(name: &'static str) -> Self {
        Self {
            name,
            kind: ParameterKind::Primitive(std::any::type_name::<T>()),
            default: None,
        }
    }

    /// Declare a default value used when nothing else satisfies the parameter
    pub fn default<V: Clone + Send + Sync + 'static>(mut self, value: V) -> Self {
        self.default = Some(Arc::new(move || into_instance(Arc::new(value.clone()))));
        self
    }

    /// Declare a shared default, e.g. a fallback `Arc<dyn Trait>`
    pub fn default_shared<V: ?Sized + Send + Sync + 'static>(mut self, value: Arc<V>) -> Self {
        self.default = Some(Arc::new(move || into_instance(value.clone())));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> &ParameterKind {
        &self.kind
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub(crate) fn default_value(&self) -> Option<Instance> {
        self.default.as_ref().map(|make| make())
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("has_default", &self.has_default())
            .finish()
    }
}

#[derive(Clone)]
struct Override {
    name: String,
    type_id: TypeId,
    value: Instance,
}

/// Caller-supplied overrides for `make` and `call`.
///
/// Entries are matched by parameter name first, then by runtime type.
#[derive(Clone, Default)]
pub struct Parameters {
    entries: Vec<Override>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.insert(name, Arc::new(value));
        self
    }

    pub fn with_shared<T: ?Sized + Send + Sync + 'static>(
        mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace the entry called `name`
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, name: impl Into<String>, value: Arc<T>) {
        let name = name.into();
        self.entries.retain(|entry| entry.name != name);
        self.entries.push(Override {
            name,
            type_id: TypeId::of::<T>(),
            value: into_instance(value),
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn named(&self, name: &str) -> Option<&Instance> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.value)
    }

    pub(crate) fn find_by_type(&self, type_id: TypeId) -> Option<&Instance> {
        self.entries
            .iter()
            .find(|entry| entry.type_id == type_id)
            .map(|entry| &entry.value)
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| &entry.name))
            .finish()
    }
}

/// Resolved values for every declared parameter, in declaration order
pub struct Arguments {
    target: String,
    values: Vec<(&'static str, Instance)>,
}

impl Arguments {
    pub(crate) fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            values: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &'static str, value: Instance) {
        self.values.push((name, value));
    }

    /// Fetch a resolved argument as a shared value
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, Error> {
        let instance = self
            .values
            .iter()
            .find(|(declared, _)| *declared == name)
            .map(|(_, value)| value)
            .ok_or_else(|| Error::UnresolvableDependency {
                target: self.target.clone(),
                parameter: name.to_string(),
                reason: "parameter was not declared".to_string(),
            })?;

        downcast_instance::<T>(instance).ok_or_else(|| Error::TypeMismatch {
            key: format!("{}::{}", self.target, name),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    /// Fetch a resolved argument by value
    pub fn value<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T, Error> {
        self.get::<T>(name).map(|value| (*value).clone())
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Types the container can build by walking their declared parameters
pub trait Injectable: Sized + Send + Sync + 'static {
    /// Constructor parameters in declaration order
    fn parameters() -> Vec<Parameter> {
        Vec::new()
    }

    fn construct(args: Arguments) -> Result<Self, Error>;
}

/// Type-erased constructor metadata for one [`Injectable`] type
#[derive(Clone, Copy)]
pub struct Reflector {
    type_name: &'static str,
    parameters: fn() -> Vec<Parameter>,
    construct: fn(Arguments) -> Result<Instance, Error>,
}

impl Reflector {
    pub fn of<T: Injectable>() -> Self {
        Self {
            type_name: std::any::type_name::<T>(),
            parameters: T::parameters,
            construct: construct_erased::<T>,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn parameters(&self) -> Vec<Parameter> {
        (self.parameters)()
    }

    pub(crate) fn construct(&self, args: Arguments) -> Result<Instance, Error> {
        (self.construct)(args)
    }
}

impl fmt::Debug for Reflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reflector")
            .field("type_name", &self.type_name)
            .finish()
    }
}

fn construct_erased<T: Injectable>(args: Arguments) -> Result<Instance, Error> {
    T::construct(args).map(|value| into_instance(Arc::new(value)))
}

/// Link-time registration of an injectable type, submitted by [`injectable!`](crate::injectable)
pub struct InjectableEntry {
    key: fn() -> ServiceKey,
    reflector: fn() -> Reflector,
}

impl InjectableEntry {
    pub const fn new<T: Injectable>() -> Self {
        Self {
            key: ServiceKey::of::<T>,
            reflector: Reflector::of::<T>,
        }
    }
}

inventory::collect!(InjectableEntry);

static REGISTERED: Lazy<HashMap<ServiceKey, Reflector>> = Lazy::new(|| {
    inventory::iter::<InjectableEntry>
        .into_iter()
        .map(|entry| ((entry.key)(), (entry.reflector)()))
        .collect()
});

/// Reflector registered process-wide through `injectable!`
pub(crate) fn registered_reflector(key: &ServiceKey) -> Option<Reflector> {
    REGISTERED.get(key).copied()
}

/// Register types for autowiring in every container of the process
#[macro_export]
macro_rules! injectable {
    ($($ty:ty),+ $(,)?) => {
        $(
            $crate::inventory::submit! {
                $crate::InjectableEntry::new::<$ty>()
            }
        )+
    };
}

/// A closure with declared parameters, invocable through `Container::call`
pub struct Callable<R> {
    name: Cow<'static, str>,
    parameters: Arc<[Parameter]>,
    body: Arc<dyn Fn(Arguments) -> Result<R, Error> + Send + Sync>,
}

impl<R> Clone for Callable<R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            parameters: self.parameters.clone(),
            body: self.body.clone(),
        }
    }
}

impl<R> Callable<R> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, parameters: Vec<Parameter>, body: F) -> Self
    where
        F: Fn(Arguments) -> Result<R, Error> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            parameters: parameters.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub(crate) fn invoke(&self, args: Arguments) -> Result<R, Error> {
        (self.body)(args)
    }
}

impl<R> fmt::Debug for Callable<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish()
    }
}

/// A method of `T` with declared parameters; bind it to a receiver to call it
pub struct Method<T: ?Sized, R> {
    name: &'static str,
    parameters: Arc<[Parameter]>,
    body: Arc<dyn Fn(Arc<T>, Arguments) -> Result<R, Error> + Send + Sync>,
}

impl<T: ?Sized, R> Clone for Method<T, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            parameters: self.parameters.clone(),
            body: self.body.clone(),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static, R: 'static> Method<T, R> {
    pub fn new<F>(name: &'static str, parameters: Vec<Parameter>, body: F) -> Self
    where
        F: Fn(Arc<T>, Arguments) -> Result<R, Error> + Send + Sync + 'static,
    {
        Self {
            name,
            parameters: parameters.into(),
            body: Arc::new(body),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Bind the method to `receiver`, producing a plain callable
    pub fn bind(&self, receiver: Arc<T>) -> Callable<R> {
        let body = self.body.clone();
        Callable {
            name: format!("{}::{}", std::any::type_name::<T>(), self.name).into(),
            parameters: self.parameters.clone(),
            body: Arc::new(move |args| body(receiver.clone(), args)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_service_key_equality() {
        assert_eq!(ServiceKey::of::<String>(), ServiceKey::of::<String>());
        assert_ne!(ServiceKey::of::<String>(), ServiceKey::of::<u32>());
        assert_eq!(ServiceKey::named("clock"), ServiceKey::from("clock"));
        assert_ne!(ServiceKey::named("alloc::string::String"), ServiceKey::of::<String>());
    }

    #[test]
    fn test_instance_roundtrip_for_trait_objects() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let instance = into_instance(greeter.clone());

        let back = downcast_instance::<dyn Greeter>(&instance).unwrap();
        assert!(Arc::ptr_eq(&greeter, &back));
        assert!(downcast_instance::<English>(&instance).is_none());
    }

    #[test]
    fn test_parameters_match_by_name_and_type() {
        let params = Parameters::new().with("id", 42u64).with("name", "ada".to_string());

        assert!(params.contains("id"));
        assert!(params.named("name").is_some());
        assert!(params.find_by_type(TypeId::of::<u64>()).is_some());
        assert!(params.find_by_type(TypeId::of::<i32>()).is_none());
    }

    #[test]
    fn test_parameters_insert_replaces() {
        let mut params = Parameters::new().with("id", 1u64);
        params.insert("id", Arc::new(2u64));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_arguments_type_mismatch() {
        let mut args = Arguments::new("Report");
        args.push("count", into_instance(Arc::new(3usize)));

        assert_eq!(args.value::<usize>("count").unwrap(), 3);
        assert!(matches!(
            args.get::<String>("count"),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            args.get::<usize>("missing"),
            Err(Error::UnresolvableDependency { .. })
        ));
    }

    #[test]
    fn test_method_bind_keeps_receiver() {
        let method: Method<dyn Greeter, String> =
            Method::new("greet", vec![], |this: Arc<dyn Greeter>, _args| Ok(this.greet()));
        let callable = method.bind(Arc::new(English));

        assert!(callable.name().ends_with("::greet"));
        assert_eq!(callable.invoke(Arguments::new("test")).unwrap(), "hello");
    }
}
