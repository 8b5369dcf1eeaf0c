//! Route groups for organizing routes with shared configuration
//!
//! A group carries an optional path prefix and a list of middleware names.
//! Groups entered through [`Router::group`](crate::Router::group) stack: the
//! effective prefix is the concatenation of every enclosing prefix, and the
//! effective middleware list runs outermost group first.
//!
//! # Examples
//!
//! ```
//! use girder_core::RouteGroup;
//!
//! let api = RouteGroup::new().prefix("api").middleware("auth");
//! assert_eq!(api.apply_prefix("/users"), "/api/users");
//! ```

/// Route group configuration
///
/// Absence of a prefix or of middleware means "no effect": nested groups never
/// reset what their parents configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteGroup {
    /// Path prefix for all routes in this group
    prefix: String,

    /// Middleware names applied to all routes, in order
    middleware: Vec<String>,
}

impl RouteGroup {
    /// Create a new route group
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the path prefix for this group
    ///
    /// ```
    /// use girder_core::RouteGroup;
    ///
    /// let group = RouteGroup::new().prefix("api/v1/");
    /// assert_eq!(group.get_prefix(), "/api/v1");
    /// ```
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim().trim_matches('/');

        self.prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("/{}", prefix)
        };
        self
    }

    /// Add a middleware name to this group
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        self.middleware.push(name.into());
        self
    }

    /// Add multiple middleware names to this group
    pub fn with_middleware<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(names.into_iter().map(Into::into));
        self
    }

    /// Get the prefix for this group; empty when none was set
    pub fn get_prefix(&self) -> &str {
        &self.prefix
    }

    /// Get all middleware names for this group
    pub fn get_middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Apply the group's prefix to a path
    pub fn apply_prefix(&self, path: &str) -> String {
        let path = path.trim().trim_matches('/');
        match (self.prefix.is_empty(), path.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => format!("/{}", path),
            (false, true) => self.prefix.clone(),
            (false, false) => format!("{}/{}", self.prefix, path),
        }
    }

    /// Combine this group with a parent group
    ///
    /// The parent's prefix comes first and the parent's middleware runs first.
    pub fn with_parent(&self, parent: &RouteGroup) -> Self {
        let mut middleware = parent.middleware.clone();
        middleware.extend(self.middleware.iter().cloned());

        Self {
            prefix: format!("{}{}", parent.prefix, self.prefix),
            middleware,
        }
    }
}
