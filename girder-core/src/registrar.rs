// Route registration records

use crate::logging::warn;
use crate::{Action, Error, HttpMethod};
use regex::Regex;
use std::collections::HashMap;

/// One registered route.
///
/// The path is stored with its group prefix already applied. Name and
/// middleware may still be changed while the router is being built; once the
/// router is handed to an application it is only read.
#[derive(Clone, Debug)]
pub struct Registrar {
    method: HttpMethod,
    path: String,
    action: Action,
    middleware: Vec<String>,
    name: Option<String>,
    pattern: Option<Regex>,
}

impl Registrar {
    pub fn new(method: HttpMethod, path: impl Into<String>, action: impl Into<Action>) -> Self {
        let path = normalize_path(&path.into());
        let pattern = match compile_pattern(&path) {
            Ok(pattern) => pattern,
            Err(err) => {
                warn!(path = %path, error = %err, "Route template does not compile, it will only match literally");
                None
            }
        };

        Self {
            method,
            path,
            action: action.into(),
            middleware: Vec::new(),
            name: None,
            pattern,
        }
    }

    /// Name the route for lookup and URL generation
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    /// Append middleware names after any inherited from enclosing groups
    pub fn middleware<I, S>(&mut self, middleware: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.middleware.extend(middleware.into_iter().map(Into::into));
        self
    }

    pub fn get_method(&self) -> HttpMethod {
        self.method
    }

    pub fn get_path(&self) -> &str {
        &self.path
    }

    pub fn get_action(&self) -> &Action {
        &self.action
    }

    pub fn get_middleware(&self) -> &[String] {
        &self.middleware
    }

    pub fn get_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the path contains `{name}` segments
    pub fn is_templated(&self) -> bool {
        self.pattern.is_some()
    }

    /// Match a normalized path against the route template, returning the
    /// percent-decoded captures
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let pattern = self.pattern.as_ref()?;
        let captures = pattern.captures(path)?;

        Some(
            pattern
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    captures.name(name).map(|value| {
                        let raw = value.as_str();
                        let decoded = urlencoding::decode(raw)
                            .map_or_else(|_| raw.to_string(), |value| value.into_owned());
                        (name.to_string(), decoded)
                    })
                })
                .collect(),
        )
    }

    /// Build a URL for this route.
    ///
    /// Parameters named in the template are substituted; the rest are
    /// appended as a query string in key order.
    pub fn url(&self, params: &HashMap<String, String>) -> Result<String, Error> {
        let mut url = String::with_capacity(self.path.len());
        let mut used = Vec::new();
        let mut rest = self.path.as_str();

        while let Some((before, name, after)) = next_placeholder(rest) {
            url.push_str(before);
            match name {
                Some(name) => {
                    let value = params.get(name).ok_or_else(|| {
                        Error::UrlGeneration(format!(
                            "missing parameter [{}] for route {}",
                            name, self.path
                        ))
                    })?;
                    url.push_str(&urlencoding::encode(value));
                    used.push(name);
                }
                None => url.push_str(&rest[before.len()..rest.len() - after.len()]),
            }
            rest = after;
        }
        url.push_str(rest);

        let mut extra: Vec<_> = params
            .iter()
            .filter(|(key, _)| !used.contains(&key.as_str()))
            .collect();
        if !extra.is_empty() {
            extra.sort();
            let query = extra
                .into_iter()
                .map(|(key, value)| {
                    format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
                })
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&query);
        }

        Ok(url)
    }
}

/// Collapse a path to a single leading slash and no trailing slash
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    format!("/{}", trimmed)
}

/// Split off the next `{...}` block: text before it, its name if it is a
/// valid identifier, and the text after it
fn next_placeholder(input: &str) -> Option<(&str, Option<&str>, &str)> {
    let start = input.find('{')?;
    let len = input[start + 1..].find('}')?;
    let name = &input[start + 1..start + 1 + len];
    let valid = !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    Some((
        &input[..start],
        valid.then_some(name),
        &input[start + len + 2..],
    ))
}

/// Compile `{name}` segments into named captures over non-slash runs.
///
/// Returns `Ok(None)` for literal paths, which only ever match exactly.
fn compile_pattern(path: &str) -> Result<Option<Regex>, regex::Error> {
    let mut pattern = String::from("^");
    let mut templated = false;
    let mut rest = path;

    while let Some((before, name, after)) = next_placeholder(rest) {
        pattern.push_str(&regex::escape(before));
        match name {
            Some(name) => {
                pattern.push_str(&format!("(?P<{}>[^/]+)", name));
                templated = true;
            }
            None => pattern.push_str(&regex::escape(
                &rest[before.len()..rest.len() - after.len()],
            )),
        }
        rest = after;
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');

    if !templated {
        return Ok(None);
    }
    Regex::new(&pattern).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HttpRequest, handler};

    fn registrar(path: &str) -> Registrar {
        Registrar::new(
            HttpMethod::GET,
            path,
            handler(|_req: HttpRequest| async { Ok("ok") }),
        )
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(""), "/");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("users/"), "/users");
        assert_eq!(normalize_path("//api/users//"), "/api/users");
    }

    #[test]
    fn test_literal_path_is_not_templated() {
        let route = registrar("/users");
        assert!(!route.is_templated());
        assert!(route.captures("/users").is_none());
    }

    #[test]
    fn test_captures_single_parameter() {
        let route = registrar("/users/{id}");
        let params = route.captures("/users/42").unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));

        assert!(route.captures("/users/42/posts").is_none());
        assert!(route.captures("/users").is_none());
    }

    #[test]
    fn test_captures_are_percent_decoded() {
        let route = registrar("/files/{name}");
        let params = route.captures("/files/annual%20report").unwrap();
        assert_eq!(params.get("name"), Some(&"annual report".to_string()));

        let params = route.captures("/files/%FF").unwrap();
        assert_eq!(params.get("name"), Some(&"%FF".to_string()));
    }

    #[test]
    fn test_captures_multiple_parameters() {
        let route = registrar("/users/{user_id}/posts/{post_id}");
        let params = route.captures("/users/1/posts/abc-9").unwrap();
        assert_eq!(params.get("user_id"), Some(&"1".to_string()));
        assert_eq!(params.get("post_id"), Some(&"abc-9".to_string()));
    }

    #[test]
    fn test_literal_text_is_escaped() {
        let route = registrar("/files/{name}.json");
        assert!(route.captures("/files/report.json").is_some());
        assert!(route.captures("/files/reportxjson").is_none());
    }

    #[test]
    fn test_invalid_template_never_matches() {
        // duplicate capture names do not compile
        let route = registrar("/{id}/{id}");
        assert!(!route.is_templated());
        assert!(route.captures("/1/2").is_none());
    }

    #[test]
    fn test_url_generation() {
        let mut route = registrar("/users/{id}");
        route.name("users.show");

        let mut params = HashMap::new();
        params.insert("id".to_string(), "7".to_string());
        params.insert("tab".to_string(), "posts".to_string());
        assert_eq!(route.url(&params).unwrap(), "/users/7?tab=posts");

        assert!(matches!(
            route.url(&HashMap::new()),
            Err(Error::UrlGeneration(_))
        ));
    }

    #[test]
    fn test_middleware_appends() {
        let mut route = registrar("/");
        route.middleware(["auth"]).middleware(vec!["throttle".to_string()]);
        assert_eq!(route.get_middleware(), ["auth", "throttle"]);
    }
}
