//! Protected routes and the index used to look them up.
//!
//! Matching is exact-string on the path and exact on the verb. A route declared with
//! path `"*"` protects every path for its method; once any wildcard route exists, all
//! lookups are answered against the wildcard entry.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Path that protects every path for the route's method.
pub const WILDCARD_PATH: &str = "*";

/// HTTP verbs a route can protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Options,
    Head,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Options => "options",
            Method::Head => "head",
            Method::Delete => "delete",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a verb outside the supported set is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown method: {}", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "options" => Ok(Method::Options),
            "head" => Ok(Method::Head),
            "delete" => Ok(Method::Delete),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

/// A protected `(path, method)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub path: String,
    pub method: Method,
}

impl Route {
    pub fn new(path: impl Into<String>, method: Method) -> Self {
        Self { path: path.into(), method }
    }

    /// Protect every path for `method`.
    pub fn wildcard(method: Method) -> Self {
        Self::new(WILDCARD_PATH, method)
    }

    pub fn is_wildcard(&self) -> bool {
        self.path == WILDCARD_PATH
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.path.is_empty() {
            return Err(ConfigError::InvalidRoute {
                path: self.path.clone(),
                reason: "path cannot be empty",
            });
        }
        if self.path.chars().any(|c| c.is_control()) {
            return Err(ConfigError::InvalidRoute {
                path: self.path.clone(),
                reason: "path cannot contain control characters",
            });
        }
        Ok(())
    }
}

/// Immutable lookup structure built once from the declared routes.
#[derive(Debug, Clone, Default)]
pub struct RouteIndex {
    paths: HashMap<String, HashSet<Method>>,
    wildcard: Option<HashSet<Method>>,
}

impl RouteIndex {
    /// Fold the route list into path -> methods, keeping the wildcard entry separate.
    pub fn build(routes: &[Route]) -> Self {
        routes.iter().fold(Self::default(), |mut index, route| {
            if route.is_wildcard() {
                index.wildcard.get_or_insert_with(HashSet::new).insert(route.method);
            } else {
                index.paths.entry(route.path.clone()).or_default().insert(route.method);
            }
            index
        })
    }

    pub fn is_protected(&self, path: &str, method: Method) -> bool {
        match &self.wildcard {
            Some(methods) => methods.contains(&method),
            None => self.paths.get(path).is_some_and(|methods| methods.contains(&method)),
        }
    }

    /// Same as [`is_protected`](Self::is_protected) for a verb given as text.
    /// Verbs outside [`Method`] are never protected.
    pub fn is_protected_str(&self, path: &str, method: &str) -> bool {
        method.parse().map(|m| self.is_protected(path, m)).unwrap_or(false)
    }

    pub fn protects_all(&self) -> bool {
        self.wildcard.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.wildcard.is_none()
    }
}
