//! Method and path matching for the two endpoints.
//!
//! Routes map a method and a path template to an [`Endpoint`]. Templates use
//! `{name}` segments for parameters; empty segments are ignored, so
//! `/archive/abc123` and `/archive/abc123/` match the same route.
//! Parameters are percent-decoded; a segment that doesn't decode to UTF-8
//! matches nothing.
//!
//! # Example
//!
//! ```rust
//! use http::Method;
//! use photopack_server::{Endpoint, Router};
//!
//! let router = Router::with_default_routes();
//!
//! let m = router.match_route(&Method::GET, "/archive/abc123/").unwrap();
//! assert_eq!(m.endpoint(), Endpoint::Archive);
//! assert_eq!(m.param("archive_hash"), Some("abc123"));
//! ```

use std::collections::HashMap;

use http::Method;

/// Path parameter carrying the archive identifier.
pub const ARCHIVE_PARAM: &str = "archive_hash";

/// What a request is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// The static index page.
    Index,
    /// A streamed ZIP archive.
    Archive,
}

/// A matched route with extracted path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    endpoint: Endpoint,
    params: HashMap<String, String>,
}

impl RouteMatch {
    /// Returns the matched endpoint.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Returns a path parameter by name.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct Route {
    method: Method,
    segments: Vec<PathSegment>,
    endpoint: Endpoint,
}

impl Route {
    fn new(method: Method, pattern: &str, endpoint: Endpoint) -> Self {
        Self {
            method,
            segments: Self::parse_segments(pattern),
            endpoint,
        }
    }

    fn parse_segments(pattern: &str) -> Vec<PathSegment> {
        pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PathSegment::Param(name.to_string()),
                None => PathSegment::Literal(s.to_string()),
            })
            .collect()
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        if path_segments.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (pattern, actual) in self.segments.iter().zip(path_segments) {
            match pattern {
                PathSegment::Literal(expected) if expected != actual => return None,
                PathSegment::Literal(_) => {}
                PathSegment::Param(name) => {
                    // Not UTF-8 once decoded: no album can have that name.
                    let value = urlencoding::decode(actual).ok()?;
                    params.insert(name.clone(), value.into_owned());
                }
            }
        }

        Some(params)
    }
}

/// HTTP request router.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Creates a router serving `GET /` and `GET /archive/{archive_hash}/`.
    #[must_use]
    pub fn with_default_routes() -> Self {
        let mut router = Self::new();
        router.add_route(Method::GET, "/", Endpoint::Index);
        router.add_route(
            Method::GET,
            format!("/archive/{{{ARCHIVE_PARAM}}}/"),
            Endpoint::Archive,
        );
        router
    }

    /// Adds a route. Routes are tried in insertion order.
    pub fn add_route(&mut self, method: Method, pattern: impl AsRef<str>, endpoint: Endpoint) {
        self.routes
            .push(Route::new(method, pattern.as_ref(), endpoint));
    }

    /// Returns the number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Matches a request to a route.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route.match_path(path).map(|params| RouteMatch {
                    endpoint: route.endpoint,
                    params,
                })
            })
    }

    /// Returns `true` if any route matches `path`, whatever its method.
    ///
    /// Used to tell 405 apart from 404.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        self.routes
            .iter()
            .any(|route| route.match_path(path).is_some())
    }
}
