//! Minimal method + path router.
//!
//! Path patterns support static segments (`/report`), named parameters
//! (`/report/{api_key}`) and a trailing splat (`/report/*`). Trailing slashes
//! are ignored on both the pattern and the request path.

use http::Method;
use std::collections::HashMap;

#[derive(Debug)]
enum PathSegment {
    Static(String),
    Param(String),
}

#[derive(Debug)]
struct Path {
    segments: Vec<PathSegment>,
    has_trailing_splat: bool,
}

impl Path {
    fn parse(path_str: &str) -> Self {
        let mut normalized_path = path_str.trim().trim_matches('/');

        let mut has_trailing_splat = false;
        if normalized_path == "*" {
            has_trailing_splat = true;
            normalized_path = "";
        } else if let Some(stripped) = normalized_path.strip_suffix("/*") {
            has_trailing_splat = true;
            normalized_path = stripped;
        }

        let segments: Vec<PathSegment> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path
                .split('/')
                .map(|s| {
                    if let Some(stripped) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                        PathSegment::Param(stripped.to_string())
                    } else {
                        PathSegment::Static(s.to_string())
                    }
                })
                .collect()
        };

        Path {
            segments,
            has_trailing_splat,
        }
    }

    /// Returns the captured parameters if `request_path` matches this pattern.
    fn matches<'a>(&self, request_path: &'a str) -> Option<HashMap<String, &'a str>> {
        let normalized_path = request_path.trim().trim_matches('/');

        let request_segments: Vec<&'a str> = if normalized_path.is_empty() {
            vec![]
        } else {
            normalized_path.split('/').collect()
        };

        let mut params = HashMap::new();

        for (i, seg) in self.segments.iter().enumerate() {
            let req_segment = *request_segments.get(i)?;
            match seg {
                PathSegment::Static(s) => {
                    if req_segment != s {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), req_segment);
                }
            }
        }

        if self.has_trailing_splat || self.segments.len() == request_segments.len() {
            Some(params)
        } else {
            None
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct RouteMatch<'a, A> {
    pub params: HashMap<String, &'a str>,
    pub action: &'a A,
}

impl<A> RouteMatch<'_, A> {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).copied()
    }
}

#[derive(Debug)]
pub struct Route<A> {
    method: Option<Method>,
    path: Option<Path>,
    action: A,
}

impl<A> Route<A> {
    /// A route without a method matches every method; a route without a path
    /// matches every path.
    pub fn new(method: Option<Method>, path: Option<&str>, action: A) -> Self {
        Self {
            method,
            path: path.map(Path::parse),
            action,
        }
    }

    pub fn matches<'a>(
        &'a self,
        request_method: &Method,
        request_path: &'a str,
    ) -> Option<RouteMatch<'a, A>> {
        if self
            .method
            .as_ref()
            .is_some_and(|method| method != request_method)
        {
            return None;
        }

        let params = match &self.path {
            Some(path) => path.matches(request_path)?,
            None => HashMap::new(),
        };

        Some(RouteMatch {
            params,
            action: &self.action,
        })
    }
}

pub struct RouteActions<A> {
    routes: Vec<Route<A>>,
}

impl<A> RouteActions<A> {
    pub fn new(routes: Vec<Route<A>>) -> Self {
        Self { routes }
    }

    /// Returns the first route matching the request, in declaration order.
    pub fn resolve<'a, B>(&'a self, request: &'a http::Request<B>) -> Option<RouteMatch<'a, A>> {
        let path = request.uri().path();

        self.routes
            .iter()
            .find_map(|route| route.matches(request.method(), path))
    }
}
