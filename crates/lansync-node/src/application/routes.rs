//! Declarative route table for the transfer server.
//!
//! Routes are checked top to bottom; the first match wins.  The standard
//! table is:
//!
//! | # | Method  | Path             | Route         | Auth                |
//! |---|---------|------------------|---------------|---------------------|
//! | 1 | OPTIONS | any              | `Preflight`   | no                  |
//! | 2 | POST    | `/api/login`     | `Login`       | no                  |
//! | 3 | GET     | `/api/files`     | `ListFiles`   | yes                 |
//! | 4 | POST    | `/api/upload`    | `Upload`      | per policy          |
//! | 5 | GET     | `/{name}`        | `Download`    | no                  |
//! | 6 | GET     | any other        | `StaticAsset` | no                  |
//!
//! `/{name}` means exactly one non-empty path segment.  A `Download` whose
//! name is not in the catalog falls through to the static asset lookup in the
//! handler, so `/index.html` or `/favicon.ico` still reach the browser
//! bundle.  Anything unmatched is a 404.

use lansync_core::Method;

/// What a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Login,
    ListFiles,
    Upload,
    Download,
    StaticAsset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathPattern {
    Any,
    Exact(&'static str),
    /// One non-empty segment, e.g. `/report.pdf`.
    SingleSegment,
}

impl PathPattern {
    fn matches(self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => path == expected,
            Self::SingleSegment => {
                let rest = match path.strip_prefix('/') {
                    Some(rest) => rest,
                    None => return false,
                };
                !rest.is_empty() && !rest.contains('/')
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub method: Method,
    pub pattern: PathPattern,
    pub route: Route,
    pub requires_auth: bool,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteMatch {
    pub route: Route,
    pub requires_auth: bool,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    /// The table shown in the module docs.
    pub fn standard(upload_requires_auth: bool) -> Self {
        let entry = |method, pattern, route, requires_auth| RouteEntry {
            method,
            pattern,
            route,
            requires_auth,
        };
        Self {
            entries: vec![
                entry(Method::Options, PathPattern::Any, Route::Preflight, false),
                entry(
                    Method::Post,
                    PathPattern::Exact("/api/login"),
                    Route::Login,
                    false,
                ),
                entry(
                    Method::Get,
                    PathPattern::Exact("/api/files"),
                    Route::ListFiles,
                    true,
                ),
                entry(
                    Method::Post,
                    PathPattern::Exact("/api/upload"),
                    Route::Upload,
                    upload_requires_auth,
                ),
                entry(
                    Method::Get,
                    PathPattern::SingleSegment,
                    Route::Download,
                    false,
                ),
                entry(Method::Get, PathPattern::Any, Route::StaticAsset, false),
            ],
        }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    /// First entry matching `method` and `path`, if any.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.entries
            .iter()
            .find(|e| &e.method == method && e.pattern.matches(path))
            .map(|e| RouteMatch {
                route: e.route,
                requires_auth: e.requires_auth,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(table: &RouteTable, method: Method, path: &str) -> Option<Route> {
        table.resolve(&method, path).map(|m| m.route)
    }

    #[test]
    fn test_options_short_circuits_every_path() {
        let table = RouteTable::standard(true);
        for path in ["/", "/api/login", "/api/upload", "/x/y/z"] {
            let m = table.resolve(&Method::Options, path).unwrap();
            assert_eq!(m.route, Route::Preflight);
            assert!(!m.requires_auth);
        }
    }

    #[test]
    fn test_api_routes_win_over_download_and_static() {
        let table = RouteTable::standard(true);
        assert_eq!(route(&table, Method::Post, "/api/login"), Some(Route::Login));
        assert_eq!(route(&table, Method::Get, "/api/files"), Some(Route::ListFiles));
        assert_eq!(route(&table, Method::Post, "/api/upload"), Some(Route::Upload));
    }

    #[test]
    fn test_single_segment_get_is_download() {
        let table = RouteTable::standard(true);
        assert_eq!(route(&table, Method::Get, "/report.pdf"), Some(Route::Download));
        assert_eq!(
            route(&table, Method::Get, "/my%20file.txt"),
            Some(Route::Download)
        );
    }

    #[test]
    fn test_other_gets_fall_back_to_static() {
        let table = RouteTable::standard(true);
        assert_eq!(route(&table, Method::Get, "/"), Some(Route::StaticAsset));
        assert_eq!(
            route(&table, Method::Get, "/assets/app.js"),
            Some(Route::StaticAsset)
        );
    }

    #[test]
    fn test_unmatched_methods_resolve_to_none() {
        let table = RouteTable::standard(true);
        assert_eq!(route(&table, Method::Post, "/api/files"), None);
        assert_eq!(route(&table, Method::Other("DELETE".into()), "/a.txt"), None);
        assert_eq!(route(&table, Method::Other("HEAD".into()), "/a.txt"), None);
    }

    #[test]
    fn test_auth_requirements_follow_policy() {
        let gated = RouteTable::standard(true);
        let open = RouteTable::standard(false);

        assert!(gated.resolve(&Method::Get, "/api/files").unwrap().requires_auth);
        assert!(gated.resolve(&Method::Post, "/api/upload").unwrap().requires_auth);
        assert!(!open.resolve(&Method::Post, "/api/upload").unwrap().requires_auth);
        assert!(!gated.resolve(&Method::Post, "/api/login").unwrap().requires_auth);
        assert!(!gated.resolve(&Method::Get, "/a.txt").unwrap().requires_auth);
    }

    #[test]
    fn test_table_order_is_fixed() {
        let routes: Vec<Route> = RouteTable::standard(true)
            .entries()
            .iter()
            .map(|e| e.route)
            .collect();
        assert_eq!(
            routes,
            vec![
                Route::Preflight,
                Route::Login,
                Route::ListFiles,
                Route::Upload,
                Route::Download,
                Route::StaticAsset,
            ]
        );
    }
}
