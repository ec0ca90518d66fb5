//! Method-aware routing over path tries.
//!
//! A [`Router`] keeps one [`PathTrie`] per HTTP method plus a cross-method
//! union trie. The union trie answers "does *any* method know this path",
//! which is what separates a `404 Not Found` from a `405 Method Not Allowed`.

use std::collections::HashMap;
use std::fmt;

use http::Method;

mod normalize;
mod trie;

pub use self::normalize::NormalizedPath;
pub use self::trie::{PathParameters, PathTrie, TrieMatch};

use self::trie::{parse_pattern, PatternSegment};

/// Errors raised while registering routes. All of them are caller mistakes
/// (invalid arguments); lookup itself never fails.
#[derive(Debug)]
pub enum RouteError {
    /// The pattern already bears a value.
    Duplicate {
        /// The offending pattern.
        pattern: String,
    },
    /// A parameter segment collides with an existing parameter of a
    /// different name at the same position.
    ParameterConflict {
        /// The offending pattern.
        pattern: String,
        /// The parameter name already present at the position.
        existing: String,
        /// The newly supplied name.
        conflicting: String,
    },
    /// `:` with no name behind it.
    EmptyParameter {
        /// The offending pattern.
        pattern: String,
    },
    /// `**` somewhere other than the last segment.
    TailNotLast {
        /// The offending pattern.
        pattern: String,
    },
    /// Attempt to hang structure beneath a tail node.
    TailChild {
        /// The offending pattern.
        pattern: String,
    },
    /// Grafting a sub-trie would overlap existing structure.
    AttachConflict {
        /// The mount pattern.
        mount: String,
        /// What exactly overlapped.
        reason: String,
    },
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::Duplicate { pattern } => {
                write!(f, "route `{pattern}` is already registered")
            }
            RouteError::ParameterConflict {
                pattern,
                existing,
                conflicting,
            } => write!(
                f,
                "pattern `{pattern}`: parameter `:{conflicting}` conflicts with existing `:{existing}`"
            ),
            RouteError::EmptyParameter { pattern } => {
                write!(f, "pattern `{pattern}`: parameter name must not be empty")
            }
            RouteError::TailNotLast { pattern } => {
                write!(f, "pattern `{pattern}`: `**` is only allowed as the last segment")
            }
            RouteError::TailChild { pattern } => {
                write!(f, "pattern `{pattern}`: tail nodes cannot have children")
            }
            RouteError::AttachConflict { mount, reason } => {
                write!(f, "cannot attach at `{mount}`: {reason}")
            }
        }
    }
}

impl std::error::Error for RouteError {}

/// A successful method-aware lookup.
#[derive(Debug)]
pub struct RouteMatch<'a, T> {
    /// The value registered for the matched route.
    pub value: &'a T,
    /// Parameter captures.
    pub parameters: PathParameters,
    /// The prefix consumed by non-tail segments.
    pub matched: NormalizedPath,
    /// The suffix captured by a tail segment, empty otherwise.
    pub remaining: NormalizedPath,
}

/// Outcome of [`Router::lookup`].
#[derive(Debug)]
pub enum RouterMatch<'a, T> {
    /// A route for the requested method matched.
    Found(RouteMatch<'a, T>),
    /// No route for the method, but at least one other method knows the
    /// path; carries the methods that do, for the `Allow` header.
    MethodNotAllowed(Vec<Method>),
    /// No route of any method matches the path.
    NotFound,
}

impl<'a, T> RouterMatch<'a, T> {
    /// The matched route, if any.
    pub fn into_found(self) -> Option<RouteMatch<'a, T>> {
        match self {
            RouterMatch::Found(found) => Some(found),
            RouterMatch::MethodNotAllowed(_) | RouterMatch::NotFound => None,
        }
    }
}

/// A router mapping `(method, path)` pairs to values.
///
/// `HEAD` requests fall through to `GET` routes when no dedicated `HEAD`
/// route exists; stripping the response body is the server adapter's job.
///
/// ```rust
/// # use http::Method;
/// # use relic::router::{Router, RouterMatch};
/// let mut router = Router::new();
/// router.get("/users/:id", "show").unwrap();
/// router.post("/users", "create").unwrap();
///
/// match router.lookup(&Method::GET, "/users/7") {
///     RouterMatch::Found(found) => {
///         assert_eq!(*found.value, "show");
///         assert_eq!(found.parameters.raw("id"), Some("7"));
///     }
///     _ => unreachable!(),
/// }
///
/// assert!(matches!(
///     router.lookup(&Method::DELETE, "/users/7"),
///     RouterMatch::MethodNotAllowed(_)
/// ));
/// assert!(matches!(
///     router.lookup(&Method::GET, "/nope"),
///     RouterMatch::NotFound
/// ));
/// ```
pub struct Router<T> {
    tries: HashMap<Method, PathTrie<T>>,
    union: PathTrie<()>,
    fallback: Option<T>,
}

impl<T> Default for Router<T> {
    fn default() -> Self {
        Router::new()
    }
}

macro_rules! impl_verb_methods {
    ($($name:ident => $method:ident,)*) => {$(
        #[doc = concat!("Register a `", stringify!($method), "` route.")]
        pub fn $name(&mut self, pattern: &str, value: T) -> Result<(), RouteError> {
            self.add(Method::$method, pattern, value)
        }
    )*};
}

impl<T> Router<T> {
    /// Create an empty router.
    pub fn new() -> Self {
        Router {
            tries: HashMap::new(),
            union: PathTrie::new(),
            fallback: None,
        }
    }

    /// Register `value` for `method` at `pattern`.
    pub fn add(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouteError> {
        self.tries
            .entry(method)
            .or_default()
            .insert(pattern, value)?;
        let mut addition = PathTrie::new();
        // parameter names are irrelevant for existence checks; normalizing
        // them keeps same-position parameters of different methods from
        // colliding in the union trie
        addition.insert(&anonymize(pattern)?, ()).ok();
        self.union.absorb(addition);
        Ok(())
    }

    impl_verb_methods! {
        get => GET,
        post => POST,
        put => PUT,
        delete => DELETE,
        patch => PATCH,
        head => HEAD,
        options => OPTIONS,
        trace => TRACE,
        connect => CONNECT,
    }

    /// Look up a route for `method` and `path`.
    pub fn lookup<'a>(&'a self, method: &Method, path: &str) -> RouterMatch<'a, T> {
        let path = NormalizedPath::parse(path);
        if let Some(found) = self.lookup_in(method, &path) {
            return RouterMatch::Found(found);
        }
        // HEAD falls through to GET when no HEAD route matched
        if *method == Method::HEAD {
            if let Some(found) = self.lookup_in(&Method::GET, &path) {
                return RouterMatch::Found(found);
            }
        }
        if self.union.contains(&path) {
            let mut allowed: Vec<Method> = self
                .tries
                .iter()
                .filter(|(_, trie)| trie.contains(&path))
                .map(|(method, _)| method.clone())
                .collect();
            if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
                allowed.push(Method::HEAD);
            }
            allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            RouterMatch::MethodNotAllowed(allowed)
        } else {
            RouterMatch::NotFound
        }
    }

    fn lookup_in<'a>(&'a self, method: &Method, path: &NormalizedPath) -> Option<RouteMatch<'a, T>> {
        let hit = self.tries.get(method)?.lookup(path)?;
        Some(RouteMatch {
            value: hit.value,
            parameters: hit.parameters,
            matched: hit.matched,
            remaining: hit.remaining,
        })
    }

    /// Graft every route of `sub` underneath `mount`.
    ///
    /// Conflict rules are those of [`PathTrie::attach`], applied per method.
    /// The sub-router's fallback, if any, is discarded; fallbacks do not
    /// nest.
    pub fn attach(&mut self, mount: &str, sub: Router<T>, consume: bool) -> Result<(), RouteError> {
        for (method, trie) in sub.tries {
            self.tries
                .entry(method)
                .or_default()
                .attach(mount, trie, consume)?;
        }
        let mut mounted = PathTrie::new();
        mounted.attach(&anonymize(mount)?, sub.union, consume).ok();
        self.union.absorb(mounted);
        Ok(())
    }

    /// A view of this router that prefixes every registration with `prefix`.
    ///
    /// Group additions and direct additions interleave freely as long as
    /// they do not violate the trie conflict rules.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_, T> {
        RouterGroup {
            router: self,
            prefix: prefix.trim_end_matches('/').to_owned(),
        }
    }

    /// Install the fallback value, consulted by adapters when lookup yields
    /// [`RouterMatch::NotFound`] or [`RouterMatch::MethodNotAllowed`].
    pub fn set_fallback(&mut self, value: T) {
        self.fallback = Some(value);
    }

    /// The installed fallback, if any.
    pub fn fallback(&self) -> Option<&T> {
        self.fallback.as_ref()
    }
}

impl<T> fmt::Debug for Router<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.tries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A borrowed view of a router that prefixes every pattern. Created by
/// [`Router::group`].
pub struct RouterGroup<'r, T> {
    router: &'r mut Router<T>,
    prefix: String,
}

macro_rules! impl_group_verb_methods {
    ($($name:ident => $method:ident,)*) => {$(
        #[doc = concat!("Register a `", stringify!($method), "` route under the group prefix.")]
        pub fn $name(&mut self, pattern: &str, value: T) -> Result<(), RouteError> {
            self.add(Method::$method, pattern, value)
        }
    )*};
}

impl<'r, T> RouterGroup<'r, T> {
    /// Register `value` for `method` at the group-prefixed `pattern`.
    pub fn add(&mut self, method: Method, pattern: &str, value: T) -> Result<(), RouteError> {
        let full = format!("{}/{}", self.prefix, pattern.trim_start_matches('/'));
        self.router.add(method, &full, value)
    }

    impl_group_verb_methods! {
        get => GET,
        post => POST,
        put => PUT,
        delete => DELETE,
        patch => PATCH,
        head => HEAD,
        options => OPTIONS,
        trace => TRACE,
        connect => CONNECT,
    }

    /// A nested group with a further prefix.
    pub fn group(&mut self, prefix: &str) -> RouterGroup<'_, T> {
        let prefix = format!(
            "{}/{}",
            self.prefix,
            prefix.trim_start_matches('/').trim_end_matches('/')
        );
        RouterGroup {
            router: &mut *self.router,
            prefix,
        }
    }
}

impl<'r, T> fmt::Debug for RouterGroup<'r, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterGroup")
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Rewrite parameter names in a pattern to a fixed placeholder.
fn anonymize(pattern: &str) -> Result<String, RouteError> {
    let segments = parse_pattern(pattern)?;
    let mut out = String::new();
    for segment in &segments {
        out.push('/');
        match segment {
            PatternSegment::Literal(s) => out.push_str(s),
            PatternSegment::Parameter(_) => out.push_str(":_"),
            PatternSegment::Wildcard => out.push('*'),
            PatternSegment::Tail => out.push_str("**"),
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_dispatch() {
        let mut router = Router::new();
        router.get("/x", 1).unwrap();
        router.post("/x", 2).unwrap();

        let found = router.lookup(&Method::POST, "/x").into_found().unwrap();
        assert_eq!(*found.value, 2);
    }

    #[test]
    fn not_allowed_vs_not_found() {
        let mut router = Router::new();
        router.get("/x", 1).unwrap();

        match router.lookup(&Method::POST, "/x") {
            RouterMatch::MethodNotAllowed(allowed) => {
                assert_eq!(allowed, [Method::GET, Method::HEAD]);
            }
            other => panic!("expected MethodNotAllowed, got {other:?}"),
        }
        assert!(matches!(
            router.lookup(&Method::GET, "/y"),
            RouterMatch::NotFound
        ));
    }

    #[test]
    fn head_falls_through_to_get() {
        let mut router = Router::new();
        router.get("/x", 1).unwrap();

        let found = router.lookup(&Method::HEAD, "/x").into_found().unwrap();
        assert_eq!(*found.value, 1);
    }

    #[test]
    fn dedicated_head_route_wins() {
        let mut router = Router::new();
        router.get("/x", 1).unwrap();
        router.head("/x", 2).unwrap();

        let found = router.lookup(&Method::HEAD, "/x").into_found().unwrap();
        assert_eq!(*found.value, 2);
    }

    #[test]
    fn same_position_parameters_may_differ_across_methods() {
        let mut router = Router::new();
        router.get("/a/:x", 1).unwrap();
        router.post("/a/:y", 2).unwrap();

        let found = router.lookup(&Method::POST, "/a/7").into_found().unwrap();
        assert_eq!(found.parameters.raw("y"), Some("7"));
    }

    #[test]
    fn group_prefixes_registrations() {
        let mut router = Router::new();
        {
            let mut api = router.group("/api");
            api.get("/users/:id", 1).unwrap();
            let mut nested = api.group("/admin");
            nested.delete("/users/:id", 2).unwrap();
        }
        router.get("/health", 3).unwrap();

        assert!(router.lookup(&Method::GET, "/api/users/1").into_found().is_some());
        assert!(router
            .lookup(&Method::DELETE, "/api/admin/users/1")
            .into_found()
            .is_some());
        assert!(router.lookup(&Method::GET, "/health").into_found().is_some());
    }

    #[test]
    fn attach_composes_routers() {
        let mut sub = Router::new();
        sub.get("/profile", 10).unwrap();
        sub.post("/settings", 11).unwrap();

        let mut router = Router::new();
        router.get("/health", 1).unwrap();
        router.attach("/account", sub, false).unwrap();

        assert!(router
            .lookup(&Method::GET, "/account/profile")
            .into_found()
            .is_some());
        assert!(matches!(
            router.lookup(&Method::GET, "/account/settings"),
            RouterMatch::MethodNotAllowed(_)
        ));
    }

    #[test]
    fn attach_conflict_surfaces() {
        let mut sub = Router::new();
        sub.get("/x", 1).unwrap();

        let mut router = Router::new();
        router.get("/api/x", 0).unwrap();
        assert!(router.attach("/api", sub, false).is_err());
    }

    #[test]
    fn union_miss_without_tails_is_not_found() {
        let mut router = Router::new();
        router.get("/a/b", 1).unwrap();
        router.post("/a/c", 2).unwrap();

        assert!(matches!(
            router.lookup(&Method::PUT, "/a/d"),
            RouterMatch::NotFound
        ));
    }

    #[test]
    fn fallback_slot() {
        let mut router = Router::new();
        assert!(router.fallback().is_none());
        router.set_fallback(99);
        assert_eq!(router.fallback(), Some(&99));
    }
}
