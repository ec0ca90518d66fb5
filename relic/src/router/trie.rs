//! A path trie over route patterns.
//!
//! Patterns are segment sequences where each segment is a literal, a named
//! parameter (`:id`), a single-segment wildcard (`*`) or a tail (`**`, last
//! segment only). Lookup is depth-first with backtracking and a fixed
//! precedence at every node: literal, then parameter, then wildcard, then
//! tail.

use std::collections::HashMap;
use std::fmt;

use super::normalize::NormalizedPath;
use super::RouteError;

/// One parsed pattern segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PatternSegment {
    Literal(String),
    Parameter(String),
    Wildcard,
    Tail,
}

/// Parse a pattern path into segments, validating the pattern grammar.
pub(crate) fn parse_pattern(pattern: &str) -> Result<Vec<PatternSegment>, RouteError> {
    let path = NormalizedPath::parse(pattern);
    let mut segments = Vec::with_capacity(path.len());
    for (index, raw) in path.segments().iter().enumerate() {
        let segment = match raw.as_str() {
            "**" => {
                if index + 1 != path.len() {
                    return Err(RouteError::TailNotLast {
                        pattern: pattern.to_owned(),
                    });
                }
                PatternSegment::Tail
            }
            "*" => PatternSegment::Wildcard,
            s if s.starts_with(':') => {
                let name = &s[1..];
                if name.is_empty() {
                    return Err(RouteError::EmptyParameter {
                        pattern: pattern.to_owned(),
                    });
                }
                PatternSegment::Parameter(name.to_owned())
            }
            s => PatternSegment::Literal(s.to_owned()),
        };
        segments.push(segment);
    }
    Ok(segments)
}

/// Parameter captures accumulated along a matched path.
///
/// Stored in binding order; when a name is bound more than once along the
/// path, the innermost (latest) binding wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathParameters {
    bindings: Vec<(String, String)>,
}

impl PathParameters {
    /// The raw captured value for `name`, if bound.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether `name` was bound along the matched path.
    pub fn contains(&self, name: &str) -> bool {
        self.raw(name).is_some()
    }

    /// Effective bindings, innermost-wins, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().enumerate().filter_map(|(i, (n, _))| {
            // only yield the last binding for each name
            if self.bindings[i + 1..].iter().any(|(m, _)| m == n) {
                None
            } else {
                Some((n.as_str(), self.raw(n).unwrap_or_default()))
            }
        })
    }

    /// Number of distinct bound names.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// `true` when nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn push(&mut self, name: &str, value: &str) {
        self.bindings.push((name.to_owned(), value.to_owned()));
    }

    fn truncate(&mut self, len: usize) {
        self.bindings.truncate(len);
    }
}

struct ParameterEdge<T> {
    name: String,
    node: Node<T>,
}

/// One trie node. Literal children live in a map keyed by segment; the
/// parameter, wildcard and tail children are single optional slots.
struct Node<T> {
    literals: HashMap<String, Node<T>>,
    parameter: Option<Box<ParameterEdge<T>>>,
    wildcard: Option<Box<Node<T>>>,
    tail: Option<Box<Node<T>>>,
    value: Option<T>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Node {
            literals: HashMap::new(),
            parameter: None,
            wildcard: None,
            tail: None,
            value: None,
        }
    }
}

impl<T> Node<T> {
    fn is_leaf(&self) -> bool {
        self.literals.is_empty()
            && self.parameter.is_none()
            && self.wildcard.is_none()
            && self.tail.is_none()
    }
}

/// A successful [`PathTrie::lookup`].
#[derive(Debug)]
pub struct TrieMatch<'a, T> {
    /// The value stored at the matched pattern.
    pub value: &'a T,
    /// Parameter captures along the matched path.
    pub parameters: PathParameters,
    /// The part of the request path consumed by non-tail segments.
    pub matched: NormalizedPath,
    /// The suffix captured by a tail segment, empty for non-tail matches.
    pub remaining: NormalizedPath,
}

/// A trie mapping route patterns to values.
///
/// ```rust
/// # use relic::router::PathTrie;
/// let mut trie = PathTrie::new();
/// trie.insert("/users/:id", 1).unwrap();
/// trie.insert("/users/me", 2).unwrap();
///
/// let hit = trie.lookup(&"/users/42".into()).unwrap();
/// assert_eq!(*hit.value, 1);
/// assert_eq!(hit.parameters.raw("id"), Some("42"));
///
/// let hit = trie.lookup(&"/users/me".into()).unwrap();
/// assert_eq!(*hit.value, 2);
/// assert!(hit.parameters.is_empty());
/// ```
pub struct PathTrie<T> {
    root: Node<T>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        PathTrie::new()
    }
}

impl<T> PathTrie<T> {
    /// Create an empty trie.
    pub fn new() -> Self {
        PathTrie {
            root: Node::default(),
        }
    }

    /// Insert `value` at `pattern`.
    ///
    /// Fails when the pattern already bears a value, when a parameter segment
    /// collides with an existing parameter of a different name at the same
    /// position, or when the pattern grammar is violated (`:` without a name,
    /// `**` not last).
    pub fn insert(&mut self, pattern: &str, value: T) -> Result<(), RouteError> {
        let segments = parse_pattern(pattern)?;
        let node = descend_creating(&mut self.root, &segments, pattern)?;
        if node.value.is_some() {
            return Err(RouteError::Duplicate {
                pattern: pattern.to_owned(),
            });
        }
        node.value = Some(value);
        Ok(())
    }

    /// Graft `sub` at `mount`.
    ///
    /// Disjoint structure merges; any overlap (a value at the mount node, a
    /// shared literal child, parameter children, wildcard or tail children on
    /// both sides) is a conflict. The one escape hatch: with `consume` set
    /// and a *single* sub-trie — one bearing only a root value and no
    /// children — the sub-trie's value replaces whatever value the mount node
    /// holds, which is also the only form of attach permitted at a tail
    /// pattern.
    pub fn attach(&mut self, mount: &str, sub: PathTrie<T>, consume: bool) -> Result<(), RouteError> {
        let segments = parse_pattern(mount)?;
        let consuming_single = consume && sub.is_single();
        if segments.last() == Some(&PatternSegment::Tail) && !consuming_single {
            // a tail node terminates matching, nothing may live beneath it
            return Err(RouteError::TailChild {
                pattern: mount.to_owned(),
            });
        }
        let node = descend_creating(&mut self.root, &segments, mount)?;
        if consuming_single {
            node.value = sub.root.value;
            return Ok(());
        }
        merge_disjoint(node, sub.root, mount)
    }

    /// Look up `path`, backtracking as needed. Returns `None` on a miss and
    /// never panics.
    pub fn lookup<'a>(&'a self, path: &NormalizedPath) -> Option<TrieMatch<'a, T>> {
        let mut parameters = PathParameters::default();
        let segments = path.segments();
        let hit = descend(&self.root, segments, 0, &mut parameters)?;
        let (matched, remaining) = match hit.tail_from {
            Some(split) => (
                NormalizedPath::from_segments(segments[..split].to_vec(), false),
                NormalizedPath::from_segments(segments[split..].to_vec(), path.trailing_slash()),
            ),
            None => (path.clone(), NormalizedPath::default()),
        };
        Some(TrieMatch {
            value: hit.value,
            parameters,
            matched,
            remaining,
        })
    }

    /// Whether any pattern in the trie matches `path`.
    pub fn contains(&self, path: &NormalizedPath) -> bool {
        self.lookup(path).is_some()
    }

    /// `true` when the trie holds exactly one value, at its root.
    pub fn is_single(&self) -> bool {
        self.root.value.is_some() && self.root.is_leaf()
    }

    /// `true` when the trie holds no values at all.
    pub fn is_empty(&self) -> bool {
        self.root.value.is_none() && self.root.is_leaf()
    }

    /// Merge `other` into `self`, unconditionally.
    ///
    /// Overlapping structure is merged recursively and values from `other`
    /// win. Used for bookkeeping tries (method-union) where overlap across
    /// sources is expected rather than a registration error.
    pub(crate) fn absorb(&mut self, other: PathTrie<T>) {
        absorb_node(&mut self.root, other.root);
    }

    /// The value at `pattern`, creating it with `default` when absent.
    /// Unlike [`insert`](PathTrie::insert), re-registration at the same
    /// pattern is expected here.
    pub(crate) fn get_or_insert_with(
        &mut self,
        pattern: &str,
        default: impl FnOnce() -> T,
    ) -> Result<&mut T, RouteError> {
        let segments = parse_pattern(pattern)?;
        let node = descend_creating(&mut self.root, &segments, pattern)?;
        Ok(node.value.get_or_insert_with(default))
    }

    /// Whether the node addressed by `pattern` has a tail child with
    /// sibling structure next to it.
    pub(crate) fn tail_has_siblings(&self, pattern: &str) -> Result<bool, RouteError> {
        let segments = parse_pattern(pattern)?;
        let mut node = &self.root;
        for segment in &segments[..segments.len().saturating_sub(1)] {
            let next = match segment {
                PatternSegment::Literal(s) => node.literals.get(s),
                PatternSegment::Parameter(_) => node.parameter.as_ref().map(|e| &e.node),
                PatternSegment::Wildcard => node.wildcard.as_deref(),
                PatternSegment::Tail => node.tail.as_deref(),
            };
            node = match next {
                Some(next) => next,
                None => return Ok(false),
            };
        }
        Ok(!node.literals.is_empty() || node.parameter.is_some() || node.wildcard.is_some())
    }

    /// Every value on a matching chain for `path`, shallowest first.
    ///
    /// Unlike [`lookup`](PathTrie::lookup) this requires no terminating
    /// value: a value at an interior node covers everything beneath it, and
    /// all matching branches contribute. Equal-depth entries order by edge
    /// precedence (literal, parameter, wildcard, tail).
    pub(crate) fn values_along<'a>(&'a self, path: &NormalizedPath) -> Vec<&'a T> {
        let mut collected: Vec<(usize, &'a T)> = Vec::new();
        collect_along(&self.root, path.segments(), 0, &mut collected);
        collected.sort_by_key(|(depth, _)| *depth);
        collected.into_iter().map(|(_, value)| value).collect()
    }
}

impl<T> fmt::Debug for PathTrie<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathTrie").finish()
    }
}

fn descend_creating<'a, T>(
    root: &'a mut Node<T>,
    segments: &[PatternSegment],
    pattern: &str,
) -> Result<&'a mut Node<T>, RouteError> {
    let mut node = root;
    for segment in segments.iter() {
        node = match segment {
            PatternSegment::Literal(s) => node.literals.entry(s.clone()).or_default(),
            PatternSegment::Parameter(name) => {
                let edge = match &mut node.parameter {
                    Some(edge) if edge.name != *name => {
                        return Err(RouteError::ParameterConflict {
                            pattern: pattern.to_owned(),
                            existing: edge.name.clone(),
                            conflicting: name.clone(),
                        });
                    }
                    Some(edge) => edge,
                    slot @ None => slot.insert(Box::new(ParameterEdge {
                        name: name.clone(),
                        node: Node::default(),
                    })),
                };
                &mut edge.node
            }
            PatternSegment::Wildcard => node.wildcard.get_or_insert_with(Default::default),
            PatternSegment::Tail => node.tail.get_or_insert_with(Default::default),
        };
    }
    Ok(node)
}

fn merge_disjoint<T>(dst: &mut Node<T>, src: Node<T>, mount: &str) -> Result<(), RouteError> {
    let conflict = |reason: &str| RouteError::AttachConflict {
        mount: mount.to_owned(),
        reason: reason.to_owned(),
    };

    if src.value.is_some() {
        if dst.value.is_some() {
            return Err(conflict("mount node already bears a value"));
        }
        dst.value = src.value;
    }
    for (segment, child) in src.literals {
        if dst.literals.contains_key(&segment) {
            return Err(conflict(&format!("conflicting literal child `{segment}`")));
        }
        dst.literals.insert(segment, child);
    }
    if let Some(parameter) = src.parameter {
        if let Some(existing) = &dst.parameter {
            return Err(RouteError::ParameterConflict {
                pattern: mount.to_owned(),
                existing: existing.name.clone(),
                conflicting: parameter.name,
            });
        }
        dst.parameter = Some(parameter);
    }
    if let Some(wildcard) = src.wildcard {
        if dst.wildcard.is_some() {
            return Err(conflict("conflicting wildcard children"));
        }
        dst.wildcard = Some(wildcard);
    }
    if let Some(tail) = src.tail {
        if dst.tail.is_some() {
            return Err(conflict("conflicting tail children"));
        }
        dst.tail = Some(tail);
    }
    Ok(())
}

fn absorb_node<T>(dst: &mut Node<T>, src: Node<T>) {
    if src.value.is_some() {
        dst.value = src.value;
    }
    for (segment, child) in src.literals {
        match dst.literals.get_mut(&segment) {
            Some(existing) => absorb_node(existing, child),
            None => {
                dst.literals.insert(segment, child);
            }
        }
    }
    if let Some(parameter) = src.parameter {
        match &mut dst.parameter {
            // union tries normalize parameter names, merge regardless
            Some(existing) => absorb_node(&mut existing.node, parameter.node),
            slot @ None => *slot = Some(parameter),
        }
    }
    if let Some(wildcard) = src.wildcard {
        match &mut dst.wildcard {
            Some(existing) => absorb_node(existing, *wildcard),
            slot @ None => *slot = Some(wildcard),
        }
    }
    if let Some(tail) = src.tail {
        match &mut dst.tail {
            Some(existing) => absorb_node(existing, *tail),
            slot @ None => *slot = Some(tail),
        }
    }
}

fn collect_along<'a, T>(
    node: &'a Node<T>,
    segments: &[String],
    index: usize,
    out: &mut Vec<(usize, &'a T)>,
) {
    if let Some(value) = &node.value {
        out.push((index, value));
    }
    if index == segments.len() {
        return;
    }
    if let Some(child) = node.literals.get(&segments[index]) {
        collect_along(child, segments, index + 1, out);
    }
    if let Some(edge) = &node.parameter {
        collect_along(&edge.node, segments, index + 1, out);
    }
    if let Some(child) = &node.wildcard {
        collect_along(child, segments, index + 1, out);
    }
    if let Some(tail) = &node.tail {
        // a tail consumes at least one segment, so it only applies when
        // segments remain
        if let Some(value) = &tail.value {
            out.push((index + 1, value));
        }
    }
}

struct Hit<'a, T> {
    value: &'a T,
    tail_from: Option<usize>,
}

fn descend<'a, T>(
    node: &'a Node<T>,
    segments: &[String],
    index: usize,
    parameters: &mut PathParameters,
) -> Option<Hit<'a, T>> {
    if index == segments.len() {
        return node.value.as_ref().map(|value| Hit {
            value,
            tail_from: None,
        });
    }

    let segment = &segments[index];

    if let Some(child) = node.literals.get(segment) {
        if let Some(hit) = descend(child, segments, index + 1, parameters) {
            return Some(hit);
        }
    }

    if let Some(edge) = &node.parameter {
        let depth = parameters.bindings.len();
        parameters.push(&edge.name, segment);
        if let Some(hit) = descend(&edge.node, segments, index + 1, parameters) {
            return Some(hit);
        }
        // rejected branch, discard its bindings
        parameters.truncate(depth);
    }

    if let Some(child) = &node.wildcard {
        if let Some(hit) = descend(child, segments, index + 1, parameters) {
            return Some(hit);
        }
    }

    if let Some(tail) = &node.tail {
        if let Some(value) = tail.value.as_ref() {
            return Some(Hit {
                value,
                tail_from: Some(index),
            });
        }
    }

    None
}
