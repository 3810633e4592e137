//! Request matchers.

use crate::RecordedRequest;
use regex::Regex;

/// Predicate over a recorded request.
pub trait Matcher: Send + Sync {
    /// Whether the request matches.
    fn matches(&self, request: &RecordedRequest) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&RecordedRequest) -> bool + Send + Sync,
{
    fn matches(&self, request: &RecordedRequest) -> bool {
        self(request)
    }
}

/// Combinators available on every matcher.
pub trait MatcherExt: Matcher + Sized {
    /// Both matchers must match.
    fn and<B: Matcher>(self, other: B) -> And<Self, B> {
        And(self, other)
    }

    /// Either matcher may match.
    fn or<B: Matcher>(self, other: B) -> Or<Self, B> {
        Or(self, other)
    }

    /// Invert this matcher.
    fn not(self) -> Not<Self> {
        Not(self)
    }
}

impl<M: Matcher + Sized> MatcherExt for M {}

/// Conjunction of two matchers.
pub struct And<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for And<A, B> {
    fn matches(&self, request: &RecordedRequest) -> bool {
        self.0.matches(request) && self.1.matches(request)
    }
}

/// Disjunction of two matchers.
pub struct Or<A, B>(A, B);

impl<A: Matcher, B: Matcher> Matcher for Or<A, B> {
    fn matches(&self, request: &RecordedRequest) -> bool {
        self.0.matches(request) || self.1.matches(request)
    }
}

/// Negation of a matcher.
pub struct Not<M>(M);

impl<M: Matcher> Matcher for Not<M> {
    fn matches(&self, request: &RecordedRequest) -> bool {
        !self.0.matches(request)
    }
}

/// Matches an exact request path.
pub struct ExactPath(String);

/// Match the exact request path.
pub fn exact_path(path: impl Into<String>) -> ExactPath {
    ExactPath(path.into())
}

impl Matcher for ExactPath {
    fn matches(&self, request: &RecordedRequest) -> bool {
        request.path == self.0
    }
}

/// Matches a request path prefix.
pub struct PathPrefix(String);

/// Match any path starting with the prefix.
pub fn path_prefix(prefix: impl Into<String>) -> PathPrefix {
    PathPrefix(prefix.into())
}

impl Matcher for PathPrefix {
    fn matches(&self, request: &RecordedRequest) -> bool {
        request.path.starts_with(&self.0)
    }
}

/// Matches the request path against a regular expression.
pub struct PathRegex(Regex);

/// Match paths against a regular expression.
///
/// # Panics
///
/// Panics when the pattern is invalid; matchers are built in test setup
/// where that is a programming error.
pub fn path_regex(pattern: &str) -> PathRegex {
    PathRegex(Regex::new(pattern).expect("invalid path regex"))
}

impl Matcher for PathRegex {
    fn matches(&self, request: &RecordedRequest) -> bool {
        self.0.is_match(&request.path)
    }
}

/// Matches the request method.
pub struct MethodIs(String);

/// Match the request method, case-insensitive.
pub fn method_is(method: impl Into<String>) -> MethodIs {
    MethodIs(method.into().to_ascii_uppercase())
}

impl Matcher for MethodIs {
    fn matches(&self, request: &RecordedRequest) -> bool {
        request.method == self.0
    }
}

/// Matches a header, by presence or by exact value.
pub struct HasHeader {
    name: String,
    value: Option<String>,
}

/// Match requests carrying a header with the given value.
pub fn has_header(name: impl Into<String>, value: impl Into<String>) -> HasHeader {
    HasHeader {
        name: name.into().to_ascii_lowercase(),
        value: Some(value.into()),
    }
}

/// Match requests carrying a header, regardless of value.
pub fn has_header_present(name: impl Into<String>) -> HasHeader {
    HasHeader {
        name: name.into().to_ascii_lowercase(),
        value: None,
    }
}

impl Matcher for HasHeader {
    fn matches(&self, request: &RecordedRequest) -> bool {
        match (&self.value, request.header(&self.name)) {
            (Some(expected), Some(actual)) => expected == actual,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

/// Matches a query parameter with an exact value.
pub struct HasQueryParam {
    key: String,
    value: String,
}

/// Match requests carrying a query parameter with the given value.
pub fn has_query_param(key: impl Into<String>, value: impl Into<String>) -> HasQueryParam {
    HasQueryParam {
        key: key.into(),
        value: value.into(),
    }
}

impl Matcher for HasQueryParam {
    fn matches(&self, request: &RecordedRequest) -> bool {
        request.query_param(&self.key) == Some(self.value.as_str())
    }
}
