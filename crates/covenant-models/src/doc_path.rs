//! Document paths: parsed path expressions with a canonical textual form.

use std::fmt::{self, Display, Write};
use std::hash::{Hash, Hasher};

use anyhow::anyhow;
use itertools::Itertools;

use crate::path_exp::{matches_token, parse_path, PathParseError, PathToken};

/// A parsed path expression addressing into structured data. The canonical
/// textual form is kept in sync with the tokens and is what equality and
/// hashing are based on, so two paths are equal exactly when they render to
/// the same text, independent of how they were built.
///
/// Paths are value types: the `join*` constructors return a new path and
/// never mutate the receiver.
#[derive(Clone, Debug, Eq)]
pub struct DocPath {
    tokens: Vec<PathToken>,
    expr: String,
}

impl DocPath {
    /// Parse the given expression into a path.
    pub fn new(expr: impl Into<String>) -> Result<Self, PathParseError> {
        let expr = expr.into();
        let tokens = parse_path(&expr)?;
        Ok(DocPath { tokens, expr })
    }

    /// Infallible construction for statically known expressions, intended for
    /// tests. Panics on an invalid expression.
    pub fn new_unwrap(expr: &'static str) -> Self {
        Self::new(expr).unwrap()
    }

    /// A path with no tokens at all. Joining onto an empty path is not
    /// meaningful; it exists to represent "no location".
    pub fn empty() -> Self {
        DocPath {
            tokens: vec![],
            expr: String::new(),
        }
    }

    /// The root path `$`.
    pub fn root() -> Self {
        DocPath {
            tokens: vec![PathToken::Root],
            expr: "$".to_string(),
        }
    }

    /// Build a path from a list of tokens, deriving the canonical text.
    pub fn from_tokens<I>(tokens: I) -> Self
    where
        I: IntoIterator<Item = PathToken>,
    {
        let mut path = DocPath {
            tokens: tokens.into_iter().collect(),
            expr: String::new(),
        };
        path.expr = path.build_expr();
        path
    }

    /// The tokens that comprise this path.
    pub fn tokens(&self) -> &[PathToken] {
        &self.tokens
    }

    /// Length in parsed tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True if the path has no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The last token, if any.
    pub fn last(&self) -> Option<&PathToken> {
        self.tokens.last()
    }

    /// The name of the first field token, if any. Used when addressing
    /// headers and query parameters, where the interesting key is the first
    /// field under the root.
    pub fn first_field(&self) -> Option<&str> {
        self.tokens.iter().find_map(|t| match t {
            PathToken::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// The name of the last field token, if any.
    pub fn last_field(&self) -> Option<&str> {
        self.tokens.iter().rev().find_map(|t| match t {
            PathToken::Field(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// True if this is exactly the root path `$`.
    pub fn is_root(&self) -> bool {
        self.tokens == [PathToken::Root]
    }

    /// True if the path ends in a field wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.tokens.last() == Some(&PathToken::Star)
    }

    /// Calculate the specificity weight of this path expression against a
    /// concrete path. Returns the weight and the number of tokens in this
    /// path. The weight is the product of the per-token scores over the
    /// zipped prefix, so any token that fails to match collapses the whole
    /// weight to zero, as does a concrete path shorter than this one.
    pub fn path_weight(&self, path: &[&str]) -> (usize, usize) {
        let weight = if path.len() >= self.len() {
            self.tokens
                .iter()
                .zip(path.iter())
                .fold(1, |acc, (token, segment)| acc * matches_token(segment, token))
        } else {
            0
        };
        (weight, self.len())
    }

    /// True if this path expression matches the given concrete path (the
    /// calculated weight is greater than zero).
    pub fn matches_path(&self, path: &[&str]) -> bool {
        self.path_weight(path).0 > 0
    }

    /// True if this path matches the concrete path and both have the same
    /// number of segments.
    pub fn matches_path_exactly(&self, path: &[&str]) -> bool {
        self.len() == path.len() && self.matches_path(path)
    }

    /// New path with the given part appended. `*` and `[*]` become the
    /// corresponding wildcard tokens and digit-only parts become indices.
    pub fn join(&self, part: impl Into<String>) -> Self {
        let part = part.into();
        let mut path = self.clone();
        if part == "*" {
            path.push_star();
        } else if part == "[*]" {
            path.push_star_index();
        } else if let Ok(index) = part.parse() {
            path.push_index(index);
        } else {
            path.push_field(part);
        }
        path
    }

    /// New path with the index appended. A trailing wildcard is replaced by
    /// the index instead of being extended.
    pub fn join_index(&self, index: usize) -> Self {
        let mut path = self.clone();
        match path.tokens.last_mut() {
            Some(token @ (PathToken::Star | PathToken::StarIndex)) => {
                *token = PathToken::Index(index);
                path.expr = path.build_expr();
            }
            _ => {
                path.push_index(index);
            }
        }
        path
    }

    /// New path with the field appended. A trailing field wildcard is
    /// replaced by the field instead of being extended.
    pub fn join_field(&self, name: impl Into<String>) -> Self {
        let mut path = self.clone();
        match path.tokens.last_mut() {
            Some(token @ PathToken::Star) => {
                *token = PathToken::Field(name.into());
                path.expr = path.build_expr();
            }
            _ => {
                path.push_field(name.into());
            }
        }
        path
    }

    /// New path with every token of `other` (bar its root marker) appended.
    pub fn join_path(&self, other: &DocPath) -> Self {
        let mut path = self.clone();
        for token in &other.tokens {
            if token != &PathToken::Root {
                path.push(token.clone());
            }
        }
        path
    }

    /// The parent of this path, or `None` for paths of one or fewer tokens.
    pub fn parent(&self) -> Option<Self> {
        if self.tokens.len() <= 1 {
            None
        } else {
            let mut tokens = self.tokens.clone();
            tokens.truncate(tokens.len() - 1);
            Some(DocPath::from_tokens(tokens))
        }
    }

    /// New path with the last `n` tokens removed. Dropping everything yields
    /// the root path.
    pub fn drop_last(&self, n: usize) -> Self {
        let tokens = self.tokens.iter().dropping_back(n).cloned().collect_vec();
        if tokens.is_empty() {
            DocPath::root()
        } else {
            DocPath::from_tokens(tokens)
        }
    }

    /// Raw text of each token, in order.
    pub fn to_vec(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.raw_string()).collect()
    }

    /// Copy of this path with all field names lower cased.
    pub fn to_lower_case(&self) -> Self {
        DocPath {
            tokens: self
                .tokens
                .iter()
                .map(|t| match t {
                    PathToken::Field(name) => PathToken::Field(name.to_lowercase()),
                    _ => t.clone(),
                })
                .collect(),
            expr: self.expr.to_lowercase(),
        }
    }

    /// Convert this path into a JSON pointer (RFC 6901). Wildcard tokens have
    /// no pointer equivalent and fail the conversion.
    pub fn as_json_pointer(&self) -> anyhow::Result<String> {
        let mut buffer = String::new();
        for token in &self.tokens {
            match token {
                PathToken::Root => {}
                PathToken::Field(name) => {
                    let escaped = name.replace('~', "~0").replace('/', "~1");
                    let _ = write!(buffer, "/{}", escaped);
                }
                PathToken::Index(i) => {
                    let _ = write!(buffer, "/{}", i);
                }
                PathToken::Star | PathToken::StarIndex => {
                    return Err(anyhow!("* can not be converted to a JSON pointer"));
                }
            }
        }
        Ok(buffer)
    }

    /// True if the canonical text ends with the given suffix.
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.expr.ends_with(suffix)
    }

    fn push_field(&mut self, field: impl Into<String>) {
        let field = field.into();
        write_obj_key_for_path(&mut self.expr, &field);
        self.tokens.push(PathToken::Field(field));
    }

    fn push_index(&mut self, index: usize) {
        self.tokens.push(PathToken::Index(index));
        let _ = write!(self.expr, "[{}]", index);
    }

    fn push_star(&mut self) {
        self.tokens.push(PathToken::Star);
        self.expr.push_str(".*");
    }

    fn push_star_index(&mut self) {
        self.tokens.push(PathToken::StarIndex);
        self.expr.push_str("[*]");
    }

    fn push(&mut self, token: PathToken) {
        match &token {
            PathToken::Root => self.expr.push('$'),
            PathToken::Field(name) => write_obj_key_for_path(&mut self.expr, name),
            PathToken::Index(i) => {
                let _ = write!(self.expr, "[{}]", i);
            }
            PathToken::Star => self.expr.push_str(".*"),
            PathToken::StarIndex => self.expr.push_str("[*]"),
        }
        self.tokens.push(token);
    }

    fn build_expr(&self) -> String {
        let mut buffer = String::new();
        for token in &self.tokens {
            match token {
                PathToken::Root => buffer.push('$'),
                PathToken::Field(name) => write_obj_key_for_path(&mut buffer, name),
                PathToken::Index(i) => {
                    let _ = write!(buffer, "[{}]", i);
                }
                PathToken::Star => buffer.push_str(".*"),
                PathToken::StarIndex => buffer.push_str("[*]"),
            }
        }
        buffer
    }
}

impl Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl PartialEq for DocPath {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Hash for DocPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.expr.hash(state);
    }
}

impl PartialOrd for DocPath {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DocPath {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.expr.cmp(&other.expr)
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> String {
        path.expr
    }
}

impl From<&DocPath> for DocPath {
    fn from(path: &DocPath) -> DocPath {
        path.clone()
    }
}

impl From<&DocPath> for String {
    fn from(path: &DocPath) -> String {
        path.expr.clone()
    }
}

impl TryFrom<&str> for DocPath {
    type Error = PathParseError;

    fn try_from(expr: &str) -> Result<Self, Self::Error> {
        DocPath::new(expr)
    }
}

impl TryFrom<String> for DocPath {
    type Error = PathParseError;

    fn try_from(expr: String) -> Result<Self, Self::Error> {
        DocPath::new(expr)
    }
}

// Format an object key for use in a path expression: dot notation for keys
// that look like plain identifiers, bracket notation with escapes otherwise.
fn write_obj_key_for_path(out: &mut String, key: &str) {
    let plain_ident = !key.is_empty()
        && key.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain_ident {
        let _ = write!(out, ".{}", key);
    } else {
        let escaped = key.replace('\\', "\\\\").replace('\'', "\\'");
        let _ = write!(out, "['{}']", escaped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_weight_exact_match() {
        let path = DocPath::new_unwrap("$.a.b");
        assert_eq!(path.path_weight(&["$", "a", "b"]), (8, 3));
    }

    #[test]
    fn test_path_weight_with_wildcard() {
        let path = DocPath::new_unwrap("$.a.*");
        assert_eq!(path.path_weight(&["$", "a", "b"]), (4, 3));
    }

    #[test]
    fn test_path_weight_mismatched_field() {
        let path = DocPath::new_unwrap("$.a.c");
        assert_eq!(path.path_weight(&["$", "a", "b"]), (0, 3));
    }

    #[test]
    fn test_path_weight_concrete_path_too_short() {
        let path = DocPath::new_unwrap("$.a.b.c");
        assert_eq!(path.path_weight(&["$", "a", "b"]), (0, 4));
    }

    #[test]
    fn test_matches_path_exactly() {
        let path = DocPath::new_unwrap("$.a[*]");
        assert!(path.matches_path(&["$", "a", "0", "b"]));
        assert!(!path.matches_path_exactly(&["$", "a", "0", "b"]));
        assert!(path.matches_path_exactly(&["$", "a", "0"]));
    }

    #[test]
    fn test_join_classifies_parts() {
        let root = DocPath::root();
        assert_eq!(root.join("name").to_string(), "$.name");
        assert_eq!(root.join("3").to_string(), "$[3]");
        assert_eq!(root.join("*").to_string(), "$.*");
        assert_eq!(root.join("[*]").to_string(), "$[*]");
    }

    #[test]
    fn test_join_index_replaces_trailing_wildcard() {
        let path = DocPath::new_unwrap("$.items[*]");
        assert_eq!(path.join_index(2).to_string(), "$.items[2]");
        let path = DocPath::new_unwrap("$.items");
        assert_eq!(path.join_index(2).to_string(), "$.items[2]");
    }

    #[test]
    fn test_join_field_replaces_trailing_star() {
        let path = DocPath::new_unwrap("$.*");
        assert_eq!(path.join_field("name").to_string(), "$.name");
    }

    #[test]
    fn test_equality_is_by_canonical_text() {
        let built = DocPath::root().join("a").join("0");
        let parsed = DocPath::new_unwrap("$.a[0]");
        assert_eq!(built, parsed);
    }

    #[test]
    fn test_keys_with_special_characters_use_bracket_notation() {
        let path = DocPath::root().join("content-type");
        assert_eq!(path.to_string(), "$['content-type']");
        let reparsed = DocPath::new(path.to_string()).unwrap();
        assert_eq!(reparsed.tokens(), path.tokens());
    }

    #[test]
    fn test_parent() {
        let path = DocPath::new_unwrap("$.a.b");
        assert_eq!(path.parent(), Some(DocPath::new_unwrap("$.a")));
        assert_eq!(DocPath::root().parent(), None);
    }

    #[test]
    fn test_to_vec_uses_raw_segments() {
        let path = DocPath::new_unwrap("$.a[0][*]");
        assert_eq!(path.to_vec(), vec!["$", "a", "0", "[*]"]);
    }

    #[test]
    fn test_as_json_pointer() {
        let path = DocPath::new_unwrap("$.a[0].b");
        assert_eq!(path.as_json_pointer().unwrap(), "/a/0/b");
        assert!(DocPath::new_unwrap("$.a.*").as_json_pointer().is_err());
    }

    #[test]
    fn test_first_and_last_field() {
        let path = DocPath::new_unwrap("$.headers.accept");
        assert_eq!(path.first_field(), Some("headers"));
        assert_eq!(path.last_field(), Some("accept"));
    }
}
