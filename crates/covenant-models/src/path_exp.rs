//! Parser for JSONPath-like path expressions (`$.foo[0].*` style).
//!
//! Expressions are parsed with a single left-to-right scan. One character of
//! lookahead is enough to spot the terminator of a bracket body, so the
//! implementation runs over a peekable character iterator rather than a
//! generated parser.

use std::fmt::{self, Display};
use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

/// Characters that force a field name into bracket notation when a path is
/// rendered back to text.
pub const PATH_SPECIAL_CHARS: &str = "'[].@ \t\n";

/// Non-alphanumeric characters permitted inside a bare identifier.
pub const ALLOWED_SPECIAL_CHARS: &str = "-_:#@";

/// One segment of a parsed path expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// The root marker `$`
    Root,
    /// An object field accessed by name
    Field(String),
    /// An array element accessed by index
    Index(usize),
    /// The field wildcard `*`
    Star,
    /// The index wildcard `[*]`
    StarIndex,
}

impl PathToken {
    /// Raw text of this token, without any path punctuation. This is the form
    /// compared against the segments of a concrete path.
    pub fn raw_string(&self) -> String {
        match self {
            PathToken::Root => "$".to_string(),
            PathToken::Field(name) => name.clone(),
            PathToken::Index(index) => index.to_string(),
            PathToken::Star => "*".to_string(),
            PathToken::StarIndex => "[*]".to_string(),
        }
    }
}

impl Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_string())
    }
}

/// Errors raised while parsing a path expression. These are fatal to the
/// parse call and carry the offending character and its index where one
/// exists; an invalid expression is a configuration error, never something
/// to recover from.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PathParseError {
    #[error("Path expression \"{expr}\" does not start with a root marker \"$\"")]
    MissingRoot { expr: String },

    #[error("Expected a \".\" or \"[\" instead of \"{ch}\" in path expression \"{expr}\" at index {index}")]
    UnexpectedCharacter { expr: String, ch: char, index: usize },

    #[error("Expected either a \"*\" or path identifier in path expression \"{expr}\" at index {index}")]
    ExpectedIdentifier { expr: String, index: usize },

    #[error("Expected a path after \".\" in path expression \"{expr}\" at index {index}")]
    TrailingDot { expr: String, index: usize },

    #[error("\"{ch}\" is not allowed in an identifier in path expression \"{expr}\" at index {index}")]
    InvalidIdentifierCharacter { expr: String, ch: char, index: usize },

    #[error("Empty strings are not allowed in path expression \"{expr}\" at index {index}")]
    EmptyString { expr: String, index: usize },

    #[error("Unterminated string in path expression \"{expr}\" at index {index}")]
    UnterminatedString { expr: String, index: usize },

    #[error("Indexes can only consist of numbers or a \"*\", found \"{ch}\" instead in path expression \"{expr}\" at index {index}")]
    InvalidIndex { expr: String, ch: char, index: usize },

    #[error("Empty bracket expressions are not allowed in path expression \"{expr}\" at index {index}")]
    EmptyBracket { expr: String, index: usize },

    #[error("Unterminated brackets, found \"{ch}\" instead of \"]\" in path expression \"{expr}\" at index {index}")]
    UnterminatedBrackets { expr: String, ch: char, index: usize },

    #[error("Unterminated brackets in path expression \"{expr}\" at index {index}")]
    MissingClosingBracket { expr: String, index: usize },

    #[error("Expected a \"'\" (single quote) or a digit in path expression \"{expr}\" after index {index}")]
    EmptyBracketBody { expr: String, index: usize },
}

type Chars<'a> = Peekable<CharIndices<'a>>;

/// True for characters allowed in a bare (unquoted) identifier.
pub fn valid_path_character(ch: char) -> bool {
    ch.is_alphanumeric() || ALLOWED_SPECIAL_CHARS.contains(ch)
}

/// Parse a path expression into its tokens. An empty expression parses to an
/// empty token list; any non-empty expression must start with `$`.
pub fn parse_path(expr: &str) -> Result<Vec<PathToken>, PathParseError> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    match chars.next() {
        None => Ok(tokens),
        Some((_, '$')) => {
            tokens.push(PathToken::Root);
            path_exp(&mut chars, &mut tokens, expr)?;
            Ok(tokens)
        }
        Some(_) => Err(PathParseError::MissingRoot {
            expr: expr.to_string(),
        }),
    }
}

// path_exp -> (dot_path | bracket_path)*
fn path_exp(chars: &mut Chars, tokens: &mut Vec<PathToken>, expr: &str) -> Result<(), PathParseError> {
    while let Some((index, ch)) = chars.next() {
        match ch {
            '.' => path_identifier(chars, tokens, expr, index)?,
            '[' => bracket_path(chars, tokens, expr, index)?,
            _ => {
                return Err(PathParseError::UnexpectedCharacter {
                    expr: expr.to_string(),
                    ch,
                    index,
                })
            }
        }
    }
    Ok(())
}

// path_identifier -> identifier | *
fn path_identifier(
    chars: &mut Chars,
    tokens: &mut Vec<PathToken>,
    expr: &str,
    dot_index: usize,
) -> Result<(), PathParseError> {
    match chars.next() {
        None => Err(PathParseError::TrailingDot {
            expr: expr.to_string(),
            index: dot_index,
        }),
        Some((_, '*')) => {
            tokens.push(PathToken::Star);
            Ok(())
        }
        Some((_, ch)) if valid_path_character(ch) => identifier(ch, chars, tokens, expr),
        Some((index, _)) => Err(PathParseError::ExpectedIdentifier {
            expr: expr.to_string(),
            index,
        }),
    }
}

// identifier -> a valid path character followed by any number more
fn identifier(
    first: char,
    chars: &mut Chars,
    tokens: &mut Vec<PathToken>,
    expr: &str,
) -> Result<(), PathParseError> {
    let mut id = String::new();
    id.push(first);
    while let Some(&(index, ch)) = chars.peek() {
        if valid_path_character(ch) {
            id.push(ch);
            chars.next();
        } else if ch == '.' || ch == '[' {
            // terminator stays in the stream for path_exp to consume
            break;
        } else {
            return Err(PathParseError::InvalidIdentifierCharacter {
                expr: expr.to_string(),
                ch,
                index,
            });
        }
    }
    tokens.push(PathToken::Field(id));
    Ok(())
}

// bracket_path -> (string_path | index_path | *) ]
fn bracket_path(
    chars: &mut Chars,
    tokens: &mut Vec<PathToken>,
    expr: &str,
    open_index: usize,
) -> Result<(), PathParseError> {
    match chars.next() {
        None => Err(PathParseError::EmptyBracketBody {
            expr: expr.to_string(),
            index: open_index,
        }),
        Some((index, '\'')) => {
            string_path(chars, tokens, expr, index)?;
            close_bracket(chars, expr, index)
        }
        Some((index, ch)) if ch.is_ascii_digit() => {
            index_path(ch, chars, tokens, expr)?;
            close_bracket(chars, expr, index)
        }
        Some((index, '*')) => {
            tokens.push(PathToken::StarIndex);
            close_bracket(chars, expr, index)
        }
        Some((index, ']')) => Err(PathParseError::EmptyBracket {
            expr: expr.to_string(),
            index,
        }),
        Some((index, ch)) => Err(PathParseError::InvalidIndex {
            expr: expr.to_string(),
            ch,
            index,
        }),
    }
}

// string_path -> one or more characters terminated by a single quote
fn string_path(
    chars: &mut Chars,
    tokens: &mut Vec<PathToken>,
    expr: &str,
    quote_index: usize,
) -> Result<(), PathParseError> {
    let mut id = String::new();
    let mut last_index = quote_index;
    for (index, ch) in chars.by_ref() {
        last_index = index;
        if ch == '\'' {
            if id.is_empty() {
                return Err(PathParseError::EmptyString {
                    expr: expr.to_string(),
                    index,
                });
            }
            tokens.push(PathToken::Field(id));
            return Ok(());
        }
        id.push(ch);
    }
    Err(PathParseError::UnterminatedString {
        expr: expr.to_string(),
        index: last_index,
    })
}

// index_path -> one or more digits
fn index_path(
    first: char,
    chars: &mut Chars,
    tokens: &mut Vec<PathToken>,
    expr: &str,
) -> Result<(), PathParseError> {
    let mut digits = String::new();
    digits.push(first);
    while let Some(&(index, ch)) = chars.peek() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            chars.next();
        } else if ch == ']' {
            break;
        } else {
            return Err(PathParseError::InvalidIndex {
                expr: expr.to_string(),
                ch,
                index,
            });
        }
    }
    // digits only, so this parse can not fail unless the index overflows
    let index = digits.parse::<usize>().map_err(|_| PathParseError::InvalidIndex {
        expr: expr.to_string(),
        ch: first,
        index: 0,
    })?;
    tokens.push(PathToken::Index(index));
    Ok(())
}

fn close_bracket(chars: &mut Chars, expr: &str, body_index: usize) -> Result<(), PathParseError> {
    match chars.next() {
        Some((_, ']')) => Ok(()),
        Some((index, ch)) => Err(PathParseError::UnterminatedBrackets {
            expr: expr.to_string(),
            ch,
            index,
        }),
        None => Err(PathParseError::MissingClosingBracket {
            expr: expr.to_string(),
            index: body_index,
        }),
    }
}

/// Score how well a single concrete path segment matches a pattern token.
/// Exact matches (root, named field, literal index) score 2, wildcards score
/// 1, and anything else scores 0.
pub fn matches_token(segment: &str, token: &PathToken) -> usize {
    match token {
        PathToken::Root => {
            if segment == "$" {
                2
            } else {
                0
            }
        }
        PathToken::Field(name) => {
            if segment == name {
                2
            } else {
                0
            }
        }
        PathToken::Index(index) => match segment.parse::<usize>() {
            Ok(i) if i == *index => 2,
            _ => 0,
        },
        PathToken::Star => 1,
        PathToken::StarIndex => {
            if segment.parse::<usize>().is_ok() {
                1
            } else {
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_expression() {
        assert_eq!(parse_path("").unwrap(), vec![]);
    }

    #[test]
    fn test_parse_root_only() {
        assert_eq!(parse_path("$").unwrap(), vec![PathToken::Root]);
    }

    #[test]
    fn test_parse_dotted_fields() {
        assert_eq!(
            parse_path("$.a.b").unwrap(),
            vec![
                PathToken::Root,
                PathToken::Field("a".to_string()),
                PathToken::Field("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_identifier_with_special_chars() {
        assert_eq!(
            parse_path("$.user-id._links:#@self").unwrap(),
            vec![
                PathToken::Root,
                PathToken::Field("user-id".to_string()),
                PathToken::Field("_links:#@self".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_quoted_field() {
        assert_eq!(
            parse_path("$['content type']").unwrap(),
            vec![PathToken::Root, PathToken::Field("content type".to_string())]
        );
    }

    #[test]
    fn test_parse_index_and_wildcards() {
        assert_eq!(
            parse_path("$.items[0][*].*").unwrap(),
            vec![
                PathToken::Root,
                PathToken::Field("items".to_string()),
                PathToken::Index(0),
                PathToken::StarIndex,
                PathToken::Star,
            ]
        );
    }

    #[test]
    fn test_parse_missing_root_marker() {
        let err = parse_path("a.b").unwrap_err();
        assert_eq!(
            err,
            PathParseError::MissingRoot {
                expr: "a.b".to_string()
            }
        );
    }

    #[test]
    fn test_parse_invalid_identifier_character() {
        let err = parse_path("$.a!b").unwrap_err();
        assert_eq!(
            err,
            PathParseError::InvalidIdentifierCharacter {
                expr: "$.a!b".to_string(),
                ch: '!',
                index: 3,
            }
        );
    }

    #[test]
    fn test_parse_trailing_dot() {
        let err = parse_path("$.").unwrap_err();
        assert_eq!(
            err,
            PathParseError::TrailingDot {
                expr: "$.".to_string(),
                index: 1,
            }
        );
    }

    #[test]
    fn test_parse_unterminated_string() {
        assert!(matches!(
            parse_path("$['name").unwrap_err(),
            PathParseError::UnterminatedString { .. }
        ));
    }

    #[test]
    fn test_parse_empty_quoted_string() {
        assert!(matches!(
            parse_path("$['']").unwrap_err(),
            PathParseError::EmptyString { .. }
        ));
    }

    #[test]
    fn test_parse_empty_brackets() {
        assert!(matches!(
            parse_path("$[]").unwrap_err(),
            PathParseError::EmptyBracket { .. }
        ));
    }

    #[test]
    fn test_parse_non_numeric_index() {
        let err = parse_path("$[abc]").unwrap_err();
        assert_eq!(
            err,
            PathParseError::InvalidIndex {
                expr: "$[abc]".to_string(),
                ch: 'a',
                index: 2,
            }
        );
    }

    #[test]
    fn test_parse_unterminated_brackets() {
        assert!(matches!(
            parse_path("$[0").unwrap_err(),
            PathParseError::MissingClosingBracket { .. }
        ));
    }

    #[test]
    fn test_matches_token_scores() {
        assert_eq!(matches_token("$", &PathToken::Root), 2);
        assert_eq!(matches_token("a", &PathToken::Root), 0);
        assert_eq!(matches_token("name", &PathToken::Field("name".to_string())), 2);
        assert_eq!(matches_token("other", &PathToken::Field("name".to_string())), 0);
        assert_eq!(matches_token("3", &PathToken::Index(3)), 2);
        assert_eq!(matches_token("4", &PathToken::Index(3)), 0);
        assert_eq!(matches_token("anything", &PathToken::Star), 1);
        assert_eq!(matches_token("7", &PathToken::StarIndex), 1);
        assert_eq!(matches_token("seven", &PathToken::StarIndex), 0);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn token_strategy() -> impl Strategy<Value = PathToken> {
            prop_oneof![
                "[a-zA-Z][a-zA-Z0-9_-]{0,8}".prop_map(PathToken::Field),
                (0usize..100).prop_map(PathToken::Index),
                Just(PathToken::Star),
                Just(PathToken::StarIndex),
            ]
        }

        proptest! {
            #[test]
            fn test_parse_round_trips_generated_expressions(
                tokens in prop::collection::vec(token_strategy(), 0..8)
            ) {
                let mut expr = "$".to_string();
                for token in &tokens {
                    match token {
                        PathToken::Field(name) => {
                            expr.push('.');
                            expr.push_str(name);
                        }
                        PathToken::Index(index) => expr.push_str(&format!("[{}]", index)),
                        PathToken::Star => expr.push_str(".*"),
                        PathToken::StarIndex => expr.push_str("[*]"),
                        PathToken::Root => {}
                    }
                }
                let mut expected = vec![PathToken::Root];
                expected.extend(tokens.iter().cloned());
                prop_assert_eq!(parse_path(&expr).unwrap(), expected);
            }

            #[test]
            fn test_quoted_fields_preserve_arbitrary_names(name in "[a-zA-Z0-9 _./-]{1,12}") {
                let expr = format!("$['{}']", name);
                prop_assert_eq!(
                    parse_path(&expr).unwrap(),
                    vec![PathToken::Root, PathToken::Field(name)]
                );
            }
        }
    }
}
