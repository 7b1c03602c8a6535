//! The HTTP request model that expected interactions are recorded against.

use std::collections::HashMap;
use std::fmt::{self, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A request or response body. Distinguishes a body that was never specified
/// from one that was explicitly specified to be empty, because the two lead
/// to different matching obligations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Body {
    /// No body was specified
    #[default]
    Missing,
    /// A body was specified as empty
    Empty,
    /// A body was specified as a null value (e.g. a JSON `null`)
    Null,
    /// Body content plus the content type it was recorded with
    Present(Bytes, Option<String>),
}

impl Body {
    pub fn is_missing(&self) -> bool {
        matches!(self, Body::Missing)
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Body::Present(_, _))
    }

    /// True for an empty body, including present content of zero length.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty | Body::Null => true,
            Body::Present(bytes, _) => bytes.is_empty(),
            Body::Missing => false,
        }
    }

    /// The bytes of the body, if any are present.
    pub fn value(&self) -> Option<Bytes> {
        match self {
            Body::Present(bytes, _) => Some(bytes.clone()),
            _ => None,
        }
    }

    /// The content type the body was recorded with, if any.
    pub fn content_type(&self) -> Option<String> {
        match self {
            Body::Present(_, content_type) => content_type.clone(),
            _ => None,
        }
    }
}

impl Display for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Missing => write!(f, "Missing"),
            Body::Empty => write!(f, "Empty"),
            Body::Null => write!(f, "Null"),
            Body::Present(bytes, _) => write!(f, "Present({} bytes)", bytes.len()),
        }
    }
}

/// An HTTP request, as recorded in an expected interaction or captured from
/// an actual exchange. Query parameters and headers are multi-valued maps;
/// `None` means the part was not specified at all.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<HashMap<String, Vec<String>>>,
    pub headers: Option<HashMap<String, Vec<String>>>,
    pub body: Body,
}

impl HttpRequest {
    /// Look up a header by name, case insensitively.
    pub fn lookup_header_value(&self, name: &str) -> Option<Vec<String>> {
        self.headers.as_ref().and_then(|headers| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, values)| values.clone())
        })
    }

    /// The content type of the request: the one recorded with the body if
    /// any, else the first `Content-Type` header value.
    pub fn content_type(&self) -> Option<String> {
        self.body.content_type().or_else(|| {
            self.lookup_header_value("content-type")
                .and_then(|values| values.first().cloned())
        })
    }
}

impl Default for HttpRequest {
    fn default() -> Self {
        HttpRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            query: None,
            headers: None,
            body: Body::Missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_emptiness() {
        assert!(!Body::Missing.is_empty());
        assert!(Body::Empty.is_empty());
        assert!(Body::Null.is_empty());
        assert!(Body::Present(Bytes::new(), None).is_empty());
        assert!(!Body::Present(Bytes::from("data"), None).is_empty());
    }

    #[test]
    fn test_content_type_prefers_body_over_headers() {
        let request = HttpRequest {
            headers: Some(HashMap::from([(
                "Content-Type".to_string(),
                vec!["text/plain".to_string()],
            )])),
            body: Body::Present(Bytes::from("{}"), Some("application/json".to_string())),
            ..HttpRequest::default()
        };
        assert_eq!(request.content_type(), Some("application/json".to_string()));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest {
            headers: Some(HashMap::from([(
                "Content-Type".to_string(),
                vec!["application/json".to_string()],
            )])),
            ..HttpRequest::default()
        };
        assert_eq!(
            request.lookup_header_value("content-type"),
            Some(vec!["application/json".to_string()])
        );
    }
}
