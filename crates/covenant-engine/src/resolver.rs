//! Resolving doc paths against the request under test.

use anyhow::anyhow;
use covenant_models::path_exp::PathToken;
use covenant_models::request::{Body, HttpRequest};
use covenant_models::DocPath;

use crate::context::PlanMatchingContext;
use crate::value::NodeValue;

/// Resolves a doc path to a value from the test context. Resolve nodes in a
/// plan are evaluated through this.
pub trait ValueResolver: std::fmt::Debug {
    fn resolve(&self, path: &DocPath, context: &PlanMatchingContext) -> anyhow::Result<NodeValue>;
}

/// Value resolver backed by an HTTP request.
#[derive(Clone, Debug, Default)]
pub struct HttpRequestValueResolver {
    /// Request to resolve values against
    pub request: HttpRequest,
}

impl ValueResolver for HttpRequestValueResolver {
    fn resolve(&self, path: &DocPath, _context: &PlanMatchingContext) -> anyhow::Result<NodeValue> {
        match path.first_field() {
            Some("method") => Ok(NodeValue::String(self.request.method.clone())),
            Some("path") => Ok(NodeValue::String(self.request.path.clone())),
            Some("query") => {
                if path.len() == 2 || (path.len() == 3 && path.is_wildcard()) {
                    Ok(NodeValue::MultiMap(
                        self.request.query.clone().unwrap_or_default(),
                    ))
                } else if path.len() == 3 {
                    let param_name = path.last_field().unwrap_or_default();
                    match self
                        .request
                        .query
                        .as_ref()
                        .and_then(|query| query.get(param_name))
                    {
                        Some(values) if values.len() == 1 => {
                            Ok(NodeValue::String(values[0].clone()))
                        }
                        Some(values) => Ok(NodeValue::StringList(values.clone())),
                        None => Ok(NodeValue::Null),
                    }
                } else {
                    Err(anyhow!(
                        "{} is not valid for a HTTP request query parameters",
                        path
                    ))
                }
            }
            Some("headers") => {
                let headers: std::collections::HashMap<String, Vec<String>> = self
                    .request
                    .headers
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k.to_lowercase(), v))
                    .collect();
                if path.len() == 2 || (path.len() == 3 && path.is_wildcard()) {
                    Ok(NodeValue::MultiMap(headers))
                } else if path.len() == 3 {
                    let header_name = path.last_field().unwrap_or_default().to_lowercase();
                    match headers.get(&header_name) {
                        Some(values) if values.len() == 1 => {
                            Ok(NodeValue::String(values[0].clone()))
                        }
                        Some(values) => Ok(NodeValue::StringList(values.clone())),
                        None => Ok(NodeValue::Null),
                    }
                } else if path.len() == 4 && matches!(path.last(), Some(PathToken::Index(_))) {
                    let header_name = path.last_field().unwrap_or_default().to_lowercase();
                    match (headers.get(&header_name), path.last()) {
                        (Some(values), Some(PathToken::Index(index))) => Ok(values
                            .get(*index)
                            .map(|value| NodeValue::String(value.clone()))
                            .unwrap_or_default()),
                        _ => Ok(NodeValue::Null),
                    }
                } else {
                    Err(anyhow!("{} is not valid for HTTP request headers", path))
                }
            }
            Some("content-type") => Ok(self
                .request
                .content_type()
                .map(NodeValue::String)
                .unwrap_or_default()),
            Some("body") if path.len() == 2 => match &self.request.body {
                Body::Present(bytes, _) => Ok(NodeValue::Bytes(bytes.to_vec())),
                _ => Ok(NodeValue::Null),
            },
            _ => Err(anyhow!("{} is not valid for a HTTP request", path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bytes::Bytes;

    use super::*;

    fn resolve(resolver: &HttpRequestValueResolver, path: &'static str) -> anyhow::Result<NodeValue> {
        let context = PlanMatchingContext::default();
        resolver.resolve(&DocPath::new_unwrap(path), &context)
    }

    #[test]
    fn test_resolve_basic_parts() {
        let resolver = HttpRequestValueResolver::default();
        assert_eq!(
            resolve(&resolver, "$.method").unwrap(),
            NodeValue::String("GET".to_string())
        );
        assert_eq!(
            resolve(&resolver, "$.path").unwrap(),
            NodeValue::String("/".to_string())
        );
        assert_eq!(
            resolve(&resolver, "$.query").unwrap(),
            NodeValue::MultiMap(HashMap::new())
        );
        assert_eq!(
            resolve(&resolver, "$.headers").unwrap(),
            NodeValue::MultiMap(HashMap::new())
        );
        assert_eq!(resolve(&resolver, "$.body").unwrap(), NodeValue::Null);
    }

    #[test]
    fn test_resolve_query_parameter() {
        let resolver = HttpRequestValueResolver {
            request: HttpRequest {
                query: Some(HashMap::from([
                    ("a".to_string(), vec!["1".to_string()]),
                    ("b".to_string(), vec!["2".to_string(), "3".to_string()]),
                ])),
                ..HttpRequest::default()
            },
        };
        assert_eq!(
            resolve(&resolver, "$.query.a").unwrap(),
            NodeValue::String("1".to_string())
        );
        assert_eq!(
            resolve(&resolver, "$.query.b").unwrap(),
            NodeValue::StringList(vec!["2".to_string(), "3".to_string()])
        );
        assert_eq!(resolve(&resolver, "$.query.c").unwrap(), NodeValue::Null);
    }

    #[test]
    fn test_resolve_headers_lower_cases_names() {
        let resolver = HttpRequestValueResolver {
            request: HttpRequest {
                headers: Some(HashMap::from([(
                    "Content-Type".to_string(),
                    vec!["application/json".to_string()],
                )])),
                ..HttpRequest::default()
            },
        };
        assert_eq!(
            resolve(&resolver, "$.headers['content-type']").unwrap(),
            NodeValue::String("application/json".to_string())
        );
        assert_eq!(
            resolve(&resolver, "$['content-type']").unwrap(),
            NodeValue::String("application/json".to_string())
        );
    }

    #[test]
    fn test_resolve_header_by_index() {
        let resolver = HttpRequestValueResolver {
            request: HttpRequest {
                headers: Some(HashMap::from([(
                    "accept".to_string(),
                    vec!["text/html".to_string(), "application/json".to_string()],
                )])),
                ..HttpRequest::default()
            },
        };
        assert_eq!(
            resolve(&resolver, "$.headers.accept[1]").unwrap(),
            NodeValue::String("application/json".to_string())
        );
        assert_eq!(
            resolve(&resolver, "$.headers.accept[5]").unwrap(),
            NodeValue::Null
        );
    }

    #[test]
    fn test_resolve_body_bytes() {
        let resolver = HttpRequestValueResolver {
            request: HttpRequest {
                body: Body::Present(Bytes::from("data"), None),
                ..HttpRequest::default()
            },
        };
        assert_eq!(
            resolve(&resolver, "$.body").unwrap(),
            NodeValue::Bytes(b"data".to_vec())
        );
    }

    #[test]
    fn test_resolve_failures() {
        let resolver = HttpRequestValueResolver::default();
        let context = PlanMatchingContext::default();
        let err = resolver
            .resolve(&DocPath::root(), &context)
            .unwrap_err();
        assert_eq!(err.to_string(), "$ is not valid for a HTTP request");
        let err = resolver
            .resolve(&DocPath::new_unwrap("$.blah"), &context)
            .unwrap_err();
        assert_eq!(err.to_string(), "$.blah is not valid for a HTTP request");
    }
}
