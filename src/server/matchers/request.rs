use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    common::data::{
        Error, HttpStubRegex, HttpStubRequest, MatchResult, Method, MethodSpec, Mismatch,
        Tokenizer,
    },
    server::matchers::{
        comparison,
        value::{MultiValuePattern, ValuePattern},
        CustomMatchers,
    },
};

/// The URL part of a request pattern. A pattern carries at most one mode; literal
/// and regex/template modes are mutually exclusive at construction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum UrlPattern {
    /// Literal equality against path plus query.
    Url(String),
    /// Full-string regex match against path plus query.
    UrlRegex(HttpStubRegex),
    /// Literal equality against the path alone, ignoring the query.
    Path(String),
    /// Full-string regex match against the path alone.
    PathRegex(HttpStubRegex),
    /// Positional match against a template with `{name}` segments.
    PathTemplate(PathTemplate),
}

impl UrlPattern {
    /// The configuration-surface name of this URL mode.
    pub fn mode_name(&self) -> &'static str {
        match self {
            UrlPattern::Url(_) => "url",
            UrlPattern::UrlRegex(_) => "urlPattern",
            UrlPattern::Path(_) => "urlPath",
            UrlPattern::PathRegex(_) => "urlPathPattern",
            UrlPattern::PathTemplate(_) => "urlPathTemplate",
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self, UrlPattern::Url(_) | UrlPattern::Path(_))
    }

    /// The operator name used in rendered mismatch reports.
    pub fn operator(&self) -> &'static str {
        match self {
            UrlPattern::Url(_) | UrlPattern::Path(_) => "equalTo",
            UrlPattern::UrlRegex(_) | UrlPattern::PathRegex(_) => "matches",
            UrlPattern::PathTemplate(_) => "matchesPathTemplate",
        }
    }

    /// The declared expectation, rendered for mismatch reports.
    pub fn expected(&self) -> String {
        match self {
            UrlPattern::Url(url) | UrlPattern::Path(url) => url.clone(),
            UrlPattern::UrlRegex(re) | UrlPattern::PathRegex(re) => re.to_string(),
            UrlPattern::PathTemplate(template) => template.raw().to_string(),
        }
    }

    fn score(&self, request: &HttpStubRequest) -> (f64, String) {
        match self {
            UrlPattern::Url(expected) => (
                comparison::equality_score(expected, request.uri_str()),
                request.uri_str().to_string(),
            ),
            UrlPattern::UrlRegex(re) => (
                comparison::regex_score(re, request.uri_str()),
                request.uri_str().to_string(),
            ),
            UrlPattern::Path(expected) => (
                comparison::equality_score(expected, request.path()),
                request.path().to_string(),
            ),
            UrlPattern::PathRegex(re) => (
                comparison::regex_score(re, request.path()),
                request.path().to_string(),
            ),
            UrlPattern::PathTemplate(template) => {
                let path = request.path();
                let score = if template.extract(path).is_some() {
                    1.0
                } else {
                    comparison::equality_score(template.raw(), path)
                };
                (score, path.to_string())
            }
        }
    }
}

/// A parsed path template such as `/orders/{id}/lines`. Literal segments must
/// match exactly; `{name}` segments capture the candidate segment under `name`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<TemplateSegment>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
enum TemplateSegment {
    Literal(String),
    Parameter(String),
}

impl PathTemplate {
    pub fn parse(template: &str) -> Result<Self, Error> {
        if !template.starts_with('/') {
            return Err(Error::ValidationError(format!(
                "path template must start with '/': {:?}",
                template
            )));
        }

        let mut segments = Vec::new();
        for segment in template.split('/').skip(1) {
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                if name.is_empty() {
                    return Err(Error::ValidationError(format!(
                        "empty parameter name in path template {:?}",
                        template
                    )));
                }
                segments.push(TemplateSegment::Parameter(name.to_string()));
            } else {
                segments.push(TemplateSegment::Literal(segment.to_string()));
            }
        }

        Ok(PathTemplate {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Matches `path` against the template, returning the captured parameter
    /// values, or `None` when segment counts or literal segments disagree.
    pub fn extract(&self, path: &str) -> Option<BTreeMap<String, String>> {
        if !path.starts_with('/') {
            return None;
        }

        let candidate_segments: Vec<&str> = path.split('/').skip(1).collect();
        if candidate_segments.len() != self.segments.len() {
            return None;
        }

        let mut parameters = BTreeMap::new();
        for (segment, candidate) in self.segments.iter().zip(candidate_segments) {
            match segment {
                TemplateSegment::Literal(literal) => {
                    if literal != candidate {
                        return None;
                    }
                }
                TemplateSegment::Parameter(name) => {
                    parameters.insert(name.clone(), candidate.to_string());
                }
            }
        }

        Some(parameters)
    }
}

/// An opaque reference to a custom request matcher plus its parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CustomMatcherSpec {
    pub name: String,
    pub parameters: Value,
}

/// The composite matcher of one stub mapping: method, scheme/host/port, at most
/// one URL mode, header/cookie/query maps and body patterns. The overall score is
/// the arithmetic mean of all declared sub-scores.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RequestPattern {
    pub method: MethodSpec,
    pub scheme: Option<ValuePattern>,
    pub host: Option<ValuePattern>,
    pub port: Option<ValuePattern>,
    pub url: Option<UrlPattern>,
    pub headers: Vec<(String, MultiValuePattern)>,
    pub cookies: Vec<(String, ValuePattern)>,
    pub query_params: Vec<(String, MultiValuePattern)>,
    pub body_patterns: Vec<ValuePattern>,
    pub custom_matcher: Option<CustomMatcherSpec>,
}

impl RequestPattern {
    pub fn builder() -> RequestPatternBuilder {
        RequestPatternBuilder::new()
    }

    /// Whether the request satisfies every declared sub-pattern exactly.
    pub fn matches(&self, request: &HttpStubRequest, custom: &CustomMatchers) -> bool {
        self.match_result(request, custom).is_exact_match()
    }

    /// Evaluates all declared sub-patterns and combines their scores into one
    /// composite result with a rendered mismatch per non-exact section.
    pub fn match_result(&self, request: &HttpStubRequest, custom: &CustomMatchers) -> MatchResult {
        let mut scores: Vec<f64> = Vec::new();
        let mut mismatches: Vec<Mismatch> = Vec::new();

        let mut record = |score: f64,
                          entity: &str,
                          key: Option<String>,
                          operator: &str,
                          expected: String,
                          actual: Option<String>,
                          diff_with: Option<Tokenizer>| {
            scores.push(score);
            if score < 1.0 {
                let diff = match (&diff_with, &actual) {
                    (Some(tokenizer), Some(actual)) => {
                        Some(comparison::diff_str(&expected, actual, *tokenizer))
                    }
                    _ => None,
                };
                mismatches.push(Mismatch {
                    entity: entity.to_string(),
                    key,
                    operator: operator.to_string(),
                    expected,
                    actual,
                    diff,
                    score,
                });
            }
        };

        let method_score = if self.method.matches(request.method_str()) {
            1.0
        } else {
            0.0
        };
        record(
            method_score,
            "method",
            None,
            "equalTo",
            self.method.to_string(),
            Some(request.method_str().to_string()),
            None,
        );

        if let Some(pattern) = &self.scheme {
            let score = pattern.match_value(Some(request.scheme()), custom);
            record(
                score,
                "scheme",
                None,
                pattern.operator(),
                pattern.expected(),
                Some(request.scheme().to_string()),
                None,
            );
        }

        if let Some(pattern) = &self.host {
            let host = request.host();
            let score = pattern.match_value(host.as_deref(), custom);
            record(
                score,
                "host",
                None,
                pattern.operator(),
                pattern.expected(),
                host,
                None,
            );
        }

        if let Some(pattern) = &self.port {
            let port = request.port().to_string();
            let score = pattern.match_value(Some(&port), custom);
            record(
                score,
                "port",
                None,
                pattern.operator(),
                pattern.expected(),
                Some(port),
                None,
            );
        }

        if let Some(url) = &self.url {
            let (score, actual) = url.score(request);
            record(
                score,
                url.mode_name(),
                None,
                url.operator(),
                url.expected(),
                Some(actual),
                None,
            );
        }

        for (name, pattern) in &self.headers {
            let values = request.header_values(name);
            let key_present = request.contains_header(name);
            let score = pattern.match_values(key_present, &values, custom);
            record(
                score,
                "header",
                Some(name.clone()),
                pattern.pattern.operator(),
                pattern.pattern.expected(),
                if values.is_empty() {
                    None
                } else {
                    Some(values.join(", "))
                },
                None,
            );
        }

        let request_cookies = if self.cookies.is_empty() {
            Vec::new()
        } else {
            request.cookies()
        };
        for (name, pattern) in &self.cookies {
            let value = request_cookies
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str());
            let score = pattern.match_value(value, custom);
            record(
                score,
                "cookie",
                Some(name.clone()),
                pattern.operator(),
                pattern.expected(),
                value.map(|v| v.to_string()),
                None,
            );
        }

        let request_params = if self.query_params.is_empty() {
            Vec::new()
        } else {
            request.query_params_vec()
        };
        for (name, pattern) in &self.query_params {
            let values: Vec<&str> = request_params
                .iter()
                .filter(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
                .collect();
            let key_present = !values.is_empty();
            let score = pattern.match_values(key_present, &values, custom);
            record(
                score,
                "query parameter",
                Some(name.clone()),
                pattern.pattern.operator(),
                pattern.pattern.expected(),
                if values.is_empty() {
                    None
                } else {
                    Some(values.join(", "))
                },
                None,
            );
        }

        if !self.body_patterns.is_empty() {
            let body = request.body_string();
            for pattern in &self.body_patterns {
                let score = pattern.match_value(Some(&body), custom);
                record(
                    score,
                    "body",
                    None,
                    pattern.operator(),
                    pattern.expected(),
                    Some(body.clone()),
                    Some(Tokenizer::Line),
                );
            }
        }

        if let Some(spec) = &self.custom_matcher {
            let score = match custom.request_matcher(&spec.name) {
                Some(matcher) => {
                    if matcher.matches(request, &spec.parameters) {
                        1.0
                    } else {
                        0.0
                    }
                }
                None => {
                    tracing::warn!("no custom request matcher registered under {:?}", spec.name);
                    0.0
                }
            };
            record(
                score,
                "custom matcher",
                Some(spec.name.clone()),
                "custom",
                format!("custom matcher {:?}", spec.name),
                None,
                None,
            );
        }

        // The method sub-score is always declared, so the list is never empty.
        let score = scores.iter().sum::<f64>() / scores.len() as f64;
        MatchResult { score, mismatches }
    }

    /// Values captured by a path template URL mode, empty for other modes or a
    /// non-matching path.
    pub fn path_parameters(&self, request: &HttpStubRequest) -> BTreeMap<String, String> {
        match &self.url {
            Some(UrlPattern::PathTemplate(template)) => {
                template.extract(request.path()).unwrap_or_default()
            }
            _ => BTreeMap::new(),
        }
    }
}

/// Builds a [`RequestPattern`]. All configuration errors (conflicting URL modes,
/// invalid regexes, malformed templates) surface at [`RequestPatternBuilder::build`],
/// never during matching.
pub struct RequestPatternBuilder {
    method: MethodSpec,
    scheme: Option<ValuePattern>,
    host: Option<ValuePattern>,
    port: Option<ValuePattern>,
    url: Option<UrlPattern>,
    url_conflict: Option<(&'static str, &'static str)>,
    headers: Vec<(String, MultiValuePattern)>,
    cookies: Vec<(String, ValuePattern)>,
    query_params: Vec<(String, MultiValuePattern)>,
    body_patterns: Vec<ValuePattern>,
    regex_errors: Vec<Error>,
    custom_matcher: Option<CustomMatcherSpec>,
}

impl RequestPatternBuilder {
    fn new() -> Self {
        RequestPatternBuilder {
            method: MethodSpec::Any,
            scheme: None,
            host: None,
            port: None,
            url: None,
            url_conflict: None,
            headers: Vec::new(),
            cookies: Vec::new(),
            query_params: Vec::new(),
            body_patterns: Vec::new(),
            regex_errors: Vec::new(),
            custom_matcher: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = MethodSpec::Exact(method);
        self
    }

    pub fn any_method(mut self) -> Self {
        self.method = MethodSpec::Any;
        self
    }

    pub fn scheme(mut self, pattern: ValuePattern) -> Self {
        self.scheme = Some(pattern);
        self
    }

    pub fn host(mut self, pattern: ValuePattern) -> Self {
        self.host = Some(pattern);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(ValuePattern::equal_to(port.to_string()));
        self
    }

    fn set_url(mut self, url: UrlPattern) -> Self {
        if let Some(existing) = &self.url {
            // Literal and regex/template modes exclude each other; note the first
            // conflict and report it at build().
            if existing.is_literal() != url.is_literal() && self.url_conflict.is_none() {
                self.url_conflict = Some((existing.mode_name(), url.mode_name()));
            }
        }
        self.url = Some(url);
        self
    }

    /// Literal equality against path plus query.
    pub fn url<S: Into<String>>(self, url: S) -> Self {
        self.set_url(UrlPattern::Url(url.into()))
    }

    /// Full-string regex against path plus query. Compiles at `build()`.
    pub fn url_matching(mut self, pattern: &str) -> Self {
        match HttpStubRegex::parse(pattern) {
            Ok(re) => self.set_url(UrlPattern::UrlRegex(re)),
            Err(e) => {
                self.regex_errors.push(e);
                self
            }
        }
    }

    /// Literal equality against the path alone.
    pub fn path<S: Into<String>>(self, path: S) -> Self {
        self.set_url(UrlPattern::Path(path.into()))
    }

    /// Full-string regex against the path alone. Compiles at `build()`.
    pub fn path_matching(mut self, pattern: &str) -> Self {
        match HttpStubRegex::parse(pattern) {
            Ok(re) => self.set_url(UrlPattern::PathRegex(re)),
            Err(e) => {
                self.regex_errors.push(e);
                self
            }
        }
    }

    /// Path template with `{name}` segments, e.g. `/orders/{id}`.
    pub fn path_template(self, template: &str) -> Result<Self, Error> {
        let parsed = PathTemplate::parse(template)?;
        Ok(self.set_url(UrlPattern::PathTemplate(parsed)))
    }

    pub fn header<S: Into<String>>(mut self, name: S, pattern: MultiValuePattern) -> Self {
        self.headers.push((name.into(), pattern));
        self
    }

    pub fn cookie<S: Into<String>>(mut self, name: S, pattern: ValuePattern) -> Self {
        self.cookies.push((name.into(), pattern));
        self
    }

    pub fn query_param<S: Into<String>>(mut self, name: S, pattern: MultiValuePattern) -> Self {
        self.query_params.push((name.into(), pattern));
        self
    }

    pub fn body(mut self, pattern: ValuePattern) -> Self {
        self.body_patterns.push(pattern);
        self
    }

    pub fn custom_matcher<S: Into<String>>(mut self, name: S, parameters: Value) -> Self {
        self.custom_matcher = Some(CustomMatcherSpec {
            name: name.into(),
            parameters,
        });
        self
    }

    pub fn build(self) -> Result<RequestPattern, Error> {
        if let Some((first, second)) = self.url_conflict {
            return Err(Error::UrlModeConflict(first, second));
        }

        if let Some(error) = self.regex_errors.into_iter().next() {
            return Err(error);
        }

        Ok(RequestPattern {
            method: self.method,
            scheme: self.scheme,
            host: self.host,
            port: self.port,
            url: self.url,
            headers: self.headers,
            cookies: self.cookies,
            query_params: self.query_params,
            body_patterns: self.body_patterns,
            custom_matcher: self.custom_matcher,
        })
    }
}

#[cfg(test)]
mod request_pattern_tests {
    use super::*;
    use crate::common::data::HttpStubRequest;

    fn custom() -> CustomMatchers {
        CustomMatchers::new()
    }

    fn get(uri: &str) -> HttpStubRequest {
        HttpStubRequest::builder().method("GET").uri(uri).build()
    }

    #[test]
    fn empty_pattern_matches_once_method_matches() {
        let pattern = RequestPattern::builder().build().unwrap();
        let result = pattern.match_result(&get("/anything"), &custom());
        assert_eq!(result.score, 1.0);
        assert!(result.mismatches.is_empty());
    }

    #[test]
    fn method_mismatch_halves_a_two_section_score() {
        let pattern = RequestPattern::builder()
            .method(Method::GET)
            .url("/hello")
            .build()
            .unwrap();

        let request = HttpStubRequest::builder()
            .method("POST")
            .uri("/hello")
            .build();
        let result = pattern.match_result(&request, &custom());

        assert_eq!(result.score, 0.5);
        assert_eq!(result.mismatches.len(), 1);
        assert_eq!(result.mismatches[0].entity, "method");
    }

    #[test]
    fn literal_url_matches_path_and_query() {
        let pattern = RequestPattern::builder()
            .url("/search?q=x")
            .build()
            .unwrap();
        assert!(pattern.matches(&get("/search?q=x"), &custom()));
        assert!(!pattern.matches(&get("/search?q=y"), &custom()));
    }

    #[test]
    fn path_mode_ignores_the_query() {
        let pattern = RequestPattern::builder().path("/search").build().unwrap();
        assert!(pattern.matches(&get("/search?q=x"), &custom()));
    }

    #[test]
    fn url_regex_must_cover_the_full_string() {
        let pattern = RequestPattern::builder()
            .url_matching(r"/items/\d+")
            .build()
            .unwrap();
        assert!(pattern.matches(&get("/items/42"), &custom()));
        assert!(!pattern.matches(&get("/items/42/details"), &custom()));
    }

    #[test]
    fn literal_and_regex_url_modes_conflict() {
        let result = RequestPattern::builder()
            .url("/a")
            .url_matching("/a.*")
            .build();
        assert!(matches!(result, Err(Error::UrlModeConflict(_, _))));
    }

    #[test]
    fn path_template_extracts_named_segments() {
        let pattern = RequestPattern::builder()
            .path_template("/orders/{id}/lines/{line}")
            .unwrap()
            .build()
            .unwrap();

        let request = get("/orders/17/lines/2");
        assert!(pattern.matches(&request, &custom()));

        let params = pattern.path_parameters(&request);
        assert_eq!(params.get("id").map(String::as_str), Some("17"));
        assert_eq!(params.get("line").map(String::as_str), Some("2"));

        assert!(!pattern.matches(&get("/orders/17"), &custom()));
        assert!(!pattern.matches(&get("/carts/17/lines/2"), &custom()));
    }

    #[test]
    fn absent_header_fails_on_empty_string_value() {
        let pattern = RequestPattern::builder()
            .header("x-foo", MultiValuePattern::any(ValuePattern::absent()))
            .build()
            .unwrap();

        assert!(pattern.matches(&get("/"), &custom()));

        let with_empty = HttpStubRequest::builder()
            .uri("/")
            .header("X-Foo", "")
            .build();
        assert!(!pattern.matches(&with_empty, &custom()));
    }

    #[test]
    fn header_matching_is_case_insensitive_on_names() {
        let pattern = RequestPattern::builder()
            .header(
                "Content-Type",
                MultiValuePattern::any(ValuePattern::equal_to("application/json")),
            )
            .build()
            .unwrap();

        let request = HttpStubRequest::builder()
            .uri("/")
            .header("content-type", "application/json")
            .build();
        assert!(pattern.matches(&request, &custom()));
    }

    #[test]
    fn query_params_decode_before_matching() {
        let pattern = RequestPattern::builder()
            .query_param(
                "q",
                MultiValuePattern::any(ValuePattern::equal_to("hello world")),
            )
            .build()
            .unwrap();
        assert!(pattern.matches(&get("/search?q=hello%20world"), &custom()));
    }

    #[test]
    fn cookie_patterns_match_parsed_cookie_headers() {
        let pattern = RequestPattern::builder()
            .cookie("session", ValuePattern::equal_to("abc"))
            .build()
            .unwrap();

        let request = HttpStubRequest::builder()
            .uri("/")
            .header("Cookie", "theme=dark; session=abc")
            .build();
        assert!(pattern.matches(&request, &custom()));
        assert!(!pattern.matches(&get("/"), &custom()));
    }

    #[test]
    fn all_body_patterns_must_match() {
        let pattern = RequestPattern::builder()
            .body(ValuePattern::containing("alpha"))
            .body(ValuePattern::containing("beta"))
            .build()
            .unwrap();

        let both = HttpStubRequest::builder().uri("/").body("alpha beta").build();
        assert!(pattern.matches(&both, &custom()));

        let one = HttpStubRequest::builder().uri("/").body("alpha").build();
        assert!(!pattern.matches(&one, &custom()));
    }

    #[test]
    fn custom_request_matcher_participates_in_the_score() {
        let mut custom = CustomMatchers::new();
        custom.register_request_matcher(
            "has-body",
            std::sync::Arc::new(|request: &HttpStubRequest, _: &Value| {
                !request.body().is_empty()
            }),
        );

        let pattern = RequestPattern::builder()
            .custom_matcher("has-body", Value::Null)
            .build()
            .unwrap();

        let with_body = HttpStubRequest::builder().uri("/").body("x").build();
        assert!(pattern.matches(&with_body, &custom));
        assert!(!pattern.matches(&get("/"), &custom));
    }
}
