use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fmt,
    str::FromStr,
    sync::Arc,
    time::SystemTime,
};

use headers::{Cookie, HeaderMapExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::common::util::HttpStubBytes;

/// Priority assigned to a stub mapping when the user does not choose one.
/// Lower numeric values take precedence.
pub const DEFAULT_PRIORITY: u16 = 5;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid regex pattern: {0}")]
    InvalidRegex(#[from] regex::Error),
    #[error("URL match modes are mutually exclusive: {0} is already set, cannot also set {1}")]
    UrlModeConflict(&'static str, &'static str),
    #[error("a stub mapping with id {0} is already registered")]
    DuplicateStubId(usize),
    #[error("the request journal is disabled")]
    RequestJournalDisabled,
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("validation error: {0}")]
    ValidationError(String),
}

/// A general abstraction of an HTTP request as seen by the stub matching core.
///
/// Instances are immutable once built. The transport collaborator constructs one
/// request per serve via [`HttpStubRequest::builder`].
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpStubRequest {
    scheme: String,
    uri: String,
    method: String,
    headers: Vec<(String, String)>,
    body: HttpStubBytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    multipart_parts: Option<Vec<MultipartPart>>,
}

impl HttpStubRequest {
    pub fn builder() -> HttpStubRequestBuilder {
        HttpStubRequestBuilder::new()
    }

    /// Returns the scheme the request was received over, either "http" or "https".
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Returns the request target (path plus query) as received.
    pub fn uri_str(&self) -> &str {
        &self.uri
    }

    /// Returns the path component of the request target, without the query.
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// Returns the raw query string, if the request target carries one.
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// Returns the host that the request was sent to, based on the `Host` header.
    pub fn host(&self) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("host"))
            .and_then(|(_, host)| host.split(':').next())
            .map(|host| host.to_string())
    }

    /// Returns the port the request was sent to, based on the `Host` header, falling
    /// back to the scheme's default port.
    pub fn port(&self) -> u16 {
        if let Some((_, host)) = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        {
            if let Some(port_str) = host.split(':').nth(1) {
                if let Ok(port) = port_str.parse::<u16>() {
                    return port;
                }
            }
        }

        if self.scheme.eq("https") {
            return 443;
        }

        80
    }

    pub fn method_str(&self) -> &str {
        &self.method
    }

    /// All header name/value pairs in receive order. Header names keep their
    /// original casing; matching against them is case-insensitive.
    pub fn headers_vec(&self) -> &Vec<(String, String)> {
        &self.headers
    }

    /// All values carried by the header with the given (case-insensitive) name.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Cookies sent with the request, parsed from all `Cookie` headers.
    pub fn cookies(&self) -> Vec<(String, String)> {
        let mut header_map = http::HeaderMap::new();
        for (key, value) in &self.headers {
            if !key.eq_ignore_ascii_case("cookie") {
                continue;
            }
            if let Ok(header_value) = http::HeaderValue::from_str(value) {
                header_map.append(http::header::COOKIE, header_value);
            }
        }

        let mut result = Vec::new();
        if let Some(cookie) = header_map.typed_get::<Cookie>() {
            for (key, value) in cookie.iter() {
                result.push((key.to_string(), value.to_string()));
            }
        }

        result
    }

    /// Decoded query parameters in order of appearance. Keys may repeat.
    pub fn query_params_vec(&self) -> Vec<(String, String)> {
        // There doesn't seem to be a way to just parse a query string with the `url`
        // crate, so we're prefixing a dummy URL for parsing.
        let url = format!("http://dummy?{}", self.query().unwrap_or(""));
        match Url::parse(&url) {
            Ok(url) => url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn body(&self) -> &HttpStubBytes {
        &self.body
    }

    pub fn body_string(&self) -> String {
        self.body.to_maybe_lossy_str().to_string()
    }

    /// Pre-parsed multipart sections, when the transport collaborator supplied them.
    pub fn multipart_parts(&self) -> Option<&Vec<MultipartPart>> {
        self.multipart_parts.as_ref()
    }
}

/// Builder for [`HttpStubRequest`]. Used by the transport collaborator and by tests.
pub struct HttpStubRequestBuilder {
    scheme: String,
    uri: String,
    method: String,
    headers: Vec<(String, String)>,
    body: HttpStubBytes,
    multipart_parts: Option<Vec<MultipartPart>>,
}

impl HttpStubRequestBuilder {
    fn new() -> Self {
        Self {
            scheme: "http".to_string(),
            uri: "/".to_string(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: HttpStubBytes::default(),
            multipart_parts: None,
        }
    }

    pub fn scheme<S: Into<String>>(mut self, scheme: S) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Sets the request target (path with optional query), e.g. `/orders?id=5`.
    pub fn uri<S: Into<String>>(mut self, uri: S) -> Self {
        self.uri = uri.into();
        self
    }

    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.method = method.into().to_uppercase();
        self
    }

    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body<B: Into<HttpStubBytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn multipart_part(mut self, part: MultipartPart) -> Self {
        self.multipart_parts.get_or_insert_with(Vec::new).push(part);
        self
    }

    pub fn build(self) -> HttpStubRequest {
        HttpStubRequest {
            scheme: self.scheme,
            uri: self.uri,
            method: self.method,
            headers: self.headers,
            body: self.body,
            multipart_parts: self.multipart_parts,
        }
    }
}

/// One section of a multipart request body, pre-parsed by the transport collaborator.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: HttpStubBytes,
}

/// A regex wrapper that makes compiled patterns serializable and comparable.
///
/// Patterns always compile with multiline and dot-all semantics enabled so that
/// they can span newlines; compilation failures surface at construction time.
/// Serialization carries the raw pattern string and deserialization goes back
/// through [`HttpStubRegex::parse`], so the compilation flags survive a round
/// trip through the admin surface.
#[derive(Clone, Debug)]
pub struct HttpStubRegex {
    raw: regex::Regex,
    /// The same pattern wrapped in `\A(?:...)\z`. Whole-string matching cannot
    /// rely on the first leftmost-first match spanning the candidate: for
    /// alternations and lazy quantifiers a shorter match wins even when a
    /// full-length one exists.
    anchored: regex::Regex,
}

impl HttpStubRegex {
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        let raw = regex::RegexBuilder::new(pattern)
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()?;
        let anchored = regex::RegexBuilder::new(&format!(r"\A(?:{})\z", pattern))
            .multi_line(true)
            .dot_matches_new_line(true)
            .build()?;
        Ok(HttpStubRegex { raw, anchored })
    }

    /// The pattern as it was written, without the anchoring wrapper.
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Whether the regex matches the entire candidate string, not just a substring.
    pub fn is_full_match(&self, candidate: &str) -> bool {
        self.anchored.is_match(candidate)
    }
}

impl Ord for HttpStubRegex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for HttpStubRegex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HttpStubRegex {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for HttpStubRegex {}

impl fmt::Display for HttpStubRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for HttpStubRegex {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HttpStubRegex {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        HttpStubRegex::parse(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Represents an HTTP method.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
    PATCH,
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_uppercase().as_str() {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "CONNECT" => Ok(Method::CONNECT),
            "OPTIONS" => Ok(Method::OPTIONS),
            "TRACE" => Ok(Method::TRACE),
            "PATCH" => Ok(Method::PATCH),
            _ => Err(Error::InvalidMethod(input.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The method part of a request pattern: a concrete verb or the wildcard "ANY".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum MethodSpec {
    Any,
    Exact(Method),
}

impl MethodSpec {
    pub fn matches(&self, method: &str) -> bool {
        match self {
            MethodSpec::Any => true,
            MethodSpec::Exact(m) => m.to_string().eq_ignore_ascii_case(method),
        }
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MethodSpec::Any => write!(f, "ANY"),
            MethodSpec::Exact(m) => write!(f, "{}", m),
        }
    }
}

/// The response descriptor bound to a stub mapping. The matching core carries this
/// value without interpreting it; rendering belongs to the transport collaborator.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResponseDefinition {
    pub status: Option<u16>,
    pub headers: Option<Vec<(String, String)>>,
    pub body: Option<HttpStubBytes>,
    pub delay: Option<u64>,
}

impl ResponseDefinition {
    pub fn status(status: u16) -> Self {
        ResponseDefinition {
            status: Some(status),
            headers: None,
            body: None,
            delay: None,
        }
    }

    pub fn with_body<B: Into<HttpStubBytes>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl Default for ResponseDefinition {
    fn default() -> Self {
        ResponseDefinition::status(200)
    }
}

/// Binds a stub mapping to a scenario: the mapping is only eligible while the
/// scenario is in `required_state` (or always, when no required state is declared),
/// and a winning match moves the scenario to `new_state`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScenarioBinding {
    pub scenario: String,
    pub required_state: Option<String>,
    pub new_state: Option<String>,
}

/// A registered rule binding a request pattern to a response descriptor.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StubMapping {
    /// Unique identifier; assigned by the registry at registration when absent.
    pub id: Option<usize>,
    pub name: Option<String>,
    /// Lower numeric value wins over higher ones.
    pub priority: u16,
    pub request: crate::server::matchers::RequestPattern,
    pub response: ResponseDefinition,
    pub scenario: Option<ScenarioBinding>,
    pub metadata: Option<Value>,
    /// Persistent mappings survive `delete_all_stubs` and `reset`.
    pub persistent: bool,
}

impl StubMapping {
    pub fn new(request: crate::server::matchers::RequestPattern, response: ResponseDefinition) -> Self {
        StubMapping {
            id: None,
            name: None,
            priority: DEFAULT_PRIORITY,
            request,
            response,
            scenario: None,
            metadata: None,
            persistent: false,
        }
    }

    pub fn with_id(mut self, id: usize) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Binds this mapping to a scenario. Pass `None` as `required_state` to make
    /// the mapping the entry point of the scenario.
    pub fn in_scenario<S: Into<String>>(
        mut self,
        scenario: S,
        required_state: Option<String>,
        new_state: Option<String>,
    ) -> Self {
        self.scenario = Some(ScenarioBinding {
            scenario: scenario.into(),
            required_state,
            new_state,
        });
        self
    }
}

/// A stub mapping held by the registry, together with registry-owned bookkeeping.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ActiveStub {
    pub id: usize,
    /// Monotonically increasing registration counter; never reused. Among equal
    /// priorities, higher insertion index (more recently registered) wins.
    pub insertion_index: usize,
    pub call_counter: usize,
    pub mapping: StubMapping,
}

impl ActiveStub {
    pub fn new(id: usize, insertion_index: usize, mut mapping: StubMapping) -> Self {
        mapping.id = Some(id);
        ActiveStub {
            id,
            insertion_index,
            call_counter: 0,
            mapping,
        }
    }

    /// The candidate evaluation order: ascending priority, then most recently
    /// registered first.
    pub fn sort_key(&self) -> (u16, std::cmp::Reverse<usize>) {
        (self.mapping.priority, std::cmp::Reverse(self.insertion_index))
    }
}

/// The record of one resolved request, matched or not. Owned by the request journal.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServeEvent {
    pub id: usize,
    pub request: Arc<HttpStubRequest>,
    pub stub: Option<StubMapping>,
    pub response: Option<ResponseDefinition>,
    pub was_matched: bool,
    pub timestamp: SystemTime,
}

/// The outcome of resolving one request against the registry.
#[derive(Debug, Clone)]
pub struct ServeOutcome {
    pub stub: Option<ActiveStub>,
    pub response: Option<ResponseDefinition>,
    /// Values extracted from a path template URL mode of the winning stub.
    pub path_parameters: BTreeMap<String, String>,
    pub was_matched: bool,
}

/// What a near miss was compared against: a registered stub mapping, or a free
/// request pattern supplied by a verification call.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum NearMissCandidate {
    Stub(StubMapping),
    Pattern(crate::server::matchers::RequestPattern),
}

/// A non-matching candidate ranked by how close it came to matching.
/// Computed on demand, never persisted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NearMiss {
    pub request: HttpStubRequest,
    pub candidate: NearMissCandidate,
    pub result: MatchResult,
    /// The bound scenario's state at comparison time, if the candidate has one.
    pub scenario_state: Option<String>,
}

// *************************************************************************************************
// Match result and diff rendering data
// *************************************************************************************************

/// The exactness of one pattern evaluation: 1.0 is an exact match, 0.0 a total
/// mismatch. Only an exact result can win a serve; fractional scores feed the
/// near-miss ranking.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MatchResult {
    pub score: f64,
    /// One entry per declared sub-pattern that did not score exact.
    pub mismatches: Vec<Mismatch>,
}

impl MatchResult {
    pub fn exact() -> Self {
        MatchResult {
            score: 1.0,
            mismatches: Vec::new(),
        }
    }

    pub fn is_exact_match(&self) -> bool {
        self.score >= 1.0
    }
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub enum Diff {
    Same(String),
    Add(String),
    Rem(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DiffResult {
    pub tokenizer: Tokenizer,
    pub distance: f32,
    pub differences: Vec<Diff>,
}

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Copy)]
pub enum Tokenizer {
    Line,
    Word,
    Character,
}

/// One expected/actual discrepancy of a request pattern evaluation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Mismatch {
    /// The request part the discrepancy belongs to, e.g. "method", "url", "header".
    pub entity: String,
    /// The header/cookie/query parameter name, where applicable.
    pub key: Option<String>,
    /// The pattern operator that failed, e.g. "equalTo", "matches", "absent".
    pub operator: String,
    pub expected: String,
    pub actual: Option<String>,
    pub diff: Option<DiffResult>,
    /// The sub-score this part contributed to the composite score.
    pub score: f64,
}
