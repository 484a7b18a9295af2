use std::{collections::HashMap, sync::Arc};

use serde_json::Value;

use crate::common::data::HttpStubRequest;

pub mod comparison;
pub mod request;
pub mod value;

pub use request::{
    CustomMatcherSpec, PathTemplate, RequestPattern, RequestPatternBuilder, UrlPattern,
};
pub use value::{MatchMode, MultiValuePattern, ValuePattern};

/// A user-supplied matcher for one string-valued request fact, referenced by name
/// from a [`ValuePattern::Custom`] pattern.
pub trait CustomValueMatcher: Send + Sync {
    fn matches(&self, candidate: Option<&str>, parameters: &Value) -> bool;
}

/// A user-supplied matcher evaluated against the whole request, referenced by name
/// from a request pattern's custom matcher slot.
pub trait CustomRequestMatcher: Send + Sync {
    fn matches(&self, request: &HttpStubRequest, parameters: &Value) -> bool;
}

impl<F> CustomValueMatcher for F
where
    F: Fn(Option<&str>, &Value) -> bool + Send + Sync,
{
    fn matches(&self, candidate: Option<&str>, parameters: &Value) -> bool {
        self(candidate, parameters)
    }
}

impl<F> CustomRequestMatcher for F
where
    F: Fn(&HttpStubRequest, &Value) -> bool + Send + Sync,
{
    fn matches(&self, request: &HttpStubRequest, parameters: &Value) -> bool {
        self(request, parameters)
    }
}

/// The named custom matchers known to a registry instance. Patterns reference
/// these opaquely by name; an unknown name fails closed as a non-match.
#[derive(Default, Clone)]
pub struct CustomMatchers {
    value_matchers: HashMap<String, Arc<dyn CustomValueMatcher>>,
    request_matchers: HashMap<String, Arc<dyn CustomRequestMatcher>>,
}

impl CustomMatchers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_value_matcher<S: Into<String>>(
        &mut self,
        name: S,
        matcher: Arc<dyn CustomValueMatcher>,
    ) {
        self.value_matchers.insert(name.into(), matcher);
    }

    pub fn register_request_matcher<S: Into<String>>(
        &mut self,
        name: S,
        matcher: Arc<dyn CustomRequestMatcher>,
    ) {
        self.request_matchers.insert(name.into(), matcher);
    }

    pub fn value_matcher(&self, name: &str) -> Option<&Arc<dyn CustomValueMatcher>> {
        self.value_matchers.get(name)
    }

    pub fn request_matcher(&self, name: &str) -> Option<&Arc<dyn CustomRequestMatcher>> {
        self.request_matchers.get(name)
    }
}
