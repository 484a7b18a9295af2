use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    common::data::{Error, HttpStubRegex},
    server::matchers::{comparison, CustomMatchers},
};

/// A pattern for one string-valued request fact. Exactly one matching rule per
/// instance, enforced by the sum type; regexes compile at construction.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ValuePattern {
    EqualTo(String),
    Contains(String),
    Matches(HttpStubRegex),
    DoesNotMatch(HttpStubRegex),
    /// Requires the fact to be wholly missing. A present-but-empty value fails.
    Absent,
    EqualToJson {
        value: Value,
        /// Lenient comparison ignores key order and tolerates extra fields on the
        /// candidate side. Missing fields still fail.
        lenient: bool,
    },
    EqualToXml(String),
    /// An opaque reference to a matcher registered on the registry.
    Custom {
        name: String,
        parameters: Value,
    },
}

impl ValuePattern {
    pub fn equal_to<S: Into<String>>(value: S) -> Self {
        ValuePattern::EqualTo(value.into())
    }

    pub fn containing<S: Into<String>>(value: S) -> Self {
        ValuePattern::Contains(value.into())
    }

    /// Compiles `pattern` with multiline and dot-all semantics. An invalid regex
    /// fails here, never on the matching hot path.
    pub fn matching(pattern: &str) -> Result<Self, Error> {
        Ok(ValuePattern::Matches(HttpStubRegex::parse(pattern)?))
    }

    pub fn not_matching(pattern: &str) -> Result<Self, Error> {
        Ok(ValuePattern::DoesNotMatch(HttpStubRegex::parse(pattern)?))
    }

    pub fn absent() -> Self {
        ValuePattern::Absent
    }

    pub fn equal_to_json(value: Value) -> Self {
        ValuePattern::EqualToJson {
            value,
            lenient: false,
        }
    }

    pub fn equal_to_json_lenient(value: Value) -> Self {
        ValuePattern::EqualToJson {
            value,
            lenient: true,
        }
    }

    pub fn equal_to_xml<S: Into<String>>(xml: S) -> Self {
        ValuePattern::EqualToXml(xml.into())
    }

    pub fn custom<S: Into<String>>(name: S, parameters: Value) -> Self {
        ValuePattern::Custom {
            name: name.into(),
            parameters,
        }
    }

    /// The operator name used in rendered mismatch reports.
    pub fn operator(&self) -> &'static str {
        match self {
            ValuePattern::EqualTo(_) => "equalTo",
            ValuePattern::Contains(_) => "contains",
            ValuePattern::Matches(_) => "matches",
            ValuePattern::DoesNotMatch(_) => "doesNotMatch",
            ValuePattern::Absent => "absent",
            ValuePattern::EqualToJson { .. } => "equalToJson",
            ValuePattern::EqualToXml(_) => "equalToXml",
            ValuePattern::Custom { .. } => "custom",
        }
    }

    /// The declared expectation, rendered for mismatch reports.
    pub fn expected(&self) -> String {
        match self {
            ValuePattern::EqualTo(value) => value.clone(),
            ValuePattern::Contains(value) => value.clone(),
            ValuePattern::Matches(re) => re.to_string(),
            ValuePattern::DoesNotMatch(re) => format!("not {}", re),
            ValuePattern::Absent => "(absent)".to_string(),
            ValuePattern::EqualToJson { value, .. } => {
                serde_json::to_string(value).unwrap_or_default()
            }
            ValuePattern::EqualToXml(xml) => xml.clone(),
            ValuePattern::Custom { name, .. } => format!("custom matcher {:?}", name),
        }
    }

    /// Scores a candidate against this pattern. `None` means the fact is wholly
    /// absent from the request. Total over arbitrary candidate data; malformed
    /// candidate bodies resolve to a non-match, never an error.
    pub fn match_value(&self, candidate: Option<&str>, custom: &CustomMatchers) -> f64 {
        match (self, candidate) {
            (ValuePattern::Absent, None) => 1.0,
            (ValuePattern::Absent, Some(_)) => 0.0,
            (ValuePattern::Custom { name, parameters }, candidate) => {
                match custom.value_matcher(name) {
                    Some(matcher) => {
                        if matcher.matches(candidate, parameters) {
                            1.0
                        } else {
                            0.0
                        }
                    }
                    None => {
                        tracing::warn!("no custom value matcher registered under {:?}", name);
                        0.0
                    }
                }
            }
            (pattern, None) => {
                // A missing fact can never exactly satisfy a value expectation, but
                // ranking improves when we compare against the empty string.
                pattern.match_present_value("", custom).min(0.5)
            }
            (pattern, Some(value)) => pattern.match_present_value(value, custom),
        }
    }

    fn match_present_value(&self, candidate: &str, _custom: &CustomMatchers) -> f64 {
        match self {
            ValuePattern::EqualTo(expected) => comparison::equality_score(expected, candidate),
            ValuePattern::Contains(expected) => comparison::contains_score(expected, candidate),
            ValuePattern::Matches(re) => comparison::regex_score(re, candidate),
            ValuePattern::DoesNotMatch(re) => comparison::negated_regex_score(re, candidate),
            ValuePattern::EqualToJson { value, lenient } => {
                comparison::json_score(value, candidate, *lenient)
            }
            ValuePattern::EqualToXml(expected) => comparison::xml_score(expected, candidate),
            // Handled in match_value.
            ValuePattern::Absent | ValuePattern::Custom { .. } => 0.0,
        }
    }
}

/// How a multi-value pattern treats repeated values of the same field.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// At least one repeated value must satisfy the pattern.
    Any,
    /// Every repeated value must satisfy the pattern.
    All,
}

/// Wraps a [`ValuePattern`] for fields that may carry repeated values (headers,
/// query parameters). The `Absent` pattern asserts the field key is wholly
/// missing, not merely present with no values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MultiValuePattern {
    pub pattern: ValuePattern,
    pub mode: MatchMode,
}

impl MultiValuePattern {
    pub fn any(pattern: ValuePattern) -> Self {
        MultiValuePattern {
            pattern,
            mode: MatchMode::Any,
        }
    }

    pub fn all(pattern: ValuePattern) -> Self {
        MultiValuePattern {
            pattern,
            mode: MatchMode::All,
        }
    }

    pub fn match_values(&self, key_present: bool, values: &[&str], custom: &CustomMatchers) -> f64 {
        if let ValuePattern::Absent = self.pattern {
            return if key_present { 0.0 } else { 1.0 };
        }

        if !key_present || values.is_empty() {
            return self.pattern.match_value(None, custom);
        }

        let scores = values.iter().map(|v| self.pattern.match_value(Some(v), custom));
        match self.mode {
            MatchMode::Any => scores.fold(0.0, f64::max),
            MatchMode::All => scores.fold(1.0, f64::min),
        }
    }
}
