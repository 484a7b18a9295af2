//! `httpstub` is the matching core of an HTTP service-virtualization server: given
//! an inbound request, it decides which previously registered rule ("stub
//! mapping") covers it, which rule wins when several could, what scenario state
//! transition results, and, when nothing matches, which near misses best explain
//! the gap.
//!
//! The crate deliberately contains no transport: the HTTP server that accepts
//! connections, the admin routing surface and the stub file loader are external
//! collaborators that construct [`HttpStubRequest`] values, hand them to a
//! [`StubRegistry`] and render the returned response descriptors.
//!
//! # Getting started
//!
//! ```rust
//! use httpstub::prelude::*;
//!
//! let registry = StubRegistry::new();
//!
//! let pattern = RequestPattern::builder()
//!     .method(Method::GET)
//!     .url("/hello")
//!     .build()
//!     .unwrap();
//! registry
//!     .add_stub(StubMapping::new(pattern, ResponseDefinition::status(200)))
//!     .unwrap();
//!
//! let request = HttpStubRequest::builder()
//!     .method("GET")
//!     .uri("/hello")
//!     .build();
//! let outcome = registry.serve_for(&request);
//! assert!(outcome.was_matched);
//! ```
//!
//! When nothing matches, [`StubRegistry::nearest_misses_for`] ranks all
//! registered mappings by how close they came, each with a rendered
//! expected/actual diff per non-matching section.
//!
//! # Scenarios
//!
//! Mappings may join a named scenario via [`StubMapping::in_scenario`]. A
//! scenario-bound mapping is only eligible while its scenario is in the required
//! state, and a winning match advances the scenario, so multi-step interaction
//! sequences (empty cart, cart with items, ...) can be modeled with otherwise
//! identical request patterns.
//!
//! # Verification
//!
//! Every resolved request is journaled as a [`ServeEvent`], matched or not. The
//! journal is queryable by request pattern, optionally bounded (FIFO eviction),
//! and can be disabled entirely, in which case reads fail with a distinguishable
//! [`Error::RequestJournalDisabled`] rather than pretending to be empty.

mod common;
mod server;

pub use common::{
    data::{
        ActiveStub, Diff, DiffResult, Error, HttpStubRegex, HttpStubRequest,
        HttpStubRequestBuilder, MatchResult, Method, MethodSpec, Mismatch, MultipartPart,
        NearMiss, NearMissCandidate, ResponseDefinition, ScenarioBinding, ServeEvent,
        ServeOutcome, StubMapping, Tokenizer, DEFAULT_PRIORITY,
    },
    util::HttpStubBytes,
};
pub use server::{
    journal::RequestJournal,
    matchers::{
        CustomMatcherSpec, CustomMatchers, CustomRequestMatcher, CustomValueMatcher, MatchMode,
        MultiValuePattern, PathTemplate, RequestPattern, RequestPatternBuilder, UrlPattern,
        ValuePattern,
    },
    near_miss::DEFAULT_NEAR_MISS_COUNT,
    scenario::{Scenario, ScenarioRegistry, STARTED},
    state::{RegistryConfig, StubRegistry},
};

pub mod prelude {
    pub use crate::{
        HttpStubRequest, MatchMode, Method, MultiValuePattern, RegistryConfig, RequestPattern,
        ResponseDefinition, StubMapping, StubRegistry, ValuePattern,
    };
}
