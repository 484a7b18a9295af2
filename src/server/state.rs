use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use crate::{
    common::data::{
        ActiveStub, Error, HttpStubRequest, NearMiss, ServeEvent, ServeOutcome, StubMapping,
    },
    server::{
        journal::RequestJournal,
        matchers::{CustomMatchers, CustomRequestMatcher, CustomValueMatcher, RequestPattern, ValuePattern},
        near_miss,
        scenario::{Scenario, ScenarioRegistry},
    },
};

/// Construction-time configuration of a [`StubRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum journal entry count; `None` keeps every serve event.
    pub journal_capacity: Option<usize>,
    /// A disabled journal accepts `record` as a no-op and answers every read
    /// with [`Error::RequestJournalDisabled`].
    pub journal_enabled: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            journal_capacity: None,
            journal_enabled: true,
        }
    }
}

struct StubStore {
    next_stub_id: usize,
    /// Monotonically increasing registration counter, owned by the registry and
    /// never reused; survives `delete_all_stubs`.
    next_insertion_index: usize,
    /// Kept sorted by `(priority, Reverse(insertion index))`, i.e. the candidate
    /// evaluation order. Rebuilt on every mutation; reads walk it as-is.
    ordered: Vec<ActiveStub>,
    /// Pristine copies of the default set loaded at startup, restored by reset.
    defaults: Vec<ActiveStub>,
}

impl StubStore {
    fn insert_sorted(&mut self, stub: ActiveStub) {
        self.ordered.push(stub);
        self.ordered.sort_by_key(|s| s.sort_key());
    }

    fn position(&self, id: usize) -> Option<usize> {
        self.ordered.iter().position(|s| s.id == id)
    }

    fn is_default(&self, id: usize) -> bool {
        self.defaults.iter().any(|d| d.id == id)
    }
}

/// The concurrent, ordered collection of stub mappings, together with the
/// scenario register and the request journal it feeds.
///
/// One instance exists per server; all collaborators receive a reference to it
/// rather than reaching for ambient global state. All operations are synchronous
/// and safe to call from many request-handling threads at once.
pub struct StubRegistry {
    stubs: RwLock<StubStore>,
    scenarios: ScenarioRegistry,
    journal: RequestJournal,
    custom: RwLock<CustomMatchers>,
}

impl StubRegistry {
    pub fn new() -> Self {
        StubRegistry::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        let journal = if config.journal_enabled {
            RequestJournal::new(config.journal_capacity)
        } else {
            RequestJournal::disabled()
        };

        StubRegistry {
            stubs: RwLock::new(StubStore {
                next_stub_id: 0,
                next_insertion_index: 0,
                ordered: Vec::new(),
                defaults: Vec::new(),
            }),
            scenarios: ScenarioRegistry::new(),
            journal,
            custom: RwLock::new(CustomMatchers::new()),
        }
    }

    pub fn register_custom_value_matcher<S: Into<String>>(
        &self,
        name: S,
        matcher: Arc<dyn CustomValueMatcher>,
    ) {
        self.custom.write().unwrap().register_value_matcher(name, matcher);
    }

    pub fn register_custom_request_matcher<S: Into<String>>(
        &self,
        name: S,
        matcher: Arc<dyn CustomRequestMatcher>,
    ) {
        self.custom.write().unwrap().register_request_matcher(name, matcher);
    }

    // *********************************************************************************************
    // Stub administration
    // *********************************************************************************************

    /// Registers a new stub mapping. An id is assigned when the mapping carries
    /// none; a mapping carrying an already-registered id is rejected with a
    /// conflict error, leaving the registry unchanged.
    pub fn add_stub(&self, mapping: StubMapping) -> Result<ActiveStub, Error> {
        let mut store = self.stubs.write().unwrap();

        let id = match mapping.id {
            Some(id) => {
                if store.position(id).is_some() {
                    return Err(Error::DuplicateStubId(id));
                }
                store.next_stub_id = store.next_stub_id.max(id + 1);
                id
            }
            None => {
                let id = store.next_stub_id;
                store.next_stub_id += 1;
                id
            }
        };

        let insertion_index = store.next_insertion_index;
        store.next_insertion_index += 1;

        let stub = ActiveStub::new(id, insertion_index, mapping);

        tracing::debug!("Registering stub mapping with id={}", id);

        store.insert_sorted(stub.clone());
        Ok(stub)
    }

    /// Replaces the mapping with the same id in place, preserving its insertion
    /// sequence number so tie-break order against other mappings is unchanged.
    /// Returns `None` when no mapping with that id exists.
    pub fn edit_stub(&self, mapping: StubMapping) -> Result<Option<ActiveStub>, Error> {
        self.edit_stub_inner(mapping, false)
    }

    /// Like [`StubRegistry::edit_stub`], but assigns a fresh insertion sequence
    /// number so the edited mapping wins ties against its former peers.
    pub fn edit_stub_resequencing(&self, mapping: StubMapping) -> Result<Option<ActiveStub>, Error> {
        self.edit_stub_inner(mapping, true)
    }

    fn edit_stub_inner(
        &self,
        mut mapping: StubMapping,
        resequence: bool,
    ) -> Result<Option<ActiveStub>, Error> {
        let id = mapping
            .id
            .ok_or_else(|| Error::ValidationError("cannot edit a stub mapping without an id".to_string()))?;

        let mut store = self.stubs.write().unwrap();

        let position = match store.position(id) {
            Some(position) => position,
            None => return Ok(None),
        };

        mapping.id = Some(id);
        if resequence {
            let insertion_index = store.next_insertion_index;
            store.next_insertion_index += 1;
            store.ordered[position].insertion_index = insertion_index;
        }
        store.ordered[position].mapping = mapping;

        let edited = store.ordered[position].clone();
        store.ordered.sort_by_key(|s| s.sort_key());

        tracing::debug!("Edited stub mapping with id={}", id);

        Ok(Some(edited))
    }

    /// Removes one stub mapping; `false` when no mapping with that id exists.
    pub fn remove_stub(&self, id: usize) -> bool {
        let mut store = self.stubs.write().unwrap();

        match store.position(id) {
            Some(position) => {
                store.ordered.remove(position);
                tracing::debug!("Removed stub mapping with id={}", id);
                true
            }
            None => false,
        }
    }

    /// Removes all mappings except defaults and persistent ones.
    pub fn delete_all_stubs(&self) {
        let mut store = self.stubs.write().unwrap();

        let default_ids: Vec<usize> = store.defaults.iter().map(|d| d.id).collect();
        store
            .ordered
            .retain(|s| s.mapping.persistent || default_ids.contains(&s.id));

        tracing::trace!("Deleted all non-default stub mappings");
    }

    /// Pre-populates the registry from the mapping-loader collaborator. The
    /// loaded set becomes the default set that reset restores.
    pub fn load_defaults(&self, mappings: Vec<StubMapping>) -> Result<Vec<ActiveStub>, Error> {
        let mut loaded = Vec::with_capacity(mappings.len());
        for mapping in mappings {
            loaded.push(self.add_stub(mapping)?);
        }

        let mut store = self.stubs.write().unwrap();
        store.defaults.extend(loaded.iter().cloned());

        Ok(loaded)
    }

    /// Restores the stub collection to the default set loaded at startup,
    /// keeping persistent mappings registered since.
    pub fn reset_to_defaults(&self) {
        let mut store = self.stubs.write().unwrap();

        let mut restored: Vec<ActiveStub> = store.defaults.clone();
        for stub in &store.ordered {
            if stub.mapping.persistent && !store.is_default(stub.id) {
                restored.push(stub.clone());
            }
        }
        restored.sort_by_key(|s| s.sort_key());
        store.ordered = restored;

        tracing::debug!("Restored stub mappings to the default set");
    }

    /// Full reset: default stub set, pristine scenarios, empty journal.
    pub fn reset(&self) {
        self.reset_to_defaults();
        self.scenarios.reset_all();
        self.journal.reset();
    }

    pub fn get_stub(&self, id: usize) -> Option<ActiveStub> {
        let store = self.stubs.read().unwrap();
        store.position(id).map(|position| store.ordered[position].clone())
    }

    /// All registered mappings in candidate evaluation order. A snapshot; never a
    /// view into guarded state.
    pub fn all_stubs(&self) -> Vec<ActiveStub> {
        let store = self.stubs.read().unwrap();
        store.ordered.clone()
    }

    /// All mappings whose metadata, serialized as canonical JSON text, satisfies
    /// the given pattern exactly. `EqualToJson` patterns give structural matching.
    pub fn find_by_metadata(&self, pattern: &ValuePattern) -> Vec<ActiveStub> {
        let store = self.stubs.read().unwrap();
        let custom = self.custom.read().unwrap();

        store
            .ordered
            .iter()
            .filter(|stub| match &stub.mapping.metadata {
                Some(metadata) => {
                    let rendered = serde_json::to_string(metadata).unwrap_or_default();
                    pattern.match_value(Some(&rendered), &custom) >= 1.0
                }
                None => false,
            })
            .cloned()
            .collect()
    }

    // *********************************************************************************************
    // Serving
    // *********************************************************************************************

    /// Resolves one request: walks the scenario-eligible mappings in candidate
    /// order and picks the first exact match. A win applies the scenario
    /// transition before the serve event is journaled; a miss journals a
    /// not-configured event.
    pub fn serve_for(&self, request: &HttpStubRequest) -> ServeOutcome {
        let request = Arc::new(request.clone());
        let custom = self.custom.read().unwrap();

        let winner = {
            let store = self.stubs.read().unwrap();
            store
                .ordered
                .iter()
                .filter(|stub| match &stub.mapping.scenario {
                    Some(binding) => self.scenarios.is_eligible(binding),
                    None => true,
                })
                .find(|stub| stub.mapping.request.matches(&request, &custom))
                .cloned()
        };

        match winner {
            Some(stub) => {
                tracing::debug!(
                    "Matched stub mapping with id={} to request {} {}",
                    stub.id,
                    request.method_str(),
                    request.uri_str()
                );

                {
                    let mut store = self.stubs.write().unwrap();
                    if let Some(position) = store.position(stub.id) {
                        store.ordered[position].call_counter += 1;
                    }
                }

                if let Some(binding) = &stub.mapping.scenario {
                    self.scenarios.apply_transition(binding);
                }

                let path_parameters = stub.mapping.request.path_parameters(&request);
                let response = stub.mapping.response.clone();

                self.journal.record(
                    request,
                    Some(stub.mapping.clone()),
                    Some(response.clone()),
                    true,
                );

                ServeOutcome {
                    stub: Some(stub),
                    response: Some(response),
                    path_parameters,
                    was_matched: true,
                }
            }
            None => {
                tracing::debug!(
                    "No stub mapping matched request {} {}",
                    request.method_str(),
                    request.uri_str()
                );

                self.journal.record(request, None, None, false);

                ServeOutcome {
                    stub: None,
                    response: None,
                    path_parameters: BTreeMap::new(),
                    was_matched: false,
                }
            }
        }
    }

    // *********************************************************************************************
    // Near misses
    // *********************************************************************************************

    /// Ranks all registered mappings by closeness to the given request, returning
    /// the default number of results.
    pub fn nearest_misses(&self, request: &HttpStubRequest) -> Vec<NearMiss> {
        self.nearest_misses_for(request, near_miss::DEFAULT_NEAR_MISS_COUNT)
    }

    /// Ranks all registered mappings by closeness to the given request. Empty
    /// registry gives an empty list.
    pub fn nearest_misses_for(&self, request: &HttpStubRequest, limit: usize) -> Vec<NearMiss> {
        let stubs = self.all_stubs();
        let custom = self.custom.read().unwrap();
        near_miss::nearest_stubs_to_request(request, &stubs, &self.scenarios, &custom, limit)
    }

    /// Ranks journaled requests by closeness to the given pattern. Fails with the
    /// journal-disabled signal when there is no journal to read.
    pub fn nearest_misses_to_pattern(
        &self,
        pattern: &RequestPattern,
        limit: usize,
    ) -> Result<Vec<NearMiss>, Error> {
        let requests = self.journal.requests()?;
        let custom = self.custom.read().unwrap();
        Ok(near_miss::nearest_requests_to_pattern(
            pattern, &requests, &custom, limit,
        ))
    }

    // *********************************************************************************************
    // Journal surface
    // *********************************************************************************************

    pub fn serve_events(&self) -> Result<Vec<ServeEvent>, Error> {
        self.journal.get_all()
    }

    pub fn serve_event(&self, id: usize) -> Result<Option<ServeEvent>, Error> {
        self.journal.get(id)
    }

    pub fn remove_serve_event(&self, id: usize) -> Result<bool, Error> {
        self.journal.remove(id)
    }

    pub fn count_requests_matching(&self, pattern: &RequestPattern) -> Result<usize, Error> {
        let custom = self.custom.read().unwrap();
        self.journal.count_matching(pattern, &custom)
    }

    pub fn requests_matching(&self, pattern: &RequestPattern) -> Result<Vec<HttpStubRequest>, Error> {
        let custom = self.custom.read().unwrap();
        self.journal.find_matching(pattern, &custom)
    }

    pub fn remove_serve_events_matching(
        &self,
        pattern: &RequestPattern,
    ) -> Result<Vec<ServeEvent>, Error> {
        let custom = self.custom.read().unwrap();
        self.journal.remove_matching(pattern, &custom)
    }

    pub fn reset_journal(&self) {
        self.journal.reset();
    }

    // *********************************************************************************************
    // Scenario surface
    // *********************************************************************************************

    pub fn all_scenarios(&self) -> Vec<Scenario> {
        self.scenarios.all()
    }

    pub fn scenario_state(&self, name: &str) -> String {
        self.scenarios.current_state(name)
    }

    pub fn set_scenario_state<S: Into<String>>(&self, name: &str, state: S) {
        self.scenarios.set_state(name, state);
    }

    pub fn reset_scenario(&self, name: &str) {
        self.scenarios.reset_one(name);
    }

    pub fn reset_scenarios(&self) {
        self.scenarios.reset_all();
    }
}

impl Default for StubRegistry {
    fn default() -> Self {
        StubRegistry::new()
    }
}
