use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::SystemTime,
};

use crate::{
    common::data::{Error, HttpStubRequest, ResponseDefinition, ServeEvent, StubMapping},
    server::matchers::{CustomMatchers, RequestPattern},
};

/// A bounded, append-only log of serve events.
///
/// In bounded mode the journal evicts the oldest entries (FIFO) once the capacity
/// is exceeded. In disabled mode `record` is a no-op and every read operation
/// returns [`Error::RequestJournalDisabled`], so callers can tell "zero matches"
/// apart from "journal unavailable".
pub struct RequestJournal {
    state: Mutex<JournalState>,
}

struct JournalState {
    enabled: bool,
    capacity: Option<usize>,
    next_event_id: usize,
    events: VecDeque<ServeEvent>,
}

impl RequestJournal {
    pub fn new(capacity: Option<usize>) -> Self {
        RequestJournal {
            state: Mutex::new(JournalState {
                enabled: true,
                capacity,
                next_event_id: 0,
                events: VecDeque::new(),
            }),
        }
    }

    pub fn unbounded() -> Self {
        RequestJournal::new(None)
    }

    pub fn bounded(max_entries: usize) -> Self {
        RequestJournal::new(Some(max_entries))
    }

    pub fn disabled() -> Self {
        RequestJournal {
            state: Mutex::new(JournalState {
                enabled: false,
                capacity: None,
                next_event_id: 0,
                events: VecDeque::new(),
            }),
        }
    }

    /// Appends one serve event. Returns the stored event, or `None` when the
    /// journal is disabled.
    pub fn record(
        &self,
        request: Arc<HttpStubRequest>,
        stub: Option<StubMapping>,
        response: Option<ResponseDefinition>,
        was_matched: bool,
    ) -> Option<ServeEvent> {
        let mut state = self.state.lock().unwrap();

        if !state.enabled {
            return None;
        }

        let event = ServeEvent {
            id: state.next_event_id,
            request,
            stub,
            response,
            was_matched,
            timestamp: SystemTime::now(),
        };
        state.next_event_id += 1;
        state.events.push_back(event.clone());

        // Evict the minimum number of oldest entries to return within bound.
        if let Some(capacity) = state.capacity {
            while state.events.len() > capacity {
                let evicted = state.events.pop_front();
                tracing::trace!(
                    "Journal over capacity, evicted event {:?}",
                    evicted.map(|e| e.id)
                );
            }
        }

        Some(event)
    }

    /// All serve events, most recent first.
    pub fn get_all(&self) -> Result<Vec<ServeEvent>, Error> {
        let state = self.checked_state()?;
        Ok(state.events.iter().rev().cloned().collect())
    }

    pub fn get(&self, id: usize) -> Result<Option<ServeEvent>, Error> {
        let state = self.checked_state()?;
        Ok(state.events.iter().find(|e| e.id == id).cloned())
    }

    /// Removes one event; `false` when no event with that id is stored.
    pub fn remove(&self, id: usize) -> Result<bool, Error> {
        let mut state = self.checked_state()?;
        let before = state.events.len();
        state.events.retain(|e| e.id != id);
        Ok(state.events.len() < before)
    }

    pub fn count_matching(
        &self,
        pattern: &RequestPattern,
        custom: &CustomMatchers,
    ) -> Result<usize, Error> {
        let state = self.checked_state()?;
        Ok(state
            .events
            .iter()
            .filter(|e| pattern.matches(&e.request, custom))
            .count())
    }

    /// The journaled requests matching the pattern, in receive order.
    pub fn find_matching(
        &self,
        pattern: &RequestPattern,
        custom: &CustomMatchers,
    ) -> Result<Vec<HttpStubRequest>, Error> {
        let state = self.checked_state()?;
        Ok(state
            .events
            .iter()
            .filter(|e| pattern.matches(&e.request, custom))
            .map(|e| HttpStubRequest::clone(&e.request))
            .collect())
    }

    /// Removes all events matching the pattern and returns them.
    pub fn remove_matching(
        &self,
        pattern: &RequestPattern,
        custom: &CustomMatchers,
    ) -> Result<Vec<ServeEvent>, Error> {
        let mut state = self.checked_state()?;

        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(state.events.len());
        for event in state.events.drain(..) {
            if pattern.matches(&event.request, custom) {
                removed.push(event);
            } else {
                kept.push_back(event);
            }
        }
        state.events = kept;

        tracing::debug!("Removed {} journaled serve events", removed.len());

        Ok(removed)
    }

    /// All journaled requests, most recent first. Internal feed for near-miss
    /// calculation against a pattern.
    pub(crate) fn requests(&self) -> Result<Vec<Arc<HttpStubRequest>>, Error> {
        let state = self.checked_state()?;
        Ok(state.events.iter().rev().map(|e| e.request.clone()).collect())
    }

    /// Clears all entries. A no-op when disabled.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.events.clear();

        tracing::trace!("Deleted all journaled serve events");
    }

    fn checked_state(&self) -> Result<std::sync::MutexGuard<JournalState>, Error> {
        let state = self.state.lock().unwrap();
        if !state.enabled {
            return Err(Error::RequestJournalDisabled);
        }
        Ok(state)
    }
}
