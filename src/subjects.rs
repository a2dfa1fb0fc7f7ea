use crate::model::Subject;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Where subject records come from when they are not cached yet.
pub trait SubjectSource: Send + Sync {
    fn fetch(&self, subject_id: &str) -> anyhow::Result<Option<Subject>>;
}

#[derive(Default)]
struct CacheState {
    loaded: HashMap<String, Subject>,
    /// Ids being fetched, with the generation each fetch started under.
    in_flight: HashMap<String, u64>,
    /// Bumped by `invalidate`; a fetch that started under an older
    /// generation does not store its result.
    generations: HashMap<String, u64>,
    fetches: u64,
}

impl CacheState {
    fn generation(&self, subject_id: &str) -> u64 {
        self.generations.get(subject_id).copied().unwrap_or(0)
    }
}

/// Subject metadata cache with at most one fetch in flight per subject id.
///
/// A caller that asks for an id someone else is already fetching waits for
/// that fetch and reads its result. Missing records and failed fetches are
/// not cached, so a later call tries again.
pub struct SubjectCache<S: SubjectSource> {
    source: S,
    state: Mutex<CacheState>,
    settled: Condvar,
}

impl<S: SubjectSource> SubjectCache<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState::default()),
            settled: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic while holding the lock leaves the maps consistent; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, subject_id: &str) -> Option<Subject> {
        let mut state = self.lock();
        loop {
            if let Some(s) = state.loaded.get(subject_id) {
                return Some(s.clone());
            }
            let Some(&fetch_gen) = state.in_flight.get(subject_id) else {
                break;
            };
            state = self
                .settled
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
            // A current fetch settled: if it found nothing, report that
            // instead of fetching the same id again. A fetch overtaken by
            // `invalidate` says nothing, so loop and fetch fresh.
            if !state.in_flight.contains_key(subject_id)
                && state.generation(subject_id) == fetch_gen
            {
                return state.loaded.get(subject_id).cloned();
            }
        }
        let started_at = state.generation(subject_id);
        state.in_flight.insert(subject_id.to_string(), started_at);
        state.fetches += 1;
        drop(state);

        let fetched = match self.source.fetch(subject_id) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(subject_id, error = %e, "subject fetch failed");
                None
            }
        };

        let mut state = self.lock();
        state.in_flight.remove(subject_id);
        if let Some(s) = &fetched {
            if state.generation(subject_id) == started_at {
                state.loaded.insert(subject_id.to_string(), s.clone());
            } else {
                tracing::debug!(subject_id, "dropping subject fetched before invalidation");
            }
        }
        drop(state);
        self.settled.notify_all();
        fetched
    }

    /// Synchronous `subjectsById` view for the given ids. Ids that resolve to
    /// nothing are left out.
    pub fn snapshot<'a, I>(&self, ids: I) -> HashMap<String, Subject>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = HashMap::new();
        for id in ids {
            if out.contains_key(id) {
                continue;
            }
            if let Some(s) = self.get(id) {
                out.insert(id.to_string(), s);
            }
        }
        out
    }

    pub fn invalidate(&self, subject_id: &str) {
        let mut state = self.lock();
        state.loaded.remove(subject_id);
        *state.generations.entry(subject_id.to_string()).or_insert(0) += 1;
    }

    /// Number of fetches issued against the source so far.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetches
    }
}
