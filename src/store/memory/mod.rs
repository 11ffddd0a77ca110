#[cfg(test)]
mod tests;

use serde_json::{Map, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{FailureKind, StoreClient, StoreError, StoredObject};
use crate::schema::CollectionDef;

/// In-process store used for dry runs and tests.
///
/// Similarity search is approximated by keyword overlap with the
/// collection's vectorized properties. Failures can be queued up front to
/// exercise retry handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    unreachable: bool,
    injected: VecDeque<StoreError>,
    upsert_calls: usize,
    /// Become unreachable once this many upserts have been served.
    disconnect_after: Option<usize>,
}

#[derive(Debug)]
struct Collection {
    definition: CollectionDef,
    objects: Vec<(Uuid, Map<String, Value>)>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that already holds empty collections for `definitions`.
    #[inline]
    pub fn with_collections<'a>(definitions: impl IntoIterator<Item = &'a CollectionDef>) -> Self {
        let store = Self::new();
        {
            let mut state = store.lock_state();
            for definition in definitions {
                state.collections.insert(
                    definition.name.clone(),
                    Collection {
                        definition: definition.clone(),
                        objects: Vec::new(),
                    },
                );
            }
        }
        store
    }

    /// Make every call fail with a connection error until reset.
    #[inline]
    pub fn set_unreachable(&self, unreachable: bool) {
        let mut state = self.lock_state();
        state.unreachable = unreachable;
        if !unreachable {
            state.disconnect_after = None;
        }
    }

    /// Serve `upserts` more upsert calls, then behave as if the connection
    /// was lost.
    #[inline]
    pub fn disconnect_after(&self, upserts: usize) {
        let mut state = self.lock_state();
        state.disconnect_after = Some(state.upsert_calls + upserts);
    }

    /// Fail the next upsert with `error`. Queued errors are consumed in order.
    #[inline]
    pub fn fail_next_upsert(&self, error: StoreError) {
        self.lock_state().injected.push_back(error);
    }

    /// Number of upsert calls seen, including failed ones.
    #[inline]
    pub fn upsert_calls(&self) -> usize {
        self.lock_state().upsert_calls
    }

    /// Stored properties for `id`, if any.
    #[inline]
    pub fn get(&self, collection: &str, id: Uuid) -> Option<Map<String, Value>> {
        let state = self.lock_state();
        state.collections.get(collection).and_then(|stored| {
            stored
                .objects
                .iter()
                .find(|(object_id, _)| *object_id == id)
                .map(|(_, properties)| properties.clone())
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Lock, failing when the store has been marked unreachable.
    fn reachable_state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        let state = self.lock_state();
        if state.unreachable {
            return Err(StoreError::connection("in-memory store marked unreachable"));
        }
        Ok(state)
    }
}

fn missing(collection: &str) -> StoreError {
    StoreError::new(
        FailureKind::Client,
        format!("collection '{collection}' does not exist"),
    )
    .with_status(404)
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Text the keyword search matches against: vectorized properties, or every
/// text property when the collection vectorizes nothing.
fn searchable_text(definition: &CollectionDef, properties: &Map<String, Value>) -> String {
    let vectorized: Vec<&str> = definition
        .properties
        .iter()
        .filter(|property| property.vectorize)
        .map(|property| property.name.as_str())
        .collect();

    let mut parts = Vec::new();
    for (name, value) in properties {
        if !vectorized.is_empty() && !vectorized.contains(&name.as_str()) {
            continue;
        }
        match value {
            Value::String(text) => parts.push(text.clone()),
            Value::Array(items) => parts.extend(items.iter().filter_map(Value::as_str).map(str::to_string)),
            _ => {}
        }
    }
    parts.join(" ")
}

impl StoreClient for MemoryStore {
    #[inline]
    fn ready(&self) -> Result<(), StoreError> {
        self.reachable_state().map(|_| ())
    }

    #[inline]
    fn exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.reachable_state()?.collections.contains_key(collection))
    }

    #[inline]
    fn upsert(
        &self,
        collection: &str,
        id: Uuid,
        properties: &Map<String, Value>,
    ) -> Result<Uuid, StoreError> {
        let mut state = self.reachable_state()?;
        if state
            .disconnect_after
            .is_some_and(|limit| state.upsert_calls >= limit)
        {
            state.unreachable = true;
            return Err(StoreError::connection("in-memory store connection lost"));
        }
        state.upsert_calls += 1;

        if let Some(error) = state.injected.pop_front() {
            debug!("Injected failure for {}: {}", id, error);
            return Err(error);
        }

        let stored = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        match stored.objects.iter_mut().find(|(object_id, _)| *object_id == id) {
            Some((_, existing)) => *existing = properties.clone(),
            None => stored.objects.push((id, properties.clone())),
        }

        Ok(id)
    }

    #[inline]
    fn fetch_by_query(
        &self,
        collection: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredObject>, StoreError> {
        let state = self.reachable_state()?;
        let stored = state
            .collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;

        let wanted = tokens(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, StoredObject)> = stored
            .objects
            .iter()
            .filter_map(|(id, properties)| {
                let haystack = tokens(&searchable_text(&stored.definition, properties));
                let hits = wanted.iter().filter(|word| haystack.contains(word)).count();
                (hits > 0).then(|| {
                    let distance = 1.0 - hits as f32 / wanted.len() as f32;
                    (
                        hits,
                        StoredObject {
                            id: *id,
                            properties: properties.clone(),
                            distance: Some(distance),
                        },
                    )
                })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, object)| object)
            .collect())
    }

    #[inline]
    fn count_all(&self, collection: &str) -> Result<u64, StoreError> {
        let state = self.reachable_state()?;
        let stored = state
            .collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;
        Ok(stored.objects.len() as u64)
    }

    #[inline]
    fn fetch_objects(&self, collection: &str, limit: usize) -> Result<Vec<StoredObject>, StoreError> {
        let state = self.reachable_state()?;
        let stored = state
            .collections
            .get(collection)
            .ok_or_else(|| missing(collection))?;

        Ok(stored
            .objects
            .iter()
            .take(limit)
            .map(|(id, properties)| StoredObject {
                id: *id,
                properties: properties.clone(),
                distance: None,
            })
            .collect())
    }

    #[inline]
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.reachable_state()?.collections.keys().cloned().collect())
    }

    #[inline]
    fn create_collection(&self, definition: &CollectionDef) -> Result<(), StoreError> {
        let mut state = self.reachable_state()?;
        if state.collections.contains_key(&definition.name) {
            return Err(StoreError::new(
                FailureKind::Client,
                format!("collection '{}' already exists", definition.name),
            )
            .with_status(422));
        }

        state.collections.insert(
            definition.name.clone(),
            Collection {
                definition: definition.clone(),
                objects: Vec::new(),
            },
        );
        Ok(())
    }

    #[inline]
    fn delete_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.reachable_state()?.collections.remove(collection);
        Ok(())
    }

    #[inline]
    fn delete_object(&self, collection: &str, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.reachable_state()?;
        let stored = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        stored.objects.retain(|(object_id, _)| *object_id != id);
        Ok(())
    }
}
