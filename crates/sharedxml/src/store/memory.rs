//! In-process arena implementation of [`SharedStore`]

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::error::{Error, ErrorKind, Result};
use crate::store::{
    ChangeEvent, Listener, ListenerId, MapId, SequenceId, SequenceOp, SharedStore, Value,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Observed {
    Map(MapId),
    Sequence(SequenceId),
}

#[derive(Default)]
struct Arena {
    next_id: u64,
    maps: HashMap<MapId, IndexMap<String, Value>>,
    sequences: HashMap<SequenceId, Vec<MapId>>,
    listeners: HashMap<Observed, BTreeMap<ListenerId, Listener>>,
    registrations: HashMap<ListenerId, Observed>,
}

impl Arena {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn map_mut(&mut self, map: MapId) -> Result<&mut IndexMap<String, Value>> {
        self.maps.get_mut(&map).ok_or_else(|| dangling(map))
    }

    fn sequence_mut(&mut self, sequence: SequenceId) -> Result<&mut Vec<MapId>> {
        self.sequences
            .get_mut(&sequence)
            .ok_or_else(|| dangling(sequence))
    }

    fn listeners_of(&self, observed: Observed) -> Vec<Listener> {
        self.listeners
            .get(&observed)
            .map(|registered| registered.values().cloned().collect())
            .unwrap_or_default()
    }

    fn register(&mut self, observed: Observed, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.listeners
            .entry(observed)
            .or_default()
            .insert(id, listener);
        self.registrations.insert(id, observed);
        id
    }
}

/// Shared maps and sequences held in memory behind a single lock
#[derive(Default)]
pub struct MemoryStore {
    arena: RwLock<Arena>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of maps currently allocated
    pub fn map_count(&self) -> usize {
        self.arena.read().maps.len()
    }

    pub fn sequence_count(&self) -> usize {
        self.arena.read().sequences.len()
    }

    pub fn listener_count(&self) -> usize {
        self.arena.read().registrations.len()
    }

    fn emit(listeners: Vec<Listener>, event: &ChangeEvent) {
        for listener in listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.arena.read();
        f.debug_struct("MemoryStore")
            .field("maps", &arena.maps.len())
            .field("sequences", &arena.sequences.len())
            .field("listeners", &arena.registrations.len())
            .finish()
    }
}

impl SharedStore for MemoryStore {
    fn create_map(&self) -> Result<MapId> {
        let mut arena = self.arena.write();
        let id = MapId(arena.next_id());
        arena.maps.insert(id, IndexMap::new());
        Ok(id)
    }

    fn create_sequence(&self) -> Result<SequenceId> {
        let mut arena = self.arena.write();
        let id = SequenceId(arena.next_id());
        arena.sequences.insert(id, Vec::new());
        Ok(id)
    }

    fn contains_map(&self, map: MapId) -> bool {
        self.arena.read().maps.contains_key(&map)
    }

    fn get(&self, map: MapId, key: &str) -> Result<Option<Value>> {
        let arena = self.arena.read();
        let entries = arena.maps.get(&map).ok_or_else(|| dangling(map))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, map: MapId, key: &str, value: Value) -> Result<()> {
        let (listeners, previous) = {
            let mut arena = self.arena.write();
            let previous = arena.map_mut(map)?.insert(key.to_string(), value);
            (arena.listeners_of(Observed::Map(map)), previous)
        };
        Self::emit(
            listeners,
            &ChangeEvent::ValueChanged {
                map,
                key: key.to_string(),
                previous,
            },
        );
        Ok(())
    }

    fn entries(&self, map: MapId) -> Result<Vec<(String, Value)>> {
        let arena = self.arena.read();
        let entries = arena.maps.get(&map).ok_or_else(|| dangling(map))?;
        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn insert(&self, sequence: SequenceId, index: usize, items: Vec<MapId>) -> Result<()> {
        let listeners = {
            let mut arena = self.arena.write();
            let entries = arena.sequence_mut(sequence)?;
            if index > entries.len() {
                return Err(Error::unpositioned(ErrorKind::IndexOutOfRange {
                    index,
                    len: entries.len(),
                }));
            }
            entries.splice(index..index, items.iter().copied());
            arena.listeners_of(Observed::Sequence(sequence))
        };
        Self::emit(
            listeners,
            &ChangeEvent::SequenceOp {
                sequence,
                op: SequenceOp::Insert { index, items },
            },
        );
        Ok(())
    }

    fn remove(&self, sequence: SequenceId, start: usize, end: usize) -> Result<()> {
        let (listeners, removed) = {
            let mut arena = self.arena.write();
            let entries = arena.sequence_mut(sequence)?;
            if start > end || end > entries.len() {
                return Err(Error::unpositioned(ErrorKind::IndexOutOfRange {
                    index: end,
                    len: entries.len(),
                }));
            }
            let removed: Vec<MapId> = entries.drain(start..end).collect();
            (arena.listeners_of(Observed::Sequence(sequence)), removed)
        };
        Self::emit(
            listeners,
            &ChangeEvent::SequenceOp {
                sequence,
                op: SequenceOp::Remove {
                    start,
                    items: removed,
                },
            },
        );
        Ok(())
    }

    fn item_count(&self, sequence: SequenceId) -> Result<usize> {
        let arena = self.arena.read();
        let entries = arena
            .sequences
            .get(&sequence)
            .ok_or_else(|| dangling(sequence))?;
        Ok(entries.len())
    }

    fn items(&self, sequence: SequenceId, start: usize, end: usize) -> Result<Vec<MapId>> {
        let arena = self.arena.read();
        let entries = arena
            .sequences
            .get(&sequence)
            .ok_or_else(|| dangling(sequence))?;
        entries
            .get(start..end)
            .map(<[MapId]>::to_vec)
            .ok_or_else(|| {
                Error::unpositioned(ErrorKind::IndexOutOfRange {
                    index: end,
                    len: entries.len(),
                })
            })
    }

    fn on_value_changed(&self, map: MapId, listener: Listener) -> Result<ListenerId> {
        let mut arena = self.arena.write();
        if !arena.maps.contains_key(&map) {
            return Err(dangling(map));
        }
        Ok(arena.register(Observed::Map(map), listener))
    }

    fn on_op(&self, sequence: SequenceId, listener: Listener) -> Result<ListenerId> {
        let mut arena = self.arena.write();
        if !arena.sequences.contains_key(&sequence) {
            return Err(dangling(sequence));
        }
        Ok(arena.register(Observed::Sequence(sequence), listener))
    }

    fn off(&self, listener: ListenerId) -> bool {
        let mut arena = self.arena.write();
        let Some(observed) = arena.registrations.remove(&listener) else {
            return false;
        };
        if let Some(registered) = arena.listeners.get_mut(&observed) {
            registered.remove(&listener);
            if registered.is_empty() {
                arena.listeners.remove(&observed);
            }
        }
        true
    }
}

fn dangling(handle: impl std::fmt::Display) -> Error {
    Error::unpositioned(ErrorKind::DanglingHandle {
        handle: handle.to_string(),
    })
}
