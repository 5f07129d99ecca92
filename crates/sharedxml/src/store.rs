//! Replicated key-value map and ordered sequence capability
//!
//! Records are maps addressed by [`MapId`]; ordered child lists are sequences
//! addressed by [`SequenceId`]. A map value may hold a handle to another map or
//! sequence, which readers resolve explicitly and fallibly. Every mutation is
//! announced to the listeners registered on the mutated object.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub mod memory;
pub mod value;

pub use memory::MemoryStore;
pub use value::Value;

/// Handle to a shared key-value map
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u64);

impl fmt::Display for MapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

/// Handle to a shared ordered sequence of map handles
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceId(pub u64);

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

/// Registration returned by `on_value_changed` / `on_op`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Structural change to a sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SequenceOp {
    Insert { index: usize, items: Vec<MapId> },
    Remove { start: usize, items: Vec<MapId> },
}

/// Notification delivered to listeners
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeEvent {
    ValueChanged {
        map: MapId,
        key: String,
        previous: Option<Value>,
    },
    SequenceOp {
        sequence: SequenceId,
        op: SequenceOp,
    },
}

pub type Listener = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Replicated storage seen through the narrow interface this crate needs.
///
/// Implementations must not hold internal locks while invoking listeners: a
/// listener is allowed to read from and subscribe to the store it is called from.
pub trait SharedStore: Send + Sync {
    fn create_map(&self) -> Result<MapId>;

    fn create_sequence(&self) -> Result<SequenceId>;

    fn contains_map(&self, map: MapId) -> bool;

    fn get(&self, map: MapId, key: &str) -> Result<Option<Value>>;

    fn set(&self, map: MapId, key: &str, value: Value) -> Result<()>;

    /// All entries in the map's own iteration order
    fn entries(&self, map: MapId) -> Result<Vec<(String, Value)>>;

    fn insert(&self, sequence: SequenceId, index: usize, items: Vec<MapId>) -> Result<()>;

    fn remove(&self, sequence: SequenceId, start: usize, end: usize) -> Result<()>;

    fn item_count(&self, sequence: SequenceId) -> Result<usize>;

    /// Items in `start..end`
    fn items(&self, sequence: SequenceId, start: usize, end: usize) -> Result<Vec<MapId>>;

    fn on_value_changed(&self, map: MapId, listener: Listener) -> Result<ListenerId>;

    fn on_op(&self, sequence: SequenceId, listener: Listener) -> Result<ListenerId>;

    /// Remove a listener; false if it was not registered
    fn off(&self, listener: ListenerId) -> bool;
}
