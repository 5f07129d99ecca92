//! Encoded record layout and typed reads over a [`SharedStore`]
//!
//! One record is one map. The keys below are shared by the encoder, the printer
//! and the subscription manager:
//!
//! | key           | present when          | value                         |
//! |---------------|-----------------------|-------------------------------|
//! | `_type`       | always                | `element`/`text`/`cdata`/`comment` |
//! | `_value`      | not an element        | payload or explicit `Null`    |
//! | `_name`       | element               | tag name                      |
//! | `_attributes` | element               | handle to a name → value map  |
//! | `_children`   | element with children | handle to a sequence of records |

use crate::error::{Error, ErrorKind, Result};
use crate::store::{MapId, SequenceId, SharedStore, Value};

pub const TYPE: &str = "_type";
pub const VALUE: &str = "_value";
pub const NAME: &str = "_name";
pub const ATTRIBUTES: &str = "_attributes";
pub const CHILDREN: &str = "_children";

/// Resolve a map handle, failing if it has not (yet) reached this store
pub fn resolve_map(store: &dyn SharedStore, map: MapId) -> Result<MapId> {
    if store.contains_map(map) {
        Ok(map)
    } else {
        Err(Error::unpositioned(ErrorKind::DanglingHandle {
            handle: map.to_string(),
        }))
    }
}

/// Resolve a children handle read from a record
pub fn resolve_sequence(store: &dyn SharedStore, value: &Value) -> Result<SequenceId> {
    let sequence = expect_sequence(value)?;
    store.item_count(sequence)?;
    Ok(sequence)
}

fn expect_map(value: &Value) -> Result<MapId> {
    value
        .as_map()
        .ok_or_else(|| Error::unpositioned(ErrorKind::WrongHandleKind { expected: "map" }))
}

fn expect_sequence(value: &Value) -> Result<SequenceId> {
    value.as_sequence().ok_or_else(|| {
        Error::unpositioned(ErrorKind::WrongHandleKind {
            expected: "sequence",
        })
    })
}

/// Point-in-time view of one record's fields
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub id: MapId,
    /// Raw discriminator; unknown strings are kept and printed as-is
    pub kind: String,
    pub value: Value,
    pub name: Option<String>,
    pub attributes: Option<MapId>,
    pub children: Option<SequenceId>,
}

impl Record {
    pub fn read(store: &dyn SharedStore, id: MapId) -> Result<Self> {
        let kind = match store.get(id, TYPE)? {
            Some(Value::String(kind)) => kind,
            _ => {
                return Err(Error::unpositioned(ErrorKind::MissingField { field: TYPE }));
            }
        };
        let value = store.get(id, VALUE)?.unwrap_or_default();
        let name = store
            .get(id, NAME)?
            .and_then(|name| name.as_string().map(str::to_string));
        let attributes = store
            .get(id, ATTRIBUTES)?
            .filter(|v| !v.is_null())
            .map(|v| expect_map(&v))
            .transpose()?;
        let children = store
            .get(id, CHILDREN)?
            .filter(|v| !v.is_null())
            .map(|v| expect_sequence(&v))
            .transpose()?;

        Ok(Self {
            id,
            kind,
            value,
            name,
            attributes,
            children,
        })
    }

    pub fn is_element(&self) -> bool {
        self.kind == "element"
    }

    /// Attribute pairs in the attribute map's own order
    pub fn attribute_pairs(&self, store: &dyn SharedStore) -> Result<Vec<(String, String)>> {
        let Some(attributes) = self.attributes else {
            return Ok(Vec::new());
        };
        let attributes = resolve_map(store, attributes)?;
        Ok(store
            .entries(attributes)?
            .into_iter()
            .map(|(key, value)| (key, value.display_text()))
            .collect())
    }

    /// Child record handles in sequence order
    pub fn child_ids(&self, store: &dyn SharedStore) -> Result<Vec<MapId>> {
        let Some(children) = self.children else {
            return Ok(Vec::new());
        };
        let children = resolve_sequence(store, &Value::from(children))?;
        let count = store.item_count(children)?;
        store.items(children, 0, count)
    }
}
