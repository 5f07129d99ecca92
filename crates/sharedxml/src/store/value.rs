//! Values stored in shared maps

use crate::store::{MapId, SequenceId};

/// A scalar or a handle to another shared object
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    /// Explicit "no value" marker
    #[default]
    Null,
    String(String),
    Map(MapId),
    Sequence(SequenceId),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Map(_) | Self::Sequence(_))
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<MapId> {
        match self {
            Self::Map(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<SequenceId> {
        match self {
            Self::Sequence(id) => Some(*id),
            _ => None,
        }
    }

    /// Text used when printing the value; `Null` prints as nothing
    pub fn display_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::String(s) => s.clone(),
            Self::Map(id) => id.to_string(),
            Self::Sequence(id) => id.to_string(),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null, Self::String)
    }
}

impl From<MapId> for Value {
    fn from(value: MapId) -> Self {
        Self::Map(value)
    }
}

impl From<SequenceId> for Value {
    fn from(value: SequenceId) -> Self {
        Self::Sequence(value)
    }
}
