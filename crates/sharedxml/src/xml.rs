//! XML model, parser and compact writer

pub mod cursor;
pub mod model;
pub mod parser;
pub mod writer;

pub use model::{Document, Element, Node, NodeType};
pub use parser::{Config, Parser};
pub use writer::{normalize, to_compact_string};
