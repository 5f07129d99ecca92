//! sharedxml - XML documents as observable shared key-value trees
//!
//! Every XML node becomes one record in a [`SharedStore`]; element children
//! live in ordered sequences and attributes in their own map. Trees can be
//! rendered as indented text and observed for changes.
//!
//! # Quick Start
//!
//! ```
//! use sharedxml::{encode, render, MemoryStore, SharedStore};
//! # fn main() -> Result<(), sharedxml::Error> {
//! let store = MemoryStore::new();
//! let root = store.create_map()?;
//! assert!(encode(&store, r#"<a x="1"><b>hello</b><c/></a>"#, root));
//!
//! let lines = render(&store, root, 0);
//! assert_eq!(lines[0], "a");
//! assert_eq!(lines[2], "    x: 1");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod debounce;
pub mod document;
pub mod encode;
pub mod error;
pub mod load;
pub mod record;
pub mod render;
pub mod service;
pub mod store;
pub mod subscribe;
pub mod view;
pub mod xml;

pub use config::Config;
pub use document::SharedDocument;
pub use encode::{encode, try_encode, EncodeStats};
pub use error::{Error, ErrorCategory, ErrorKind, Pos, Result, Span};
pub use load::{DocumentId, DocumentSession, EncodeStatus, LoadError, LoadMode, LoadState, Loader};
pub use record::Record;
pub use render::render;
pub use service::{acquire_or_create, DocumentService, LocalDocumentService};
pub use store::{ChangeEvent, MapId, MemoryStore, SequenceId, SequenceOp, SharedStore, Value};
pub use subscribe::{Coverage, Subscriptions};
pub use view::LiveView;
