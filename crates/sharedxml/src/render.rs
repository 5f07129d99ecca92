//! Indented line rendering of a shared record tree
//!
//! ```text
//! a
//!   Attributes:
//!     x: 1
//!   Children:
//!     b
//!       Children:
//!         Type: text, Value: hello
//!     c
//! ```
//!
//! Rendering is best-effort. Each record level catches its own failure, logs it
//! and keeps the lines it already produced, so a partially replicated or
//! corrupt tree still prints as much as can be read.

use tracing::warn;

use crate::error::Result;
use crate::record::{resolve_map, Record};
use crate::store::{MapId, SharedStore};

/// Spaces added per tree depth
pub const INDENT_STEP: usize = 2;

/// Render the tree under `root`, starting at `base_indent` spaces.
///
/// Reads are point-in-time; calling again re-reads the current state.
pub fn render(store: &dyn SharedStore, root: MapId, base_indent: usize) -> Vec<String> {
    let mut lines = Vec::new();
    if let Err(err) = render_record(store, root, base_indent, &mut lines) {
        warn!("failed to render {root}: {err}");
    }
    lines
}

fn render_record(
    store: &dyn SharedStore,
    map: MapId,
    indent: usize,
    lines: &mut Vec<String>,
) -> Result<()> {
    let record = Record::read(store, map)?;
    let pad = " ".repeat(indent);

    if !record.is_element() {
        lines.push(format!(
            "{pad}Type: {}, Value: {}",
            record.kind,
            record.value.display_text()
        ));
        return Ok(());
    }

    lines.push(format!("{pad}{}", record.name.as_deref().unwrap_or_default()));

    let inner = indent + INDENT_STEP;
    let inner_pad = " ".repeat(inner);
    let nested_pad = " ".repeat(inner + INDENT_STEP);

    let attributes = record.attribute_pairs(store)?;
    if !attributes.is_empty() {
        lines.push(format!("{inner_pad}Attributes:"));
        for (key, value) in attributes {
            lines.push(format!("{nested_pad}{key}: {value}"));
        }
    }

    if record.children.is_some() {
        let children = record.child_ids(store)?;
        lines.push(format!("{inner_pad}Children:"));
        for child in children {
            let child = resolve_map(store, child)?;
            lines.extend(render(store, child, inner + INDENT_STEP));
        }
    }

    Ok(())
}
