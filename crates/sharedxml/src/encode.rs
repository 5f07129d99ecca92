//! XML to shared record tree encoding
//!
//! The document is normalized first (see [`crate::xml::normalize`]), so text
//! nodes carry trimmed content and whitespace-only formatting is not preserved.
//! Records are written depth-first in a single pass: each child map is created,
//! inserted into its parent's children sequence, then populated before the next
//! sibling is touched.

use std::time::Instant;

use tracing::{debug, error, info};

use crate::error::Result;
use crate::record::{ATTRIBUTES, CHILDREN, NAME, TYPE, VALUE};
use crate::store::{MapId, SharedStore, Value};
use crate::xml::{self, Element, Node, NodeType};

/// Counts of shared objects created by one encode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub records: usize,
    pub attribute_maps: usize,
    pub sequences: usize,
}

/// Encode `xml` into `target`, logging and returning false on failure.
///
/// On failure `target` may hold a partially written tree that must not be trusted.
pub fn encode(store: &dyn SharedStore, xml: &str, target: MapId) -> bool {
    match try_encode(store, xml, target, xml::Config::default()) {
        Ok(_) => true,
        Err(err) => {
            error!("failed to encode xml into {target}: {err}");
            false
        }
    }
}

/// Typed form of [`encode`]
pub fn try_encode(
    store: &dyn SharedStore,
    xml: &str,
    target: MapId,
    config: xml::Config,
) -> Result<EncodeStats> {
    let started = Instant::now();
    let doc = xml::normalize(xml, config)?;

    let mut encoder = Encoder {
        store,
        stats: EncodeStats::default(),
    };
    encoder.write_element(&doc.root, target)?;
    encoder.stats.records += 1;

    info!(
        records = encoder.stats.records,
        "encoded xml into {target} in {} ms",
        started.elapsed().as_millis()
    );
    Ok(encoder.stats)
}

struct Encoder<'s> {
    store: &'s dyn SharedStore,
    stats: EncodeStats,
}

impl Encoder<'_> {
    fn write_node(&mut self, node: &Node, map: MapId) -> Result<()> {
        match node {
            Node::Element(element) => self.write_element(element, map),
            other => {
                self.store
                    .set(map, TYPE, Value::from(other.node_type().as_str()))?;
                let payload = other.content().map(str::to_string);
                self.store.set(map, VALUE, Value::from(payload))
            }
        }
    }

    fn write_element(&mut self, element: &Element, map: MapId) -> Result<()> {
        self.store
            .set(map, TYPE, Value::from(NodeType::Element.as_str()))?;
        self.store.set(map, NAME, Value::from(element.name.as_str()))?;

        let attributes = self.store.create_map()?;
        self.stats.attribute_maps += 1;
        self.store.set(map, ATTRIBUTES, Value::from(attributes))?;
        for (key, value) in &element.attributes {
            self.store.set(attributes, key, Value::from(value.as_str()))?;
        }

        if element.children.is_empty() {
            return Ok(());
        }

        let children = self.store.create_sequence()?;
        self.stats.sequences += 1;
        self.store.set(map, CHILDREN, Value::from(children))?;
        for (index, child) in element.children.iter().enumerate() {
            let child_map = self.store.create_map()?;
            self.store.insert(children, index, vec![child_map])?;
            self.write_node(child, child_map)?;
            self.stats.records += 1;
        }
        debug!(
            element = %element.name,
            children = element.children.len(),
            "encoded children"
        );
        Ok(())
    }
}
