//! XML data model

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

/// XML document
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub root: Element,
}

/// XML element
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }
}

/// XML content node
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
    Comment(String),
}

impl Node {
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Element(_) => NodeType::Element,
            Self::Text(_) => NodeType::Text,
            Self::CData(_) => NodeType::CData,
            Self::Comment(_) => NodeType::Comment,
        }
    }

    /// Payload of a non-element node
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Element(_) => None,
            Self::Text(s) | Self::CData(s) | Self::Comment(s) => Some(s),
        }
    }
}

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(value)
    }
}

/// Discriminator written to every encoded record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element,
    Text,
    CData,
    Comment,
}

impl NodeType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Element => "element",
            Self::Text => "text",
            Self::CData => "cdata",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "element" => Ok(Self::Element),
            "text" => Ok(Self::Text),
            "cdata" => Ok(Self::CData),
            "comment" => Ok(Self::Comment),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}
