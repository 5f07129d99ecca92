//! Compact XML serialization and whitespace normalization

use crate::error::Result;
use crate::xml::model::{Document, Element, Node};
use crate::xml::parser::{Config, Parser};

/// Serialize without insignificant whitespace: text is trimmed, empty text dropped,
/// childless elements self-close.
pub fn to_compact_string(doc: &Document) -> String {
    let mut output = String::new();
    write_element(&doc.root, &mut output);
    output
}

/// Parse, compact and re-parse so text nodes reflect the canonical compressed
/// form instead of the source formatting.
pub fn normalize(xml: &str, config: Config) -> Result<Document> {
    let doc = Parser::with_config(xml.as_bytes(), config).parse()?;
    let compact = to_compact_string(&doc);
    Parser::with_config(compact.as_bytes(), config).parse()
}

fn write_element(element: &Element, output: &mut String) {
    output.push('<');
    output.push_str(&element.name);

    for (key, value) in &element.attributes {
        output.push(' ');
        output.push_str(key);
        output.push_str("=\"");
        output.push_str(&escape(value, true));
        output.push('"');
    }

    let start = output.len();
    output.push('>');
    let mut wrote_child = false;
    for child in &element.children {
        wrote_child |= write_node(child, output);
    }

    if !wrote_child {
        output.truncate(start);
        output.push_str("/>");
        return;
    }

    output.push_str("</");
    output.push_str(&element.name);
    output.push('>');
}

fn write_node(node: &Node, output: &mut String) -> bool {
    match node {
        Node::Element(child) => write_element(child, output),
        Node::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return false;
            }
            output.push_str(&escape(text, false));
        }
        Node::CData(data) => {
            output.push_str("<![CDATA[");
            output.push_str(data);
            output.push_str("]]>");
        }
        Node::Comment(comment) => {
            output.push_str("<!--");
            output.push_str(comment);
            output.push_str("-->");
        }
    }
    true
}

fn escape(input: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
