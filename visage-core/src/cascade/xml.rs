//! Minimal element tree for OpenCV `FileStorage` XML documents.

use anyhow::{Context, Result, bail};
use quick_xml::{Reader, events::Event};

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&XmlNode> {
        self.child(name)
            .with_context(|| format!("<{}> has no <{name}> element", self.name))
    }

    /// Children of a sequence node (`<_>` items).
    pub fn items(&self) -> impl Iterator<Item = &XmlNode> {
        self.children.iter().filter(|c| c.name == "_")
    }

    pub fn text_trimmed(&self) -> &str {
        self.text.trim()
    }

    pub fn parse_number<T>(&self) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.text_trimmed();
        raw.parse::<T>()
            .map_err(|e| anyhow::anyhow!("<{}> holds '{raw}', not a number: {e}", self.name))
    }

    /// Whitespace separated numbers, as used by `internalNodes`, `leafValues` and `rects`.
    pub fn parse_list(&self) -> Result<Vec<f64>> {
        self.text
            .split_whitespace()
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|e| anyhow::anyhow!("<{}> holds '{tok}': {e}", self.name))
            })
            .collect()
    }
}

/// Parse a document and return its root element.
pub(crate) fn parse_document(text: &str) -> Result<XmlNode> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..XmlNode::default()
                });
            }
            Ok(Event::Empty(e)) => {
                let node = XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..XmlNode::default()
                };
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(t)) => {
                if let Some(current) = stack.last_mut() {
                    let text = t.unescape().context("invalid character data")?;
                    if !current.text.is_empty() {
                        current.text.push(' ');
                    }
                    current.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().context("unbalanced closing tag")?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => bail!(
                "malformed XML at byte {}: {e}",
                reader.buffer_position()
            ),
        }
    }

    if let Some(open) = stack.last() {
        bail!("unexpected end of document inside <{}>", open.name);
    }
    root.context("document has no root element")
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            anyhow::ensure!(root.is_none(), "document has more than one root element");
            *root = Some(node);
        }
    }
    Ok(())
}
