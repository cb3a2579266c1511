//! Reader for the remote parser's XML output
//!
//! The markup service returns its parse tree as an XML document over a small,
//! closed vocabulary (`<root>`, `<template>`, `<tplarg>`, `<title>`,
//! `<part>`, `<name>`, `<value>`, `<comment>`, `<ignore>`, `<ext>`, plus
//! bare text). This module reads that document into a generic element tree;
//! the XML artifacts are discarded once the session's own arena is built.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseTreeError {
    #[error("malformed parse tree XML: {0}")]
    Xml(String),

    #[error("parse tree has no document element")]
    NoRoot,
}

/// One node of the raw parse tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

/// An element with its attributes and ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

fn element_from(start: &BytesStart<'_>) -> Result<XmlElement, ParseTreeError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| ParseTreeError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| ParseTreeError::Xml(e.to_string()))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(XmlElement {
        name,
        attrs,
        children: Vec::new(),
    })
}

/// Parse a complete XML document and return its document element.
pub fn parse_document(xml: &str) -> Result<XmlElement, ParseTreeError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ParseTreeError::Xml(e.to_string()))?;
        match event {
            Event::Start(start) => {
                stack.push(element_from(&start)?);
            }
            Event::Empty(start) => {
                let element = element_from(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => return Err(ParseTreeError::Xml("content after root".into())),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| ParseTreeError::Xml("unmatched closing tag".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(XmlNode::Element(element)),
                    None if root.is_none() => root = Some(element),
                    None => return Err(ParseTreeError::Xml("content after root".into())),
                }
            }
            Event::Text(text) => {
                let value = text
                    .unescape()
                    .map_err(|e| ParseTreeError::Xml(e.to_string()))?
                    .into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(value));
                }
                // Text outside the document element is insignificant.
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Text(value));
                }
            }
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if !stack.is_empty() {
        return Err(ParseTreeError::Xml("unterminated element".into()));
    }
    root.ok_or(ParseTreeError::NoRoot)
}
