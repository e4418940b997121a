use std::io::{Read, Write};

use xml::common::XmlVersion;
use xml::writer::EventWriter;
use xml::writer::XmlEvent as XmlWEvent;
use xml::EmitterConfig;
use xmltree::{Element, XMLNode};

use crate::errors::DavError;
use crate::DavResult;

pub(crate) trait ElementExt {
    fn new2<'a, N: Into<&'a str>>(n: N) -> Self;
    fn text<T: Into<String>>(self, t: T) -> Self;
    fn push(&mut self, e: Element);
    fn text_content(&self) -> String;
    fn child_elements(&self) -> Vec<&Element>;
    fn parse2<R: Read>(r: R) -> DavResult<Element>;
}

impl ElementExt for Element {
    // "D:name" creates a prefixed element, "name" a plain one.
    fn new2<'a, N: Into<&'a str>>(n: N) -> Element {
        let n = n.into();
        match n.split_once(':') {
            None => Element::new(n),
            Some((pfx, name)) => {
                let mut e = Element::new(name);
                e.prefix = Some(pfx.to_string());
                e
            }
        }
    }

    fn text<T: Into<String>>(mut self, t: T) -> Element {
        self.children.push(XMLNode::Text(t.into()));
        self
    }

    fn push(&mut self, e: Element) {
        self.children.push(XMLNode::Element(e));
    }

    fn text_content(&self) -> String {
        self.get_text().map(|t| t.into_owned()).unwrap_or_default()
    }

    fn child_elements(&self) -> Vec<&Element> {
        self.children
            .iter()
            .filter_map(|n| match n {
                XMLNode::Element(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn parse2<R: Read>(r: R) -> DavResult<Element> {
        Element::parse(r).map_err(|_| DavError::XmlParseError)
    }
}

// Serialise an element tree through an EventWriter. Namespace
// declarations are emitted only where an element carries one; the `D`
// prefix is assumed to be declared on the document root.
pub(crate) fn write_elem<W: Write>(w: &mut EventWriter<W>, elem: &Element) -> DavResult<()> {
    let name = match &elem.prefix {
        Some(pfx) => format!("{}:{}", pfx, elem.name),
        None => elem.name.clone(),
    };
    let mut ev = XmlWEvent::start_element(name.as_str());
    if let Some(ns) = &elem.namespace {
        ev = match &elem.prefix {
            Some(pfx) => ev.ns(pfx.as_str(), ns.as_str()),
            None => ev.default_ns(ns.as_str()),
        };
    }
    w.write(ev)?;
    for child in &elem.children {
        match child {
            XMLNode::Element(e) => write_elem(w, e)?,
            XMLNode::Text(t) => w.write(XmlWEvent::characters(t))?,
            XMLNode::CData(t) => w.write(XmlWEvent::characters(t))?,
            _ => {}
        }
    }
    w.write(XmlWEvent::end_element())?;
    Ok(())
}

// New writer over an owned buffer, XML declaration already emitted.
pub(crate) fn emitter() -> DavResult<EventWriter<Vec<u8>>> {
    let mut emitter = EventWriter::new_with_config(
        Vec::new(),
        EmitterConfig {
            normalize_empty_elements: false,
            perform_indent: false,
            ..Default::default()
        },
    );
    emitter.write(XmlWEvent::StartDocument {
        version: XmlVersion::Version10,
        encoding: Some("utf-8"),
        standalone: None,
    })?;
    Ok(emitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_and_plain_names() {
        let e = Element::new2("D:href");
        assert_eq!(e.name, "href");
        assert_eq!(e.prefix.as_deref(), Some("D"));
        let e = Element::new2("owner");
        assert_eq!(e.name, "owner");
        assert_eq!(e.prefix, None);
    }

    #[test]
    fn serialises_nested_tree() {
        let mut w = emitter().unwrap();
        let mut root = Element::new2("D:multistatus");
        root.namespace = Some("DAV:".to_string());
        let mut resp = Element::new2("D:response");
        resp.push(Element::new2("D:href").text("/a"));
        root.push(resp);
        write_elem(&mut w, &root).unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert!(out.contains(r#"<D:multistatus xmlns:D="DAV:">"#));
        assert!(out.contains("<D:href>/a</D:href>"));
    }

    #[test]
    fn default_namespace_on_plain_element() {
        let mut w = emitter().unwrap();
        let mut e = Element::new2("foo");
        e.namespace = Some("X".to_string());
        let e = e.text("bar");
        write_elem(&mut w, &e).unwrap();
        let out = String::from_utf8(w.into_inner()).unwrap();
        assert!(out.contains(r#"<foo xmlns="X">bar</foo>"#));
    }
}
