//! Builder for 207 Multi-Status response documents.

use bytes::Bytes;
use http::{StatusCode, Version};
use xml::writer::{EventWriter, XmlEvent as XmlWEvent};
use xmltree::Element;

use crate::util::proto_string;
use crate::xmltree_ext::{emitter, write_elem, ElementExt};
use crate::DavResult;

/// An owning `D:multistatus` document under construction.
///
/// Lives for one request; `finish()` serialises it into an owned
/// buffer that outlives the writer. Status lines carry the inbound
/// request's protocol string verbatim.
pub(crate) struct MultiStatus {
    emitter: EventWriter<Vec<u8>>,
    proto: &'static str,
}

impl MultiStatus {
    pub fn new(version: Version) -> DavResult<MultiStatus> {
        let mut emitter = emitter()?;
        emitter.write(XmlWEvent::start_element("D:multistatus").ns("D", "DAV:"))?;
        Ok(MultiStatus {
            emitter,
            proto: proto_string(version),
        })
    }

    fn status_line(&self, status: StatusCode) -> String {
        format!(
            "{} {} {}",
            self.proto,
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
    }

    /// One `D:response` pairing props with per-group status lines
    /// (PROPFIND, PROPPATCH).
    pub fn add_response(
        &mut self,
        href: &str,
        propstats: Vec<(StatusCode, Vec<Element>)>,
    ) -> DavResult<()> {
        self.emitter.write(XmlWEvent::start_element("D:response"))?;
        write_elem(&mut self.emitter, &Element::new2("D:href").text(href))?;
        for (status, props) in propstats {
            let status_line = self.status_line(status);
            self.emitter.write(XmlWEvent::start_element("D:propstat"))?;
            self.emitter.write(XmlWEvent::start_element("D:prop"))?;
            for prop in &props {
                write_elem(&mut self.emitter, prop)?;
            }
            self.emitter.write(XmlWEvent::end_element())?; // prop
            write_elem(&mut self.emitter, &Element::new2("D:status").text(status_line))?;
            self.emitter.write(XmlWEvent::end_element())?; // propstat
        }
        self.emitter.write(XmlWEvent::end_element())?; // response
        Ok(())
    }

    /// Close the document and hand back the serialised bytes.
    pub fn finish(mut self) -> DavResult<Bytes> {
        self.emitter.write(XmlWEvent::end_element())?; // multistatus
        Ok(Bytes::from(self.emitter.into_inner()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_propstat_groups() {
        let mut ms = MultiStatus::new(Version::HTTP_11).unwrap();
        ms.add_response(
            "/a%20b",
            vec![
                (StatusCode::OK, vec![Element::new2("D:getcontentlength").text("5")]),
                (StatusCode::FORBIDDEN, vec![Element::new2("D:getcontenttype")]),
            ],
        )
        .unwrap();
        let out = String::from_utf8(ms.finish().unwrap().to_vec()).unwrap();
        assert!(out.starts_with(r#"<?xml version="1.0" encoding="utf-8"?>"#));
        assert!(out.contains(r#"<D:multistatus xmlns:D="DAV:">"#));
        assert!(out.contains("<D:href>/a%20b</D:href>"));
        assert!(out.contains("<D:status>HTTP/1.1 200 OK</D:status>"));
        assert!(out.contains("<D:status>HTTP/1.1 403 Forbidden</D:status>"));
        assert!(out.ends_with("</D:multistatus>"));
    }

    #[test]
    fn proto_follows_request_version() {
        let mut ms = MultiStatus::new(Version::HTTP_10).unwrap();
        ms.add_response("/", vec![(StatusCode::OK, vec![])]).unwrap();
        let out = String::from_utf8(ms.finish().unwrap().to_vec()).unwrap();
        assert!(out.contains("HTTP/1.0 200 OK"));
    }
}
