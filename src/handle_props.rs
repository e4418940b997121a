use std::io::Cursor;
use std::path::Path;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use log::{debug, trace};
use xmltree::Element;

use crate::body::Body;
use crate::davheaders::Depth;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::mount::Mountpoint;
use crate::multistatus::MultiStatus;
use crate::props;
use crate::util::{systemtime_to_httpdate, unixtime_to_httpdate};
use crate::xmltree_ext::ElementExt;
use crate::DavResult;

const NS_DAV_URI: &str = "DAV:";
const NS_APACHE_URI: &str = "http://apache.org/dav/props/";

const XML_CONTENT_TYPE: &str = "application/xml; charset=\"utf-8\"";

// The live properties this module serves, in the DAV: namespace except
// for the apache executable flag.
const LIVE_PROPS: &[&str] = &[
    "creationdate",
    "displayname",
    "getcontentlength",
    "getcontenttype",
    "getetag",
    "getlastmodified",
    "resourcetype",
];

enum PropfindType {
    Prop(Vec<Element>),
    AllProp,
    PropName,
}

fn parse_propfind(xmldata: &[u8]) -> DavResult<PropfindType> {
    if xmldata.is_empty() {
        return Ok(PropfindType::AllProp);
    }
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "propfind" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
        return Err(DavError::XmlParseError);
    }
    for elem in tree.child_elements() {
        if elem.namespace.as_deref() != Some(NS_DAV_URI) {
            continue;
        }
        match elem.name.as_str() {
            "allprop" => return Ok(PropfindType::AllProp),
            "propname" => return Ok(PropfindType::PropName),
            "prop" => {
                let wanted = elem.child_elements().into_iter().cloned().collect();
                return Ok(PropfindType::Prop(wanted));
            }
            _ => {}
        }
    }
    Err(DavError::XmlParseError)
}

// A D:-prefixed live property element, optionally with content.
fn live_elem(name: &str, content: Option<String>) -> Element {
    let mut e = Element::new2(format!("D:{}", name).as_str());
    if let Some(t) = content {
        if !t.is_empty() {
            e = e.text(t);
        }
    }
    e
}

// The apache executable property carries its own namespace declaration.
fn executable_elem() -> Element {
    let mut e = Element::new2("A:executable");
    e.namespace = Some(NS_APACHE_URI.to_string());
    e
}

// A dead property rendered back to XML: name plus default-namespace
// declaration, value as text.
fn dead_elem(prop: &props::DavProp, docontent: bool) -> Element {
    let mut e = Element::new(&prop.name);
    e.namespace = prop.namespace.clone();
    if docontent {
        if let Some(value) = &prop.value {
            let text = String::from_utf8_lossy(value).into_owned();
            if !text.is_empty() {
                e = e.text(text);
            }
        }
    }
    e
}

// Build one live property, content included unless `docontent` is off
// (propname). None means the property does not apply to this resource.
fn build_live_prop(
    name: &str,
    path: &DavPath,
    meta: &std::fs::Metadata,
    docontent: bool,
) -> Option<Element> {
    if !docontent {
        return Some(live_elem(name, None));
    }
    match name {
        "creationdate" => Some(live_elem(name, Some(unixtime_to_httpdate(props::created_unixtime(meta))))),
        "displayname" => Some(live_elem(name, Some(path.to_string()))),
        "getcontentlength" => {
            if meta.is_dir() {
                None
            } else {
                Some(live_elem(name, Some(meta.len().to_string())))
            }
        }
        "getcontenttype" => {
            if meta.is_dir() {
                Some(live_elem(name, Some("httpd/unix-directory".to_string())))
            } else {
                Some(live_elem(name, Some(path.get_mime_type_str().to_string())))
            }
        }
        "getetag" => Some(live_elem(name, Some(props::etag(meta)))),
        "getlastmodified" => {
            let t = meta.modified().ok()?;
            Some(live_elem(name, Some(systemtime_to_httpdate(t))))
        }
        "resourcetype" => {
            let mut e = live_elem(name, None);
            if meta.is_dir() {
                e.push(Element::new2("D:collection"));
            }
            Some(e)
        }
        _ => None,
    }
}

// All propstat groups for one resource.
fn resource_propstats(
    pf: &PropfindType,
    path: &DavPath,
    fspath: &Path,
    meta: &std::fs::Metadata,
) -> Vec<(StatusCode, Vec<Element>)> {
    let mut found: Vec<Element> = Vec::new();
    let mut missing: Vec<Element> = Vec::new();

    match pf {
        PropfindType::Prop(wanted) => {
            for want in wanted {
                match want.namespace.as_deref() {
                    Some(NS_DAV_URI) if LIVE_PROPS.contains(&want.name.as_str()) => {
                        match build_live_prop(&want.name, path, meta, true) {
                            Some(e) => found.push(e),
                            None => missing.push(live_elem(&want.name, None)),
                        }
                    }
                    Some(NS_APACHE_URI) if want.name == "executable" => {
                        match props::executable(meta) {
                            Some(_) => found.push(executable_elem()),
                            None => missing.push(executable_elem()),
                        }
                    }
                    ns => {
                        // dead property lookup
                        let ns = ns.filter(|s| *s != NS_DAV_URI);
                        match props::get_prop(fspath, ns, &want.name) {
                            Ok(value) => found.push(dead_elem(
                                &props::DavProp {
                                    name: want.name.clone(),
                                    namespace: ns.map(str::to_string),
                                    value: Some(value),
                                },
                                true,
                            )),
                            Err(_) => {
                                let mut e = Element::new(&want.name);
                                e.namespace = ns.map(str::to_string);
                                if want.namespace.as_deref() == Some(NS_DAV_URI) {
                                    e = live_elem(&want.name, None);
                                }
                                missing.push(e);
                            }
                        }
                    }
                }
            }
        }
        PropfindType::AllProp | PropfindType::PropName => {
            let docontent = matches!(pf, PropfindType::AllProp);
            for name in LIVE_PROPS {
                if let Some(e) = build_live_prop(name, path, meta, docontent) {
                    found.push(e);
                }
            }
            if props::executable(meta).is_some() {
                found.push(executable_elem());
            }
            for prop in props::dead_properties(fspath) {
                found.push(dead_elem(&prop, docontent));
            }
        }
    }

    let mut propstats = vec![(StatusCode::OK, found)];
    if !missing.is_empty() {
        propstats.push((StatusCode::NOT_FOUND, missing));
    }
    propstats
}

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_propfind(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = path;
        let fspath = mount.resolve_strict(&path)?;
        let meta = std::fs::metadata(&fspath).map_err(|_| DavError::NotFound)?;
        path.add_slash_if(meta.is_dir());

        // Absent Depth means infinity for collections, the resource
        // itself otherwise.
        let depth = match req.headers().typed_get::<Depth>() {
            Some(d) => d,
            None if meta.is_dir() => Depth::Infinity,
            None => Depth::Zero,
        };

        let pf = parse_propfind(xmldata)?;
        trace!("propfind: {} depth {:?}", path, depth);

        let mut ms = MultiStatus::new(req.version())?;

        // the request target itself comes first,
        ms.add_response(
            &path.as_url_string(),
            resource_propstats(&pf, &path, &fspath, &meta),
        )?;

        // then its children, in filesystem order.
        if meta.is_dir() && depth != Depth::Zero {
            self.propfind_directory(&path, &fspath, depth, &pf, &mut ms)?;
        }

        let mut res = Response::new(Body::from(ms.finish()?));
        res.headers_mut()
            .insert("content-type", XML_CONTENT_TYPE.parse().unwrap());
        *res.status_mut() = StatusCode::MULTI_STATUS;
        Ok(res)
    }

    fn propfind_directory(
        &self,
        path: &DavPath,
        fspath: &Path,
        depth: Depth,
        pf: &PropfindType,
        ms: &mut MultiStatus,
    ) -> DavResult<()> {
        let entries = match std::fs::read_dir(fspath) {
            Ok(entries) => entries,
            Err(e) => {
                // if we cannot read the directory, just skip it.
                debug!("propfind: read_dir {:?}: {}", fspath, e);
                return Ok(());
            }
        };

        for entry in entries {
            let Ok(entry) = entry else { continue };
            let Ok(name) = entry.file_name().into_string() else { continue };
            let nfspath = entry.path();
            // a child whose stat fails is omitted, the listing goes on.
            // symlink_metadata so a symlink is a leaf entry: it is never
            // entered, which would walk out of the docroot or cycle.
            let Ok(meta) = std::fs::symlink_metadata(&nfspath) else {
                trace!("propfind: stat failed, skipping {:?}", nfspath);
                continue;
            };
            let mut npath = path.clone();
            npath.push_segment(&name);
            npath.add_slash_if(meta.is_dir());

            ms.add_response(&npath.as_url_string(), resource_propstats(pf, &npath, &nfspath, &meta))?;

            if meta.is_dir() && depth == Depth::Infinity {
                self.propfind_directory(&npath, &nfspath, depth, pf, ms)?;
            }
        }
        Ok(())
    }

    pub(crate) async fn handle_proppatch(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        let mut path = path;
        let fspath = mount.resolve_strict(&path)?;
        let meta = std::fs::metadata(&fspath).map_err(|_| DavError::NotFound)?;
        path.add_slash_if(meta.is_dir());

        trace!(
            "proppatch input:\n{}",
            String::from_utf8_lossy(xmldata)
        );

        let tree = Element::parse2(Cursor::new(xmldata))?;
        if tree.name != "propertyupdate" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
            return Err(DavError::XmlParseError);
        }

        // walk the set/remove blocks in document order.
        let mut ok: Vec<Element> = Vec::new();
        let mut failed: Vec<Element> = Vec::new();
        for block in tree.child_elements() {
            if block.namespace.as_deref() != Some(NS_DAV_URI) {
                continue;
            }
            let set = match block.name.as_str() {
                "set" => true,
                "remove" => false,
                _ => continue,
            };
            for prop in block
                .child_elements()
                .into_iter()
                .filter(|e| e.name == "prop" && e.namespace.as_deref() == Some(NS_DAV_URI))
                .flat_map(|e| e.child_elements().into_iter().cloned().collect::<Vec<_>>())
            {
                let ns = prop.namespace.as_deref().filter(|s| *s != NS_DAV_URI);
                let result = if set {
                    let value = prop.text_content();
                    props::set_prop(&fspath, ns, &prop.name, value.as_bytes())
                } else {
                    props::del_prop(&fspath, ns, &prop.name)
                };
                let mut echo = Element::new(&prop.name);
                echo.namespace = ns.map(str::to_string);
                match result {
                    Ok(()) => ok.push(echo),
                    Err(_) => failed.push(echo),
                }
            }
        }

        let mut propstats = Vec::new();
        if !ok.is_empty() {
            propstats.push((StatusCode::OK, ok));
        }
        if !failed.is_empty() {
            propstats.push((StatusCode::FORBIDDEN, failed));
        }
        if propstats.is_empty() {
            return Err(DavError::XmlParseError);
        }

        let mut ms = MultiStatus::new(req.version())?;
        ms.add_response(&path.as_url_string(), propstats)?;

        let mut res = Response::new(Body::from(ms.finish()?));
        res.headers_mut()
            .insert("content-type", XML_CONTENT_TYPE.parse().unwrap());
        *res.status_mut() = StatusCode::MULTI_STATUS;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_propfind_variants() {
        assert!(matches!(parse_propfind(b"").unwrap(), PropfindType::AllProp));

        let body = br#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:allprop/></D:propfind>"#;
        assert!(matches!(parse_propfind(body).unwrap(), PropfindType::AllProp));

        let body = br#"<?xml version="1.0"?><D:propfind xmlns:D="DAV:"><D:propname/></D:propfind>"#;
        assert!(matches!(parse_propfind(body).unwrap(), PropfindType::PropName));

        let body = br#"<?xml version="1.0"?>
            <D:propfind xmlns:D="DAV:">
              <D:prop><D:getcontentlength/><foo xmlns="X"/></D:prop>
            </D:propfind>"#;
        match parse_propfind(body).unwrap() {
            PropfindType::Prop(props) => {
                assert_eq!(props.len(), 2);
                assert_eq!(props[0].name, "getcontentlength");
                assert_eq!(props[1].namespace.as_deref(), Some("X"));
            }
            _ => panic!("expected prop list"),
        }

        assert!(parse_propfind(b"<bogus/>").is_err());
    }

    #[test]
    fn live_props_of_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f.txt");
        std::fs::write(&f, b"hello").unwrap();
        let meta = std::fs::metadata(&f).unwrap();
        let path = DavPath::from_str_and_prefix("/f.txt", "/").unwrap();

        let e = build_live_prop("getcontentlength", &path, &meta, true).unwrap();
        assert_eq!(e.text_content(), "5");
        let e = build_live_prop("getcontenttype", &path, &meta, true).unwrap();
        assert_eq!(e.text_content(), "text/plain");
        let e = build_live_prop("resourcetype", &path, &meta, true).unwrap();
        assert!(e.child_elements().is_empty());
        let e = build_live_prop("displayname", &path, &meta, true).unwrap();
        assert_eq!(e.text_content(), "/f.txt");
    }

    #[test]
    fn live_props_of_a_collection() {
        let dir = tempfile::tempdir().unwrap();
        let meta = std::fs::metadata(dir.path()).unwrap();
        let path = DavPath::from_str_and_prefix("/d/", "/").unwrap();

        assert!(build_live_prop("getcontentlength", &path, &meta, true).is_none());
        let e = build_live_prop("resourcetype", &path, &meta, true).unwrap();
        assert_eq!(e.child_elements()[0].name, "collection");
        let e = build_live_prop("getcontenttype", &path, &meta, true).unwrap();
        assert_eq!(e.text_content(), "httpd/unix-directory");
    }
}
