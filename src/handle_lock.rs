use std::io::Cursor;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use log::{debug, trace};
use xmltree::Element;

use crate::body::Body;
use crate::davheaders::{self, DavTimeout, Depth};
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::locks::{LockDepth, LockRecord};
use crate::mount::Mountpoint;
use crate::xmltree_ext::{emitter, write_elem, ElementExt};
use crate::DavResult;

const NS_DAV_URI: &str = "DAV:";
const XML_CONTENT_TYPE: &str = "application/xml; charset=\"utf-8\"";

// Granted validity is the client's first usable Timeout preference,
// bounded; "Infinite" gets the maximum instead.
const DEFAULT_TIMEOUT: u64 = 600;
const MAX_TIMEOUT: u64 = 86400;

fn get_timeout(req: &Request<()>) -> u64 {
    match req.headers().typed_get::<davheaders::Timeout>() {
        Some(davheaders::Timeout(v)) if !v.is_empty() => match v[0] {
            DavTimeout::Infinite => MAX_TIMEOUT,
            DavTimeout::Seconds(n) => (n as u64).min(MAX_TIMEOUT),
        },
        _ => DEFAULT_TIMEOUT,
    }
}

// What a LOCK body asks for. The registry only hands out one lock per
// URI, so the scope is echoed back but never relaxes exclusion.
struct LockInfo {
    shared: bool,
    owner: Option<Element>,
}

fn parse_lockinfo(xmldata: &[u8]) -> DavResult<LockInfo> {
    let tree = Element::parse2(Cursor::new(xmldata))?;
    if tree.name != "lockinfo" || tree.namespace.as_deref() != Some(NS_DAV_URI) {
        return Err(DavError::XmlParseError);
    }

    let mut shared: Option<bool> = None;
    let mut locktype = false;
    let mut owner: Option<Element> = None;

    for elem in tree.child_elements() {
        if elem.namespace.as_deref() != Some(NS_DAV_URI) {
            continue;
        }
        match elem.name.as_str() {
            "lockscope" => {
                for scope in elem.child_elements() {
                    match scope.name.as_str() {
                        "exclusive" => shared = Some(false),
                        "shared" => shared = Some(true),
                        _ => return Err(DavError::XmlParseError),
                    }
                }
            }
            "locktype" => {
                for t in elem.child_elements() {
                    match t.name.as_str() {
                        "write" => locktype = true,
                        _ => return Err(DavError::XmlParseError),
                    }
                }
            }
            "owner" => {
                let mut o = elem.clone();
                o.prefix = Some("D".to_string());
                owner = Some(o);
            }
            _ => return Err(DavError::XmlParseError),
        }
    }

    match shared {
        Some(shared) if locktype => Ok(LockInfo { shared, owner }),
        _ => Err(DavError::XmlParseError),
    }
}

// serialise the owner element for storage in the lock record.
fn owner_to_string(owner: &Element) -> Option<String> {
    let mut w = xml::writer::EventWriter::new_with_config(
        Vec::new(),
        xml::EmitterConfig {
            write_document_declaration: false,
            ..Default::default()
        },
    );
    write_elem(&mut w, owner).ok()?;
    String::from_utf8(w.into_inner()).ok()
}

fn build_lock_prop(lock: &LockRecord, shared: bool, href: &str, full: bool) -> Element {
    let mut actlock = Element::new2("D:activelock");

    let mut elem = Element::new2("D:lockscope");
    elem.push(if shared {
        Element::new2("D:shared")
    } else {
        Element::new2("D:exclusive")
    });
    actlock.push(elem);

    let mut elem = Element::new2("D:locktype");
    elem.push(Element::new2("D:write"));
    actlock.push(elem);

    actlock.push(Element::new2("D:depth").text(match lock.depth {
        LockDepth::Zero => "0",
        LockDepth::Infinity => "infinity",
    }));
    actlock.push(Element::new2("D:timeout").text(format!("Second-{}", lock.timeout)));

    let mut tokenelem = Element::new2("D:locktoken");
    tokenelem.push(Element::new2("D:href").text(lock.token.clone()));
    actlock.push(tokenelem);

    let mut rootelem = Element::new2("D:lockroot");
    rootelem.push(Element::new2("D:href").text(href));
    actlock.push(rootelem);

    if let Some(owner) = &lock.owner {
        if let Ok(o) = Element::parse2(Cursor::new(owner.as_bytes())) {
            actlock.push(o);
        }
    }

    if !full {
        return actlock;
    }

    let mut ldis = Element::new2("D:lockdiscovery");
    ldis.push(actlock);
    let mut prop = Element::new2("D:prop");
    prop.namespace = Some(NS_DAV_URI.to_string());
    prop.push(ldis);
    prop
}

fn lock_response_body(lock: &LockRecord, shared: bool, href: &str) -> DavResult<Body> {
    let mut w = emitter()?;
    write_elem(&mut w, &build_lock_prop(lock, shared, href, true))?;
    Ok(Body::from(bytes::Bytes::from(w.into_inner())))
}

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_lock(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
        xmldata: &[u8],
    ) -> DavResult<Response<Body>> {
        // must have a lock registry or bail.
        let Some(lm) = self.locks() else {
            return Err(DavError::MethodNotAllowed);
        };

        let mut path = path;
        let exists = match mount.resolve_strict(&path) {
            Ok(fspath) => {
                if fspath.is_dir() {
                    path.add_slash();
                }
                true
            }
            Err(_) => false,
        };
        let uri = self.lock_uri(req, &path);
        let timeout = get_timeout(req);

        // an empty body is a refresh of the token in the If: header.
        if xmldata.is_empty() {
            let tokens = davheaders::if_lock_tokens(req.headers());
            if tokens.len() != 1 {
                return Err(StatusCode::BAD_REQUEST.into());
            }
            let lock = lm
                .refresh(&uri, &tokens[0], timeout)
                .await
                .map_err(|_| DavError::PreconditionFailed)?;
            debug!("LOCK refresh {} -> {}", uri, lock.token);

            let mut res = Response::new(lock_response_body(&lock, false, &path.as_url_string())?);
            res.headers_mut()
                .insert("content-type", XML_CONTENT_TYPE.parse().unwrap());
            *res.status_mut() = StatusCode::OK;
            return Ok(res);
        }

        let depth = match req.headers().typed_get::<Depth>() {
            Some(Depth::Infinity) | None => LockDepth::Infinity,
            Some(Depth::Zero) => LockDepth::Zero,
            Some(Depth::One) => return Err(StatusCode::BAD_REQUEST.into()),
        };

        let info = parse_lockinfo(xmldata)?;
        let owner = info.owner.as_ref().and_then(owner_to_string);

        let lock = lm
            .acquire(&uri, owner, depth, timeout)
            .await
            .map_err(|_| DavError::Locked)?;
        trace!("LOCK {} -> {}", uri, lock.token);

        // an unmapped URL becomes an empty resource under the lock.
        if !exists {
            let fspath = match mount.resolve_parent(&path) {
                Ok(p) => p,
                Err(e) => {
                    lm.release(&uri, &lock.token).await.ok();
                    return Err(e);
                }
            };
            if std::fs::File::create_new(&fspath).is_err() {
                lm.release(&uri, &lock.token).await.ok();
                return Err(DavError::Forbidden);
            }
        }

        let mut res = Response::new(lock_response_body(&lock, info.shared, &path.as_url_string())?);
        res.headers_mut()
            .insert("content-type", XML_CONTENT_TYPE.parse().unwrap());
        res.headers_mut()
            .typed_insert(davheaders::LockToken(format!("<{}>", lock.token)));
        *res.status_mut() = if exists { StatusCode::OK } else { StatusCode::CREATED };
        Ok(res)
    }

    pub(crate) async fn handle_unlock(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        // must have a lock registry or bail.
        let Some(lm) = self.locks() else {
            return Err(DavError::MethodNotAllowed);
        };

        let t = req
            .headers()
            .typed_get::<davheaders::LockToken>()
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
        let token = t.0.trim_matches(|c| c == '<' || c == '>');

        let mut path = path;
        if let Ok(fspath) = mount.resolve_strict(&path) {
            if fspath.is_dir() {
                path.add_slash();
            }
        }
        let uri = self.lock_uri(req, &path);

        match lm.release(&uri, token).await {
            Ok(()) => {
                let mut res = Response::new(Body::empty());
                *res.status_mut() = StatusCode::NO_CONTENT;
                Ok(res)
            }
            Err(_) => Err(DavError::Conflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lockinfo() {
        let body = br#"<?xml version="1.0"?>
            <D:lockinfo xmlns:D="DAV:">
              <D:lockscope><D:exclusive/></D:lockscope>
              <D:locktype><D:write/></D:locktype>
              <D:owner><D:href>mailto:me@example.com</D:href></D:owner>
            </D:lockinfo>"#;
        let info = parse_lockinfo(body).unwrap();
        assert!(!info.shared);
        assert!(info.owner.is_some());
    }

    #[test]
    fn rejects_bad_lockinfo() {
        assert!(parse_lockinfo(b"<lockinfo/>").is_err());
        let body = br#"<D:lockinfo xmlns:D="DAV:"><D:lockscope><D:exclusive/></D:lockscope></D:lockinfo>"#;
        assert!(parse_lockinfo(body).is_err());
    }

    #[test]
    fn activelock_body_shape() {
        let lock = LockRecord {
            token: "urn:uuid:abc".to_string(),
            owner: None,
            depth: LockDepth::Infinity,
            timeout: 600,
            created_at: 0,
        };
        let prop = build_lock_prop(&lock, false, "/a.txt", true);
        assert_eq!(prop.name, "prop");
        let ldis = &prop.child_elements()[0];
        assert_eq!(ldis.name, "lockdiscovery");
        let act = &ldis.child_elements()[0];
        assert_eq!(act.name, "activelock");
        let names: Vec<&str> = act.child_elements().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["lockscope", "locktype", "depth", "timeout", "locktoken", "lockroot"]
        );
    }
}
