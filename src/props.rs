//! Dead properties stored as extended attributes, and live properties
//! computed by stat.

use std::path::Path;

use crate::errors::DavError;
use crate::DavResult;

// All dead-property attributes live under this key namespace.
const XATTR_PREFIX: &str = "user.uwsgi.webdav.";

// Separates the (escaped) XML namespace from the property name.
const NS_SEP: char = '|';

/// A user-defined property: name, optional XML namespace, and for
/// reads/writes the raw value.
#[derive(Debug, Clone, PartialEq)]
pub struct DavProp {
    pub name: String,
    pub namespace: Option<String>,
    pub value: Option<Vec<u8>>,
}

// '%' and '|' are escaped in the namespace portion of the key, so the
// key always splits unambiguously at the first unescaped '|'.
fn escape_ns(ns: &str) -> String {
    ns.replace('%', "%25").replace(NS_SEP, "%7C")
}

fn unescape_ns(ns: &str) -> String {
    ns.replace("%7C", "|").replace("%25", "%")
}

/// The xattr key for a property.
pub(crate) fn prop_to_key(namespace: Option<&str>, name: &str) -> String {
    let mut key = String::from(XATTR_PREFIX);
    if let Some(ns) = namespace {
        key.push_str(&escape_ns(ns));
        key.push(NS_SEP);
    }
    key.push_str(name);
    key
}

/// Decode an xattr key back to (namespace, name). Keys outside our
/// prefix are not dead properties and yield None.
pub(crate) fn key_to_prop(key: &str) -> Option<(Option<String>, String)> {
    let rest = key.strip_prefix(XATTR_PREFIX)?;
    match rest.split_once(NS_SEP) {
        Some((ns, name)) => Some((Some(unescape_ns(ns)), name.to_string())),
        None => Some((None, rest.to_string())),
    }
}

#[cfg(unix)]
mod store {
    use log::trace;

    use super::*;

    /// All dead properties of a resource, values included. A filesystem
    /// without xattr support simply has none.
    pub fn dead_properties(path: &Path) -> Vec<DavProp> {
        let mut props = Vec::new();
        let names = match xattr::list(path) {
            Ok(names) => names,
            Err(_) => return props,
        };
        for name in names {
            let Some(key) = name.to_str().map(str::to_owned) else { continue };
            let Some((namespace, pname)) = key_to_prop(&key) else { continue };
            // a racing removal just drops the entry
            if let Ok(Some(value)) = xattr::get(path, &key) {
                props.push(DavProp {
                    name: pname,
                    namespace,
                    value: Some(value),
                });
            }
        }
        props
    }

    pub fn get_prop(path: &Path, namespace: Option<&str>, name: &str) -> DavResult<Vec<u8>> {
        let key = prop_to_key(namespace, name);
        match xattr::get(path, &key) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(DavError::NotFound),
            Err(e) => Err(DavError::IoError(e)),
        }
    }

    pub fn set_prop(path: &Path, namespace: Option<&str>, name: &str, value: &[u8]) -> DavResult<()> {
        let key = prop_to_key(namespace, name);
        trace!("xattr set {} on {:?}", key, path);
        xattr::set(path, &key, value).map_err(|_| DavError::Forbidden)
    }

    pub fn del_prop(path: &Path, namespace: Option<&str>, name: &str) -> DavResult<()> {
        let key = prop_to_key(namespace, name);
        trace!("xattr remove {} on {:?}", key, path);
        // removing a property that is not there reports success
        if let Ok(None) = xattr::get(path, &key) {
            return Ok(());
        }
        xattr::remove(path, &key).map_err(|_| DavError::Forbidden)
    }
}

#[cfg(not(unix))]
mod store {
    use super::*;

    pub fn dead_properties(_path: &Path) -> Vec<DavProp> {
        Vec::new()
    }

    pub fn get_prop(_path: &Path, _namespace: Option<&str>, _name: &str) -> DavResult<Vec<u8>> {
        Err(DavError::NotFound)
    }

    pub fn set_prop(_path: &Path, _namespace: Option<&str>, _name: &str, _value: &[u8]) -> DavResult<()> {
        Err(DavError::Forbidden)
    }

    pub fn del_prop(_path: &Path, _namespace: Option<&str>, _name: &str) -> DavResult<()> {
        Err(DavError::Forbidden)
    }
}

pub use store::{dead_properties, del_prop, get_prop, set_prop};

/// The executable flag of a resource, where the system has one.
#[cfg(unix)]
pub(crate) fn executable(meta: &std::fs::Metadata) -> Option<bool> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
pub(crate) fn executable(_meta: &std::fs::Metadata) -> Option<bool> {
    None
}

/// Creation time as a unix timestamp. True birth time is not portable,
/// so this is the inode change time where available.
#[cfg(unix)]
pub(crate) fn created_unixtime(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.ctime()
}

#[cfg(not(unix))]
pub(crate) fn created_unixtime(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Apache-style etag from stat.
pub(crate) fn etag(meta: &std::fs::Metadata) -> String {
    if let Ok(t) = meta.modified() {
        if let Ok(t) = t.duration_since(std::time::UNIX_EPOCH) {
            return format!(
                "{:x}-{:x}",
                meta.len(),
                t.as_secs() * 1_000_000 + t.subsec_nanos() as u64 / 1000
            );
        }
    }
    format!("{:x}", meta.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_roundtrip_plain() {
        let key = prop_to_key(None, "color");
        assert_eq!(key, "user.uwsgi.webdav.color");
        assert_eq!(key_to_prop(&key), Some((None, "color".to_string())));
    }

    #[test]
    fn key_roundtrip_namespaced() {
        let key = prop_to_key(Some("http://example.com/ns"), "color");
        assert_eq!(key, "user.uwsgi.webdav.http://example.com/ns|color");
        assert_eq!(
            key_to_prop(&key),
            Some((Some("http://example.com/ns".to_string()), "color".to_string()))
        );
    }

    #[test]
    fn key_roundtrip_separator_in_namespace() {
        let ns = "urn:x|y%z";
        let key = prop_to_key(Some(ns), "color");
        assert_eq!(key_to_prop(&key), Some((Some(ns.to_string()), "color".to_string())));
    }

    #[test]
    fn foreign_keys_ignored() {
        assert_eq!(key_to_prop("user.mime_type"), None);
        assert_eq!(key_to_prop("security.selinux"), None);
    }

    #[cfg(unix)]
    #[test]
    fn xattr_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let f = dir.path().join("f.txt");
        std::fs::write(&f, b"hi").unwrap();

        // not every filesystem carries user xattrs; skip when it doesn't
        if set_prop(&f, Some("X"), "foo", b"bar").is_err() {
            return;
        }
        assert_eq!(get_prop(&f, Some("X"), "foo").unwrap(), b"bar");

        let props = dead_properties(&f);
        assert!(props.iter().any(|p| {
            p.name == "foo" && p.namespace.as_deref() == Some("X") && p.value.as_deref() == Some(b"bar")
        }));

        del_prop(&f, Some("X"), "foo").unwrap();
        assert!(get_prop(&f, Some("X"), "foo").is_err());

        // removing a property that is not there is not an error
        del_prop(&f, Some("X"), "foo").unwrap();
        del_prop(&f, None, "never-set").unwrap();
    }
}
