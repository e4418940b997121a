//! The path half of a request URL, decoded and normalised.

use std::path::{Path, PathBuf};

use percent_encoding as pct;

use crate::errors::DavError;

// Encode all non-unreserved characters, except '/'.
// See RFC3986, and https://en.wikipedia.org/wiki/Percent-encoding .
const PATH_ENCODE_SET: &pct::AsciiSet = &pct::NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// A percent-decoded, normalised URL path below a mountpoint prefix.
///
/// `path` always starts with `/` and is relative to the mountpoint;
/// a trailing slash marks a collection. The prefix is carried along so
/// hrefs can be rendered with it put back in front.
#[derive(Clone, PartialEq)]
pub struct DavPath {
    prefix: String,
    path: String,
}

impl std::fmt::Display for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}{}", self.prefix, self.path)
    }
}

impl std::fmt::Debug for DavPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}", self.as_url_string())
    }
}

// make path safe:
// - raw path before decoding can contain only printable ascii
// - make sure path is absolute
// - remove query part (everything after ?)
// - merge consecutive slashes
// - process . and .., fail on underflow
// - decode percent encoded bytes, fail on invalid encodings.
// - do not allow NUL or '/' in segments.
fn normalize_path(rp: &str) -> Result<String, DavError> {
    if rp.bytes().any(|x| !(32..=126).contains(&x)) {
        return Err(DavError::InvalidPath);
    }

    // don't allow fragments. query part gets deleted.
    let mut rawpath = rp;
    if let Some(pos) = rawpath.find(['?', '#']) {
        if rawpath.as_bytes()[pos] == b'#' {
            return Err(DavError::InvalidPath);
        }
        rawpath = &rawpath[..pos];
    }

    if !rawpath.starts_with('/') {
        return Err(DavError::InvalidPath);
    }
    let isdir = rawpath.ends_with('/');

    let mut segs: Vec<String> = Vec::new();
    for segment in rawpath.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segs.pop().is_none() {
                    return Err(DavError::InvalidPath);
                }
            }
            s => {
                let decoded = pct::percent_decode_str(s)
                    .decode_utf8()
                    .map_err(|_| DavError::InvalidPath)?;
                if decoded.bytes().any(|x| x == 0 || x == b'/') {
                    return Err(DavError::InvalidPath);
                }
                // an encoded dot segment must not sneak past the
                // lexical handling above
                if decoded == "." || decoded == ".." {
                    return Err(DavError::InvalidPath);
                }
                segs.push(decoded.into_owned());
            }
        }
    }

    let mut path = String::new();
    for seg in &segs {
        path.push('/');
        path.push_str(seg);
    }
    if isdir || segs.is_empty() {
        path.push('/');
    }
    Ok(path)
}

impl DavPath {
    /// From a URL-encoded path and the matched (non-encoded) mount prefix.
    pub fn from_str_and_prefix(src: &str, prefix: &str) -> Result<DavPath, DavError> {
        let full = normalize_path(src)?;
        let pfx = prefix.trim_end_matches('/');
        let rest = full.strip_prefix(pfx).ok_or(DavError::IllegalPath)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(DavError::IllegalPath);
        }
        let path = if rest.is_empty() { "/".to_string() } else { rest.to_string() };
        Ok(DavPath {
            prefix: pfx.to_string(),
            path,
        })
    }

    /// From a request URI.
    pub fn from_uri(uri: &http::uri::Uri, prefix: &str) -> Result<DavPath, DavError> {
        match uri.path() {
            path if path.starts_with('/') => DavPath::from_str_and_prefix(path, prefix),
            _ => Err(DavError::InvalidPath),
        }
    }

    /// The decoded path relative to the mountpoint, leading `/` included.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The mount prefix this path was matched under.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Is this a collection URL, i.e. does it end in `/`.
    pub fn is_collection(&self) -> bool {
        self.path.ends_with('/')
    }

    /// add a slash to the end of the path (if not already present).
    pub(crate) fn add_slash(&mut self) {
        if !self.is_collection() {
            self.path.push('/');
        }
    }

    pub(crate) fn add_slash_if(&mut self, b: bool) {
        if b {
            self.add_slash();
        }
    }

    /// Add a segment to the end of the path.
    pub(crate) fn push_segment(&mut self, seg: &str) {
        if !self.is_collection() {
            self.path.push('/');
        }
        self.path.push_str(seg);
    }

    /// The parent collection (`/a/b` and `/a/b/` both give `/a/`).
    pub(crate) fn parent(&self) -> DavPath {
        let mut segs: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        segs.pop();
        let mut path = String::new();
        for seg in &segs {
            path.push('/');
            path.push_str(seg);
        }
        path.push('/');
        DavPath {
            prefix: self.prefix.clone(),
            path,
        }
    }

    /// The last segment of the path. Empty for the mount root.
    pub(crate) fn file_name(&self) -> &str {
        self.path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
    }

    /// As URL-encoded string including the mount prefix, for hrefs.
    pub fn as_url_string(&self) -> String {
        let mut s = pct::percent_encode(self.prefix.as_bytes(), PATH_ENCODE_SET).to_string();
        s.push_str(&pct::percent_encode(self.path.as_bytes(), PATH_ENCODE_SET).to_string());
        s
    }

    /// As a relative OS path, for joining onto a docroot. Never starts
    /// or ends with a separator.
    pub(crate) fn as_rel_ospath(&self) -> &Path {
        Path::new(self.path.trim_matches('/'))
    }

    /// Split into the parent collection and the final segment.
    pub(crate) fn parent_and_leaf(&self) -> (DavPath, &str) {
        (self.parent(), self.file_name())
    }

    /// Join onto a docroot directory.
    pub(crate) fn fspath(&self, docroot: &Path) -> PathBuf {
        docroot.join(self.as_rel_ospath())
    }

    pub(crate) fn get_mime_type_str(&self) -> &'static str {
        let name = self.file_name();
        match name.rsplit_once('.') {
            Some((_, ext)) => mime_guess::from_ext(ext)
                .first_raw()
                .unwrap_or("application/octet-stream"),
            None => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dots_and_slashes() {
        assert_eq!(normalize_path("/a//b/./c/../d").unwrap(), "/a/b/d");
        assert_eq!(normalize_path("/a/b/").unwrap(), "/a/b/");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/a/..").unwrap(), "/");
    }

    #[test]
    fn rejects_escapes_and_garbage() {
        assert!(normalize_path("/..").is_err());
        assert!(normalize_path("/a/../../b").is_err());
        assert!(normalize_path("relative").is_err());
        assert!(normalize_path("/a#frag").is_err());
        assert!(normalize_path("/a%00b").is_err());
        assert!(normalize_path("/a%2Fb").is_err());
        assert!(normalize_path("/%2e%2e/x").is_err());
        assert!(normalize_path("/a/%2e").is_err());
    }

    #[test]
    fn decodes_segments() {
        assert_eq!(normalize_path("/hello%20world").unwrap(), "/hello world");
        // query part is dropped
        assert_eq!(normalize_path("/a?b=c").unwrap(), "/a");
    }

    #[test]
    fn prefix_handling() {
        let p = DavPath::from_str_and_prefix("/dav/a/b.txt", "/dav").unwrap();
        assert_eq!(p.as_str(), "/a/b.txt");
        assert_eq!(p.prefix(), "/dav");
        assert_eq!(p.as_url_string(), "/dav/a/b.txt");
        assert_eq!(p.file_name(), "b.txt");
        assert_eq!(p.parent().as_str(), "/a/");

        let root = DavPath::from_str_and_prefix("/dav", "/dav").unwrap();
        assert_eq!(root.as_str(), "/");
        assert!(root.is_collection());

        assert!(DavPath::from_str_and_prefix("/other/a", "/dav").is_err());
        assert!(DavPath::from_str_and_prefix("/davx/a", "/dav").is_err());
    }

    #[test]
    fn href_encoding() {
        let p = DavPath::from_str_and_prefix("/a%20b/c", "/").unwrap();
        assert_eq!(p.as_url_string(), "/a%20b/c");
    }

    #[test]
    fn push_and_slash() {
        let mut p = DavPath::from_str_and_prefix("/d/", "/").unwrap();
        p.push_segment("x");
        assert_eq!(p.as_str(), "/d/x");
        p.add_slash();
        assert_eq!(p.as_str(), "/d/x/");
    }
}
