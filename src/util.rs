use std::cmp::Ordering;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use http::Version;

use crate::errors::DavError;
use crate::DavResult;

/// The WebDAV method set this module serves.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Method {
    Head,
    Get,
    Put,
    Options,
    PropFind,
    PropPatch,
    MkCol,
    Copy,
    Move,
    Delete,
    Lock,
    Unlock,
}

// translate method into our own enum that has webdav methods as well.
pub(crate) fn dav_method(m: &http::Method) -> DavResult<Method> {
    let m = match *m {
        http::Method::HEAD => Method::Head,
        http::Method::GET => Method::Get,
        http::Method::PUT => Method::Put,
        http::Method::DELETE => Method::Delete,
        http::Method::OPTIONS => Method::Options,
        _ => match m.as_str() {
            "PROPFIND" => Method::PropFind,
            "PROPPATCH" => Method::PropPatch,
            "MKCOL" => Method::MkCol,
            "COPY" => Method::Copy,
            "MOVE" => Method::Move,
            "LOCK" => Method::Lock,
            "UNLOCK" => Method::Unlock,
            _ => return Err(DavError::UnknownDavMethod),
        },
    };
    Ok(m)
}

/// The protocol string of the inbound request, echoed verbatim into
/// multistatus status lines.
pub(crate) fn proto_string(v: Version) -> &'static str {
    match v {
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

/// HTTP-date, RFC 7231 7.1.1.1 (IMF-fixdate, always GMT).
pub(crate) fn systemtime_to_httpdate(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// As above, from a raw unix timestamp (what stat reports for ctime).
pub(crate) fn unixtime_to_httpdate(secs: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default();
    dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Version sort, strverscmp style: runs of ASCII digits compare as
/// numbers, everything else compares bytewise. Used for the directory
/// index so "img2" sorts before "img10".
pub(crate) fn version_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let si = i;
            let sj = j;
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let na = a[si..i].iter().fold(0u64, |n, c| n.saturating_mul(10) + (c - b'0') as u64);
            let nb = b[sj..j].iter().fold(0u64, |n, c| n.saturating_mul(10) + (c - b'0') as u64);
            match na.cmp(&nb) {
                Ordering::Equal => {}
                other => return other,
            }
        } else {
            match a[i].cmp(&b[j]) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                }
                other => return other,
            }
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_httpdate() {
        assert_eq!(systemtime_to_httpdate(UNIX_EPOCH), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(unixtime_to_httpdate(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn test_version_cmp() {
        assert_eq!(version_cmp("img2", "img10"), Ordering::Less);
        assert_eq!(version_cmp("img10", "img10"), Ordering::Equal);
        assert_eq!(version_cmp("a", "b"), Ordering::Less);
        assert_eq!(version_cmp("file", "file1"), Ordering::Less);
        assert_eq!(version_cmp("9", "10"), Ordering::Less);
    }

    #[test]
    fn test_dav_method() {
        assert_eq!(dav_method(&http::Method::GET).unwrap(), Method::Get);
        let m = http::Method::from_bytes(b"PROPFIND").unwrap();
        assert_eq!(dav_method(&m).unwrap(), Method::PropFind);
        assert!(dav_method(&http::Method::TRACE).is_err());
    }
}
