//! Typed versions of the WebDAV request/response headers.

use headers::Header;
use http::header::{HeaderMap, HeaderName, HeaderValue};

// helper.
fn one<'i, I>(values: &mut I) -> Result<&'i HeaderValue, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    let v = values.next().ok_or_else(invalid)?;
    if values.next().is_some() {
        Err(invalid())
    } else {
        Ok(v)
    }
}

// helper
fn invalid() -> headers::Error {
    headers::Error::invalid()
}

macro_rules! header {
    ($tname:ident, $hname:ident, $sname:expr) => {
        static $hname: HeaderName = HeaderName::from_static($sname);

        #[derive(Debug, Clone, PartialEq)]
        pub struct $tname(pub String);

        impl Header for $tname {
            fn name() -> &'static HeaderName {
                &$hname
            }

            fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
            where
                I: Iterator<Item = &'i HeaderValue>,
            {
                one(values)?
                    .to_str()
                    .map(|x| $tname(x.to_owned()))
                    .map_err(|_| invalid())
            }

            fn encode<E>(&self, values: &mut E)
            where
                E: Extend<HeaderValue>,
            {
                let value = HeaderValue::from_str(&self.0).unwrap();
                values.extend(std::iter::once(value))
            }
        }
    };
}

header!(Dav, DAV, "dav");
header!(LockToken, LOCK_TOKEN, "lock-token");

static DEPTH: HeaderName = HeaderName::from_static("depth");
static OVERWRITE: HeaderName = HeaderName::from_static("overwrite");
static DESTINATION: HeaderName = HeaderName::from_static("destination");
static TIMEOUT: HeaderName = HeaderName::from_static("timeout");

/// Depth: header.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Header for Depth {
    fn name() -> &'static HeaderName {
        &DEPTH
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"0" => Ok(Depth::Zero),
            b"1" => Ok(Depth::One),
            b"infinity" | b"Infinity" => Ok(Depth::Infinity),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = match *self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Overwrite: header, `T` or `F`.
#[derive(Debug, Clone, PartialEq)]
pub struct Overwrite(pub bool);

impl Header for Overwrite {
    fn name() -> &'static HeaderName {
        &OVERWRITE
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        match one(values)?.as_bytes() {
            b"F" => Ok(Overwrite(false)),
            b"T" => Ok(Overwrite(true)),
            _ => Err(invalid()),
        }
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = if self.0 { "T" } else { "F" };
        values.extend(std::iter::once(HeaderValue::from_static(value)));
    }
}

/// Destination: header, reduced to a request path.
///
/// The header value is an absolute URL; scheme, `://` and host are
/// stripped so the remainder can be resolved against the same mount
/// as the request itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination(pub String);

impl Header for Destination {
    fn name() -> &'static HeaderName {
        &DESTINATION
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let s = one(values)?.to_str().map_err(|_| invalid())?;
        if s.starts_with('/') {
            return Ok(Destination(s.to_string()));
        }
        let url = url::Url::parse(s).map_err(|_| invalid())?;
        if url.cannot_be_a_base() {
            return Err(invalid());
        }
        Ok(Destination(url.path().to_string()))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        values.extend(std::iter::once(HeaderValue::from_str(&self.0).unwrap()));
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DavTimeout {
    Seconds(u32),
    Infinite,
}

/// Timeout: header, a preference list of `Second-N` / `Infinite`.
#[derive(Debug, Clone)]
pub struct Timeout(pub Vec<DavTimeout>);

impl Header for Timeout {
    fn name() -> &'static HeaderName {
        &TIMEOUT
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        let value = one(values)?;
        let mut v = Vec::new();
        for word in value.to_str().map_err(|_| invalid())?.split(',') {
            let word = word.trim();
            let w = match word {
                "Infinite" => DavTimeout::Infinite,
                _ if word.starts_with("Second-") => match word[7..].parse::<u32>() {
                    Err(_) => return Err(invalid()),
                    Ok(n) => DavTimeout::Seconds(n),
                },
                _ => return Err(invalid()),
            };
            v.push(w);
        }
        Ok(Timeout(v))
    }

    fn encode<E>(&self, values: &mut E)
    where
        E: Extend<HeaderValue>,
    {
        let value = self
            .0
            .iter()
            .map(|s| match s {
                DavTimeout::Seconds(n) => format!("Second-{}", n),
                DavTimeout::Infinite => "Infinite".to_string(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        values.extend(std::iter::once(HeaderValue::from_str(&value).unwrap()));
    }
}

/// Pull lock tokens out of an `If:` header.
///
/// Full RFC 4918 `If:` evaluation is a condition language; all this
/// module needs from it is the set of submitted `<urn:uuid:...>` state
/// tokens, so that is all we scrape.
pub(crate) fn if_lock_tokens(headers: &HeaderMap) -> Vec<String> {
    let mut tokens = Vec::new();
    for value in headers.get_all("if") {
        let Ok(s) = value.to_str() else { continue };
        let mut rest = s;
        while let Some(start) = rest.find('<') {
            let Some(end) = rest[start..].find('>') else { break };
            let tok = &rest[start + 1..start + end];
            // resource tags are URLs, state tokens are not
            if !tok.starts_with("http://") && !tok.starts_with("https://") && !tok.starts_with('/') {
                tokens.push(tok.to_string());
            }
            rest = &rest[start + end + 1..];
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use headers::HeaderMapExt;

    #[test]
    fn destination_strips_scheme_and_host() {
        let mut map = HeaderMap::new();
        map.insert("destination", HeaderValue::from_static("http://example.com/dav/b.txt"));
        let d: Destination = map.typed_get().unwrap();
        assert_eq!(d.0, "/dav/b.txt");

        map.insert("destination", HeaderValue::from_static("/dav/c.txt"));
        let d: Destination = map.typed_get().unwrap();
        assert_eq!(d.0, "/dav/c.txt");
    }

    #[test]
    fn timeout_parses_list() {
        let mut map = HeaderMap::new();
        map.insert("timeout", HeaderValue::from_static("Second-3600, Infinite"));
        let t: Timeout = map.typed_get().unwrap();
        assert_eq!(t.0, vec![DavTimeout::Seconds(3600), DavTimeout::Infinite]);
    }

    #[test]
    fn if_header_token_scrape() {
        let mut map = HeaderMap::new();
        map.insert(
            "if",
            HeaderValue::from_static("<http://h/a.txt> (<urn:uuid:1234-5678>)"),
        );
        assert_eq!(if_lock_tokens(&map), vec!["urn:uuid:1234-5678".to_string()]);
    }
}
