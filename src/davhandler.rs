//
// This module contains the main entry point of the library,
// DavHandler.
//
use std::io;
use std::pin::pin;
use std::sync::Arc;

use bytes::Buf;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use log::debug;

use crate::body::Body;
use crate::cache::LockCache;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::locks::LockManager;
use crate::mount::{find_mount, Mountpoint};
use crate::util::{dav_method, Method};
use crate::DavResult;

// Pre-read bodies (PROPFIND, PROPPATCH, LOCK) are capped at this size;
// anything bigger is not a sane property/lock document.
const MAX_XML_BODY: usize = 65536;

/// The webdav handler struct.
///
/// Build one with `DavHandler::builder()`, configure at least one
/// mountpoint, then call `handle` per request.
#[derive(Clone)]
pub struct DavHandler {
    config: Arc<DavConfig>,
}

/// Configuration of the handler.
#[derive(Default)]
pub struct DavConfig {
    /// URL prefixes mapped onto docroot directories.
    pub(crate) mountpoints: Vec<Mountpoint>,
    /// Stylesheet URLs linked from the directory index.
    pub(crate) stylesheets: Vec<String>,
    /// Script URLs linked from the directory index.
    pub(crate) scripts: Vec<String>,
    /// `id` of the element wrapping the directory index.
    pub(crate) indexer_id: Option<String>,
    /// CSS class put on directory entries in the index.
    pub(crate) indexer_class: Option<String>,
    /// Lock registry; without one LOCK/UNLOCK answer 405.
    pub(crate) locks: Option<LockManager>,
}

impl DavConfig {
    /// Create a new configuration builder.
    pub fn new() -> DavConfig {
        DavConfig::default()
    }

    /// Use the configuration that was built to generate a DavHandler.
    pub fn build_handler(self) -> DavHandler {
        DavHandler {
            config: Arc::new(self),
        }
    }

    /// Serve `mountpoint` (may be called multiple times).
    pub fn mountpoint(mut self, mountpoint: Mountpoint) -> Self {
        self.mountpoints.push(mountpoint);
        self
    }

    /// Stylesheet URLs for the directory index.
    pub fn stylesheets(mut self, urls: Vec<String>) -> Self {
        self.stylesheets = urls;
        self
    }

    /// Script URLs for the directory index.
    pub fn scripts(mut self, urls: Vec<String>) -> Self {
        self.scripts = urls;
        self
    }

    /// `id` attribute of the element wrapping the directory index.
    pub fn indexer_id(mut self, id: impl Into<String>) -> Self {
        self.indexer_id = Some(id.into());
        self
    }

    /// CSS class for directory entries in the index.
    pub fn indexer_class(mut self, class: impl Into<String>) -> Self {
        self.indexer_class = Some(class.into());
        self
    }

    /// Back lock state with the given shared cache.
    pub fn lock_cache(mut self, cache: Arc<dyn LockCache>) -> Self {
        self.locks = Some(LockManager::new(cache));
        self
    }
}

// The actual inner struct, one per request.
pub(crate) struct DavInner {
    pub(crate) config: Arc<DavConfig>,
}

impl DavHandler {
    /// Return a configuration builder.
    pub fn builder() -> DavConfig {
        DavConfig::new()
    }

    /// Handle a webdav request.
    ///
    /// Per-request errors never bubble out of here; they are rendered
    /// as responses with the matching status code.
    pub async fn handle<ReqBody>(&self, req: Request<ReqBody>) -> io::Result<Response<Body>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Send,
        ReqBody::Error: std::error::Error + Send + Sync + 'static,
    {
        let inner = DavInner {
            config: self.config.clone(),
        };
        inner.handle(req).await
    }
}

impl DavInner {
    pub(crate) fn locks(&self) -> Option<&LockManager> {
        self.config.locks.as_ref()
    }

    // The fully qualified URI a lock on this path is keyed by.
    pub(crate) fn lock_uri(&self, req: &Request<()>, path: &DavPath) -> String {
        let scheme = req.uri().scheme_str().unwrap_or("http");
        let host = req
            .uri()
            .authority()
            .map(|a| a.as_str())
            .or_else(|| req.headers().get("host").and_then(|h| h.to_str().ok()))
            .unwrap_or("localhost");
        format!("{}://{}{}", scheme, host, path.as_url_string())
    }

    // collect a pre-read body, bounded.
    pub(crate) async fn read_request<ReqBody>(&self, body: ReqBody, max_size: usize) -> DavResult<Vec<u8>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Error: std::error::Error + Send + Sync + 'static,
    {
        let mut data = Vec::new();
        let mut body = pin!(body);
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|_| DavError::XmlReadError)?;
            if let Ok(buf) = frame.into_data() {
                if data.len() + buf.remaining() > max_size {
                    return Err(StatusCode::PAYLOAD_TOO_LARGE.into());
                }
                put_buf(&mut data, buf);
            }
        }
        Ok(data)
    }

    // dispatcher; renders DavError results as responses.
    async fn handle<ReqBody>(self, req: Request<ReqBody>) -> io::Result<Response<Body>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Send,
        ReqBody::Error: std::error::Error + Send + Sync + 'static,
    {
        let (parts, body) = req.into_parts();
        let req = Request::from_parts(parts, ());

        match self.handle2(&req, body).await {
            Ok(resp) => {
                debug!("== END REQUEST result {}", resp.status());
                Ok(resp)
            }
            Err(err) => {
                debug!("== END REQUEST result {:?}", err);
                let mut resp = Response::builder()
                    .status(err.statuscode())
                    .header("content-length", "0");
                if err.must_close() {
                    resp = resp.header("connection", "close");
                }
                Ok(resp.body(Body::empty()).unwrap())
            }
        }
    }

    // dispatcher part 2: everything that can fail with a DavError.
    async fn handle2<ReqBody>(self, req: &Request<()>, body: ReqBody) -> DavResult<Response<Body>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Send,
        ReqBody::Error: std::error::Error + Send + Sync + 'static,
    {
        // translate HTTP method to Webdav method.
        let method = match dav_method(req.method()) {
            Ok(m) => m,
            Err(e) => {
                debug!("refusing method {} request {}", req.method(), req.uri());
                return Err(e);
            }
        };

        // a handler without mountpoints is unusable.
        if self.config.mountpoints.is_empty() {
            return Err(DavError::NoMountpoints);
        }

        // make sure the request path is valid and find the mountpoint
        // serving it.
        let raw = DavPath::from_str_and_prefix(req.uri().path(), "/")?;
        let mount = find_mount(&self.config.mountpoints, raw.as_str())
            .ok_or(DavError::IllegalPath)?
            .clone();
        let path = DavPath::from_uri(req.uri(), mount.prefix())?;

        // PUT is the only handler that streams the body itself. All the
        // other handlers either expect no body, or a pre-read Vec<u8>.
        let (body_strm, body_data) = match method {
            Method::Put => (Some(body), Vec::new()),
            _ => (None, self.read_request(body, MAX_XML_BODY).await?),
        };

        // Not all methods accept a body.
        match method {
            Method::Put | Method::PropFind | Method::PropPatch | Method::Lock => {}
            _ => {
                if !body_data.is_empty() {
                    return Err(DavError::UnsupportedMediaType);
                }
            }
        }

        debug!("== START REQUEST {:?} {}", method, path);

        match method {
            Method::Options => self.handle_options(req, &mount, path).await,
            Method::Head | Method::Get => self.handle_get(req, &mount, path).await,
            Method::Put => self.handle_put(req, &mount, path, body_strm.unwrap()).await,
            Method::Delete => self.handle_delete(req, &mount, path).await,
            Method::MkCol => self.handle_mkcol(req, &mount, path).await,
            Method::Copy | Method::Move => self.handle_copymove(req, &mount, path, method).await,
            Method::PropFind => self.handle_propfind(req, &mount, path, &body_data).await,
            Method::PropPatch => self.handle_proppatch(req, &mount, path, &body_data).await,
            Method::Lock => self.handle_lock(req, &mount, path, &body_data).await,
            Method::Unlock => self.handle_unlock(req, &mount, path).await,
        }
    }
}

// append a Buf to a Vec.
fn put_buf(data: &mut Vec<u8>, mut buf: impl bytes::Buf) {
    while buf.has_remaining() {
        let chunk = buf.chunk();
        data.extend_from_slice(chunk);
        let n = chunk.len();
        buf.advance(n);
    }
}
