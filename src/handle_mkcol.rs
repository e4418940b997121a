use http::{Request, Response, StatusCode};
use log::debug;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::mount::Mountpoint;
use crate::DavResult;

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_mkcol(
        &self,
        _req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        // RFC 4918 9.3.1 MKCOL status codes: an existing resource is
        // 405, a missing parent 409. The body check (415) already
        // happened in the dispatcher.
        if mount.resolve_strict(&path).is_ok() {
            return Err(DavError::MethodNotAllowed);
        }
        let fspath = mount.resolve_parent(&path)?;

        debug!("MKCOL {} -> {:?}", path, fspath);
        std::fs::create_dir(&fspath).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => DavError::MethodNotAllowed,
            std::io::ErrorKind::NotFound => DavError::Conflict,
            _ => DavError::Forbidden,
        })?;

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
