use std::pin::pin;

use bytes::Buf;
use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use log::{debug, error};
use tokio::io::AsyncWriteExt;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::mount::Mountpoint;
use crate::props;
use crate::DavResult;

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_put<ReqBody>(
        &self,
        _req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
        body: ReqBody,
    ) -> DavResult<Response<Body>>
    where
        ReqBody: http_body::Body + Send,
        ReqBody::Data: Send,
        ReqBody::Error: std::error::Error + Send + Sync + 'static,
    {
        if path.is_collection() {
            return Err(DavError::Conflict);
        }

        // parent must exist; the leaf need not.
        let fspath = mount.resolve_parent(&path)?;
        debug!("PUT {} -> {:?}", path, fspath);

        let mut file = tokio::fs::File::create(&fspath)
            .await
            .map_err(|_| DavError::Forbidden)?;

        // loop, read body, write to file. After a failure mid-stream
        // the partial file stays; the client is expected to retry.
        let mut body = pin!(body);
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| {
                error!("PUT {}: body read error: {}", path, e);
                DavError::StatusClose(StatusCode::BAD_REQUEST)
            })?;
            let Ok(mut buf) = frame.into_data() else { continue };
            while buf.has_remaining() {
                let chunk = buf.chunk();
                let n = chunk.len();
                file.write_all(chunk)
                    .await
                    .map_err(|_| DavError::StatusClose(StatusCode::FORBIDDEN))?;
                buf.advance(n);
            }
        }
        file.flush()
            .await
            .map_err(|_| DavError::StatusClose(StatusCode::FORBIDDEN))?;

        let mut res = Response::new(Body::empty());
        res.headers_mut().typed_insert(headers::ContentLength(0));
        if let Ok(meta) = std::fs::metadata(&fspath) {
            if let Ok(etag) = format!("\"{}\"", props::etag(&meta)).parse::<headers::ETag>() {
                res.headers_mut().typed_insert(etag);
            }
            if let Ok(modified) = meta.modified() {
                res.headers_mut().typed_insert(headers::LastModified::from(modified));
            }
        }
        *res.status_mut() = StatusCode::CREATED;
        Ok(res)
    }
}
