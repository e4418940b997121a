use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};

use crate::body::Body;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::mount::Mountpoint;
use crate::DavResult;

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_options(
        &self,
        _req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        let mut res = Response::new(Body::empty());

        let class = if self.locks().is_some() { "1, 2" } else { "1" };
        res.headers_mut().typed_insert(davheaders::Dav(class.to_string()));
        res.headers_mut().typed_insert(headers::ContentLength(0));

        // Advertise what can actually be done with the target.
        let meta = mount.resolve_strict(&path).and_then(|p| Ok(std::fs::metadata(p)?));
        let mut v = vec!["OPTIONS"];
        match meta {
            Err(_) => {
                v.extend(["PUT", "MKCOL"]);
                if self.locks().is_some() {
                    v.push("LOCK");
                }
            }
            Ok(meta) => {
                if !meta.is_dir() {
                    v.extend(["GET", "HEAD", "PUT"]);
                } else {
                    v.extend(["GET", "HEAD"]);
                }
                v.extend(["PROPFIND", "PROPPATCH", "COPY", "MOVE", "DELETE"]);
                if self.locks().is_some() {
                    v.extend(["LOCK", "UNLOCK"]);
                }
            }
        }
        res.headers_mut().insert("allow", v.join(", ").parse().unwrap());

        *res.status_mut() = StatusCode::OK;
        Ok(res)
    }
}
