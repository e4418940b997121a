use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use log::debug;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::mount::Mountpoint;
use crate::props;
use crate::util::version_cmp;
use crate::DavResult;

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_get(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        let head = req.method() == http::Method::HEAD;
        let fspath = mount.resolve_strict(&path)?;
        let meta = std::fs::metadata(&fspath).map_err(|_| DavError::NotFound)?;

        if meta.is_dir() {
            return self.handle_dirlist(&path, mount, head);
        }

        let file = tokio::fs::File::open(&fspath)
            .await
            .map_err(|_| DavError::Forbidden)?;

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("content-type", path.get_mime_type_str().parse().unwrap());
        res.headers_mut().typed_insert(headers::ContentLength(meta.len()));
        if let Ok(modified) = meta.modified() {
            res.headers_mut().typed_insert(headers::LastModified::from(modified));
        }
        if let Ok(etag) = format!("\"{}\"", props::etag(&meta)).parse::<headers::ETag>() {
            res.headers_mut().typed_insert(etag);
        }
        *res.status_mut() = StatusCode::OK;

        if !head {
            *res.body_mut() = Body::file(file);
        }
        Ok(res)
    }

    // GET on a collection renders an HTML index.
    fn handle_dirlist(&self, path: &DavPath, mount: &Mountpoint, head: bool) -> DavResult<Response<Body>> {
        let fspath = mount.resolve_strict(path)?;

        struct Dirent {
            name: String,
            is_dir: bool,
        }

        let mut dirents: Vec<Dirent> = Vec::new();
        for entry in std::fs::read_dir(&fspath).map_err(|_| DavError::Forbidden)? {
            let Ok(entry) = entry else { continue };
            let Ok(name) = entry.file_name().into_string() else { continue };
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            dirents.push(Dirent { name, is_dir });
        }
        dirents.sort_by(|a, b| version_cmp(&a.name, &b.name));

        let mut res = Response::new(Body::empty());
        res.headers_mut()
            .insert("content-type", "text/html; charset=utf-8".parse().unwrap());
        *res.status_mut() = StatusCode::OK;
        if head {
            return Ok(res);
        }

        let cfg = &self.config;
        let upath = htmlescape::encode_minimal(&path.to_string());
        let mut w = String::new();
        w.push_str("<!DOCTYPE html>\n<html><head>");
        w.push_str(&format!("<title>Index of {}</title>", upath));
        w.push_str(r#"<meta charset="utf-8">"#);
        for css in &cfg.stylesheets {
            w.push_str(&format!(
                r#"<link rel="stylesheet" type="text/css" href="{}">"#,
                htmlescape::encode_attribute(css)
            ));
        }
        for js in &cfg.scripts {
            w.push_str(&format!(
                r#"<script src="{}"></script>"#,
                htmlescape::encode_attribute(js)
            ));
        }
        w.push_str("</head><body>");
        match &cfg.indexer_id {
            Some(id) => w.push_str(&format!(r#"<div id="{}">"#, htmlescape::encode_attribute(id))),
            None => w.push_str("<div>"),
        }
        w.push_str(&format!("<h1>Index of {}</h1>", upath));
        w.push_str("<ul>");
        debug!("dirlist: {} entries under {}", dirents.len(), path);
        for d in &dirents {
            let mut npath = path.clone();
            npath.push_segment(&d.name);
            npath.add_slash_if(d.is_dir);
            let mut name = htmlescape::encode_minimal(&d.name);
            if d.is_dir {
                name.push('/');
            }
            let class = match (&cfg.indexer_class, d.is_dir) {
                (Some(class), true) => format!(r#" class="{}""#, htmlescape::encode_attribute(class)),
                _ => String::new(),
            };
            w.push_str(&format!(
                r#"<li><a{} href="{}">{}</a></li>"#,
                class,
                npath.as_url_string(),
                name
            ));
        }
        w.push_str("</ul></div></body></html>");

        res.headers_mut().typed_insert(headers::ContentLength(w.len() as u64));
        *res.body_mut() = Body::from(w);
        Ok(res)
    }
}
