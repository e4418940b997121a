use std::path::Path;

use headers::HeaderMapExt;
use http::{Request, Response, StatusCode};
use log::debug;

use crate::body::Body;
use crate::davheaders;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::handle_delete::delete_items;
use crate::mount::Mountpoint;
use crate::props;
use crate::util::Method;
use crate::DavResult;

// Copy the dead properties along with each copied entry. Best effort:
// a target filesystem without xattrs just loses them.
fn copy_props(from: &Path, to: &Path) {
    for prop in props::dead_properties(from) {
        let Some(value) = prop.value else { continue };
        if props::set_prop(to, prop.namespace.as_deref(), &prop.name, &value).is_err() {
            debug!("copy: dead properties not preserved on {:?}", to);
            return;
        }
    }
}

// Recursive copy. `topdest` guards against copying a collection into
// itself ("COPY /a/ -> /a/b/").
fn do_copy(source: &Path, topdest: &Path, dest: &Path, depth: davheaders::Depth) -> DavResult<()> {
    if source == topdest {
        return Ok(());
    }
    let meta = std::fs::symlink_metadata(source).map_err(|_| DavError::Forbidden)?;

    if !meta.is_dir() {
        std::fs::copy(source, dest).map_err(|_| DavError::Forbidden)?;
        copy_props(source, dest);
        return Ok(());
    }

    // Copying a collection onto an existing collection is not an error.
    if let Err(e) = std::fs::create_dir(dest) {
        if e.kind() != std::io::ErrorKind::AlreadyExists {
            return Err(DavError::Forbidden);
        }
    }
    copy_props(source, dest);

    // only recurse when Depth > 0.
    if depth == davheaders::Depth::Zero {
        return Ok(());
    }

    for entry in std::fs::read_dir(source).map_err(|_| DavError::Forbidden)? {
        let entry = entry.map_err(|_| DavError::Forbidden)?;
        do_copy(&entry.path(), topdest, &dest.join(entry.file_name()), depth)?;
    }
    Ok(())
}

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_copymove(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
        method: Method,
    ) -> DavResult<Response<Body>> {
        // get and check headers.
        let overwrite = req
            .headers()
            .typed_get::<davheaders::Overwrite>()
            .map_or(true, |o| o.0);
        let depth = match req.headers().typed_get::<davheaders::Depth>() {
            Some(davheaders::Depth::Infinity) | None => davheaders::Depth::Infinity,
            Some(davheaders::Depth::Zero) if method == Method::Copy => davheaders::Depth::Zero,
            _ => return Err(StatusCode::BAD_REQUEST.into()),
        };

        // decode and validate destination against the same mount.
        let dst = req
            .headers()
            .typed_get::<davheaders::Destination>()
            .ok_or(DavError::Status(StatusCode::BAD_REQUEST))?;
        let mut dest = DavPath::from_str_and_prefix(&dst.0, mount.prefix())
            .map_err(|_| DavError::Status(StatusCode::BAD_GATEWAY))?;

        // source must exist.
        let mut path = path;
        let source_fs = mount.resolve_strict(&path)?;
        let meta = std::fs::symlink_metadata(&source_fs).map_err(|_| DavError::NotFound)?;
        path.add_slash_if(meta.is_dir());
        dest.add_slash_if(meta.is_dir());

        // parent of the destination must exist.
        let dest_fs = mount.resolve_parent(&dest)?;
        let dest_exists = std::fs::symlink_metadata(&dest_fs).is_ok();

        if dest_exists && !overwrite {
            return Err(DavError::PreconditionFailed);
        }
        if source_fs == dest_fs {
            return Err(DavError::Forbidden);
        }

        debug!("{:?} {} -> {}", method, path, dest);

        if method == Method::Copy {
            // clear the way for a file replacing a collection (and the
            // other way around); fs::copy handles file-onto-file.
            if dest_exists {
                let clash = std::fs::symlink_metadata(&dest_fs)
                    .map(|m| m.is_dir() != meta.is_dir())
                    .unwrap_or(false);
                if clash {
                    delete_items(&dest_fs)?;
                }
            }
            do_copy(&source_fs, &dest_fs, &dest_fs, depth)?;
        } else {
            // MOVE is a single rename; make room first when overwriting.
            if dest_exists {
                delete_items(&dest_fs)?;
            }
            std::fs::rename(&source_fs, &dest_fs).map_err(|_| DavError::Forbidden)?;
            if let Some(lm) = self.locks() {
                lm.forget(&self.lock_uri(req, &path)).await;
            }
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = if dest_exists {
            StatusCode::NO_CONTENT
        } else {
            StatusCode::CREATED
        };
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_recurses_and_skips_self() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("a"), b"1").unwrap();
        std::fs::write(src.join("sub/b"), b"2").unwrap();

        let dst = dir.path().join("dst");
        do_copy(&src, &dst, &dst, davheaders::Depth::Infinity).unwrap();
        assert_eq!(std::fs::read(dst.join("a")).unwrap(), b"1");
        assert_eq!(std::fs::read(dst.join("sub/b")).unwrap(), b"2");
    }

    #[test]
    fn copy_depth_zero_creates_only_the_collection() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir(&src).unwrap();
        std::fs::write(src.join("a"), b"1").unwrap();

        let dst = dir.path().join("dst");
        do_copy(&src, &dst, &dst, davheaders::Depth::Zero).unwrap();
        assert!(dst.is_dir());
        assert!(!dst.join("a").exists());
    }
}
