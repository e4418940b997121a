use std::path::Path;

use http::{Request, Response, StatusCode};
use log::debug;

use crate::body::Body;
use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::mount::Mountpoint;
use crate::DavResult;

// Depth-first removal of a subtree. Works on symlink_metadata so a
// symlink is unlinked, never followed out of the tree. The first
// failure aborts the walk.
pub(crate) fn delete_items(fspath: &Path) -> DavResult<()> {
    let meta = std::fs::symlink_metadata(fspath).map_err(|_| DavError::Forbidden)?;
    if !meta.is_dir() {
        debug!("delete_items (file) {:?}", fspath);
        return std::fs::remove_file(fspath).map_err(|_| DavError::Forbidden);
    }

    debug!("delete_items (recurse) {:?}", fspath);
    for entry in std::fs::read_dir(fspath).map_err(|_| DavError::Forbidden)? {
        let entry = entry.map_err(|_| DavError::Forbidden)?;
        delete_items(&entry.path())?;
    }
    std::fs::remove_dir(fspath).map_err(|_| DavError::Forbidden)
}

impl crate::davhandler::DavInner {
    pub(crate) async fn handle_delete(
        &self,
        req: &Request<()>,
        mount: &Mountpoint,
        path: DavPath,
    ) -> DavResult<Response<Body>> {
        let mut path = path;
        let fspath = mount.resolve_strict(&path)?;
        if fspath.is_dir() {
            path.add_slash();
        }

        delete_items(&fspath)?;

        // the resource is gone, any lock on it goes too.
        if let Some(lm) = self.locks() {
            lm.forget(&self.lock_uri(req, &path)).await;
        }

        let mut res = Response::new(Body::empty());
        *res.status_mut() = StatusCode::OK;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_subtree_depth_first() {
        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("d");
        std::fs::create_dir_all(d.join("sub")).unwrap();
        std::fs::write(d.join("a"), b"1").unwrap();
        std::fs::write(d.join("sub/b"), b"2").unwrap();

        delete_items(&d).unwrap();
        assert!(!d.exists());
    }

    #[cfg(unix)]
    #[test]
    fn unlinks_symlinks_without_following() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("keep"), b"k").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let d = dir.path().join("d");
        std::fs::create_dir(&d).unwrap();
        std::os::unix::fs::symlink(outside.path(), d.join("link")).unwrap();

        delete_items(&d).unwrap();
        assert!(!d.exists());
        assert!(outside.path().join("keep").exists());
    }
}
