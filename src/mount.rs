//! Mountpoints: URL prefixes bound to docroot directories, and the
//! translation of request paths into safe filesystem paths.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::davpath::DavPath;
use crate::errors::DavError;
use crate::DavResult;

/// A URL prefix mapped onto a canonical docroot directory.
///
/// Built once at startup and immutable afterwards. Every path handed
/// out by the resolvers is equal to the docroot or a descendant of it;
/// anything else (dot-dot tricks, symlinks pointing out of the tree)
/// resolves to NotFound.
#[derive(Debug, Clone)]
pub struct Mountpoint {
    prefix: String,
    docroot: PathBuf,
}

impl Mountpoint {
    /// Bind `prefix` to `dir`. The directory is canonicalised here, so
    /// it must exist; the prefix is reduced to `/name` form (`/` for
    /// the root mount).
    pub fn new(prefix: impl Into<String>, dir: impl AsRef<Path>) -> io::Result<Mountpoint> {
        let docroot = std::fs::canonicalize(dir.as_ref())?;
        if !docroot.is_dir() {
            return Err(io::Error::new(io::ErrorKind::NotADirectory, "docroot is not a directory"));
        }
        let mut prefix = prefix.into();
        if !prefix.starts_with('/') {
            prefix.insert(0, '/');
        }
        while prefix.len() > 1 && prefix.ends_with('/') {
            prefix.pop();
        }
        Ok(Mountpoint { prefix, docroot })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn docroot(&self) -> &Path {
        &self.docroot
    }

    // Does this mount serve the given (decoded, normalised) URL path?
    pub(crate) fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return true;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    // Is `real` the docroot itself or a descendant of it?
    fn contains(&self, real: &Path) -> bool {
        real == self.docroot || real.starts_with(&self.docroot)
    }

    /// Resolve a request path to an existing filesystem path.
    ///
    /// Canonicalises (resolving symlinks on the way) and refuses any
    /// result outside the docroot. A missing component and an escape
    /// both come back as NotFound.
    pub fn resolve_strict(&self, path: &DavPath) -> DavResult<PathBuf> {
        let fspath = path.fspath(&self.docroot);
        let real = std::fs::canonicalize(&fspath).map_err(|_| DavError::NotFound)?;
        if !self.contains(&real) {
            debug!("resolve_strict: {:?} escapes {:?}", real, self.docroot);
            return Err(DavError::NotFound);
        }
        Ok(real)
    }

    /// Resolve a request path whose leaf need not exist, for creation
    /// methods. The parent collection is resolved strictly and the
    /// final segment appended literally; a missing parent (or a path
    /// with no final segment) is a Conflict.
    pub fn resolve_parent(&self, path: &DavPath) -> DavResult<PathBuf> {
        let (parent, leaf) = path.parent_and_leaf();
        if leaf.is_empty() {
            return Err(DavError::Conflict);
        }
        let mut real = self.resolve_strict(&parent).map_err(|_| DavError::Conflict)?;
        if !real.is_dir() {
            return Err(DavError::Conflict);
        }
        real.push(leaf);
        Ok(real)
    }
}

/// Find the mountpoint serving a URL path. Longest prefix wins.
pub(crate) fn find_mount<'a>(mounts: &'a [Mountpoint], path: &str) -> Option<&'a Mountpoint> {
    mounts
        .iter()
        .filter(|m| m.matches(path))
        .max_by_key(|m| m.prefix.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkpath(path: &str) -> DavPath {
        DavPath::from_str_and_prefix(path, "/").unwrap()
    }

    #[test]
    fn strict_resolves_inside_docroot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/f.txt"), b"x").unwrap();
        let m = Mountpoint::new("/", dir.path()).unwrap();

        let real = m.resolve_strict(&mkpath("/sub/f.txt")).unwrap();
        assert!(real.starts_with(m.docroot()));
        assert_eq!(real.file_name().unwrap(), "f.txt");

        assert!(matches!(m.resolve_strict(&mkpath("/nope")), Err(DavError::NotFound)));
    }

    #[cfg(unix)]
    #[test]
    fn strict_refuses_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret"), b"s").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let m = Mountpoint::new("/", dir.path()).unwrap();

        assert!(matches!(m.resolve_strict(&mkpath("/link")), Err(DavError::NotFound)));
        assert!(matches!(m.resolve_strict(&mkpath("/link/secret")), Err(DavError::NotFound)));
    }

    #[test]
    fn parent_parity_with_strict() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        let m = Mountpoint::new("/", dir.path()).unwrap();

        // existing leaf: both resolvers agree
        let p = mkpath("/a.txt");
        assert_eq!(m.resolve_strict(&p).unwrap(), m.resolve_parent(&p).unwrap());

        // missing leaf: only the parent resolver succeeds
        let p = mkpath("/b.txt");
        assert!(m.resolve_strict(&p).is_err());
        assert_eq!(m.resolve_parent(&p).unwrap(), m.docroot().join("b.txt"));

        // missing parent is a conflict
        assert!(matches!(m.resolve_parent(&mkpath("/no/dir/b.txt")), Err(DavError::Conflict)));

        // the mount root has no leaf to create
        assert!(matches!(m.resolve_parent(&mkpath("/")), Err(DavError::Conflict)));
    }

    #[test]
    fn prefix_matching() {
        let dir = tempfile::tempdir().unwrap();
        let m1 = Mountpoint::new("/", dir.path()).unwrap();
        let m2 = Mountpoint::new("/dav", dir.path()).unwrap();
        let mounts = vec![m1, m2];

        assert_eq!(find_mount(&mounts, "/dav/x").unwrap().prefix(), "/dav");
        assert_eq!(find_mount(&mounts, "/dav").unwrap().prefix(), "/dav");
        assert_eq!(find_mount(&mounts, "/davx").unwrap().prefix(), "/");
        assert_eq!(find_mount(&mounts, "/other").unwrap().prefix(), "/");
        assert!(find_mount(&mounts[1..], "/other").is_none());
    }
}
