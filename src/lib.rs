//! A WebDAV server module (RFC 4918 class 1 and 2) that maps named URL
//! mountpoints onto filesystem directories.
//!
//! The handler is transport-agnostic: it consumes an [`http::Request`]
//! with any [`http_body::Body`] and produces an [`http::Response`] with
//! a [`Body`] that implements both `http_body::Body` and `Stream`, so
//! it plugs into hyper, axum, warp and friends without glue.
//!
//! Dead properties (PROPPATCH) are persisted as extended attributes on
//! the resource itself; lock state lives in a shared key/value cache
//! behind the [`LockCache`] trait so every worker sees one lock view.
//!
//! ```no_run
//! use dav_mount::{DavHandler, MemCache, Mountpoint};
//!
//! let dav = DavHandler::builder()
//!     .mountpoint(Mountpoint::new("/", "/srv/dav").unwrap())
//!     .lock_cache(MemCache::new())
//!     .build_handler();
//! // hand `http::Request`s to dav.handle(...)
//! ```

mod body;
mod cache;
mod davhandler;
mod davheaders;
mod davpath;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod locks;
mod mount;
mod multistatus;
mod props;
mod util;
mod xmltree_ext;

pub use crate::body::Body;
pub use crate::cache::{LockCache, MemCache};
pub use crate::davhandler::{DavConfig, DavHandler};
pub use crate::davpath::DavPath;
pub use crate::errors::DavError;
pub use crate::locks::{LockDepth, LockError, LockManager, LockRecord};
pub use crate::mount::Mountpoint;
pub use crate::props::DavProp;
pub use crate::util::Method;

pub(crate) type DavResult<T> = Result<T, DavError>;
