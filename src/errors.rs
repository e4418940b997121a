use std::error::Error;
use std::io::ErrorKind;

use http::StatusCode;

/// Errors a handler can run into while servicing a request.
///
/// Everything here maps onto a client-visible status code via
/// `statuscode()`; only `StatusClose` additionally forces the
/// connection shut (the status line may already be on the wire).
#[derive(Debug)]
pub enum DavError {
    /// Target (or an intermediate path component) does not exist.
    NotFound,
    /// Parent collection of the target does not exist.
    Conflict,
    /// Filesystem refused the operation.
    Forbidden,
    /// Method cannot apply to the target (e.g. MKCOL on an existing resource).
    MethodNotAllowed,
    /// `Overwrite: F` with an existing destination.
    PreconditionFailed,
    /// Body supplied where none is defined (e.g. MKCOL).
    UnsupportedMediaType,
    /// An unexpired lock with a different token covers the URI.
    Locked,
    /// Module unusable: no mountpoint table at request time.
    NoMountpoints,
    /// Method is not part of the WebDAV set we serve.
    UnknownDavMethod,
    /// Request path failed to parse or decode.
    InvalidPath,
    /// Request path is outside every configured mountpoint.
    IllegalPath,
    /// Request body was not the XML document the method requires.
    XmlParseError,
    /// Could not read the request body at all.
    XmlReadError,
    Status(StatusCode),
    /// Like `Status`, but the connection must be closed afterwards.
    StatusClose(StatusCode),
    IoError(std::io::Error),
    XmlReaderError(xml::reader::Error),
    XmlWriterError(xml::writer::Error),
}

impl std::fmt::Display for DavError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            DavError::XmlReaderError(_) => write!(f, "XML parse error"),
            DavError::XmlWriterError(_) => write!(f, "XML generate error"),
            DavError::IoError(_) => write!(f, "I/O error"),
            _ => write!(f, "{:?}", self),
        }
    }
}

impl Error for DavError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DavError::IoError(e) => Some(e),
            DavError::XmlReaderError(e) => Some(e),
            DavError::XmlWriterError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DavError {
    fn from(e: std::io::Error) -> Self {
        DavError::IoError(e)
    }
}

impl From<xml::reader::Error> for DavError {
    fn from(e: xml::reader::Error) -> Self {
        DavError::XmlReaderError(e)
    }
}

impl From<xml::writer::Error> for DavError {
    fn from(e: xml::writer::Error) -> Self {
        DavError::XmlWriterError(e)
    }
}

impl From<StatusCode> for DavError {
    fn from(sc: StatusCode) -> Self {
        DavError::Status(sc)
    }
}

fn ioerror_to_status(ioerror: &std::io::Error) -> StatusCode {
    match ioerror.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::FORBIDDEN,
    }
}

impl DavError {
    pub(crate) fn statuscode(&self) -> StatusCode {
        match self {
            DavError::NotFound => StatusCode::NOT_FOUND,
            DavError::Conflict => StatusCode::CONFLICT,
            DavError::Forbidden => StatusCode::FORBIDDEN,
            DavError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            DavError::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
            DavError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            DavError::Locked => StatusCode::LOCKED,
            DavError::NoMountpoints => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::UnknownDavMethod => StatusCode::NOT_IMPLEMENTED,
            DavError::InvalidPath => StatusCode::BAD_REQUEST,
            DavError::IllegalPath => StatusCode::NOT_FOUND,
            DavError::XmlParseError => StatusCode::BAD_REQUEST,
            DavError::XmlReadError => StatusCode::BAD_REQUEST,
            DavError::Status(e) => *e,
            DavError::StatusClose(e) => *e,
            DavError::IoError(e) => ioerror_to_status(e),
            DavError::XmlReaderError(_) => StatusCode::BAD_REQUEST,
            DavError::XmlWriterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub(crate) fn must_close(&self) -> bool {
        matches!(self, DavError::StatusClose(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(DavError::Locked.statuscode(), StatusCode::LOCKED);
        assert_eq!(DavError::Conflict.statuscode(), StatusCode::CONFLICT);
        assert_eq!(DavError::NoMountpoints.statuscode(), StatusCode::INTERNAL_SERVER_ERROR);
        let io = std::io::Error::from(ErrorKind::PermissionDenied);
        assert_eq!(DavError::IoError(io).statuscode(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn close_only_on_statusclose() {
        assert!(DavError::StatusClose(StatusCode::FORBIDDEN).must_close());
        assert!(!DavError::Status(StatusCode::FORBIDDEN).must_close());
    }
}
