use std::io;
use std::net;
use std::num::ParseIntError;
use std::string::FromUtf8Error;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    // DNS wire-format errors.
    #[error("insufficient data for base length type")]
    ErrBaseLen,
    #[error("insufficient data for calculated length type")]
    ErrCalcLen,
    #[error("segment prefix is reserved")]
    ErrReserved,
    #[error("too many pointers (>10)")]
    ErrTooManyPtr,
    #[error("invalid pointer")]
    ErrInvalidPtr,
    #[error("name exceeded 255 bytes")]
    ErrNameTooLong,
    #[error("zero length segment")]
    ErrZeroSegLen,
    #[error("segment length too long")]
    ErrSegTooLong,
    #[error("resource length too long")]
    ErrResTooLong,
    #[error("name is not in canonical format (it must end with a .)")]
    ErrNonCanonicalName,
    #[error("insufficient data for resource body length")]
    ErrResourceLen,
    #[error("nil resource body")]
    ErrNilResourceBody,
    #[error("too many Questions to pack (>65535)")]
    ErrTooManyQuestions,
    #[error("too many Answers to pack (>65535)")]
    ErrTooManyAnswers,
    #[error("too many Authorities to pack (>65535)")]
    ErrTooManyAuthorities,
    #[error("too many Additionals to pack (>65535)")]
    ErrTooManyAdditionals,
    #[error("parsing/packing of this section has completed")]
    ErrSectionDone,
    #[error("parsing/packing of this type isn't available yet")]
    ErrNotStarted,

    // mDNS engine errors.
    #[error("use of closed connection")]
    ErrConnectionClosed,
    #[error("host name must not be empty")]
    ErrHostnameEmpty,
    #[error("name must not be empty")]
    ErrNameEmpty,
    #[error("record set must not be empty")]
    ErrEmptyRecordSet,
    #[error("shared records cannot be renamed on conflict")]
    ErrSharedRecordConflict,

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("parse addr: {0}")]
    ParseIp(#[from] net::AddrParseError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

// Workaround for wanting PartialEq for io::Error.
impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}
