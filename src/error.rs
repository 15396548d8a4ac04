//! Errors reported by this library

#[cfg(doc)]
use crate::unflatten::DeviceTree;

use crate::priv_util::SliceReadError;
use core::fmt;
use core::result;
use core::str::Utf8Error;

/// An error describing problems met while unflattening or reading a device tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevTreeError {
    /// The blob pointer was null or misaligned.
    InvalidParameter(&'static str),

    /// The magic number FDT_MAGIC was not found at the start of the
    /// structure.
    InvalidMagicNumber,

    /// Unable to safely read data from a property value using the supplied offset.
    InvalidOffset,

    /// The data was not formatted as expected.  This likely indicates an error in the Device Tree
    /// we're parsing.
    ParseError,

    /// While trying to convert a string that was supposed to be ASCII, invalid
    /// `str` sequences were encounter.
    StrError(Utf8Error),

    /// The structure block does not start with a node, so there is nothing to unflatten.
    EmptyTree,

    /// The allocator refused a request made while building a [`DeviceTree`].
    AllocationFailure,

    /// The measuring pass and the populating pass disagreed on the size of the tree.
    SizeMismatch { expected: usize, used: usize },
}

impl DevTreeError {
    /// Returns true for errors which mean the blob could not be recognised as a device tree.
    #[must_use]
    pub fn is_invalid_blob(&self) -> bool {
        matches!(
            self,
            DevTreeError::InvalidParameter(_) | DevTreeError::InvalidMagicNumber
        )
    }
}

impl From<SliceReadError> for DevTreeError {
    fn from(_: SliceReadError) -> DevTreeError {
        DevTreeError::ParseError
    }
}

impl From<Utf8Error> for DevTreeError {
    fn from(e: Utf8Error) -> DevTreeError {
        DevTreeError::StrError(e)
    }
}

/// The result of a parse.
pub type Result<T> = core::result::Result<T, DevTreeError>;

impl fmt::Display for DevTreeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        match *self {
            DevTreeError::InvalidParameter(err) => write!(f, "Invalid parameter supplied: {}", err),
            DevTreeError::InvalidOffset => write!(f, "Invalid offset provided."),

            DevTreeError::InvalidMagicNumber => write!(f, "Device tree contains invalid magic number."),
            DevTreeError::ParseError => write!(f, "Failed to parse device tree. It is invalid."),
            DevTreeError::StrError(utf_err) => write!(f, "Failed to parse device tree string: {}", utf_err),

            DevTreeError::EmptyTree => write!(f, "Device tree contains no nodes."),
            DevTreeError::AllocationFailure => write!(f, "Unable to allocate memory for the device tree."),
            DevTreeError::SizeMismatch { expected, used } => write!(
                f,
                "Device tree construction used {} bytes but {} were measured.",
                used, expected
            ),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DevTreeError {}
