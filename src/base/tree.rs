#[cfg(doc)]
use crate::base::parse::ParsedTok;

use core::mem::size_of;
use core::slice;

use crate::error::{DevTreeError, Result};

use crate::priv_util::SliceRead;
use crate::spec::{fdt_header, FDT_FIRST_MODERN_VERSION, FDT_MAGIC};

use super::parse::DevTreeParseIter;

const fn is_aligned<T>(offset: usize) -> bool {
    offset % size_of::<T>() == 0
}

const fn verify_offset_aligned<T>(offset: usize) -> Result<usize> {
    let i: [Result<usize>; 2] = [Err(DevTreeError::ParseError), Ok(offset)];
    i[is_aligned::<T>(offset) as usize]
}

macro_rules! get_be32_field {
    ( $f:ident, $s:ident , $buf:expr ) => {
        $buf.read_be_u32(offset_of!($s, $f))
    };
}

/// A read-only view over a Flattened Device Tree blob.
///
/// Only the header is interpreted on construction. The structure block is tokenized on demand
/// by [`DevTree::parse_iter`].
#[derive(Copy, Clone, Debug)]
pub struct DevTree<'dt> {
    buf: &'dt [u8],
}

impl<'dt> PartialEq for DevTree<'dt> {
    fn eq(&self, other: &Self) -> bool {
        self.buf as *const [u8] == other.buf as *const [u8]
    }
}

impl<'dt> DevTree<'dt> {
    pub const MIN_HEADER_SIZE: usize = size_of::<fdt_header>();

    /// Verify the magic header of a Device Tree buffer
    #[inline]
    pub fn verify_magic(buf: &[u8]) -> Result<()> {
        // A buffer too short to hold the magic is no device tree either.
        match get_be32_field!(magic, fdt_header, buf) {
            Ok(FDT_MAGIC) => Ok(()),
            _ => Err(DevTreeError::InvalidMagicNumber),
        }
    }

    /// Using the provided byte slice this method will:
    ///
    /// 1. Verify that the slice is 32-bit aligned
    /// 2. Verify that the slice begins with the magic Device Tree header
    /// 3. Return the reported `totalsize` field of the Device Tree header
    ///
    /// The buffer must be at least [`Self::MIN_HEADER_SIZE`] long.
    #[inline]
    pub fn read_totalsize(buf: &[u8]) -> Result<usize> {
        Self::verify_magic(buf)?;
        verify_offset_aligned::<u32>(buf.as_ptr() as usize)
            .map_err(|_| DevTreeError::InvalidParameter("Unaligned buffer provided"))?;

        match get_be32_field!(totalsize, fdt_header, buf)? as usize {
            size if size < Self::MIN_HEADER_SIZE => Err(DevTreeError::ParseError),
            size => Ok(size),
        }
    }

    fn from_safe_slice(buf: &'dt [u8]) -> Result<Self> {
        let ret = Self { buf };
        // Verify required alignment before returning.
        verify_offset_aligned::<u32>(ret.off_dt_struct())?;
        if ret.off_dt_struct() >= buf.len() || ret.off_dt_strings() > buf.len() {
            return Err(DevTreeError::ParseError);
        }
        Ok(ret)
    }

    /// Construct the parseable DevTree object from the provided byte slice.
    ///
    /// The slice may be longer than the blob; it is cut down to the header's `totalsize`.
    #[inline]
    pub fn new(buf: &'dt [u8]) -> Result<Self> {
        let totalsize = Self::read_totalsize(buf)?;
        match buf.get(..totalsize) {
            Some(buf) => Self::from_safe_slice(buf),
            None => Err(DevTreeError::ParseError),
        }
    }

    /// Construct the parseable DevTree object from a raw byte pointer
    ///
    /// # Safety
    ///
    /// Callers of this method the must guarantee the following:
    ///
    /// - The passed address is null or points to at least [`Self::MIN_HEADER_SIZE`] readable bytes.
    /// - If the header is valid, `totalsize` bytes are readable from the address for `'dt`.
    #[inline]
    pub unsafe fn from_raw_pointer(addr: *const u8) -> Result<Self> {
        if addr.is_null() {
            return Err(DevTreeError::InvalidParameter("Null device tree pointer"));
        }
        let buf: &[u8] = slice::from_raw_parts(addr, Self::MIN_HEADER_SIZE);
        let buf_size = Self::read_totalsize(buf)?;
        let buf: &[u8] = slice::from_raw_parts(addr, buf_size);

        Self::from_safe_slice(buf)
    }

    fn field(&self, off: usize) -> u32 {
        // The header was bounds checked on construction.
        self.buf.read_be_u32(off).unwrap_or_default()
    }

    /// Returns the totalsize field of the Device Tree. This is the number of bytes of the device
    /// tree structure.
    #[inline]
    #[must_use]
    pub fn totalsize(&self) -> usize {
        self.field(offset_of!(fdt_header, totalsize)) as usize
    }

    /// Returns the dt_struct offset field of the Device Tree
    #[inline]
    #[must_use]
    pub fn off_dt_struct(&self) -> usize {
        self.field(offset_of!(fdt_header, off_dt_struct)) as usize
    }

    /// Returns the dt_strings offset field of the Device Tree
    #[inline]
    #[must_use]
    pub fn off_dt_strings(&self) -> usize {
        self.field(offset_of!(fdt_header, off_dt_strings)) as usize
    }

    /// Returns the magic field of the Device Tree
    #[inline]
    #[must_use]
    pub fn magic(&self) -> u32 {
        self.field(offset_of!(fdt_header, magic))
    }

    /// Returns the version field of the Device Tree
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.field(offset_of!(fdt_header, version))
    }

    /// Returns the last_comp_version field of the Device Tree
    #[inline]
    #[must_use]
    pub fn last_comp_version(&self) -> u32 {
        self.field(offset_of!(fdt_header, last_comp_version))
    }

    /// Returns the boot_cpuid_phys field of the Device Tree
    #[inline]
    #[must_use]
    pub fn boot_cpuid_phys(&self) -> u32 {
        self.field(offset_of!(fdt_header, boot_cpuid_phys))
    }

    /// Blobs older than version 16 store full paths as node names and 8-byte align long property
    /// values.
    #[inline]
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.version() < FDT_FIRST_MODERN_VERSION
    }

    /// Returns the name stored at `nameoff` in the strings block, without its NUL.
    pub fn string_at(&self, nameoff: usize) -> Result<&'dt [u8]> {
        let off = self
            .off_dt_strings()
            .checked_add(nameoff)
            .ok_or(DevTreeError::ParseError)?;
        Ok(self.buf.read_bstring0(off)?)
    }

    /// Returns an iterator over low level parsing tokens, [`ParsedTok`].
    #[must_use]
    pub fn parse_iter(&self) -> DevTreeParseIter<'_, 'dt> {
        DevTreeParseIter::new(self)
    }

    pub fn buf(&self) -> &'dt [u8] {
        self.buf
    }
}
