use core::str::from_utf8;

use crate::prelude::*;

use crate::error::{DevTreeError, Result};
use crate::spec::Phandle;

/// Typed access to a property's raw value.
///
/// Device tree properties are not strongly typed. Every accessor here is bounds checked against
/// the value and reports [`DevTreeError::InvalidOffset`] instead of reading past it, but none of
/// them can tell whether the bytes actually hold the type asked for.
pub trait PropReader<'r> {
    type NodeType;

    /// Returns the buffer associated with the property's data.
    #[doc(hidden)]
    fn propbuf(&self) -> &'r [u8];

    /// Returns the property's name as stored in the blob's strings block.
    #[doc(hidden)]
    fn name_bytes(&self) -> &'r [u8];

    /// Returns the name of the property within the device tree.
    #[inline]
    fn name(&self) -> Result<&'r str> {
        Ok(from_utf8(self.name_bytes())?)
    }

    /// Returns the length of the property value within the device tree
    #[inline]
    #[must_use]
    fn length(&self) -> usize {
        self.propbuf().len()
    }

    /// Returns the node which this property is contained within.
    fn node(&self) -> Self::NodeType;

    /// Read a big-endian [`u32`] from the provided offset in this property's value and return it
    /// in native byte order.
    ///
    /// If the read would reach outside of the property's value an [`Err`] containing
    /// [`DevTreeError::InvalidOffset`] is returned. The offset need not be aligned.
    #[inline]
    fn get_u32(&self, offset: usize) -> Result<u32> {
        self.propbuf()
            .read_be_u32(offset)
            .or(Err(DevTreeError::InvalidOffset))
    }

    /// Read a big-endian [`u64`] from the provided offset in this property's value.
    ///
    /// See [`PropReader::get_u32`].
    #[inline]
    fn get_u64(&self, offset: usize) -> Result<u64> {
        self.propbuf()
            .read_be_u64(offset)
            .or(Err(DevTreeError::InvalidOffset))
    }

    /// A Phandle is simply defined as a u32 value, as such this method performs the same action as
    /// [`PropReader::get_u32`]
    #[inline]
    fn get_phandle(&self, offset: usize) -> Result<Phandle> {
        self.get_u32(offset)
    }

    /// Returns the string property as a string if it can be parsed as one.
    #[inline]
    fn get_str(&self) -> Result<&'r str> {
        self.get_str_at(0)
    }

    /// Returns the `str` at the given offset within the property.
    ///
    /// A string missing its terminating NUL runs to the end of the value.
    #[inline]
    fn get_str_at(&self, offset: usize) -> Result<&'r str> {
        let (_, s) = PropTraitWrap(self).get_string(offset)?;
        Ok(s)
    }

    /// Returns the number of strings in a string list property.
    #[inline]
    fn get_str_count(&self) -> Result<usize> {
        PropTraitWrap(self).iter_str_list(None)
    }

    /// Fills the supplied slice with the strings of a string list property and returns how many
    /// were parsed.
    ///
    /// Strings that do not fit in `list` are counted but not stored.
    #[inline]
    fn get_strlist(&self, list: &mut [Option<&'r str>]) -> Result<usize> {
        PropTraitWrap(self).iter_str_list(Some(list))
    }

    /// Returns an iterator over the NUL separated entries of the value, as raw bytes.
    #[inline]
    fn iter_str(&self) -> StrListIter<'r> {
        StrListIter {
            buf: self.propbuf(),
        }
    }

    /// Returns this property's data as a raw slice
    #[inline]
    fn get_raw(&self) -> &'r [u8] {
        self.propbuf()
    }
}

/// Iterator over the entries of a string list value.
#[derive(Clone, Debug)]
pub struct StrListIter<'r> {
    buf: &'r [u8],
}

impl<'r> Iterator for StrListIter<'r> {
    type Item = &'r [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        match self.buf.iter().position(|b| *b == 0) {
            Some(end) => {
                let (s, rest) = self.buf.split_at(end);
                self.buf = &rest[1..];
                Some(s)
            }
            None => Some(core::mem::take(&mut self.buf)),
        }
    }
}

struct PropTraitWrap<'w, T: ?Sized>(&'w T);

impl<'w, 'r, T: PropReader<'r> + ?Sized> PropTraitWrap<'w, T> {
    /// Returns the string at `offset` and the number of bytes it takes up, NUL included.
    fn get_string(&self, offset: usize) -> Result<(usize, &'r str)> {
        let buf = self.0.propbuf();
        let tail = buf.get(offset..).ok_or(DevTreeError::InvalidOffset)?;
        let s = tail.read_bstring0(0).unwrap_or(tail);
        let len = core::cmp::min(s.len() + 1, tail.len());
        Ok((len, from_utf8(s)?))
    }

    fn iter_str_list(&self, mut list_opt: Option<&mut [Option<&'r str>]>) -> Result<usize> {
        let mut offset = 0;
        let mut count = 0;
        while offset < self.0.length() {
            let (len, s) = self.get_string(offset)?;
            offset += len;

            if let Some(slot) = list_opt.as_deref_mut().and_then(|l| l.get_mut(count)) {
                *slot = Some(s);
            }
            count += 1;
        }
        Ok(count)
    }
}
