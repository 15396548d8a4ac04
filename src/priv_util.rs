use core::mem::size_of;
use core::ptr::read_unaligned;

#[derive(Debug, Copy, Clone)]
pub enum SliceReadError {
    UnexpectedEndOfInput,
}

pub(crate) type SliceReadResult<T> = Result<T, SliceReadError>;

pub(crate) trait SliceRead<'a> {
    fn read_be_u32(&self, pos: usize) -> SliceReadResult<u32>;
    fn read_be_u64(&self, pos: usize) -> SliceReadResult<u64>;
    fn read_bstring0(&self, pos: usize) -> SliceReadResult<&'a [u8]>;
    fn nread_bstring0(&self, pos: usize, len: usize) -> SliceReadResult<&'a [u8]>;
}

macro_rules! be_read {
    ( $buf:ident, $type:ident , $off:expr ) => {
        match $off.checked_add(size_of::<$type>()) {
            // We explicitly read unaligned.
            Some(end) if end <= $buf.len() => unsafe {
                Ok(<$type>::from_be(read_unaligned::<$type>(
                    $buf.as_ptr().add($off) as *const $type,
                )))
            },
            _ => Err(SliceReadError::UnexpectedEndOfInput),
        }
    };
}

impl<'a> SliceRead<'a> for &'a [u8] {
    #[inline]
    #[allow(clippy::cast_ptr_alignment)]
    fn read_be_u32(&self, pos: usize) -> SliceReadResult<u32> {
        be_read!(self, u32, pos)
    }

    #[inline]
    #[allow(clippy::cast_ptr_alignment)]
    fn read_be_u64(&self, pos: usize) -> SliceReadResult<u64> {
        be_read!(self, u64, pos)
    }

    fn read_bstring0(&self, pos: usize) -> SliceReadResult<&'a [u8]> {
        let tail = self.get(pos..).ok_or(SliceReadError::UnexpectedEndOfInput)?;
        match tail.iter().position(|b| *b == 0) {
            Some(len) => Ok(&tail[..len]),
            None => Err(SliceReadError::UnexpectedEndOfInput),
        }
    }

    fn nread_bstring0(&self, pos: usize, len: usize) -> SliceReadResult<&'a [u8]> {
        let end = core::cmp::min(pos.saturating_add(len), self.len());
        let tail = self
            .get(pos..end)
            .ok_or(SliceReadError::UnexpectedEndOfInput)?;
        match tail.iter().position(|b| *b == 0) {
            Some(len) => Ok(&tail[..len]),
            None => Err(SliceReadError::UnexpectedEndOfInput),
        }
    }
}

/// Round `off` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(off: usize, align: usize) -> usize {
    (off + align - 1) & !(align - 1)
}

/// Strip a single trailing NUL, as stored by string-valued properties.
#[inline]
pub(crate) fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.split_last() {
        Some((0, head)) => head,
        _ => bytes,
    }
}
