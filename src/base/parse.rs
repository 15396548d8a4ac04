//! Low level flattened device tree parsing functions.
//!

use core::mem::size_of;

use num_traits::FromPrimitive;

use crate::base::DevTree;
use crate::error::{DevTreeError, Result};
use crate::priv_util::{align_up, SliceRead};
use crate::spec::{fdt_prop_header, FdtTok, MAX_NODE_NAME_LEN};

use fallible_iterator::FallibleIterator;

/// This function implements the logic to tokenize the device tree's main structure block.
///
/// This function will return the next [`ParsedTok`] if one exists. If it succeeds in parsing
/// a token, `off` will be incremented to the start of the next token within `buf`.
///
/// When `legacy` is set, property values of eight bytes or more start on an 8-byte boundary
/// (relative to the start of `buf`), as blobs older than version 16 lay them out.
///
/// The given offset, `off`, must be u32 aligned. If this function returns `Ok(Some(_))` the new
/// offset is u32 aligned again, so it may be called iteratively without re-checking.
pub fn next_devtree_token<'a>(
    buf: &'a [u8],
    off: &mut usize,
    legacy: bool,
) -> Result<Option<ParsedTok<'a>>> {
    debug_assert!(*off % size_of::<u32>() == 0);

    let fdt_tok_val = buf.read_be_u32(*off)?;
    *off += size_of::<u32>();

    match FromPrimitive::from_u32(fdt_tok_val) {
        Some(FdtTok::BeginNode) => {
            // Read the name (or return an error if the device tree is incorrectly formatted).
            // Legacy names are whole paths, so only modern names are held to the limit.
            let name = if legacy {
                buf.read_bstring0(*off)?
            } else {
                buf.nread_bstring0(*off, MAX_NODE_NAME_LEN)?
            };

            // Move to the end of name (adding null byte).
            *off += name.len() + 1;
            // Tokens are u32 aligned.
            *off = align_up(*off, size_of::<u32>());

            Ok(Some(ParsedTok::BeginNode(ParsedBeginNode { name })))
        }
        Some(FdtTok::Prop) => {
            let prop_len = buf.read_be_u32(*off + offset_of!(fdt_prop_header, len))? as usize;
            let name_offset =
                buf.read_be_u32(*off + offset_of!(fdt_prop_header, nameoff))? as usize;

            // Move offset past prop header
            *off += size_of::<fdt_prop_header>();
            if legacy {
                *off = align_up(*off, if prop_len >= 8 { 8 } else { 4 });
            }

            // Create a slice using the offset
            let end = off.checked_add(prop_len).ok_or(DevTreeError::ParseError)?;
            let prop_buf = buf.get(*off..end).ok_or(DevTreeError::ParseError)?;

            // Move the offset past the prop data.
            *off += prop_buf.len();
            // Align back to u32.
            *off = align_up(*off, size_of::<u32>());

            Ok(Some(ParsedTok::Prop(ParsedProp {
                name_offset,
                prop_buf,
            })))
        }
        Some(FdtTok::EndNode) => Ok(Some(ParsedTok::EndNode)),
        Some(FdtTok::Nop) => Ok(Some(ParsedTok::Nop)),
        Some(FdtTok::End) => Ok(None),
        None => {
            // Invalid token
            Err(DevTreeError::ParseError)
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedBeginNode<'a> {
    pub name: &'a [u8],
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedProp<'a> {
    pub prop_buf: &'a [u8],
    pub name_offset: usize,
}

/// Enumeration of all tokens within a device tree's structure block.
#[derive(Debug, Clone, Copy)]
pub enum ParsedTok<'a> {
    BeginNode(ParsedBeginNode<'a>),
    EndNode,
    Prop(ParsedProp<'a>),
    Nop,
}

#[derive(Clone)]
pub struct DevTreeParseIter<'r, 'dt: 'r> {
    pub offset: usize,
    pub fdt: &'r DevTree<'dt>,
    legacy: bool,
}

impl<'r, 'dt: 'r> DevTreeParseIter<'r, 'dt> {
    pub(crate) fn new(fdt: &'r DevTree<'dt>) -> Self {
        Self {
            offset: fdt.off_dt_struct(),
            legacy: fdt.is_legacy(),
            fdt,
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&self) -> Result<Option<ParsedTok<'dt>>> {
        let mut offset = self.offset;
        next_devtree_token(self.fdt.buf(), &mut offset, self.legacy)
    }
}

impl<'r, 'dt: 'r> FallibleIterator for DevTreeParseIter<'r, 'dt> {
    type Error = DevTreeError;
    type Item = ParsedTok<'dt>;

    fn next(&mut self) -> Result<Option<Self::Item>> {
        next_devtree_token(self.fdt.buf(), &mut self.offset, self.legacy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(w: &[u32]) -> ([u64; 8], usize) {
        let mut buf = [0u64; 8];
        let bytes = unsafe { core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, 64) };
        for (i, v) in w.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_be_bytes());
        }
        (buf, w.len() * 4)
    }

    fn as_bytes(buf: &[u64; 8]) -> &[u8] {
        unsafe { core::slice::from_raw_parts(buf.as_ptr() as *const u8, 64) }
    }

    #[test]
    fn begin_node_name_is_padded_to_u32() {
        // BEGIN_NODE "cpu@0" END_NODE
        let (buf, _) = words(&[1, 0x6370_7540, 0x3000_0000, 2]);
        let buf = as_bytes(&buf);
        let mut off = 0;
        match next_devtree_token(buf, &mut off, false).unwrap() {
            Some(ParsedTok::BeginNode(node)) => assert_eq!(node.name, b"cpu@0"),
            _ => panic!("expected a node"),
        }
        assert_eq!(off, 12);
        assert!(matches!(
            next_devtree_token(buf, &mut off, false).unwrap(),
            Some(ParsedTok::EndNode)
        ));
    }

    #[test]
    fn legacy_long_values_are_eight_byte_aligned() {
        // PROP len=8 nameoff=0, one pad word, then the value.
        let (buf, _) = words(&[3, 8, 0, 0, 0xaa, 0xbb, 9]);
        let buf = as_bytes(&buf);

        let mut off = 0;
        match next_devtree_token(buf, &mut off, true).unwrap() {
            Some(ParsedTok::Prop(prop)) => {
                assert_eq!(prop.prop_buf, &[0, 0, 0, 0xaa, 0, 0, 0, 0xbb]);
            }
            _ => panic!("expected a property"),
        }
        assert_eq!(off, 24);
        assert!(next_devtree_token(buf, &mut off, true).unwrap().is_none());

        // The modern layout reads the pad word as the start of the value.
        let mut off = 0;
        match next_devtree_token(buf, &mut off, false).unwrap() {
            Some(ParsedTok::Prop(prop)) => assert_eq!(prop.prop_buf, &[0, 0, 0, 0, 0, 0, 0, 0xaa]),
            _ => panic!("expected a property"),
        }
    }

    #[test]
    fn oversized_value_length_is_a_parse_error() {
        // PROP len=0xffffffff nameoff=0
        let (buf, _) = words(&[3, 0xffff_ffff, 0, 9]);
        for legacy in [false, true].iter() {
            let mut off = 0;
            assert_eq!(
                next_devtree_token(as_bytes(&buf), &mut off, *legacy).unwrap_err(),
                DevTreeError::ParseError
            );
        }
    }

    #[test]
    fn only_modern_node_names_are_length_limited() {
        let mut buf = [0u64; 48];
        let bytes = unsafe { core::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut u8, 384) };
        bytes[..4].copy_from_slice(&1u32.to_be_bytes());
        for b in bytes[4..4 + 300].iter_mut() {
            *b = b'a';
        }
        let bytes: &[u8] = bytes;

        let mut off = 0;
        assert_eq!(
            next_devtree_token(bytes, &mut off, false).unwrap_err(),
            DevTreeError::ParseError
        );

        let mut off = 0;
        match next_devtree_token(bytes, &mut off, true).unwrap() {
            Some(ParsedTok::BeginNode(node)) => assert_eq!(node.name.len(), 300),
            _ => panic!("expected a node"),
        }
        assert_eq!(off, 308);
    }

    #[test]
    fn unknown_token_is_a_parse_error() {
        let (buf, _) = words(&[7]);
        let mut off = 0;
        assert_eq!(
            next_devtree_token(as_bytes(&buf), &mut off, false).unwrap_err(),
            DevTreeError::ParseError
        );
    }
}
