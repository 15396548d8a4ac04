use core::alloc::{GlobalAlloc, Layout};
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};
use core::slice;

use crate::prelude::*;

use super::layout::Cursor;
use super::tree::{DTNode, DTProp, NodeId, PropId, Value};
use crate::base::parse::{DevTreeParseIter, ParsedBeginNode, ParsedTok};
use crate::base::DevTree;
use crate::error::{DevTreeError, Result};
use crate::spec::NULL_STR;

/// Length of a node's full path, given its parent's full path (`None` for the root) and the
/// name found in the blob.
///
/// Names starting with `/` are already full paths (blobs older than version 16). Otherwise the
/// path is the parent's path and the name joined by `/`; the root is always `/`.
pub(super) fn full_name_len(parent: Option<&[u8]>, name: &[u8]) -> usize {
    if name.first() == Some(&b'/') {
        return name.len();
    }
    match parent {
        None => 1,
        Some(b"/") => 1 + name.len(),
        Some(parent) => parent.len() + 1 + name.len(),
    }
}

/// Write the path [`full_name_len`] measured into `dst`, which must be exactly that long.
pub(super) fn write_full_name(dst: &mut [u8], parent: Option<&[u8]>, name: &[u8]) {
    if name.first() == Some(&b'/') {
        dst.copy_from_slice(name);
        return;
    }
    match parent {
        None => dst[0] = b'/',
        Some(parent) => {
            let split = if parent == b"/" { 0 } else { parent.len() };
            dst[..split].copy_from_slice(&parent[..split]);
            dst[split] = b'/';
            dst[split + 1..].copy_from_slice(name);
        }
    }
}

/// The part of a full path a missing `name` property is made from: everything after the last
/// `/`, up to the first `@` that follows it.
///
/// `/cpus/core@0` gives `core`, the root `/` gives an empty name.
pub(super) fn short_name(full_name: &[u8]) -> &[u8] {
    let start = full_name
        .iter()
        .rposition(|b| *b == b'/')
        .map_or(0, |slash| slash + 1);
    let tail = &full_name[start..];
    match tail.iter().position(|b| *b == b'@') {
        Some(at) => &tail[..at],
        None => tail,
    }
}

/// A node that is open during the measuring pass.
///
/// The measuring pass has no block to keep records in, yet children need their parent's full
/// path to size their own. Each open node therefore gets a small allocation of its own holding
/// the path, linked to its parent's. It is released when the node ends.
struct TempNode {
    parent: Option<NonNull<TempNode>>,
    layout: Layout,
    full_name_len: usize,
}

impl TempNode {
    /// # Safety
    ///
    /// `this` must point to a live temporary node.
    unsafe fn full_name<'t>(this: NonNull<TempNode>) -> &'t [u8] {
        let path = this.as_ptr().add(1) as *const u8;
        slice::from_raw_parts(path, (*this.as_ptr()).full_name_len)
    }
}

/// The chain of open temporary nodes, youngest first.
///
/// Dropping the stack releases every node still on it, so an error anywhere in the measuring
/// pass leaves nothing behind.
pub(super) struct TempStack<'i> {
    alloc: &'i dyn GlobalAlloc,
    top: Option<NonNull<TempNode>>,
}

impl<'i> TempStack<'i> {
    fn new(alloc: &'i dyn GlobalAlloc) -> Self {
        Self { alloc, top: None }
    }

    fn top_full_name(&self) -> Option<&[u8]> {
        // Unsafe OK. Every node on the stack is live until popped.
        self.top.map(|top| unsafe { TempNode::full_name(top) })
    }

    fn push(&mut self, name: &[u8], full_name_len: usize) -> Result<()> {
        let layout = Layout::from_size_align(
            size_of::<TempNode>() + full_name_len,
            align_of::<TempNode>(),
        )
        .map_err(|_| DevTreeError::AllocationFailure)?;

        // Unsafe OK. The layout is at least one TempNode large.
        let node = unsafe { self.alloc.alloc_zeroed(layout) } as *mut TempNode;
        let node = NonNull::new(node).ok_or_else(|| {
            log::error!("unable to allocate a temporary device tree node");
            DevTreeError::AllocationFailure
        })?;

        // Unsafe OK. The allocation is aligned for a TempNode and has room for the path after
        // it; the parent path lives in a different allocation.
        unsafe {
            ptr::write(
                node.as_ptr(),
                TempNode {
                    parent: self.top,
                    layout,
                    full_name_len,
                },
            );
            let dst = slice::from_raw_parts_mut(node.as_ptr().add(1) as *mut u8, full_name_len);
            write_full_name(dst, self.top_full_name(), name);
        }

        self.top = Some(node);
        Ok(())
    }

    fn pop(&mut self) {
        if let Some(top) = self.top {
            // Unsafe OK. The node is live and was allocated from self.alloc with its layout.
            unsafe {
                let TempNode { parent, layout, .. } = ptr::read(top.as_ptr());
                self.alloc.dealloc(top.as_ptr() as *mut u8, layout);
                self.top = parent;
            }
        }
    }
}

impl Drop for TempStack<'_> {
    fn drop(&mut self) {
        while self.top.is_some() {
            self.pop();
        }
    }
}

pub(super) enum Target<'b, 'i> {
    /// Only advance the cursor. Open nodes are kept as temporaries.
    Measure(TempStack<'i>),
    /// Write records into the tree's block and link them up.
    Populate {
        buf: &'b mut [u8],
        measured: usize,
        current: Option<NodeId>,
        last: Option<NodeId>,
    },
}

/// Drives one pass over the structure block.
///
/// Both passes run exactly the same reservations against their [`Cursor`]. They only differ in
/// what they do with the offsets they get back.
pub(super) struct DTIBuilder<'b, 'i, 'dt> {
    fdt: &'b DevTree<'dt>,
    cursor: Cursor,
    target: Target<'b, 'i>,
    node_count: usize,
}

// Record access within the populating pass' buffer.
//
// Unsafe OK for all of these: offsets come from the cursor, which aligns them for the record
// type, and the buffer itself is aligned for both record types. Bounds are checked by `slot`
// before a record is first written; later accesses only touch records already written.
#[allow(clippy::cast_ptr_alignment)]
fn node_in<'b, 'dt>(buf: &'b [u8], id: NodeId) -> &'b DTNode<'dt> {
    unsafe { &*(buf.as_ptr().add(id.offset()) as *const DTNode<'dt>) }
}

#[allow(clippy::cast_ptr_alignment)]
fn node_in_mut<'b, 'dt>(buf: &'b mut [u8], id: NodeId) -> &'b mut DTNode<'dt> {
    unsafe { &mut *(buf.as_mut_ptr().add(id.offset()) as *mut DTNode<'dt>) }
}

#[allow(clippy::cast_ptr_alignment)]
fn prop_in_mut<'b, 'dt>(buf: &'b mut [u8], id: PropId) -> &'b mut DTProp<'dt> {
    unsafe { &mut *(buf.as_mut_ptr().add(id.offset()) as *mut DTProp<'dt>) }
}

fn full_name_in(buf: &[u8], id: NodeId) -> &[u8] {
    let start = id.offset() + size_of::<DTNode>();
    &buf[start..start + node_in(buf, id).full_name_len]
}

/// Check that `len` bytes at `off` fit in the block handed to the populating pass.
fn slot(buf: &[u8], measured: usize, off: usize, len: usize) -> Result<()> {
    if off + len > buf.len() {
        log::error!(
            "device tree record at {:#x} runs past the {} measured bytes",
            off,
            measured
        );
        return Err(DevTreeError::SizeMismatch {
            expected: measured,
            used: off + len,
        });
    }
    debug_assert!((buf.as_ptr() as usize + off) % align_of::<DTNode>() == 0);
    Ok(())
}

impl<'b, 'i, 'dt> DTIBuilder<'b, 'i, 'dt> {
    pub(super) fn measure(fdt: &'b DevTree<'dt>, alloc: &'i dyn GlobalAlloc) -> Self {
        Self {
            fdt,
            cursor: Cursor::new(),
            target: Target::Measure(TempStack::new(alloc)),
            node_count: 0,
        }
    }

    /// `buf` is the whole block: the `measured` bytes for records followed by the canary.
    pub(super) fn populate(fdt: &'b DevTree<'dt>, buf: &'b mut [u8], measured: usize) -> Self {
        Self {
            fdt,
            cursor: Cursor::new(),
            target: Target::Populate {
                buf,
                measured,
                current: None,
                last: None,
            },
            node_count: 0,
        }
    }

    pub(super) fn node_count(&self) -> usize {
        self.node_count
    }

    fn parent_full_name(&self) -> Option<&[u8]> {
        match &self.target {
            Target::Measure(stack) => stack.top_full_name(),
            Target::Populate { buf, current, .. } => current.map(|cur| full_name_in(buf, cur)),
        }
    }

    fn full_name_of(&self, id: NodeId) -> &[u8] {
        match &self.target {
            Target::Measure(stack) => stack.top_full_name().unwrap_or_default(),
            Target::Populate { buf, .. } => full_name_in(buf, id),
        }
    }

    /// Walk the whole structure block. Returns the cursor's final offset, which after the
    /// measuring pass is the number of bytes the tree needs.
    ///
    /// A structure block that does not open with a node, leading NOPs aside, measures zero
    /// bytes.
    pub(super) fn unflatten_nodes(&mut self) -> Result<usize> {
        let fdt = self.fdt;
        let mut iter = fdt.parse_iter();

        loop {
            match iter.peek()? {
                Some(ParsedTok::BeginNode(_)) => break,
                Some(ParsedTok::Nop) => {
                    iter.next()?;
                }
                _ => return Ok(0),
            }
        }

        while let Some(tok) = iter.next()? {
            match tok {
                ParsedTok::BeginNode(node) => self.parsed_node(&mut iter, &node)?,
                ParsedTok::EndNode => self.parsed_end_node(),
                ParsedTok::Nop => continue,
                // Props may only occur in a node header, which parsed_node consumes.
                ParsedTok::Prop(_) => return Err(DevTreeError::ParseError),
            }
        }
        Ok(self.cursor.offset())
    }

    /// Decode one node: its record and path, its link into the tree, then its properties.
    fn parsed_node(
        &mut self,
        iter: &mut DevTreeParseIter<'_, 'dt>,
        node: &ParsedBeginNode<'dt>,
    ) -> Result<()> {
        let name = node.name;
        let full_name_len = full_name_len(self.parent_full_name(), name);
        let off = self
            .cursor
            .reserve(size_of::<DTNode>() + full_name_len, align_of::<DTNode>());
        let id = NodeId::new(off)?;

        match &mut self.target {
            Target::Measure(stack) => stack.push(name, full_name_len)?,
            Target::Populate {
                buf,
                measured,
                current,
                last,
            } => {
                slot(buf, *measured, off, size_of::<DTNode>() + full_name_len)?;
                let parent = *current;

                {
                    // The parent was reserved earlier, so its path sits below ours.
                    let (lo, hi) = buf.split_at_mut(off + size_of::<DTNode>());
                    let parent_name = parent.map(|p| full_name_in(lo, p));
                    write_full_name(&mut hi[..full_name_len], parent_name, name);
                }

                // Unsafe OK. slot() checked the bounds, the cursor aligned the offset.
                unsafe {
                    ptr::write(
                        buf.as_mut_ptr().add(off) as *mut DTNode<'dt>,
                        DTNode {
                            parent,
                            child: None,
                            sibling: None,
                            last_child: None,
                            allnext: None,
                            properties: None,
                            name: None,
                            dev_type: None,
                            phandle: None,
                            full_name_len,
                        },
                    );
                }

                if let Some(parent) = parent {
                    let prev_child = node_in(buf, parent).last_child;
                    match prev_child {
                        None => node_in_mut(buf, parent).child = Some(id),
                        Some(prev) => node_in_mut(buf, prev).sibling = Some(id),
                    }
                    node_in_mut(buf, parent).last_child = Some(id);
                }
                if let Some(prev) = *last {
                    node_in_mut(buf, prev).allnext = Some(id);
                }
                *last = Some(id);
                *current = Some(id);
            }
        }
        self.node_count += 1;

        let mut has_name = false;
        let mut tail: Option<PropId> = None;
        loop {
            if let Some(ParsedTok::Nop) = iter.peek()? {
                iter.next()?;
                continue;
            }
            match self.parsed_prop(iter, id, &mut has_name)? {
                Some(prop) => self.link_prop(id, &mut tail, prop),
                None => break,
            }
        }

        if !has_name {
            let prop = self.synthesize_name(id)?;
            self.link_prop(id, &mut tail, prop);
        }

        if let Target::Populate { buf, .. } = &mut self.target {
            let rec = node_in_mut(buf, id);
            rec.name.get_or_insert(Value::Borrowed(NULL_STR.as_bytes()));
            rec.dev_type
                .get_or_insert(Value::Borrowed(NULL_STR.as_bytes()));
        }
        Ok(())
    }

    /// Decode the next property of node `id`, or return `None` without consuming anything if
    /// the next token is not a property.
    fn parsed_prop(
        &mut self,
        iter: &mut DevTreeParseIter<'_, 'dt>,
        id: NodeId,
        has_name: &mut bool,
    ) -> Result<Option<PropId>> {
        let prop = match iter.peek()? {
            Some(ParsedTok::Prop(prop)) => prop,
            _ => return Ok(None),
        };
        iter.next()?;

        let name = self.fdt.string_at(prop.name_offset)?;
        if name == b"name" {
            *has_name = true;
        }

        let off = self
            .cursor
            .reserve(size_of::<DTProp>(), align_of::<DTProp>());
        let pid = PropId::new(off)?;

        if let Target::Populate { buf, measured, .. } = &mut self.target {
            slot(buf, *measured, off, size_of::<DTProp>())?;
            let value = prop.prop_buf;

            // Unsafe OK. slot() checked the bounds, the cursor aligned the offset.
            unsafe {
                ptr::write(
                    buf.as_mut_ptr().add(off) as *mut DTProp<'dt>,
                    DTProp {
                        name,
                        value: Value::Borrowed(value),
                        next: None,
                    },
                );
            }

            let node = node_in_mut(buf, id);
            match name {
                b"name" => node.name = Some(Value::Borrowed(value)),
                b"device_type" => node.dev_type = Some(Value::Borrowed(value)),
                b"phandle" => node.phandle = value.read_be_u32(0).ok(),
                _ => {}
            }
        }

        Ok(Some(pid))
    }

    /// Add a `name` property made from the node's full path, stored inline after its record.
    fn synthesize_name(&mut self, id: NodeId) -> Result<PropId> {
        let short = short_name(self.full_name_of(id));
        let start = short.as_ptr() as usize - self.full_name_of(id).as_ptr() as usize;
        // Keep the NUL, as a blob string value would.
        let len = short.len() + 1;
        let short_len = short.len();

        let off = self
            .cursor
            .reserve(size_of::<DTProp>() + len, align_of::<DTProp>());
        let pid = PropId::new(off)?;

        if let Target::Populate { buf, measured, .. } = &mut self.target {
            slot(buf, *measured, off, size_of::<DTProp>() + len)?;
            let value_off = off + size_of::<DTProp>();
            let value = Value::Owned {
                offset: value_off as u32,
                len: len as u32,
            };

            // Unsafe OK. slot() checked the bounds, the cursor aligned the offset.
            unsafe {
                ptr::write(
                    buf.as_mut_ptr().add(off) as *mut DTProp<'dt>,
                    DTProp {
                        name: b"name",
                        value,
                        next: None,
                    },
                );
            }

            let src = id.offset() + size_of::<DTNode>() + start;
            buf.copy_within(src..src + short_len, value_off);
            buf[value_off + short_len] = 0;

            node_in_mut(buf, id).name = Some(value);
        }

        Ok(pid)
    }

    fn link_prop(&mut self, id: NodeId, tail: &mut Option<PropId>, prop: PropId) {
        if let Target::Populate { buf, .. } = &mut self.target {
            match *tail {
                None => node_in_mut(buf, id).properties = Some(prop),
                Some(prev) => prop_in_mut(buf, prev).next = Some(prop),
            }
        }
        *tail = Some(prop);
    }

    /// Close the current node. Unbalanced end tokens at the top level are ignored.
    fn parsed_end_node(&mut self) {
        match &mut self.target {
            Target::Measure(stack) => stack.pop(),
            Target::Populate { buf, current, .. } => {
                if let Some(cur) = *current {
                    *current = node_in(buf, cur).parent;
                }
            }
        }
    }
}
