use core::alloc::{GlobalAlloc, Layout};
use core::convert::TryFrom;
use core::mem::{align_of, size_of};
use core::ptr::NonNull;
use core::slice;

use super::builder::DTIBuilder;
use super::iters::{DeviceCompatibleNodeIter, DeviceNodeIter};
use super::DeviceNode;
use crate::base::DevTree;
use crate::error::{DevTreeError, Result};
use crate::priv_util::align_up;
use crate::spec::{Phandle, TREE_CANARY};

const CANARY_LEN: usize = size_of::<u32>();

/// Byte offset of a node record within the tree's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct NodeId(u32);

/// Byte offset of a property record within the tree's block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct PropId(u32);

impl NodeId {
    pub(super) const ROOT: NodeId = NodeId(0);

    pub(super) fn new(off: usize) -> Result<Self> {
        u32::try_from(off)
            .map(NodeId)
            .map_err(|_| DevTreeError::AllocationFailure)
    }

    pub(super) fn offset(self) -> usize {
        self.0 as usize
    }
}

impl PropId {
    pub(super) fn new(off: usize) -> Result<Self> {
        u32::try_from(off)
            .map(PropId)
            .map_err(|_| DevTreeError::AllocationFailure)
    }

    pub(super) fn offset(self) -> usize {
        self.0 as usize
    }
}

/// A property value or node string.
///
/// Blob-sourced data is borrowed in place. Data the engine synthesizes lives in the tree's own
/// block, just after the record that owns it.
#[derive(Debug, Clone, Copy)]
pub(super) enum Value<'dt> {
    Borrowed(&'dt [u8]),
    Owned { offset: u32, len: u32 },
}

#[repr(C)]
pub(super) struct DTNode<'dt> {
    pub(super) parent: Option<NodeId>,
    pub(super) child: Option<NodeId>,
    pub(super) sibling: Option<NodeId>,
    // Youngest child so far, only used while linking.
    pub(super) last_child: Option<NodeId>,
    // Next node in depth-first pre-order, regardless of depth.
    pub(super) allnext: Option<NodeId>,
    pub(super) properties: Option<PropId>,
    pub(super) name: Option<Value<'dt>>,
    pub(super) dev_type: Option<Value<'dt>>,
    pub(super) phandle: Option<Phandle>,

    // NOTE: The full path is stored right after the record, like a C flexible array member.
    pub(super) full_name_len: usize,
}

#[repr(C)]
pub(super) struct DTProp<'dt> {
    pub(super) name: &'dt [u8],
    pub(super) value: Value<'dt>,
    pub(super) next: Option<PropId>,
}

// We assert this because it makes size calculations easier: both record kinds may follow each
// other in the block and the cursor never has to track which kind came last.
const_assert_eq!(align_of::<DTNode<'static>>(), align_of::<DTProp<'static>>());

/// Progress of a single unflatten run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnflattenState {
    Uninitialized,
    HeaderValidated,
    Sized,
    Allocated,
    Populated,
    Ready,
    Failed,
}

/// An unflattened device tree.
///
/// All node and property records live in one block obtained from the allocator passed to
/// [`DeviceTree::new`]. The block is released as a whole when the tree is dropped; nodes are
/// never added or removed once the tree is built.
pub struct DeviceTree<'i, 'dt> {
    fdt: DevTree<'dt>,
    block: NonNull<u8>,
    layout: Layout,
    size: usize,
    node_count: usize,
    alloc: &'i dyn GlobalAlloc,
}

impl<'i, 'dt> DeviceTree<'i, 'dt> {
    /// Run the measuring pass alone and return the layout of the block the tree needs,
    /// including the trailing canary.
    pub fn get_layout(fdt: &DevTree<'dt>, alloc: &'i dyn GlobalAlloc) -> Result<Layout> {
        match Self::measure(fdt, alloc)? {
            0 => Err(DevTreeError::EmptyTree),
            size => Self::block_layout(size),
        }
    }

    fn measure(fdt: &DevTree<'dt>, alloc: &'i dyn GlobalAlloc) -> Result<usize> {
        let mut builder = DTIBuilder::measure(fdt, alloc);
        let used = builder.unflatten_nodes()?;
        Ok(align_up(used, size_of::<u32>()))
    }

    fn block_layout(size: usize) -> Result<Layout> {
        Layout::from_size_align(size + CANARY_LEN, align_of::<DTNode>())
            .map_err(|_| DevTreeError::AllocationFailure)
    }

    /// Unflatten `fdt` into a block taken from `alloc`.
    pub fn new(fdt: DevTree<'dt>, alloc: &'i dyn GlobalAlloc) -> Result<Self> {
        Self::unflatten(fdt, alloc, |_| {})
    }

    /// Unflatten `fdt`, reporting each state the run reaches to `step`.
    ///
    /// The run measures the tree, allocates one block for it, populates the block and finally
    /// checks that the population stayed inside the measured size.
    pub(crate) fn unflatten<F>(
        fdt: DevTree<'dt>,
        alloc: &'i dyn GlobalAlloc,
        mut step: F,
    ) -> Result<Self>
    where
        F: FnMut(UnflattenState),
    {
        step(UnflattenState::HeaderValidated);

        let size = Self::measure(&fdt, alloc)?;
        if size == 0 {
            return Err(DevTreeError::EmptyTree);
        }
        log::debug!("device tree needs {} bytes", size);
        step(UnflattenState::Sized);

        let layout = Self::block_layout(size)?;
        // Unsafe OK: the layout is never zero sized, it always holds the canary.
        let block = NonNull::new(unsafe { alloc.alloc_zeroed(layout) }).ok_or_else(|| {
            log::error!("unable to allocate {} bytes for the device tree", layout.size());
            DevTreeError::AllocationFailure
        })?;

        // From here on dropping the tree releases the block.
        let mut tree = Self {
            fdt,
            block,
            layout,
            size,
            node_count: 0,
            alloc,
        };
        tree.block_mut()[size..].copy_from_slice(&TREE_CANARY.to_be_bytes());
        step(UnflattenState::Allocated);

        let fdt = tree.fdt;
        let (used, node_count) = {
            let mut builder = DTIBuilder::populate(&fdt, tree.block_mut(), size);
            let used = builder.unflatten_nodes()?;
            (used, builder.node_count())
        };
        tree.node_count = node_count;
        step(UnflattenState::Populated);

        tree.verify(used)?;
        log::debug!("unflattened {} device tree nodes", node_count);
        step(UnflattenState::Ready);

        Ok(tree)
    }

    fn verify(&self, used: usize) -> Result<()> {
        let canary = &self.block()[self.size..];
        let canary_ok = canary == &TREE_CANARY.to_be_bytes()[..];
        if !canary_ok || align_up(used, size_of::<u32>()) != self.size {
            log::error!(
                "device tree overran its block: measured {} bytes, populated {}",
                self.size,
                used
            );
            return Err(DevTreeError::SizeMismatch {
                expected: self.size,
                used,
            });
        }
        Ok(())
    }

    fn block(&self) -> &[u8] {
        // Unsafe OK. The block is layout.size() bytes long and lives as long as self.
        unsafe { slice::from_raw_parts(self.block.as_ptr(), self.layout.size()) }
    }

    fn block_mut(&mut self) -> &mut [u8] {
        // Unsafe OK. As above, and we hold the only reference to the block.
        unsafe { slice::from_raw_parts_mut(self.block.as_ptr(), self.layout.size()) }
    }

    /// Panics if `off` cannot hold a record of this tree.
    fn check_record<T>(&self, off: usize) {
        assert!(
            off % align_of::<T>() == 0 && off + size_of::<T>() <= self.size,
            "record offset {} outside device tree of {} bytes",
            off,
            self.size
        );
    }

    #[allow(clippy::cast_ptr_alignment)]
    pub(super) fn node_rec(&self, id: NodeId) -> &DTNode<'dt> {
        self.check_record::<DTNode>(id.offset());
        // Unsafe OK. Ids are only handed out for records the builder wrote at aligned offsets
        // inside the block, and the offset was checked against the block above.
        unsafe { &*(self.block.as_ptr().add(id.offset()) as *const DTNode<'dt>) }
    }

    #[allow(clippy::cast_ptr_alignment)]
    pub(super) fn prop_rec(&self, id: PropId) -> &DTProp<'dt> {
        self.check_record::<DTProp>(id.offset());
        // Unsafe OK. See node_rec.
        unsafe { &*(self.block.as_ptr().add(id.offset()) as *const DTProp<'dt>) }
    }

    pub(super) fn full_name_of(&self, id: NodeId) -> &[u8] {
        let start = id.offset() + size_of::<DTNode>();
        &self.block()[start..start + self.node_rec(id).full_name_len]
    }

    pub(super) fn value<'a>(&'a self, value: &Value<'dt>) -> &'a [u8] {
        match *value {
            Value::Borrowed(bytes) => bytes,
            Value::Owned { offset, len } => {
                let start = offset as usize;
                &self.block()[start..start + len as usize]
            }
        }
    }

    /// Returns the root node. It is always the first record in the block.
    pub fn root(&self) -> DeviceNode<'_, 'i, 'dt> {
        DeviceNode::new(self, NodeId::ROOT)
    }

    /// The blob this tree was unflattened from.
    pub fn fdt(&self) -> &DevTree<'dt> {
        &self.fdt
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Bytes used by the tree's records, excluding the canary.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns an iterator over every node in depth-first pre-order.
    #[must_use]
    pub fn nodes(&self) -> DeviceNodeIter<'_, 'i, 'dt> {
        DeviceNodeIter::new(self, Some(NodeId::ROOT))
    }

    /// Returns an iterator over every node listing `string` in its `compatible` property.
    pub fn compatible_nodes<'a, 's>(
        &'a self,
        string: &'s str,
    ) -> DeviceCompatibleNodeIter<'s, 'a, 'i, 'dt> {
        DeviceCompatibleNodeIter {
            iter: self.nodes(),
            string,
        }
    }
}

impl Drop for DeviceTree<'_, '_> {
    fn drop(&mut self) {
        // Unsafe OK. The block was allocated from this allocator with this layout.
        unsafe { self.alloc.dealloc(self.block.as_ptr(), self.layout) }
    }
}

impl core::fmt::Debug for DeviceTree<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceTree")
            .field("size", &self.size)
            .field("node_count", &self.node_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::alloc::System;

    #[derive(Default)]
    struct CountingAlloc {
        live: Cell<usize>,
    }

    unsafe impl GlobalAlloc for CountingAlloc {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            self.live.set(self.live.get() + 1);
            System.alloc(layout)
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            self.live.set(self.live.get() - 1);
            System.dealloc(ptr, layout)
        }
    }

    const BLOB_LEN: usize = 92;

    // / { reg = <1>; };
    fn blob() -> [u32; BLOB_LEN / 4] {
        let mut words = [0u32; BLOB_LEN / 4];
        let header = [0xd00d_feed, BLOB_LEN as u32, 56, 88, 40, 17, 16, 0, 4, 32];
        let structs = [1, 0, 3, 4, 0, 1, 2, 9];
        words[..10].copy_from_slice(&header);
        words[14..22].copy_from_slice(&structs);
        words[22] = u32::from_be_bytes(*b"reg\0");
        for w in words.iter_mut() {
            *w = w.to_be();
        }
        words
    }

    fn as_bytes(words: &[u32; BLOB_LEN / 4]) -> &[u8] {
        unsafe { slice::from_raw_parts(words.as_ptr() as *const u8, BLOB_LEN) }
    }

    #[test]
    fn overwritten_canary_is_a_size_mismatch() {
        let words = blob();
        let alloc = CountingAlloc::default();
        let fdt = DevTree::new(as_bytes(&words)).unwrap();
        let mut tree = DeviceTree::new(fdt, &alloc).unwrap();
        assert_eq!(alloc.live.get(), 1);

        let size = tree.size();
        assert!(tree.verify(size).is_ok());
        tree.block_mut()[size] ^= 0xff;
        assert_eq!(
            tree.verify(size).unwrap_err(),
            DevTreeError::SizeMismatch {
                expected: size,
                used: size
            }
        );

        drop(tree);
        assert_eq!(alloc.live.get(), 0);
    }

    #[test]
    fn short_population_is_a_size_mismatch() {
        let words = blob();
        let alloc = CountingAlloc::default();
        let fdt = DevTree::new(as_bytes(&words)).unwrap();
        let tree = DeviceTree::new(fdt, &alloc).unwrap();

        let size = tree.size();
        assert_eq!(
            tree.verify(size - 4).unwrap_err(),
            DevTreeError::SizeMismatch {
                expected: size,
                used: size - 4
            }
        );

        drop(tree);
        assert_eq!(alloc.live.get(), 0);
    }
}
