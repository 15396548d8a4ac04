use core::str::from_utf8;

use super::iters::{DeviceChildIter, DevicePropIter};
use super::tree::{DTNode, DeviceTree, NodeId};
use crate::error::{DevTreeError, Result};
use crate::priv_util::trim_nul;
use crate::spec::Phandle;

/// A node of an unflattened [`DeviceTree`].
///
/// This is a cheap handle: a reference to the tree and the position of the node's record in it.
#[derive(Clone, Copy)]
pub struct DeviceNode<'a, 'i: 'a, 'dt> {
    tree: &'a DeviceTree<'i, 'dt>,
    pub(super) id: NodeId,
}

impl<'a, 'i: 'a, 'dt> DeviceNode<'a, 'i, 'dt> {
    pub(super) fn new(tree: &'a DeviceTree<'i, 'dt>, id: NodeId) -> Self {
        Self { tree, id }
    }

    pub(super) fn rec(&self) -> &'a DTNode<'dt> {
        self.tree.node_rec(self.id)
    }

    pub fn tree(&self) -> &'a DeviceTree<'i, 'dt> {
        self.tree
    }

    /// The node's `name` property, or the name made up from its path when the blob has none.
    ///
    /// Nodes that somehow ended up without a name report `"<null>"`.
    pub fn name(&self) -> Result<&'a str> {
        from_utf8(self.name_bytes()).map_err(DevTreeError::StrError)
    }

    /// The node's `device_type` property, or `"<null>"`.
    pub fn device_type(&self) -> Result<&'a str> {
        from_utf8(self.device_type_bytes()).map_err(DevTreeError::StrError)
    }

    /// The absolute path of the node, e.g. `/soc/uart@1000`.
    pub fn full_name(&self) -> Result<&'a str> {
        from_utf8(self.full_name_bytes()).map_err(DevTreeError::StrError)
    }

    /// The last component of the node's path, unit address included.
    pub fn unit_name(&self) -> Result<&'a str> {
        let path = self.full_name_bytes();
        let start = path
            .iter()
            .rposition(|b| *b == b'/')
            .map_or(0, |slash| slash + 1);
        from_utf8(&path[start..]).map_err(DevTreeError::StrError)
    }

    pub fn phandle(&self) -> Option<Phandle> {
        self.rec().phandle
    }

    pub(super) fn name_bytes(&self) -> &'a [u8] {
        self.rec()
            .name
            .as_ref()
            .map_or(&[][..], |v| trim_nul(self.tree.value(v)))
    }

    pub(super) fn device_type_bytes(&self) -> &'a [u8] {
        self.rec()
            .dev_type
            .as_ref()
            .map_or(&[][..], |v| trim_nul(self.tree.value(v)))
    }

    pub(super) fn full_name_bytes(&self) -> &'a [u8] {
        self.tree.full_name_of(self.id)
    }

    pub fn parent(&self) -> Option<Self> {
        self.rec().parent.map(|id| Self::new(self.tree, id))
    }

    /// Returns an iterator over the node's direct children, oldest first.
    pub fn children(&self) -> DeviceChildIter<'a, 'i, 'dt> {
        DeviceChildIter::new(self.tree, self.rec().child)
    }

    /// Returns the child following `prev`, or the first child when `prev` is `None`.
    ///
    /// `prev` is expected to be a child of this node. A `prev` from another tree has no
    /// successor here.
    pub fn next_child(&self, prev: Option<&Self>) -> Option<Self> {
        let next = match prev {
            None => self.rec().child,
            Some(prev) if core::ptr::eq(prev.tree, self.tree) => prev.rec().sibling,
            Some(_) => None,
        };
        next.map(|id| Self::new(self.tree, id))
    }

    /// Returns an iterator over the node's properties in blob order.
    pub fn props(&self) -> DevicePropIter<'a, 'i, 'dt> {
        DevicePropIter::new(*self, self.rec().properties)
    }
}

impl PartialEq for DeviceNode<'_, '_, '_> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl core::fmt::Debug for DeviceNode<'_, '_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceNode")
            .field("full_name", &self.full_name())
            .finish()
    }
}
