use crate::prelude::*;

use super::tree::{DTProp, PropId};
use super::DeviceNode;

/// A property of a [`DeviceNode`].
///
/// Most desired methods are available through the [`PropReader`] trait.
#[derive(Clone, Copy)]
pub struct DeviceProp<'a, 'i: 'a, 'dt> {
    node: DeviceNode<'a, 'i, 'dt>,
    pub(super) id: PropId,
}

impl<'a, 'i: 'a, 'dt> DeviceProp<'a, 'i, 'dt> {
    pub(super) fn new(node: DeviceNode<'a, 'i, 'dt>, id: PropId) -> Self {
        Self { node, id }
    }

    pub(super) fn rec(&self) -> &'a DTProp<'dt> {
        self.node.tree().prop_rec(self.id)
    }
}

impl<'a, 'i: 'a, 'dt> PropReader<'a> for DeviceProp<'a, 'i, 'dt> {
    type NodeType = DeviceNode<'a, 'i, 'dt>;

    #[inline]
    fn propbuf(&self) -> &'a [u8] {
        self.node.tree().value(&self.rec().value)
    }

    #[inline]
    fn name_bytes(&self) -> &'a [u8] {
        self.rec().name
    }

    fn node(&self) -> DeviceNode<'a, 'i, 'dt> {
        self.node
    }
}

impl core::fmt::Debug for DeviceProp<'_, '_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceProp")
            .field("name", &self.name())
            .field("length", &self.length())
            .finish()
    }
}
