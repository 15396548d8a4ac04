//! Lookups over an unflattened tree.
//!
//! Every search is a linear scan of the `allnext` chain, or a direct walk of the parent and
//! sibling links. Nothing here fails: a lookup that finds nothing returns `None`.

use core::ptr;

use crate::prelude::*;

use super::iters::DeviceNodeIter;
use super::{DeviceNode, DeviceProp, DeviceTree};
use crate::priv_util::trim_nul;
use crate::spec::Phandle;

/// Properties naming a node's interrupt controller, in the order they are consulted.
const INTERRUPT_PARENT_PROPS: [&str; 3] =
    ["interrupt-parent", "interrupt-extended", "interrupts-extended"];

/// An entry of a driver's match table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfDeviceId<T = ()> {
    pub compatible: &'static str,
    pub data: T,
}

impl<T> OfDeviceId<T> {
    pub const fn new(compatible: &'static str, data: T) -> Self {
        Self { compatible, data }
    }
}

impl<'i, 'dt> DeviceTree<'i, 'dt> {
    /// Nodes after `from`, or every node when `from` is `None`.
    fn scan_from<'a>(
        &'a self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
    ) -> DeviceNodeIter<'a, 'i, 'dt> {
        match from {
            None => self.nodes(),
            Some(node) if ptr::eq(node.tree(), self) => {
                DeviceNodeIter::new(self, node.rec().allnext)
            }
            // Not one of ours.
            Some(_) => DeviceNodeIter::new(self, None),
        }
    }

    /// Returns the node whose full path is `path`.
    pub fn find_by_path(&self, path: &str) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.nodes()
            .find(|node| node.full_name_bytes() == path.as_bytes())
    }

    pub fn find_by_name(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        name: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.scan_from(from)
            .find(|node| node.name_bytes() == name.as_bytes())
    }

    pub fn find_by_type(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        ty: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.scan_from(from)
            .find(|node| node.device_type_bytes() == ty.as_bytes())
    }

    pub fn find_by_phandle(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        handle: Phandle,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.scan_from(from)
            .find(|node| node.phandle() == Some(handle))
    }

    /// Returns the next node listing `compat` in its `compatible` property and, when `ty` is
    /// given, whose `device_type` is `ty`.
    pub fn find_compatible(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        ty: Option<&str>,
        compat: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.scan_from(from).find(|node| {
            ty.map_or(true, |ty| node.device_type_bytes() == ty.as_bytes())
                && node.device_is_compatible(compat)
        })
    }

    /// Returns the next node matching any entry of `table`, together with that entry.
    pub fn find_matching_node<'t, T>(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        table: &'t [OfDeviceId<T>],
    ) -> Option<(DeviceNode<'_, 'i, 'dt>, &'t OfDeviceId<T>)> {
        self.scan_from(from)
            .find_map(|node| node.match_against_table(table).map(|id| (node, id)))
    }
}

impl<'a, 'i: 'a, 'dt> DeviceNode<'a, 'i, 'dt> {
    /// Returns the first entry of `table` this node is compatible with.
    pub fn match_against_table<'t, T>(
        &self,
        table: &'t [OfDeviceId<T>],
    ) -> Option<&'t OfDeviceId<T>> {
        table
            .iter()
            .find(|id| self.device_is_compatible(id.compatible))
    }

    /// Returns the node's own property called `name`.
    pub fn get_property(&self, name: &str) -> Option<DeviceProp<'a, 'i, 'dt>> {
        self.props()
            .find(|prop| prop.name_bytes() == name.as_bytes())
    }

    /// Whether `compat` is one of the entries of the node's `compatible` list.
    pub fn device_is_compatible(&self, compat: &str) -> bool {
        self.get_property("compatible").map_or(false, |prop| {
            prop.iter_str()
                .filter(|entry| !entry.is_empty())
                .any(|entry| entry == compat.as_bytes())
        })
    }

    /// A node without a `status` property, or whose status is `ok` or `okay`, is available.
    pub fn is_available(&self) -> bool {
        match self.get_property("status") {
            None => true,
            Some(prop) => matches!(trim_nul(prop.get_raw()), b"ok" | b"okay"),
        }
    }

    /// Returns the interrupt controller this node's interrupts are routed to.
    ///
    /// Each step follows the first interrupt parent phandle that resolves, or the structural
    /// parent if none does, and the walk ends at the first node reached that has
    /// `#interrupt-cells`. The node itself is never the answer.
    pub fn interrupt_parent(&self) -> Option<Self> {
        let tree = self.tree();
        let mut np = *self;

        // Phandle cycles would otherwise never end.
        for _ in 0..=tree.node_count() {
            let next = INTERRUPT_PARENT_PROPS
                .iter()
                .filter_map(|name| np.property_read_u32(name))
                .find_map(|handle| tree.find_by_phandle(None, handle))
                .or_else(|| np.parent())?;

            if next.get_property("#interrupt-cells").is_some() {
                return Some(next);
            }
            np = next;
        }
        log::warn!("interrupt parent chain of {:?} does not end", self.full_name());
        None
    }

    /// `#interrupt-cells` of the node's interrupt parent, or 0 without one.
    pub fn n_interrupt_cells(&self) -> u32 {
        self.interrupt_parent()
            .and_then(|parent| parent.property_read_u32("#interrupt-cells"))
            .unwrap_or(0)
    }

    /// Number of complete interrupt specifiers in the node's `interrupts` property.
    pub fn irq_count(&self) -> usize {
        let cells = self.n_interrupt_cells() as usize;
        if cells == 0 {
            return 0;
        }
        self.get_property("interrupts")
            .map_or(0, |prop| prop.length() / 4 / cells)
    }

    pub fn property_read_u32(&self, name: &str) -> Option<u32> {
        self.property_read_u32_index(name, 0)
    }

    /// Reads the `index`th 32-bit cell of property `name`.
    pub fn property_read_u32_index(&self, name: &str, index: usize) -> Option<u32> {
        let offset = index.checked_mul(4)?;
        self.get_property(name)?.get_u32(offset).ok()
    }

    pub fn property_read_string(&self, name: &str) -> Option<&'a str> {
        self.property_read_string_index(name, 0)
    }

    /// Reads the `index`th entry of the string list property `name`.
    pub fn property_read_string_index(&self, name: &str, index: usize) -> Option<&'a str> {
        let entry = self.get_property(name)?.iter_str().nth(index)?;
        core::str::from_utf8(entry).ok()
    }

    pub fn property_count_strings(&self, name: &str) -> Option<usize> {
        self.get_property(name)?.get_str_count().ok()
    }
}
