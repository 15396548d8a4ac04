//! Ownership of the machine's device tree.
//!
//! A kernel sets up its device tree once at boot, from the blob the boot loader handed over,
//! and every driver queries it afterwards. [`Machine`] holds that tree along with the state of
//! the last attempt to build it. While no tree is set, every query answers "not found".

use core::alloc::GlobalAlloc;

use crate::base::DevTree;
use crate::error::Result;
use crate::spec::Phandle;
use crate::unflatten::{DeviceNode, DeviceTree, OfDeviceId, UnflattenState};

pub struct Machine<'i, 'dt> {
    alloc: &'i dyn GlobalAlloc,
    state: UnflattenState,
    tree: Option<DeviceTree<'i, 'dt>>,
}

impl<'i, 'dt> Machine<'i, 'dt> {
    /// Create a machine without a device tree. Trees are built from `alloc`.
    pub fn new(alloc: &'i dyn GlobalAlloc) -> Self {
        Self {
            alloc,
            state: UnflattenState::Uninitialized,
            tree: None,
        }
    }

    /// Build the device tree from the blob at `blob`, replacing any tree already set.
    ///
    /// A null pointer or a blob with a bad magic number leaves the machine without a tree. On any
    /// failure the state is [`UnflattenState::Failed`] and nothing stays allocated.
    ///
    /// # Safety
    ///
    /// `blob` must be null or satisfy the requirements of [`DevTree::from_raw_pointer`].
    pub unsafe fn setup(&mut self, blob: *const u8) -> Result<()> {
        self.teardown();
        let fdt = DevTree::from_raw_pointer(blob);
        self.build(fdt)
    }

    /// As [`Machine::setup`], for a blob already available as a slice.
    pub fn setup_from_slice(&mut self, blob: &'dt [u8]) -> Result<()> {
        self.teardown();
        let fdt = DevTree::new(blob);
        self.build(fdt)
    }

    fn build(&mut self, fdt: Result<DevTree<'dt>>) -> Result<()> {
        let fdt = fdt.map_err(|e| {
            if e.is_invalid_blob() {
                log::warn!("no device tree set up: {}", e);
            }
            self.state = UnflattenState::Failed;
            e
        })?;

        let state = &mut self.state;
        let built = DeviceTree::unflatten(fdt, self.alloc, |next| {
            log::trace!("device tree: {:?} -> {:?}", *state, next);
            *state = next;
        });

        match built {
            Ok(tree) => {
                self.tree = Some(tree);
                Ok(())
            }
            Err(e) => {
                log::trace!(
                    "device tree: {:?} -> {:?} ({})",
                    self.state,
                    UnflattenState::Failed,
                    e
                );
                self.state = UnflattenState::Failed;
                Err(e)
            }
        }
    }

    /// Release the tree, if any, and return to [`UnflattenState::Uninitialized`].
    pub fn teardown(&mut self) {
        self.tree = None;
        self.state = UnflattenState::Uninitialized;
    }

    #[must_use]
    pub fn state(&self) -> UnflattenState {
        self.state
    }

    pub fn tree(&self) -> Option<&DeviceTree<'i, 'dt>> {
        self.tree.as_ref()
    }

    pub fn root(&self) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree().map(DeviceTree::root)
    }

    pub fn find_by_path(&self, path: &str) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree()?.find_by_path(path)
    }

    pub fn find_by_name(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        name: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree()?.find_by_name(from, name)
    }

    pub fn find_by_type(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        ty: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree()?.find_by_type(from, ty)
    }

    pub fn find_by_phandle(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        handle: Phandle,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree()?.find_by_phandle(from, handle)
    }

    pub fn find_compatible(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        ty: Option<&str>,
        compat: &str,
    ) -> Option<DeviceNode<'_, 'i, 'dt>> {
        self.tree()?.find_compatible(from, ty, compat)
    }

    pub fn find_matching_node<'t, T>(
        &self,
        from: Option<&DeviceNode<'_, 'i, 'dt>>,
        table: &'t [OfDeviceId<T>],
    ) -> Option<(DeviceNode<'_, 'i, 'dt>, &'t OfDeviceId<T>)> {
        self.tree()?.find_matching_node(from, table)
    }
}

impl core::fmt::Debug for Machine<'_, '_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("tree", &self.tree)
            .finish()
    }
}
