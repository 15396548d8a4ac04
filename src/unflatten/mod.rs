//! Unflattening of a device tree blob into a linked tree of nodes and properties.
//!
//! Utilities in this module operate on a [`DeviceTree`]. The tree keeps every node and property
//! record in a single block taken from a caller supplied [`GlobalAlloc`], so it can be built
//! early during boot from whatever heap the kernel has.
//!
//! # Background
//!
//! The exact size of the tree is not known until the whole blob has been walked. Building it is
//! therefore done in two passes over the structure block which share all their decoding logic:
//!
//! 1. The measuring pass advances a [`layout::Cursor`] over every record the tree will contain,
//!    without writing anything.
//! 2. One block of the measured size is allocated, plus a trailing canary.
//! 3. The populating pass replays the same reservations, writing and linking records.
//! 4. The canary is checked. A disagreement between the passes is reported as
//!    [`DevTreeError::SizeMismatch`] and the block is released.
//!
//! Property values are not copied: they borrow from the blob. The only exception is the `name`
//! property synthesized for nodes which have none, which lives in the block itself.
//!
//! # Examples
//!
//! ```
//! # use of_unflatten::base::DevTree;
//! # let blob: &[u8] = &[];
//! use of_unflatten::prelude::*;
//! use of_unflatten::unflatten::*;
//!
//! let devtree = DevTree::new(blob).expect("Buffer does not contain a device tree.");
//!
//! // Pick any allocator. In a kernel this is the kernel heap.
//! let tree = DeviceTree::new(devtree, &std::alloc::System).unwrap();
//!
//! let uart = tree.find_compatible(None, None, "ns16550a").unwrap();
//! let clock = uart.property_read_u32("clock-frequency");
//! for prop in uart.props() {
//!     println!("{:?}", prop.name());
//! }
//! ```
//!
//! [`GlobalAlloc`]: core::alloc::GlobalAlloc

#[cfg(doc)]
use crate::error::DevTreeError;

mod builder;
pub mod layout;

#[doc(hidden)]
pub mod node;
#[doc(hidden)]
pub mod prop;
#[doc(hidden)]
pub mod query;
#[doc(hidden)]
pub mod tree;

pub mod iters;

#[doc(inline)]
pub use node::DeviceNode;
#[doc(inline)]
pub use prop::DeviceProp;
#[doc(inline)]
pub use query::OfDeviceId;
#[doc(inline)]
pub use tree::{DeviceTree, UnflattenState};
