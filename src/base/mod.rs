//! Basic device tree utils that operate directly on the FDT.
//!
//! # Overview
//!
//! This module validates a blob's header and tokenizes its structure block on the fly. It is
//! the input side of the [`crate::unflatten`] engine, which consumes the token stream twice:
//! once to measure the tree and once to build it.
//!
//! # Examples
//!
//! ```
//! use of_unflatten::prelude::*;
//! use of_unflatten::base::*;
//! use of_unflatten::base::parse::ParsedTok;
//!
//! # let blob: &[u8] = &[];
//! let devtree = DevTree::new(blob).expect("Buffer does not contain a device tree.");
//!
//! let mut iter = devtree.parse_iter();
//! while let Some(tok) = iter.next().unwrap() {
//!     if let ParsedTok::BeginNode(node) = tok {
//!         println!("{:?}", node.name);
//!     }
//! }
//! ```

#[doc(hidden)]
pub mod tree;

pub mod parse;

#[doc(inline)]
pub use tree::*;
