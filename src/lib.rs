//! A flattened device tree unflattener for embedded no-std kernels.
//!
//! The boot loader hands the kernel a device tree blob. This crate turns it into a linked tree
//! of nodes and properties, allocated as a single block from the kernel's own allocator, and
//! provides the lookups drivers use to find their hardware: by path, name, type, phandle,
//! compatible string and interrupt parent.
//!
//! # Features
//!
//! This crate can be used without the standard library (`#![no_std]`) by disabling the default
//! `std` feature. Use this in `Cargo.toml`:
//!
//! ```toml
//! [dependencies.of-unflatten]
//! version = "0.1"
//! default-features = false
//! # features = ["alloc"]
//! ```
//!
//! The "alloc" feature only forwards to the iterator library. Trees are always built from an
//! explicitly passed [`core::alloc::GlobalAlloc`].
//!
//! # Examples
//!
//! ```
//! use of_unflatten::machine::Machine;
//!
//! # let blob: &[u8] = &[];
//! let mut machine = Machine::new(&std::alloc::System);
//! if machine.setup_from_slice(blob).is_ok() {
//!     let chosen = machine.find_by_path("/chosen");
//! }
//! ```
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate core;
extern crate endian_type_rs as endian_type;
#[macro_use]
extern crate memoffset;
#[macro_use]
extern crate static_assertions;

pub mod base;
pub mod error;
pub mod machine;
pub mod prelude;
pub mod spec;
pub mod unflatten;

pub mod common {
    pub mod prop;
}

mod priv_util;
