#![allow(dead_code)]

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;
use std::ptr;

const FDT_MAGIC: u32 = 0xd00d_feed;
const HEADER_SIZE: usize = 40;
// A single empty reservation entry terminates the memory reservation map.
const RSVMAP_SIZE: usize = 16;
const STRUCT_OFFSET: usize = HEADER_SIZE + RSVMAP_SIZE;

/// Emits device tree blobs token by token.
///
/// Legacy writers (version 3) expect full paths as node names and pad long property values to
/// eight bytes, as old blobs do. The structure block starts on an 8-byte boundary so that
/// padding is the same relative to the block and to the blob.
pub struct FdtWriter {
    version: u32,
    structs: Vec<u8>,
    strings: Vec<u8>,
}

impl FdtWriter {
    pub fn new() -> Self {
        Self::with_version(17)
    }

    pub fn legacy() -> Self {
        Self::with_version(3)
    }

    fn with_version(version: u32) -> Self {
        Self {
            version,
            structs: Vec::new(),
            strings: Vec::new(),
        }
    }

    fn word(&mut self, w: u32) -> &mut Self {
        self.structs.extend_from_slice(&w.to_be_bytes());
        self
    }

    fn pad(&mut self, align: usize) {
        while self.structs.len() % align != 0 {
            self.structs.push(0);
        }
    }

    fn string(&mut self, name: &str) -> u32 {
        let mut off = 0;
        for s in self.strings.split(|b| *b == 0) {
            if s == name.as_bytes() && off < self.strings.len() {
                return off as u32;
            }
            off += s.len() + 1;
        }
        let off = self.strings.len();
        self.strings.extend_from_slice(name.as_bytes());
        self.strings.push(0);
        off as u32
    }

    pub fn begin_node(&mut self, name: &str) -> &mut Self {
        self.word(1);
        self.structs.extend_from_slice(name.as_bytes());
        self.structs.push(0);
        self.pad(4);
        self
    }

    pub fn end_node(&mut self) -> &mut Self {
        self.word(2)
    }

    pub fn nop(&mut self) -> &mut Self {
        self.word(4)
    }

    pub fn prop(&mut self, name: &str, value: &[u8]) -> &mut Self {
        let nameoff = self.string(name);
        self.word(3).word(value.len() as u32).word(nameoff);
        if self.version < 0x10 && value.len() >= 8 {
            self.pad(8);
        }
        self.structs.extend_from_slice(value);
        self.pad(4);
        self
    }

    pub fn prop_empty(&mut self, name: &str) -> &mut Self {
        self.prop(name, &[])
    }

    pub fn prop_u32(&mut self, name: &str, value: u32) -> &mut Self {
        self.prop(name, &value.to_be_bytes())
    }

    pub fn prop_cells(&mut self, name: &str, cells: &[u32]) -> &mut Self {
        let value: Vec<u8> = cells.iter().flat_map(|c| c.to_be_bytes().to_vec()).collect();
        self.prop(name, &value)
    }

    pub fn prop_str(&mut self, name: &str, value: &str) -> &mut Self {
        self.prop_strs(name, &[value])
    }

    pub fn prop_strs(&mut self, name: &str, values: &[&str]) -> &mut Self {
        let mut value = Vec::new();
        for s in values {
            value.extend_from_slice(s.as_bytes());
            value.push(0);
        }
        self.prop(name, &value)
    }

    pub fn finish(mut self) -> Blob {
        self.word(9);

        let off_strings = STRUCT_OFFSET + self.structs.len();
        let totalsize = off_strings + self.strings.len();
        let header = [
            FDT_MAGIC,
            totalsize as u32,
            STRUCT_OFFSET as u32,
            off_strings as u32,
            HEADER_SIZE as u32,
            self.version,
            if self.version < 0x10 { 2 } else { 16 },
            0,
            self.strings.len() as u32,
            self.structs.len() as u32,
        ];

        let mut bytes = Vec::with_capacity(totalsize);
        for w in header.iter() {
            bytes.extend_from_slice(&w.to_be_bytes());
        }
        bytes.resize(STRUCT_OFFSET, 0);
        bytes.extend_from_slice(&self.structs);
        bytes.extend_from_slice(&self.strings);
        Blob::new(&bytes)
    }
}

/// An 8-byte aligned copy of a blob.
pub struct Blob {
    words: Vec<u64>,
    len: usize,
}

impl Blob {
    fn new(bytes: &[u8]) -> Self {
        let mut blob = Self {
            words: vec![0; (bytes.len() + 7) / 8],
            len: bytes.len(),
        };
        blob.bytes_mut().copy_from_slice(bytes);
        blob
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.words.as_ptr() as *const u8, self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr() as *mut u8, self.len) }
    }
}

/// The blob from the end-to-end scenario:
///
/// ```text
/// / {
///     cpus { cpu@0 { compatible = "vendor,cpu"; phandle = <1>; }; };
///     chosen { interrupt-parent = <1>; };
/// };
/// ```
pub fn sample_blob(cpu_is_intc: bool) -> Blob {
    let mut w = FdtWriter::new();
    w.begin_node("")
        .begin_node("cpus")
        .begin_node("cpu@0")
        .prop_str("compatible", "vendor,cpu")
        .prop_u32("phandle", 1);
    if cpu_is_intc {
        w.prop_u32("#interrupt-cells", 1);
    }
    w.end_node()
        .end_node()
        .begin_node("chosen")
        .prop_u32("interrupt-parent", 1)
        .end_node()
        .end_node();
    w.finish()
}

/// Wraps the system allocator, counting allocations and optionally refusing them once a budget
/// is spent.
#[derive(Default)]
pub struct TestAlloc {
    allocs: Cell<usize>,
    frees: Cell<usize>,
    live: Cell<usize>,
    budget: Cell<Option<usize>>,
    last: Cell<Option<Layout>>,
}

impl TestAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `n` allocations and refuses every one after.
    pub fn failing_after(n: usize) -> Self {
        let alloc = Self::default();
        alloc.budget.set(Some(n));
        alloc
    }

    pub fn allocs(&self) -> usize {
        self.allocs.get()
    }

    pub fn frees(&self) -> usize {
        self.frees.get()
    }

    pub fn live(&self) -> usize {
        self.live.get()
    }

    pub fn last_layout(&self) -> Option<Layout> {
        self.last.get()
    }
}

unsafe impl GlobalAlloc for TestAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if let Some(left) = self.budget.get() {
            if left == 0 {
                return ptr::null_mut();
            }
            self.budget.set(Some(left - 1));
        }
        let ptr = System.alloc(layout);
        if !ptr.is_null() {
            self.allocs.set(self.allocs.get() + 1);
            self.live.set(self.live.get() + 1);
            self.last.set(Some(layout));
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        System.dealloc(ptr, layout);
        self.frees.set(self.frees.get() + 1);
        self.live.set(self.live.get() - 1);
    }
}
