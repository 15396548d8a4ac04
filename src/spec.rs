use endian_type::types::u32_be;
use num_derive::FromPrimitive;

pub const FDT_MAGIC: u32 = 0xd00d_feed;

/// First format version whose node names are bare path segments and whose property values are
/// only ever 4-byte aligned.
pub const FDT_FIRST_MODERN_VERSION: u32 = 0x10;

/// Longest node name we are willing to scan for a terminating NUL.
pub const MAX_NODE_NAME_LEN: usize = 256;

/// Written after the end of the unflattened tree and checked once it has been populated.
pub const TREE_CANARY: u32 = FDT_MAGIC;

/// Stand-in for a node's `name` or `device_type` when the blob provides neither.
pub const NULL_STR: &str = "<null>";

pub type Phandle = u32;

#[derive(FromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FdtTok {
    BeginNode = 0x1,
    EndNode = 0x2,
    Prop = 0x3,
    Nop = 0x4,
    End = 0x9,
}

// As defined by the devicetree format.
#[repr(C)]
pub struct fdt_header {
    pub magic: u32_be,
    pub totalsize: u32_be,
    pub off_dt_struct: u32_be,
    pub off_dt_strings: u32_be,
    pub off_mem_rsvmap: u32_be,
    pub version: u32_be,
    pub last_comp_version: u32_be,
    pub boot_cpuid_phys: u32_be,
    pub size_dt_strings: u32_be,
    pub size_dt_struct: u32_be,
}

#[repr(C)]
pub struct fdt_prop_header {
    pub len: u32_be,
    pub nameoff: u32_be,
}
