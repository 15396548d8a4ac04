use crate::priv_util::align_up;

/// A forward-only cursor over the tree's memory block.
///
/// The cursor is an offset from the start of the block, so the same sequence of reservations
/// yields the same offsets whether the block exists yet or not. The measuring pass runs it
/// against nothing and reads the final offset as the required size; the populating pass runs it
/// again and writes records at the offsets it hands out.
///
/// No bounds checks are made here. The populating pass checks each record against the block it
/// was given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor(usize);

impl Cursor {
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Align the cursor up to `align`, return that offset and advance past `size` bytes.
    ///
    /// `align` must be a power of two.
    pub fn reserve(&mut self, size: usize, align: usize) -> usize {
        debug_assert!(align.is_power_of_two());
        let at = align_up(self.0, align);
        self.0 = at + size;
        at
    }

    /// Bytes consumed so far, including alignment padding.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_aligns_before_advancing() {
        let mut cur = Cursor::new();
        assert_eq!(cur.reserve(5, 8), 0);
        assert_eq!(cur.offset(), 5);
        assert_eq!(cur.reserve(4, 8), 8);
        assert_eq!(cur.reserve(1, 4), 12);
        assert_eq!(cur.reserve(0, 1), 13);
        assert_eq!(cur.offset(), 13);
    }

    #[test]
    fn identical_reservations_give_identical_offsets() {
        let plan = [(48, 8), (7, 1), (32, 8), (3, 4), (64, 8)];

        let mut measured = Cursor::new();
        let first: [usize; 5] = {
            let mut out = [0; 5];
            for (slot, (size, align)) in out.iter_mut().zip(plan.iter()) {
                *slot = measured.reserve(*size, *align);
            }
            out
        };

        let mut built = Cursor::new();
        for (expect, (size, align)) in first.iter().zip(plan.iter()) {
            assert_eq!(built.reserve(*size, *align), *expect);
        }
        assert_eq!(built, measured);
    }
}
