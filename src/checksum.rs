//! Byte-sum checksum used by the G3A loader.
//!
//! The checksum is the sum of every byte, treated as unsigned, modulo 2^32.
//! Because it is a plain sum it is additive under concatenation, which lets
//! the container builder fold the payload and the header separately.

/// One-shot checksum of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |sum, &b| sum.wrapping_add(b as u32))
}

/// Running checksum, fed in stream order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sum = self.sum.wrapping_add(checksum(data));
    }

    /// Fold in a checksum computed elsewhere.
    pub fn combine(&mut self, other: u32) {
        self.sum = self.sum.wrapping_add(other);
    }

    pub fn finalize(self) -> u32 {
        self.sum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_is_zero() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(Checksum::new().finalize(), 0);
    }

    #[test]
    fn sums_unsigned_bytes() {
        assert_eq!(checksum(&[0xFF, 0xFF, 0x02]), 0x200);
    }

    #[test]
    fn wraps_at_u32() {
        let mut ck = Checksum::new();
        ck.combine(u32::MAX);
        ck.update(&[2]);
        assert_eq!(ck.finalize(), 1);
    }

    proptest! {
        #[test]
        fn additive_under_concatenation(a in proptest::collection::vec(any::<u8>(), 0..512),
                                        b in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut joined = a.clone();
            joined.extend_from_slice(&b);
            prop_assert_eq!(checksum(&joined), checksum(&a).wrapping_add(checksum(&b)));
        }

        #[test]
        fn running_matches_one_shot(data in proptest::collection::vec(any::<u8>(), 0..2048),
                                    split in 0usize..2048) {
            let split = split.min(data.len());
            let mut ck = Checksum::new();
            ck.update(&data[..split]);
            ck.update(&data[split..]);
            prop_assert_eq!(ck.finalize(), checksum(&data));
        }
    }
}
