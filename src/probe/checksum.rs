/// Internet checksum (RFC 1071) over an arbitrary byte buffer
///
/// The buffer is summed as big-endian 16-bit words. A trailing odd byte is
/// padded with a zero byte. The 32-bit sum is folded until it fits in 16 bits
/// and then complemented.
pub fn checksum(buffer: &[u8]) -> u16 {
    !fold(sum_words(buffer))
}

/// Returns true if the buffer, checksum field included, sums to zero
pub fn verify(buffer: &[u8]) -> bool {
    checksum(buffer) == 0
}

fn sum_words(buffer: &[u8]) -> u32 {
    let mut chunks = buffer.chunks_exact(2);
    let mut sum: u32 = chunks
        .by_ref()
        .map(|word| u16::from_be_bytes([word[0], word[1]]) as u32)
        .fold(0u32, u32::wrapping_add);

    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add((*last as u32) << 8);
    }

    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer() {
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_rfc1071_example() {
        // Worked example from RFC 1071 section 3
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(checksum(&data), !0xddf2);
    }

    #[test]
    fn test_odd_length_pads_with_zero() {
        assert_eq!(checksum(&[0xAB]), checksum(&[0xAB, 0x00]));
        assert_eq!(checksum(&[0x12, 0x34, 0x56]), checksum(&[0x12, 0x34, 0x56, 0x00]));
    }

    #[test]
    fn test_carry_is_folded() {
        // 0xFFFF + 0x0001 = 0x10000 -> folds to 0x0001
        assert_eq!(checksum(&[0xFF, 0xFF, 0x00, 0x01]), !0x0001);
    }

    #[test]
    fn test_inserted_checksum_verifies() {
        let mut data = vec![8, 0, 0, 0, 0x12, 0x34, 0x00, 0x01, b'a', b'b', b'c'];
        let cksum = checksum(&data);
        data[2..4].copy_from_slice(&cksum.to_be_bytes());
        assert!(verify(&data));
    }

    use proptest::prelude::*;

    proptest! {
        /// Writing the checksum into a zeroed field always makes the buffer verify
        #[test]
        fn proptest_checksum_verifies(mut data in prop::collection::vec(0u8..=255, 4..512)) {
            data[2] = 0;
            data[3] = 0;
            let cksum = checksum(&data);
            data[2..4].copy_from_slice(&cksum.to_be_bytes());
            prop_assert!(verify(&data));
        }

        /// Never panics, whatever the length
        #[test]
        fn proptest_checksum_no_panic(data in prop::collection::vec(0u8..=255, 0..1500)) {
            let _ = checksum(&data);
        }
    }
}
