//! ISO-TP request/response address arithmetic
//!
//! 11-bit diagnostic IDs answer on `tx + offset` (typically `0x7E0` →
//! `0x7E8`). 29-bit normal-fixed IDs (`0x18DA<target><source>`) answer with
//! target and source swapped, so the offset does not apply.

/// Default offset between a physical request ID and its response ID
pub const DEFAULT_RX_OFFSET: i32 = 0x8;

/// Functional (broadcast) request IDs; these have no single response ID
pub const FUNCTIONAL_ADDRS: [u32; 2] = [0x7DF, 0x18DB33F1];

/// Response address for a request address.
///
/// Pass a negated offset to recover the request address from a response
/// address. Returns `None` for functional addresses and for offsets that
/// would leave the `u32` range.
pub fn rx_addr_for_tx_addr(tx_addr: u32, rx_offset: i32) -> Option<u32> {
    if FUNCTIONAL_ADDRS.contains(&tx_addr) {
        return None;
    }

    if tx_addr < 0xFFFF {
        u32::try_from(i64::from(tx_addr) + i64::from(rx_offset)).ok()
    } else {
        Some((tx_addr & 0xFFFF_0000) | ((tx_addr << 8) & 0xFF00) | ((tx_addr >> 8) & 0xFF))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x7E0, 0x8, Some(0x7E8))]
    #[case(0x7E8, -0x8, Some(0x7E0))]
    #[case(0x750, 0x6A, Some(0x7BA))]
    #[case(0x18DA30F1, 0x8, Some(0x18DAF130))]
    #[case(0x18DAF130, -0x8, Some(0x18DA30F1))]
    #[case(0x7DF, 0x8, None)]
    #[case(0x18DB33F1, 0x8, None)]
    #[case(0x4, -0x8, None)]
    fn test_rx_addr_for_tx_addr(
        #[case] tx: u32,
        #[case] offset: i32,
        #[case] expected: Option<u32>,
    ) {
        assert_eq!(rx_addr_for_tx_addr(tx, offset), expected);
    }
}
