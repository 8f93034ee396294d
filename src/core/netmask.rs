//! Prefix length <-> netmask conversion for IPv4 endpoints
//!
//! Masks are handled as host-order `u32` values here; callers convert to
//! network order when filling kernel records.

/// Width of an IPv4 address in bits
pub const IPV4_BITS: u8 = 32;

/// Returns the mask with the top `bits` bits set.
///
/// Prefix lengths above 32 saturate to a full mask.
///
/// ```
/// use fwchains::core::netmask::prefix_to_mask;
///
/// assert_eq!(prefix_to_mask(24), 0xFFFF_FF00);
/// assert_eq!(prefix_to_mask(0), 0);
/// ```
pub const fn prefix_to_mask(bits: u8) -> u32 {
    if bits == 0 {
        0
    } else if bits >= IPV4_BITS {
        u32::MAX
    } else {
        u32::MAX << (IPV4_BITS - bits)
    }
}

/// Returns the number of leading one bits of `mask`.
///
/// Non-contiguous masks are truncated at the first zero bit.
pub const fn mask_to_prefix(mask: u32) -> u8 {
    mask.leading_ones() as u8
}
