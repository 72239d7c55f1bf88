//! Bucket hash for tag strings
//!
//! Bytes are folded into a 64-bit accumulator eight bits at a time; each full
//! word is mixed into the running hash with a multiplicative constant. The
//! string length is folded in as a terminator, and the top `bits` bits of the
//! final mix select the bucket.

/// 2^63 + 2^61 - 2^57 + 2^54 - 2^51 - 2^18 + 1
const GOLDEN_RATIO_PRIME_64: u64 = 0x9e37_ffff_fffc_0001;

/// Smallest and largest supported bucket-count exponent
pub const MIN_HASH_BITS: u32 = 1;
pub const MAX_HASH_BITS: u32 = 20;

#[inline]
fn mix(v: u64) -> u64 {
    v.wrapping_mul(GOLDEN_RATIO_PRIME_64)
}

/// Bucket index of `tag` in a table of `2^bits` buckets
///
/// `bits` must lie in `MIN_HASH_BITS..=MAX_HASH_BITS`; callers validate it.
pub fn hash_tag(tag: &str, bits: u32) -> usize {
    let mut hash: u64 = 0;
    let mut word: u64 = 0;
    let mut len: usize = 0;

    for &c in tag.as_bytes() {
        word = (word << 8) | u64::from(c);
        len += 1;
        if len % 8 == 0 {
            hash = mix(hash ^ word);
            word = 0;
        }
    }
    word = (word << 8) | (len as u8 as u64);
    hash = mix(hash ^ word);

    (hash >> (64 - bits)) as usize
}
