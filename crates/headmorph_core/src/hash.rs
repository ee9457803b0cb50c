//! Name hashing
//!
//! Morph and model names are keyed by the host's 32-bit Jenkins
//! one-at-a-time hash. ASCII letters are folded to lowercase first, so
//! `"MP_M_Freemode_01"` and `"mp_m_freemode_01"` share a key.

/// Hash a name the way the host engine does.
pub const fn joaat(name: &str) -> u32 {
    let bytes = name.as_bytes();
    let mut hash: u32 = 0;
    let mut i = 0;

    while i < bytes.len() {
        hash = hash.wrapping_add(bytes[i].to_ascii_lowercase() as u32);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
        i += 1;
    }

    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash.wrapping_add(hash << 15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_model_hash() {
        assert_eq!(joaat("mp_m_freemode_01"), 0x705E_61F2);
    }

    #[test]
    fn folds_ascii_case() {
        assert_eq!(joaat("Micro_Cheek_Up"), joaat("micro_cheek_up"));
        assert_ne!(joaat("micro_cheek_up"), joaat("micro_cheek_down"));
    }

    #[test]
    fn empty_name_hashes_to_zero() {
        assert_eq!(joaat(""), 0);
    }
}
