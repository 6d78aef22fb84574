use rand::Rng;

use crate::identity::LicenseCode;

/// Lower-case alphanumerics without the look-alikes 0/o and 1/l.
const CODE_CHARSET: &[u8] = b"abcdefghijkmnpqrstuvwxyz23456789";
/// 24 chars from 32 symbols: 120 bits.
pub const CODE_LEN: usize = 24;

/// Generate `count` random license codes.
///
/// Must be called outside a store transaction: a retried body would
/// otherwise draw a different pool each attempt.
pub fn generate_license_codes(count: usize) -> Vec<LicenseCode> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let code: String = (0..CODE_LEN)
                .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
                .collect();
            LicenseCode::from_generated(code)
        })
        .collect()
}
