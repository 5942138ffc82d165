use rand::Rng;

/// Upper-case letters and digits minus the look-alikes `I`, `O`, `0` and `1`.
pub const ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const LENGTH: usize = 6;

pub fn generate() -> String {
    let mut rng = rand::thread_rng();
    (0..LENGTH)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Codes are typed by hand, so matching ignores case and surrounding space.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
