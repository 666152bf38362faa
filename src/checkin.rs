//! Check-in code generation.
//!
//! Codes use an alphabet without look-alike characters (no 0/O, 1/I/L) so they can be
//! read out at a center's front desk.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Upper bound on retries when a generated code collides with an active one.
const MAX_ATTEMPTS: usize = 64;

#[derive(Debug)]
pub struct CodeGenerator {
    rng: StdRng,
    len: usize,
}

impl CodeGenerator {
    /// Seeded generator: same seed ⇒ same code sequence. `None` seeds from entropy.
    pub fn new(seed: Option<u64>, len: usize) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng, len: len.max(1) }
    }

    pub fn next_code(&mut self) -> String {
        (0..self.len)
            .map(|_| CODE_ALPHABET[self.rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }

    /// Next code for which `in_use` is false, or `None` after repeated collisions.
    pub fn unique_code(&mut self, in_use: impl Fn(&str) -> bool) -> Option<String> {
        (0..MAX_ATTEMPTS)
            .map(|_| self.next_code())
            .find(|code| !in_use(code))
    }
}

/// Normalize user input before lookup: trim, uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
