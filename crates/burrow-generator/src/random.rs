use crate::Generator;
use burrow_core::ShortCode;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of the codes minted by default.
pub const DEFAULT_CODE_LENGTH: usize = 8;

/// Draws codes uniformly from `[A-Za-z0-9]`.
///
/// Each call uses the thread-local RNG, so the generator holds no shared
/// mutable state and can be called from many tasks at once. With the
/// default length the code space holds 62^8 (about 2.2e14) values.
#[derive(Debug, Clone, Copy)]
pub struct RandomGenerator {
    length: usize,
}

impl RandomGenerator {
    pub fn new() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
        }
    }

    /// Creates a generator producing codes of `length` characters.
    ///
    /// `length` is clamped into the 3..=32 range accepted by [`ShortCode`].
    pub fn with_length(length: usize) -> Self {
        Self {
            length: length.clamp(3, 32),
        }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator for RandomGenerator {
    type Output = ShortCode;

    fn generate(&self) -> ShortCode {
        let code: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect();
        ShortCode::new_unchecked(code)
    }
}
