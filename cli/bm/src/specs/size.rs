//! Size spec parsing.
//!
//! Sizes are entered as a number with an optional unit, e.g. `25`, `2 GiB`,
//! `200MB`. The result is always in MiB. A bare number means GiB.

use thiserror::Error;

/// Number of MiB in one GiB.
const GIB: u64 = 1024;

/// Errors produced while parsing a size spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizeSpecError {
    #[error("empty size specification")]
    Empty,

    #[error("unexpected '{character}' at position {offset} in size specification")]
    Unexpected { character: char, offset: usize },

    #[error("size specification '{0}' is too large")]
    TooLarge(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Digits,
    Gap,
    Unit,
    Binary,
    Bytes,
}

/// Parse a size spec into MiB.
///
/// Grammar: `digits [space*] [M|G [i] [B]]`, unit letters case-insensitive.
/// `M` multiplies by 1, `G` (or no unit at all) by 1024.
pub fn parse_size(spec: &str) -> Result<u64, SizeSpecError> {
    if spec.is_empty() {
        return Err(SizeSpecError::Empty);
    }

    let mut state = State::Digits;
    let mut digits_end = 0;
    let mut multiplier = GIB;

    for (offset, character) in spec.char_indices() {
        let unexpected = SizeSpecError::Unexpected { character, offset };
        state = match (state, character) {
            (State::Digits, c) if c.is_ascii_digit() => {
                digits_end = offset + 1;
                State::Digits
            }
            (State::Digits | State::Gap, c) if digits_end > 0 && c.is_whitespace() => State::Gap,
            (State::Digits | State::Gap, 'm' | 'M') if digits_end > 0 => {
                multiplier = 1;
                State::Unit
            }
            (State::Digits | State::Gap, 'g' | 'G') if digits_end > 0 => {
                multiplier = GIB;
                State::Unit
            }
            (State::Unit, 'i' | 'I') => State::Binary,
            (State::Unit | State::Binary, 'b' | 'B') => State::Bytes,
            _ => return Err(unexpected),
        };
    }

    let amount: u64 = spec[..digits_end]
        .parse()
        .map_err(|_| SizeSpecError::TooLarge(spec.to_string()))?;

    amount
        .checked_mul(multiplier)
        .ok_or_else(|| SizeSpecError::TooLarge(spec.to_string()))
}
