//! Generation parameters sent with every completion request.

use thiserror::Error;

/// Validated sampling configuration.
///
/// `temperature` is within `0.0..=2.0` and `max_output_tokens` is non-zero,
/// guaranteed by construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationParamsError {
    #[error("temperature {0} is outside 0.0..=2.0")]
    Temperature(f32),
    #[error("max output tokens must be greater than zero")]
    ZeroOutputTokens,
}

impl GenerationParams {
    /// Construct from constants known to be valid.
    ///
    /// Panics at compile time when used in a `const` context with invalid values.
    #[must_use]
    pub const fn fixed(temperature: f32, max_output_tokens: u32) -> Self {
        assert!(temperature >= 0.0 && temperature <= 2.0);
        assert!(max_output_tokens > 0);
        Self {
            temperature,
            max_output_tokens,
        }
    }

    pub fn new(temperature: f32, max_output_tokens: u32) -> Result<Self, GenerationParamsError> {
        if !(0.0..=2.0).contains(&temperature) {
            return Err(GenerationParamsError::Temperature(temperature));
        }
        if max_output_tokens == 0 {
            return Err(GenerationParamsError::ZeroOutputTokens);
        }
        Ok(Self {
            temperature,
            max_output_tokens,
        })
    }

    #[must_use]
    pub const fn temperature(&self) -> f32 {
        self.temperature
    }

    #[must_use]
    pub const fn max_output_tokens(&self) -> u32 {
        self.max_output_tokens
    }
}
