//! Coordinate quantization.
//!
//! Surface samples are mapped from a real interval onto the integer codes
//! `0..=2^bits - 1` before hashing, so that nearly equal coordinates collapse
//! onto the same code.

use thiserror::Error;

/// Largest supported quantization precision.
pub const MAX_BITS: u32 = 32;

/// Errors raised while quantizing coordinates.
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("quantization precision must be between 1 and 32 bits, got {0}")]
    InvalidBits(u32),

    #[error("quantization range [{min}, {max}] is empty or not finite")]
    EmptyRange { min: f64, max: f64 },

    #[error("non-finite coordinate {value} at point {index}")]
    NonFinite { index: usize, value: f64 },
}

/// Result type for transform operations.
pub type Result<T> = std::result::Result<T, TransformError>;

/// Maps coordinates in `[min, max]` to `bits`-bit integer codes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    bits: u32,
    min: f64,
    max: f64,
    levels: f64,
}

impl Quantizer {
    /// Create a quantizer over `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `bits` is outside `1..=32`, or the range is empty
    /// or too wide to scale in `f64`.
    pub fn new(bits: u32, min: f64, max: f64) -> Result<Self> {
        if bits == 0 || bits > MAX_BITS {
            return Err(TransformError::InvalidBits(bits));
        }
        if !(max > min) || !min.is_finite() || !max.is_finite() || !(max - min).is_finite() {
            return Err(TransformError::EmptyRange { min, max });
        }
        Ok(Self {
            bits,
            min,
            max,
            levels: ((1u64 << bits) - 1) as f64,
        })
    }

    /// Quantizer over the unit cube `[-1, 1]`.
    pub fn unit(bits: u32) -> Result<Self> {
        Self::new(bits, -1.0, 1.0)
    }

    #[inline]
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Highest code this quantizer produces.
    #[inline]
    pub fn max_code(&self) -> i64 {
        self.levels as i64
    }

    /// Quantize a single value. Returns `None` for NaN or infinities.
    ///
    /// Values are scaled onto `[0, 2^bits - 1]`, clipped, then truncated.
    #[inline]
    pub fn quantize(&self, value: f64) -> Option<i64> {
        if !value.is_finite() {
            return None;
        }
        let scaled = (value - self.min) * self.levels / (self.max - self.min);
        Some(scaled.clamp(0.0, self.levels) as i64)
    }

    /// Quantize a sequence of 3-D points.
    pub fn quantize_points(&self, points: &[[f64; 3]]) -> Result<Vec<[i64; 3]>> {
        let mut codes = Vec::with_capacity(points.len());
        for (index, point) in points.iter().enumerate() {
            let mut code = [0i64; 3];
            for (axis, &value) in point.iter().enumerate() {
                code[axis] = self
                    .quantize(value)
                    .ok_or(TransformError::NonFinite { index, value })?;
            }
            codes.push(code);
        }
        Ok(codes)
    }
}

/// Serialize quantized points to their canonical byte form.
///
/// Codes are written row-major as little-endian `i64`, three per point.
pub fn codes_to_bytes(codes: &[[i64; 3]]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(codes.len() * 3 * std::mem::size_of::<i64>());
    for code in codes {
        for value in code {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }
    bytes
}
