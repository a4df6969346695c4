//! Utilities for numerics.

/// Applies the standard sigmoid/logistic function to the input.
///
/// Some networks output raw logits for their confidence values, this maps them to the 0.0 to 1.0
/// range.
pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}
