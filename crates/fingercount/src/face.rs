//! Face mesh estimation.

pub mod landmark;
