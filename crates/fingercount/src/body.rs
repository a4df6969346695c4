//! Body pose estimation.

pub mod landmark;
