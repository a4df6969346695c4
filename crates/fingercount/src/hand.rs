//! Hand landmark estimation and finger counting.

pub mod fingers;
pub mod landmark;
