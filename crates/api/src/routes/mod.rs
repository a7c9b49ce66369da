//! HTTP route handlers

pub mod batteries;
pub mod predictions;
