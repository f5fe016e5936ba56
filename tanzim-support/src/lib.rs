//! # Tanzim Support
//!
//! Shared text utilities for the Tanzim container crates.
//!
//! This crate provides:
//! - Rendering of dependency paths and cycles for diagnostics
//! - Type-name shortening and "did you mean?" suggestions

pub mod rendering;
