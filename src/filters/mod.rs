//! Filter building blocks shared by all engines.
//!
//! ## Supported Formats
//!
//! | Format | Shape | Type | Description |
//! |--------|-------|------|-------------|
//! | Grayscale8 | (H, W, 1) | u8 | Single luminance channel, 0-255 |
//! | RGB8 | (H, W, 3) | u8 | Red, green, blue, 0-255 |
//! | RGBA8 | (H, W, 4) | u8 | RGB + alpha, 0-255 |
//!
//! The high-pass convolution treats every channel as an independent sample
//! plane, alpha included. [`grayscale`] reduces color input to one plane
//! first when the caller wants the luminance-only pipeline.
//!
//! ## Modules
//!
//! - **kernel**: high-pass kernel construction and size validation
//! - **core**: per-pixel convolution with edge replication and clamping
//! - **grayscale**: average and BT.709 reductions to one channel

pub mod core;
pub mod grayscale;
pub mod kernel;
