//! WebAssembly exports for the high-pass filter.
//!
//! These functions are exposed to JavaScript via wasm-bindgen. Browsers give
//! us no threads by default, so only the sequential engine is exported.

use ndarray::Array3;
use wasm_bindgen::prelude::*;

use crate::config::FilterConfig;
use crate::engine::{sequential, Variant};
use crate::filters::grayscale::to_gray_average_u8;

fn to_image(data: &[u8], width: usize, height: usize, channels: usize) -> Result<Array3<u8>, JsValue> {
    Array3::from_shape_vec((height, width, channels), data.to_vec())
        .map_err(|e| JsValue::from_str(&format!("invalid dimensions: {e}")))
}

/// Apply the high-pass filter to a flat u8 buffer.
///
/// # Arguments
/// * `data` - Flat array of samples (length = width * height * channels)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `channels` - Samples per pixel (1, 3 or 4)
/// * `kernel_size` - Odd kernel size, 3-11
///
/// # Returns
/// Flat array with the filtered samples, same layout as the input
#[wasm_bindgen]
pub fn high_pass_wasm(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    kernel_size: usize,
) -> Result<Vec<u8>, JsValue> {
    let input = to_image(data, width, height, channels)?;
    let config = FilterConfig::new(Variant::Sequential, kernel_size);

    let output = sequential::run(input.view(), &config)
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(output.image.into_raw_vec_and_offset().0)
}

/// Reduce an RGB/RGBA buffer to one gray sample per pixel (channel average).
#[wasm_bindgen]
pub fn grayscale_wasm(
    data: &[u8],
    width: usize,
    height: usize,
    channels: usize,
) -> Result<Vec<u8>, JsValue> {
    let input = to_image(data, width, height, channels)?;
    Ok(to_gray_average_u8(input.view()).into_raw_vec_and_offset().0)
}
