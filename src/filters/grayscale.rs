//! Grayscale conversion applied before filtering.
//!
//! The ParaVision pipeline filters a single luminance plane. Two reductions
//! are offered:
//! - **Average**: integer mean of the three color channels, the default
//! - **BT.709**: ITU-R BT.709 luminosity weights
//!
//! Inputs may have 1, 3 or 4 channels. Alpha is ignored and single-channel
//! inputs are copied through. Output is always `(height, width, 1)`.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

/// ITU-R BT.709 luminosity coefficients
const LUMA_R: f32 = 0.2126;
const LUMA_G: f32 = 0.7152;
const LUMA_B: f32 = 0.0722;

/// How color samples are reduced to one gray sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrayscaleMethod {
    /// `(r + g + b) / 3`, truncated.
    #[default]
    Average,
    /// BT.709 weighted luminosity.
    Bt709,
}

impl GrayscaleMethod {
    pub fn apply(self, input: ArrayView3<u8>) -> Array3<u8> {
        match self {
            GrayscaleMethod::Average => to_gray_average_u8(input),
            GrayscaleMethod::Bt709 => to_gray_bt709_u8(input),
        }
    }
}

impl fmt::Display for GrayscaleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrayscaleMethod::Average => f.write_str("average"),
            GrayscaleMethod::Bt709 => f.write_str("bt709"),
        }
    }
}

impl FromStr for GrayscaleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" | "avg" | "mean" => Ok(GrayscaleMethod::Average),
            "bt709" | "luma" => Ok(GrayscaleMethod::Bt709),
            other => Err(format!("unknown grayscale method '{other}'")),
        }
    }
}

/// Reduce to one channel with the integer channel average.
pub fn to_gray_average_u8(input: ArrayView3<u8>) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let mut output = Array3::<u8>::zeros((height, width, 1));

    if channels < 3 {
        output.assign(&input.slice(ndarray::s![.., .., 0..1]));
        return output;
    }

    for y in 0..height {
        for x in 0..width {
            let sum = input[[y, x, 0]] as u32 + input[[y, x, 1]] as u32 + input[[y, x, 2]] as u32;
            output[[y, x, 0]] = (sum / 3) as u8;
        }
    }

    output
}

/// Reduce to one channel with BT.709 luminosity.
pub fn to_gray_bt709_u8(input: ArrayView3<u8>) -> Array3<u8> {
    let (height, width, channels) = input.dim();
    let mut output = Array3::<u8>::zeros((height, width, 1));

    if channels < 3 {
        output.assign(&input.slice(ndarray::s![.., .., 0..1]));
        return output;
    }

    for y in 0..height {
        for x in 0..width {
            let r = input[[y, x, 0]] as f32;
            let g = input[[y, x, 1]] as f32;
            let b = input[[y, x, 2]] as f32;

            output[[y, x, 0]] = (LUMA_R * r + LUMA_G * g + LUMA_B * b).clamp(0.0, 255.0) as u8;
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_truncates() {
        let mut img = Array3::<u8>::zeros((1, 2, 3));
        img[[0, 0, 0]] = 10;
        img[[0, 0, 1]] = 20;
        img[[0, 0, 2]] = 31;
        img[[0, 1, 0]] = 255;
        img[[0, 1, 1]] = 255;
        img[[0, 1, 2]] = 255;

        let gray = to_gray_average_u8(img.view());

        assert_eq!(gray.dim(), (1, 2, 1));
        assert_eq!(gray[[0, 0, 0]], 20);
        assert_eq!(gray[[0, 1, 0]], 255);
    }

    #[test]
    fn test_alpha_is_ignored() {
        let mut img = Array3::<u8>::zeros((1, 1, 4));
        img[[0, 0, 0]] = 90;
        img[[0, 0, 1]] = 90;
        img[[0, 0, 2]] = 90;
        img[[0, 0, 3]] = 0;

        assert_eq!(to_gray_average_u8(img.view())[[0, 0, 0]], 90);
        let luma = to_gray_bt709_u8(img.view())[[0, 0, 0]];
        assert!((89..=90).contains(&luma));
    }

    #[test]
    fn test_single_channel_passes_through() {
        let img = Array3::<u8>::from_elem((2, 3, 1), 42);
        assert_eq!(to_gray_average_u8(img.view()), img);
        assert_eq!(GrayscaleMethod::Bt709.apply(img.view()), img);
    }

    #[test]
    fn test_bt709_weights_green() {
        let mut img = Array3::<u8>::zeros((1, 1, 3));
        img[[0, 0, 1]] = 255;
        let gray = to_gray_bt709_u8(img.view());
        assert_eq!(gray[[0, 0, 0]], 182);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("avg".parse::<GrayscaleMethod>().unwrap(), GrayscaleMethod::Average);
        assert_eq!("BT709".parse::<GrayscaleMethod>().unwrap(), GrayscaleMethod::Bt709);
        assert!("hsv".parse::<GrayscaleMethod>().is_err());
    }
}
