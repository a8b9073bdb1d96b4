use std::path::Path;

use image::{Rgb, RgbImage};

use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::files::ensure_parent_dir;
use crate::sanity::check::{PixelVerdict, SanityConfig, classify_pixel, is_candidate};
use crate::sanity::inputs::FramePair;

pub fn verdict_color(verdict: PixelVerdict) -> Rgb<u8> {
    match verdict {
        PixelVerdict::Sane => Rgb([0, 255, 0]),
        PixelVerdict::OccludedConsistent => Rgb([255, 255, 255]),
        PixelVerdict::Occluded => Rgb([0, 0, 255]),
        PixelVerdict::OutOfFrame => Rgb([255, 255, 0]),
        PixelVerdict::IdMismatch => Rgb([255, 150, 0]),
        PixelVerdict::CorrespMismatch => Rgb([255, 0, 0]),
    }
}

/// Frame N's correspondences at half brightness, foreground pixels colored by verdict.
pub fn render_debug_image(pair: &FramePair, config: &SanityConfig) -> RgbImage {
    RgbImage::from_fn(pair.flow.width, pair.flow.height, |x, y| {
        if is_candidate(pair, x, y) {
            return verdict_color(classify_pixel(pair, x, y, config));
        }
        let [r, g, b] = pair.corresp.get(x, y).copied().unwrap_or([0.0; 3]);
        Rgb([half(r), half(g), half(b)])
    })
}

fn half(v: f32) -> u8 {
    (v * 0.5).clamp(0.0, 255.0) as u8
}

pub fn save_debug_image(path: &Path, pair: &FramePair, config: &SanityConfig) -> FlowResult<()> {
    ensure_parent_dir(path)?;
    render_debug_image(pair, config)
        .save(path)
        .map_err(|e| FlowError::image(path, e))
}

#[cfg(test)]
#[path = "../../tests/unit/sanity/debug.rs"]
mod tests;
