use std::path::Path;

use crate::foundation::error::{FlowError, FlowResult, IoContext as _};
use crate::foundation::plane::Plane;

/// Per-pixel `[dx, dy]` displacement in pixels. Positive `dy` moves down.
pub type FlowField = Plane<[f32; 2]>;

/// Tag that opens every `.flo` file; reads as `PIEH` in little endian.
pub const FLO_TAG: f32 = 202021.25;
const FLO_MAX_DIM: i32 = 99999;
const FLO_HEADER_BYTES: usize = 12;

/// Serialize a flow field into Middlebury `.flo` bytes.
pub fn encode_flo(flow: &FlowField) -> Vec<u8> {
    let mut out = Vec::with_capacity(FLO_HEADER_BYTES + flow.data.len() * 8);
    out.extend_from_slice(&FLO_TAG.to_le_bytes());
    out.extend_from_slice(&(flow.width as i32).to_le_bytes());
    out.extend_from_slice(&(flow.height as i32).to_le_bytes());
    for [dx, dy] in &flow.data {
        out.extend_from_slice(&dx.to_le_bytes());
        out.extend_from_slice(&dy.to_le_bytes());
    }
    out
}

/// Parse Middlebury `.flo` bytes. `origin` names the source in error messages.
pub fn decode_flo(bytes: &[u8], origin: &str) -> FlowResult<FlowField> {
    if bytes.len() < FLO_HEADER_BYTES {
        return Err(FlowError::decode(format!(
            "flow '{origin}' is too short for a header ({} bytes)",
            bytes.len()
        )));
    }
    let word = |i: usize| -> [u8; 4] { [bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]] };

    let tag = f32::from_le_bytes(word(0));
    if tag != FLO_TAG {
        return Err(FlowError::decode(format!(
            "flow '{origin}' has wrong tag {tag}"
        )));
    }
    let width = i32::from_le_bytes(word(4));
    let height = i32::from_le_bytes(word(8));
    if !(1..=FLO_MAX_DIM).contains(&width) || !(1..=FLO_MAX_DIM).contains(&height) {
        return Err(FlowError::decode(format!(
            "flow '{origin}' has invalid size {width}x{height}"
        )));
    }

    let count = width as usize * height as usize;
    let expected = FLO_HEADER_BYTES + count * 8;
    if bytes.len() != expected {
        return Err(FlowError::decode(format!(
            "flow '{origin}' is {} bytes, expected {expected} for {width}x{height}",
            bytes.len()
        )));
    }

    let data = bytes[FLO_HEADER_BYTES..]
        .chunks_exact(8)
        .map(|c| {
            [
                f32::from_le_bytes([c[0], c[1], c[2], c[3]]),
                f32::from_le_bytes([c[4], c[5], c[6], c[7]]),
            ]
        })
        .collect();
    Plane::from_vec(width as u32, height as u32, data)
}

pub fn read_flo(path: &Path) -> FlowResult<FlowField> {
    let bytes = std::fs::read(path).at_path(path)?;
    decode_flo(&bytes, &path.display().to_string())
}

pub fn write_flo(path: &Path, flow: &FlowField) -> FlowResult<()> {
    std::fs::write(path, encode_flo(flow)).at_path(path)
}

/// Bilinearly resample a flow field to a new resolution, scaling the vectors by the
/// size ratio so they stay in pixels of the new grid.
pub fn resample_flow(flow: &FlowField, width: u32, height: u32) -> FlowResult<FlowField> {
    if width == 0 || height == 0 {
        return Err(FlowError::config(format!(
            "cannot resample flow to {width}x{height}"
        )));
    }
    let sx = flow.width as f32 / width as f32;
    let sy = flow.height as f32 / height as f32;
    let max_x = (flow.width - 1) as f32;
    let max_y = (flow.height - 1) as f32;

    Ok(Plane::from_fn(width, height, |x, y| {
        let src_x = (x as f32 * sx).min(max_x);
        let src_y = (y as f32 * sy).min(max_y);
        let [dx, dy] = flow.sample_bilinear(src_x, src_y).unwrap_or([0.0, 0.0]);
        [dx / sx, dy / sy]
    }))
}

#[cfg(test)]
#[path = "../../tests/unit/flow/field.rs"]
mod tests;
