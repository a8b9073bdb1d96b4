use crate::flow::field::FlowField;
use crate::foundation::core::Resolution;
use crate::foundation::error::{FlowError, FlowResult};
use crate::foundation::plane::Plane;
use crate::meta::buffer::MetaBuffer;

/// Render pass holding motion vectors.
pub const MOTION_PASS: &str = "Vector";

/// Unit of the raw motion vectors.
///
/// Conversion to pixels is a pure per-axis scale applied identically to forward and
/// backward vectors:
/// - `Pixels`: `dx_px = dx_raw`, `dy_px = dy_raw`
/// - `Normalized` (`[-1, 1]` across the frame): `dx_px = dx_raw * width / 2`,
///   `dy_px = dy_raw * height / 2`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionUnits {
    #[default]
    Pixels,
    Normalized,
}

impl MotionUnits {
    pub fn scale(self, res: Resolution) -> (f32, f32) {
        match self {
            Self::Pixels => (1.0, 1.0),
            Self::Normalized => (res.width as f32 / 2.0, res.height as f32 / 2.0),
        }
    }
}

/// Flow decoded from one frame's motion pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedFlow {
    /// Frame N -> N+1.
    pub forward: FlowField,
    /// Frame N -> N-1, present when the pass carries four channels.
    pub backward: Option<FlowField>,
}

/// Decode the motion pass of a raw buffer into pixel flow.
///
/// The pass must have exactly two channels (`X, Y`: forward only) or four
/// (`X, Y, Z, W`: backward in `X, Y`, forward in `Z, W`). Signs follow the renderer's
/// vector pass, whose y axis points up:
/// - forward  = `(-Z, W)`, or `(-X, Y)` for a two-channel pass
/// - backward = `(X, -Y)`
#[tracing::instrument(skip(buffer), fields(buffer_res = %buffer.resolution()))]
pub fn decode_motion(
    buffer: &MetaBuffer,
    declared: Resolution,
    units: MotionUnits,
) -> FlowResult<DecodedFlow> {
    if buffer.resolution() != declared {
        return Err(FlowError::decode(format!(
            "buffer is {} but the sequence resolution is {declared}",
            buffer.resolution()
        )));
    }

    let components = buffer.pass_components(MOTION_PASS);
    let (sx, sy) = units.scale(declared);
    let channel = |c: &str| buffer.channel(&format!("{MOTION_PASS}.{c}"), false);

    let components: Vec<&str> = components.iter().map(String::as_str).collect();
    match components.as_slice() {
        ["W", "X", "Y", "Z"] => {
            let (x, y) = (channel("X")?, channel("Y")?);
            let (z, w) = (channel("Z")?, channel("W")?);
            Ok(DecodedFlow {
                forward: interleave(declared, z, w, -sx, sy)?,
                backward: Some(interleave(declared, x, y, sx, -sy)?),
            })
        }
        ["X", "Y"] => {
            let (x, y) = (channel("X")?, channel("Y")?);
            Ok(DecodedFlow {
                forward: interleave(declared, x, y, -sx, sy)?,
                backward: None,
            })
        }
        other => Err(FlowError::decode(format!(
            "motion pass must have 2 (X,Y) or 4 (X,Y,Z,W) channels, found {}: [{}]",
            other.len(),
            other.join(", ")
        ))),
    }
}

fn interleave(res: Resolution, xs: &[f32], ys: &[f32], kx: f32, ky: f32) -> FlowResult<FlowField> {
    let data = xs
        .iter()
        .zip(ys)
        .map(|(&x, &y)| [x * kx, y * ky])
        .collect();
    Plane::from_vec(res.width, res.height, data)
}

#[cfg(test)]
#[path = "../../tests/unit/flow/decode.rs"]
mod tests;
