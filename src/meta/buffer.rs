use std::collections::BTreeMap;
use std::path::Path;

use crate::foundation::core::Resolution;
use crate::foundation::error::{FlowError, FlowResult};

/// Layer name the renderer uses when several layers carry the same pass.
const PREFERRED_LAYER: &str = "RenderLayer";

/// One frame of raw render output: named `f32` channels, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct MetaBuffer {
    pub width: u32,
    pub height: u32,
    channels: BTreeMap<String, Vec<f32>>,
}

impl MetaBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: BTreeMap::new(),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    pub fn insert_channel(&mut self, name: impl Into<String>, values: Vec<f32>) -> FlowResult<()> {
        let name = name.into();
        let expected = self.width as usize * self.height as usize;
        if values.len() != expected {
            return Err(FlowError::decode(format!(
                "channel '{name}' has {} samples, expected {expected} for {}x{}",
                values.len(),
                self.width,
                self.height
            )));
        }
        self.channels.insert(name, values);
        Ok(())
    }

    pub fn with_channel(mut self, name: impl Into<String>, values: Vec<f32>) -> FlowResult<Self> {
        self.insert_channel(name, values)?;
        Ok(self)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }

    /// Look a channel up by substring, e.g. `Vector.Z`.
    ///
    /// Several matches resolve to `RenderLayer.<pattern>` when present. Otherwise they
    /// are an error, unless `pick_any` is set, in which case the first match in name
    /// order wins.
    pub fn channel(&self, pattern: &str, pick_any: bool) -> FlowResult<&[f32]> {
        let matches: Vec<&String> = self
            .channels
            .keys()
            .filter(|k| k.contains(pattern))
            .collect();

        let name = match matches.as_slice() {
            [] => {
                return Err(FlowError::decode(format!(
                    "no channel matched '{pattern}' out of: {}",
                    self.channel_names().collect::<Vec<_>>().join(", ")
                )));
            }
            [only] => *only,
            [first, ..] => {
                let likely = format!("{PREFERRED_LAYER}.{pattern}");
                if let Some(found) = matches.iter().find(|k| ***k == likely) {
                    *found
                } else if pick_any {
                    *first
                } else {
                    return Err(FlowError::decode(format!(
                        "more than one channel matched '{pattern}': {}",
                        matches
                            .iter()
                            .map(|s| s.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )));
                }
            }
        };
        Ok(self.channels[name].as_slice())
    }

    /// Distinct component suffixes of a pass, e.g. `["X", "Y", "Z", "W"]` for
    /// `Vector`, in name order.
    pub fn pass_components(&self, pass: &str) -> Vec<String> {
        let needle = format!("{pass}.");
        let mut out: Vec<String> = self
            .channels
            .keys()
            .filter_map(|k| {
                let at = k.find(&needle)?;
                Some(k[at + needle.len()..].to_string())
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    /// Load every channel of every layer of an EXR file.
    ///
    /// Channels of named layers are exposed as `<layer>.<channel>`.
    pub fn from_exr_file(path: &Path) -> FlowResult<Self> {
        let image = exr::prelude::read_all_flat_layers_from_file(path)
            .map_err(|e| FlowError::decode(format!("read exr '{}': {e}", path.display())))?;

        let mut buffer: Option<MetaBuffer> = None;
        for layer in &image.layer_data {
            let (width, height) = (layer.size.width() as u32, layer.size.height() as u32);
            let buf = buffer.get_or_insert_with(|| MetaBuffer::new(width, height));
            if buf.width != width || buf.height != height {
                return Err(FlowError::decode(format!(
                    "exr '{}' mixes layer sizes {}x{} and {width}x{height}",
                    path.display(),
                    buf.width,
                    buf.height
                )));
            }

            let layer_name = layer.attributes.layer_name.as_ref().map(|t| t.to_string());
            for ch in &layer.channel_data.list {
                let name = match &layer_name {
                    Some(l) => format!("{l}.{}", ch.name),
                    None => ch.name.to_string(),
                };
                let values: Vec<f32> = ch.sample_data.values_as_f32().collect();
                buf.insert_channel(name, values).map_err(|e| match e {
                    FlowError::Decode(msg) => {
                        FlowError::decode(format!("exr '{}': {msg}", path.display()))
                    }
                    other => other,
                })?;
            }
        }

        buffer.ok_or_else(|| FlowError::decode(format!("exr '{}' has no layers", path.display())))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/meta/buffer.rs"]
mod tests;
