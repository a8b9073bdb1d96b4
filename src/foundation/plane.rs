use crate::foundation::core::Resolution;
use crate::foundation::error::{FlowError, FlowResult};

/// A row-major 2D grid of per-pixel values.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane<T> {
    pub width: u32,
    pub height: u32,
    pub data: Vec<T>,
}

impl<T> Plane<T> {
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> FlowResult<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(FlowError::decode(format!(
                "plane {width}x{height} needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.width,
            height: self.height,
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(self.offset(x, y))
    }

    pub fn set(&mut self, x: u32, y: u32, value: T) {
        if x < self.width && y < self.height {
            let i = self.offset(x, y);
            self.data[i] = value;
        }
    }

    /// Whether a continuous position lies in `[0, w-1] x [0, h-1]`.
    pub fn in_domain(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f32 && y <= (self.height - 1) as f32
    }

    /// Euclidean distance from `(x, y)` to the sample domain (0 inside it).
    pub fn distance_outside(&self, x: f32, y: f32) -> f32 {
        let dx = (-x).max(x - (self.width - 1) as f32).max(0.0);
        let dy = (-y).max(y - (self.height - 1) as f32).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }

    pub fn same_size<U>(&self, other: &Plane<U>) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl<const N: usize> Plane<[f32; N]> {
    /// Bilinear sample at a continuous `(x, y)` position.
    ///
    /// Pixel `(c, r)` sits at integer coordinates. Returns `None` outside
    /// `[0, w-1] x [0, h-1]`.
    pub fn sample_bilinear(&self, x: f32, y: f32) -> Option<[f32; N]> {
        if !self.in_domain(x, y) {
            return None;
        }
        let (c0, c1, ca) = neighbors(x, self.width);
        let (r0, r1, ra) = neighbors(y, self.height);

        let at = |c: u32, r: u32| self.data[self.offset(c, r)];
        let mut out = [0.0f32; N];
        for (k, o) in out.iter_mut().enumerate() {
            let top = at(c0, r0)[k] * ca + at(c1, r0)[k] * (1.0 - ca);
            let bottom = at(c0, r1)[k] * ca + at(c1, r1)[k] * (1.0 - ca);
            *o = top * ra + bottom * (1.0 - ra);
        }
        Some(out)
    }
}

/// Floor/ceil neighbours of `v` and the weight of the floor neighbour.
fn neighbors(v: f32, size: u32) -> (u32, u32, f32) {
    let prev = v.floor();
    let next = v.ceil();
    let alpha = next - v;
    let prev = prev as u32;
    let mut next = next as u32;
    if next > size - 1 {
        next = prev;
    }
    (prev, next, alpha)
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/plane.rs"]
mod tests;
