use std::io::Cursor;

use image::{ImageFormat, RgbaImage};

use crate::error::{Result, StudioError};

/// Straight (non-premultiplied) RGBA8 pixel.
pub type Rgba = [u8; 4];

pub const TRANSPARENT: Rgba = [0, 0, 0, 0];
pub const MASK_ON: Rgba = [255, 255, 255, 255];
pub const MASK_OFF: Rgba = [0, 0, 0, 255];

/// A point in surface pixel space. Pixel `(x, y)` covers `[x, x+1) × [y, y+1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// How a stroke is applied to the pixels it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeOp {
    /// Source-over with the given colour.
    Paint(Rgba),
    /// Destination-out at full strength.
    Erase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Framebuffer {
    /// A fully transparent buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, TRANSPARENT)
    }

    pub fn filled(width: u32, height: u32, color: Rgba) -> Self {
        let len = width as usize * height as usize;
        let mut data = Vec::with_capacity(len * 4);
        for _ in 0..len {
            data.extend_from_slice(&color);
        }
        Self { width, height, data }
    }

    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(StudioError::ImageError(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    pub fn get(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = self.offset(x, y);
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    pub fn set(&mut self, x: u32, y: u32, color: Rgba) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = self.offset(x, y);
        self.data[i..i + 4].copy_from_slice(&color);
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Porter-Duff source-over of `color`, its alpha scaled by `coverage`.
    pub fn blend_source_over(&mut self, x: u32, y: u32, color: Rgba, coverage: f32) {
        let Some(dst) = self.get(x, y) else { return };
        let sa = color[3] as f32 / 255.0 * coverage.clamp(0.0, 1.0);
        if sa <= 0.0 {
            return;
        }
        let da = dst[3] as f32 / 255.0;
        let oa = sa + da * (1.0 - sa);
        if oa <= 0.0 {
            self.set(x, y, TRANSPARENT);
            return;
        }

        let mut out = [0u8; 4];
        for c in 0..3 {
            let v = (color[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / oa;
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        out[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
        self.set(x, y, out);
    }

    /// Destination-out: removes `alpha` worth of the existing coverage.
    pub fn blend_destination_out(&mut self, x: u32, y: u32, alpha: f32) {
        let Some(mut dst) = self.get(x, y) else { return };
        let keep = 1.0 - alpha.clamp(0.0, 1.0);
        let a = (dst[3] as f32 * keep).round() as u8;
        if a == 0 {
            dst = TRANSPARENT;
        } else {
            dst[3] = a;
        }
        self.set(x, y, dst);
    }

    /// Strokes a round-capped segment of `width` pixels from `from` to `to`.
    ///
    /// Coverage falls off over one pixel at the edge, so the covered band is
    /// `width` wide with a soft rim.
    pub fn stroke_segment(&mut self, from: Point, to: Point, width: f32, op: StrokeOp) {
        if self.width == 0 || self.height == 0 || width <= 0.0 {
            return;
        }
        let radius = width / 2.0;
        let reach = radius + 1.0;

        let min_x = (from.x.min(to.x) - reach).floor().max(0.0) as u32;
        let min_y = (from.y.min(to.y) - reach).floor().max(0.0) as u32;
        let max_x = ((from.x.max(to.x) + reach).ceil().max(0.0) as u32).min(self.width - 1);
        let max_y = ((from.y.max(to.y) + reach).ceil().max(0.0) as u32).min(self.height - 1);
        if min_x > max_x || min_y > max_y {
            return;
        }

        for y in min_y..=max_y {
            for x in min_x..=max_x {
                let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
                let d = distance_to_segment(center, from, to);
                let coverage = (radius - d + 0.5).clamp(0.0, 1.0);
                if coverage <= 0.0 {
                    continue;
                }
                match op {
                    StrokeOp::Paint(color) => self.blend_source_over(x, y, color, coverage),
                    StrokeOp::Erase => self.blend_destination_out(x, y, coverage),
                }
            }
        }
    }

    /// Binarises on alpha: any coverage becomes opaque white, none becomes
    /// opaque black.
    pub fn threshold_alpha(&self) -> Framebuffer {
        let mut data = Vec::with_capacity(self.data.len());
        for px in self.data.chunks_exact(4) {
            let out = if px[3] > 0 { MASK_ON } else { MASK_OFF };
            data.extend_from_slice(&out);
        }
        Framebuffer {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// `self` drawn source-over on top of `base`. Both must share dimensions.
    pub fn composite_over(&self, base: &Framebuffer) -> Result<Framebuffer> {
        if self.width != base.width || self.height != base.height {
            return Err(StudioError::ImageError(format!(
                "cannot composite {}x{} over {}x{}",
                self.width, self.height, base.width, base.height
            )));
        }
        let mut out = base.clone();
        for y in 0..self.height {
            for x in 0..self.width {
                let i = self.offset(x, y);
                let src = [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]];
                if src[3] > 0 {
                    out.blend_source_over(x, y, src, 1.0);
                }
            }
        }
        Ok(out)
    }

    pub fn to_image(&self) -> Result<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| StudioError::ImageError("framebuffer size mismatch".into()))
    }

    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.to_image()?
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + t * dx, a.y + t * dy);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}
