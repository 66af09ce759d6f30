use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::{self, FilterType};

use super::framebuffer::{Framebuffer, Point, Rgba, StrokeOp};
use crate::{
    error::{Result, StudioError},
    models::{ImageSource, MaskImage},
};

pub const MAX_DISPLAY_WIDTH: u32 = 800;
pub const MAX_DISPLAY_HEIGHT: u32 = 600;
pub const MIN_BRUSH_WIDTH: u32 = 5;
pub const MAX_BRUSH_WIDTH: u32 = 100;
pub const DEFAULT_BRUSH_WIDTH: u32 = 20;

/// Translucent red used to show the region marked for editing.
pub const PAINT_COLOR: Rgba = [255, 0, 0, 128];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Paint,
    Erase,
}

impl Tool {
    fn stroke_op(&self) -> StrokeOp {
        match self {
            Tool::Paint => StrokeOp::Paint(PAINT_COLOR),
            Tool::Erase => StrokeOp::Erase,
        }
    }
}

/// Where the surface is shown on screen, in client coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
    Leave,
}

/// Scales `(width, height)` down to fit inside `max_width × max_height`,
/// keeping the aspect ratio. Width is fitted first, then height.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    let (mut w, mut h) = (width as f64, height as f64);
    if w > max_width as f64 {
        h = h * max_width as f64 / w;
        w = max_width as f64;
    }
    if h > max_height as f64 {
        w = w * max_height as f64 / h;
        h = max_height as f64;
    }
    ((w as u32).max(1), (h as u32).max(1))
}

/// A photo with a paint layer on top that the user marks up with strokes.
///
/// The photo layer is only ever replaced by [`MaskSurface::reset`]; tools act
/// on the paint layer alone, and [`MaskSurface::finalize`] thresholds that
/// layer's alpha into a black/white mask.
#[derive(Debug, Clone)]
pub struct MaskSurface {
    source: Framebuffer,
    base: Framebuffer,
    paint: Framebuffer,
    tool: Tool,
    brush_width: u32,
    last_point: Option<Point>,
}

impl MaskSurface {
    /// Decodes an encoded image and fits it to the display bounds.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| StudioError::ImageError(format!("Failed to load image: {}", e)))?
            .to_rgba8();

        let (width, height) = decoded.dimensions();
        let (fit_w, fit_h) = fit_within(width, height, MAX_DISPLAY_WIDTH, MAX_DISPLAY_HEIGHT);
        let scaled = if (fit_w, fit_h) == (width, height) {
            decoded
        } else {
            log::debug!(
                "🖼️  Scaling source {}x{} to {}x{}",
                width,
                height,
                fit_w,
                fit_h
            );
            imageops::resize(&decoded, fit_w, fit_h, FilterType::Triangle)
        };

        Ok(Self::from_framebuffer(Framebuffer::from_image(scaled)))
    }

    /// Wraps an already-sized photo without rescaling.
    pub fn from_framebuffer(photo: Framebuffer) -> Self {
        let paint = Framebuffer::new(photo.width(), photo.height());
        Self {
            source: photo.clone(),
            base: photo,
            paint,
            tool: Tool::Paint,
            brush_width: DEFAULT_BRUSH_WIDTH,
            last_point: None,
        }
    }

    /// Loads the surface for an image source. Remote URLs are fetched with
    /// `client`; `data:` URLs and blobs are decoded in place.
    pub async fn load(source: &ImageSource, client: &reqwest::Client) -> Result<Self> {
        match source {
            ImageSource::Blob { bytes, .. } => Self::from_bytes(bytes),
            ImageSource::Url(url) if url.starts_with("data:") => {
                Self::from_bytes(&decode_data_url(url)?)
            }
            ImageSource::Url(url) => {
                let response = client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(StudioError::RequestError(format!(
                        "Failed to fetch image {}: HTTP {}",
                        url,
                        response.status()
                    )));
                }
                let bytes = response.bytes().await?;
                Self::from_bytes(&bytes)
            }
        }
    }

    pub fn width(&self) -> u32 {
        self.paint.width()
    }

    pub fn height(&self) -> u32 {
        self.paint.height()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn brush_width(&self) -> u32 {
        self.brush_width
    }

    pub fn set_brush_width(&mut self, width: u32) {
        self.brush_width = width.clamp(MIN_BRUSH_WIDTH, MAX_BRUSH_WIDTH);
    }

    pub fn is_drawing(&self) -> bool {
        self.last_point.is_some()
    }

    pub fn paint_layer(&self) -> &Framebuffer {
        &self.paint
    }

    /// Maps a client-space pointer position through the on-screen rectangle
    /// into surface pixels.
    pub fn map_pointer(&self, client: Point, rect: DisplayRect) -> Point {
        let scale_x = if rect.width > 0.0 {
            self.width() as f32 / rect.width
        } else {
            1.0
        };
        let scale_y = if rect.height > 0.0 {
            self.height() as f32 / rect.height
        } else {
            1.0
        };
        Point::new(
            (client.x - rect.left) * scale_x,
            (client.y - rect.top) * scale_y,
        )
    }

    pub fn pointer_down(&mut self, at: Point) {
        self.last_point = Some(at);
    }

    /// Draws from the previous point to `at` when a stroke is active.
    /// Returns whether anything was drawn.
    pub fn pointer_move(&mut self, at: Point) -> bool {
        let Some(prev) = self.last_point else {
            return false;
        };
        self.paint
            .stroke_segment(prev, at, self.brush_width as f32, self.tool.stroke_op());
        self.last_point = Some(at);
        true
    }

    pub fn pointer_up(&mut self) {
        self.last_point = None;
    }

    pub fn handle(&mut self, event: PointerEvent) {
        match event {
            PointerEvent::Down(p) => self.pointer_down(p),
            PointerEvent::Move(p) => {
                self.pointer_move(p);
            }
            PointerEvent::Up | PointerEvent::Leave => self.pointer_up(),
        }
    }

    /// Drops every stroke and redraws the original scaled photo.
    pub fn reset(&mut self) {
        self.paint.clear();
        self.base = self.source.clone();
        self.last_point = None;
    }

    /// What the user sees: paint layer over the photo.
    pub fn display(&self) -> Result<Framebuffer> {
        self.paint.composite_over(&self.base)
    }

    pub fn mask_framebuffer(&self) -> Framebuffer {
        self.paint.threshold_alpha()
    }

    /// Encodes the binary mask as PNG.
    pub fn finalize(&self) -> Result<MaskImage> {
        let mask = self.mask_framebuffer();
        Ok(MaskImage {
            width: mask.width(),
            height: mask.height(),
            png: mask.to_png()?,
        })
    }
}

fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| StudioError::ImageError("malformed data URL".into()))?;
    if !header.ends_with(";base64") {
        return Err(StudioError::ImageError(
            "only base64 data URLs are supported".into(),
        ));
    }
    STANDARD
        .decode(payload)
        .map_err(|e| StudioError::ImageError(format!("invalid base64 image: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::framebuffer::{MASK_OFF, MASK_ON};
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn encoded_photo(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decode(mask: &MaskImage) -> RgbaImage {
        image::load_from_memory(&mask.png).unwrap().to_rgba8()
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(1600, 1200, 800, 600), (800, 600));
        assert_eq!(fit_within(2000, 1000, 800, 600), (800, 400));
        assert_eq!(fit_within(1000, 2000, 800, 600), (300, 600));
        assert_eq!(fit_within(100, 50, 800, 600), (100, 50));
        assert_eq!(fit_within(5000, 1, 800, 600), (800, 1));
    }

    #[test]
    fn test_load_scales_large_images() {
        let surface = MaskSurface::from_bytes(&encoded_photo(1200, 900)).unwrap();
        assert_eq!((surface.width(), surface.height()), (800, 600));
    }

    #[test]
    fn test_undecodable_source_yields_no_surface() {
        let err = MaskSurface::from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, StudioError::ImageError(_)));
    }

    #[test]
    fn test_map_pointer_scales_per_axis() {
        let surface = MaskSurface::from_bytes(&encoded_photo(400, 300)).unwrap();
        let rect = DisplayRect {
            left: 10.0,
            top: 20.0,
            width: 200.0,
            height: 100.0,
        };
        let p = surface.map_pointer(Point::new(110.0, 70.0), rect);
        assert_eq!(p, Point::new(200.0, 150.0));
    }

    #[test]
    fn test_moves_without_stroke_are_ignored() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(50, 50)).unwrap();
        assert!(!surface.pointer_move(Point::new(10.0, 10.0)));
        surface.pointer_down(Point::new(5.0, 5.0));
        assert!(surface.is_drawing());
        assert!(surface.pointer_move(Point::new(40.0, 40.0)));
        surface.handle(PointerEvent::Leave);
        assert!(!surface.is_drawing());
        assert!(!surface.pointer_move(Point::new(45.0, 10.0)));
    }

    #[test]
    fn test_brush_width_is_clamped() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(10, 10)).unwrap();
        assert_eq!(surface.brush_width(), DEFAULT_BRUSH_WIDTH);
        surface.set_brush_width(1);
        assert_eq!(surface.brush_width(), MIN_BRUSH_WIDTH);
        surface.set_brush_width(500);
        assert_eq!(surface.brush_width(), MAX_BRUSH_WIDTH);
    }

    #[test]
    fn test_stroke_across_center_gives_brush_wide_band() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(400, 300)).unwrap();
        assert_eq!((surface.width(), surface.height()), (400, 300));
        surface.set_brush_width(50);

        surface.handle(PointerEvent::Down(Point::new(0.0, 150.0)));
        surface.handle(PointerEvent::Move(Point::new(200.0, 150.0)));
        surface.handle(PointerEvent::Move(Point::new(400.0, 150.0)));
        surface.handle(PointerEvent::Up);

        let mask = surface.finalize().unwrap();
        assert_eq!((mask.width, mask.height), (400, 300));
        let img = decode(&mask);

        for x in [10u32, 100, 200, 390] {
            let white = (0..300)
                .filter(|&y| img.get_pixel(x, y).0 == MASK_ON)
                .count();
            assert_eq!(white, 50, "column {}", x);
        }
        assert_eq!(img.get_pixel(200, 150).0, MASK_ON);
        assert_eq!(img.get_pixel(200, 20).0, MASK_OFF);
        assert_eq!(img.get_pixel(200, 280).0, MASK_OFF);
    }

    #[test]
    fn test_mask_is_strictly_binary_and_tracks_alpha() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(60, 40)).unwrap();
        surface.set_brush_width(7);
        surface.pointer_down(Point::new(3.3, 4.1));
        surface.pointer_move(Point::new(41.7, 33.9));
        surface.pointer_move(Point::new(55.2, 8.6));
        surface.pointer_up();

        let img = decode(&surface.finalize().unwrap());
        let paint = surface.paint_layer();
        for y in 0..40 {
            for x in 0..60 {
                let alpha = paint.get(x, y).unwrap()[3];
                let expected = if alpha > 0 { MASK_ON } else { MASK_OFF };
                assert_eq!(img.get_pixel(x, y).0, expected);
            }
        }
    }

    #[test]
    fn test_erase_clears_paint_but_not_photo() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(100, 100)).unwrap();
        let fresh = surface.display().unwrap();

        surface.set_brush_width(20);
        surface.pointer_down(Point::new(10.0, 50.0));
        surface.pointer_move(Point::new(90.0, 50.0));
        surface.pointer_up();
        assert_ne!(surface.display().unwrap(), fresh);

        surface.set_tool(Tool::Erase);
        surface.set_brush_width(100);
        surface.pointer_down(Point::new(0.0, 50.0));
        surface.pointer_move(Point::new(100.0, 50.0));
        surface.pointer_up();

        assert!(surface.paint_layer().pixels().chunks(4).all(|px| px[3] == 0));
        assert_eq!(surface.display().unwrap(), fresh);
    }

    #[test]
    fn test_reset_restores_fresh_surface() {
        let mut surface = MaskSurface::from_bytes(&encoded_photo(1000, 700)).unwrap();
        let fresh = surface.display().unwrap();

        surface.pointer_down(Point::new(0.0, 0.0));
        surface.pointer_move(Point::new(500.0, 400.0));
        surface.reset();

        assert!(!surface.is_drawing());
        assert_eq!(surface.display().unwrap(), fresh);
        let img = decode(&surface.finalize().unwrap());
        assert!(img.pixels().all(|p| p.0 == MASK_OFF));
    }

    #[tokio::test]
    async fn test_load_from_data_url() {
        let url = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(encoded_photo(30, 20))
        );
        let surface = MaskSurface::load(&ImageSource::Url(url), &reqwest::Client::new())
            .await
            .unwrap();
        assert_eq!((surface.width(), surface.height()), (30, 20));

        let bad = ImageSource::Url("data:image/png,raw".to_string());
        assert!(MaskSurface::load(&bad, &reqwest::Client::new()).await.is_err());
    }
}
