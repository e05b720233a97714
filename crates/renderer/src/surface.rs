use crate::overlay::{Overlay, OverlayKind};
use image::{Rgba, RgbaImage, imageops};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const DETECTION_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
const TRACK_COLOR: Rgba<u8> = Rgba([255, 170, 0, 255]);

/// Where a tile paints. Sizes are in source-image pixels.
pub trait Surface: Send + 'static {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    fn draw_image(&mut self, frame: &RgbaImage);

    fn draw_overlay(&mut self, overlay: &Overlay);
}

/// Text drawn next to a box. Kept as data instead of rasterised glyphs.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub x: i32,
    pub y: i32,
    pub kind: OverlayKind,
    pub lines: Vec<String>,
}

/// In-memory RGBA canvas with a separate label layer.
pub struct ImageSurface {
    canvas: RgbaImage,
    labels: Vec<Label>,
    resizes: u64,
}

impl Default for ImageSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSurface {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            labels: Vec::new(),
            resizes: 0,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Labels for the overlays drawn since the last image.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn resizes(&self) -> u64 {
        self.resizes
    }
}

impl Surface for ImageSurface {
    fn size(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
        self.labels.clear();
        self.resizes += 1;
    }

    fn draw_image(&mut self, frame: &RgbaImage) {
        if frame.dimensions() == self.canvas.dimensions() {
            self.canvas.copy_from_slice(frame.as_raw());
        } else {
            imageops::replace(&mut self.canvas, frame, 0, 0);
        }
        self.labels.clear();
    }

    fn draw_overlay(&mut self, overlay: &Overlay) {
        let color = match overlay.kind {
            OverlayKind::Detection => DETECTION_COLOR,
            OverlayKind::Track => TRACK_COLOR,
        };

        let x = overlay.bbox[0].round() as i32;
        let y = overlay.bbox[1].round() as i32;
        let width = (overlay.width().round() as u32).max(1);
        let height = (overlay.height().round() as u32).max(1);

        draw_hollow_rect_mut(&mut self.canvas, Rect::at(x, y).of_size(width, height), color);

        let mut lines = Vec::with_capacity(1 + overlay.details.len());
        lines.push(overlay.label.clone());
        lines.extend(overlay.details.iter().cloned());

        self.labels.push(Label {
            x,
            y,
            kind: overlay.kind,
            lines,
        });
    }
}
