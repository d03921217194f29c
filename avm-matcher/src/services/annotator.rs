//! Label compositing
//!
//! Appends a white strip below an image and draws a centered black label in
//! it. Operates on a copy; the input image is never touched.

use image::{DynamicImage, Rgb, RgbImage};

/// Visible-label compositor
pub trait Annotator: Send + Sync {
    fn label(&self, image: &DynamicImage, text: &str) -> DynamicImage;
}

/// Strip annotator with a built-in 5x7 bitmap font
#[derive(Debug, Clone, Copy)]
pub struct StripAnnotator {
    strip_height: u32,
    /// Pixel size of one font cell
    scale: u32,
}

impl StripAnnotator {
    pub fn new(strip_height: u32, scale: u32) -> Self {
        Self {
            strip_height,
            scale: scale.max(1),
        }
    }

    fn draw_text(&self, canvas: &mut RgbImage, text: &str, top: u32) {
        let glyph_w = GLYPH_WIDTH * self.scale;
        let advance = glyph_w + self.scale;
        let count = text.chars().count() as u32;
        let text_w = if count == 0 { 0 } else { count * advance - self.scale };
        let text_h = GLYPH_HEIGHT * self.scale;

        let left = canvas.width().saturating_sub(text_w) / 2;
        let top = top + self.strip_height.saturating_sub(text_h) / 2;

        for (i, ch) in text.chars().enumerate() {
            let x0 = left + i as u32 * advance;
            let rows = glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    for dy in 0..self.scale {
                        for dx in 0..self.scale {
                            let x = x0 + col * self.scale + dx;
                            let y = top + row as u32 * self.scale + dy;
                            if x < canvas.width() && y < canvas.height() {
                                canvas.put_pixel(x, y, BLACK);
                            }
                        }
                    }
                }
            }
        }
    }
}

impl Default for StripAnnotator {
    /// 60px strip with 28px-tall glyphs
    fn default() -> Self {
        Self::new(60, 4)
    }
}

impl Annotator for StripAnnotator {
    fn label(&self, image: &DynamicImage, text: &str) -> DynamicImage {
        let base = flatten_on_white(image);
        let (width, height) = base.dimensions();

        let mut canvas = RgbImage::from_pixel(width, height + self.strip_height, WHITE);
        image::imageops::replace(&mut canvas, &base, 0, 0);
        self.draw_text(&mut canvas, text, height);

        DynamicImage::ImageRgb8(canvas)
    }
}

/// Flatten any image to RGB, compositing transparency over white
pub fn flatten_on_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    RgbImage::from_fn(width, height, |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let alpha = p[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        ' ' => [0x00; 7],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x11, 0x1F, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04], // '?'
    }
}
