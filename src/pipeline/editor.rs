//! Interactive image editor: colour adjustments, rotation, flips and resize.
//!
//! The editor keeps the decoded source bitmap for as long as it is open and
//! renders every preview from that original, never from a previous render.
//! Adjustments are therefore non-destructive: any sequence of changes that
//! ends in the same [`EditorState`] produces the same pixels.
//!
//! Render order is fixed:
//!
//! ```text
//! resize ─▶ brightness/contrast/saturation ─▶ flip ─▶ rotate ─▶ surface
//! ```
//!
//! which is what a canvas does for `translate(centre) · rotate(θ) · scale(±1)`
//! followed by a centred draw with a colour filter set.

use crate::error::ConvertError;
use crate::output::Artifact;
use crate::pipeline::image::{decode, encode, TargetFormat};
use crate::request::InputFile;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Lower and upper bound of the percentage sliders.
pub const MIN_PERCENT: u16 = 0;
pub const MAX_PERCENT: u16 = 200;
/// Neutral value of every percentage slider.
pub const NEUTRAL_PERCENT: u16 = 100;

/// Quarter-turn rotation, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Normalise any multiple of 90 (negative values included).
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }
        Some(match degrees.rem_euclid(360) {
            0 => Rotation::Deg0,
            90 => Rotation::Deg90,
            180 => Rotation::Deg180,
            _ => Rotation::Deg270,
        })
    }

    pub fn degrees(self) -> u16 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    pub fn radians(self) -> f64 {
        self.degrees() as f64 * PI / 180.0
    }

    pub fn clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg90,
            Rotation::Deg90 => Rotation::Deg180,
            Rotation::Deg180 => Rotation::Deg270,
            Rotation::Deg270 => Rotation::Deg0,
        }
    }

    pub fn counter_clockwise(self) -> Self {
        match self {
            Rotation::Deg0 => Rotation::Deg270,
            Rotation::Deg90 => Rotation::Deg0,
            Rotation::Deg180 => Rotation::Deg90,
            Rotation::Deg270 => Rotation::Deg180,
        }
    }

    /// Portrait/landscape transpose for quarter turns.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Deg90 | Rotation::Deg270)
    }
}

/// Current adjustment settings. Lives only while the editor is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorState {
    pub brightness: u16,
    pub contrast: u16,
    pub saturation: u16,
    pub rotation: Rotation,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Output width overriding the natural width.
    pub width: Option<u32>,
    /// Output height overriding the natural height.
    pub height: Option<u32>,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            brightness: NEUTRAL_PERCENT,
            contrast: NEUTRAL_PERCENT,
            saturation: NEUTRAL_PERCENT,
            rotation: Rotation::Deg0,
            flip_horizontal: false,
            flip_vertical: false,
            width: None,
            height: None,
        }
    }
}

impl EditorState {
    pub fn set_brightness(&mut self, percent: u16) {
        self.brightness = percent.clamp(MIN_PERCENT, MAX_PERCENT);
    }

    pub fn set_contrast(&mut self, percent: u16) {
        self.contrast = percent.clamp(MIN_PERCENT, MAX_PERCENT);
    }

    pub fn set_saturation(&mut self, percent: u16) {
        self.saturation = percent.clamp(MIN_PERCENT, MAX_PERCENT);
    }

    pub fn rotate_clockwise(&mut self) {
        self.rotation = self.rotation.clockwise();
    }

    pub fn rotate_counter_clockwise(&mut self) {
        self.rotation = self.rotation.counter_clockwise();
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn toggle_flip_horizontal(&mut self) {
        self.flip_horizontal = !self.flip_horizontal;
    }

    pub fn toggle_flip_vertical(&mut self) {
        self.flip_vertical = !self.flip_vertical;
    }

    /// Override output size. Zero is treated as one pixel.
    pub fn set_size(&mut self, width: Option<u32>, height: Option<u32>) {
        self.width = width.map(|w| w.max(1));
        self.height = height.map(|h| h.max(1));
    }

    /// Back to neutral colours, no rotation, no flips, natural size.
    pub fn reset_adjustments(&mut self) {
        *self = Self::default();
    }

    /// Size the drawn bitmap takes before rotation.
    pub fn draw_dimensions(&self, natural: (u32, u32)) -> (u32, u32) {
        (
            self.width.unwrap_or(natural.0),
            self.height.unwrap_or(natural.1),
        )
    }

    /// Surface size: the drawn size, transposed for 90°/270°.
    pub fn canvas_dimensions(&self, natural: (u32, u32)) -> (u32, u32) {
        let (w, h) = self.draw_dimensions(natural);
        if self.rotation.swaps_dimensions() {
            (h, w)
        } else {
            (w, h)
        }
    }

    fn has_colour_adjustments(&self) -> bool {
        self.brightness != NEUTRAL_PERCENT
            || self.contrast != NEUTRAL_PERCENT
            || self.saturation != NEUTRAL_PERCENT
    }
}

/// Apply `brightness() contrast() saturate()` in that order, clamping after
/// each stage. Alpha is left untouched.
pub fn apply_colour_filters(img: &mut RgbaImage, brightness: u16, contrast: u16, saturation: u16) {
    let b = brightness as f32 / 100.0;
    let c = contrast as f32 / 100.0;
    let s = saturation as f32 / 100.0;

    // Saturation matrix from the Filter Effects definition of saturate().
    let m = [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ];

    for px in img.pixels_mut() {
        let mut rgb = [0f32; 3];
        for (i, v) in rgb.iter_mut().enumerate() {
            let x = px[i] as f32 / 255.0;
            let x = (x * b).clamp(0.0, 1.0);
            *v = ((x - 0.5) * c + 0.5).clamp(0.0, 1.0);
        }
        for (i, row) in m.iter().enumerate() {
            let x = row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2];
            px[i] = (x.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}

/// Render `original` under `state`. Pure: same inputs, same pixels.
pub fn render(original: &DynamicImage, state: &EditorState) -> RgbaImage {
    let natural = (original.width(), original.height());
    let (w, h) = state.draw_dimensions(natural);

    let mut img = if (w, h) == natural {
        original.to_rgba8()
    } else {
        imageops::resize(&original.to_rgba8(), w, h, FilterType::Triangle)
    };

    if state.has_colour_adjustments() {
        apply_colour_filters(&mut img, state.brightness, state.contrast, state.saturation);
    }

    if state.flip_horizontal {
        imageops::flip_horizontal_in_place(&mut img);
    }
    if state.flip_vertical {
        imageops::flip_vertical_in_place(&mut img);
    }

    match state.rotation {
        Rotation::Deg0 => img,
        Rotation::Deg90 => imageops::rotate90(&img),
        Rotation::Deg180 => imageops::rotate180(&img),
        Rotation::Deg270 => imageops::rotate270(&img),
    }
}

/// An open editing session over one image.
#[derive(Debug)]
pub struct ImageEditor {
    source_name: String,
    original: DynamicImage,
    state: EditorState,
}

impl ImageEditor {
    /// Decode the source once; all later renders start from it.
    pub fn open(input: &InputFile) -> Result<Self, ConvertError> {
        let original = decode(&input.bytes)?;
        debug!(
            "Editor opened {} ({}x{})",
            input.name,
            original.width(),
            original.height()
        );
        Ok(Self {
            source_name: input.name.clone(),
            original,
            state: EditorState::default(),
        })
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn natural_dimensions(&self) -> (u32, u32) {
        (self.original.width(), self.original.height())
    }

    pub fn canvas_dimensions(&self) -> (u32, u32) {
        self.state.canvas_dimensions(self.natural_dimensions())
    }

    /// Change the settings and re-render the preview from the original.
    pub fn adjust(&mut self, change: impl FnOnce(&mut EditorState)) -> RgbaImage {
        change(&mut self.state);
        self.render()
    }

    pub fn render(&self) -> RgbaImage {
        render(&self.original, &self.state)
    }

    /// Encode the current render as PNG, named `<base>_edited.png`.
    pub fn export(&self) -> Result<Artifact, ConvertError> {
        let rendered = DynamicImage::ImageRgba8(self.render());
        let bytes = encode(&rendered, TargetFormat::Png, 100)?;
        Ok(Artifact::new(
            format!("{}_edited.png", crate::registry::base_name(&self.source_name)),
            TargetFormat::Png.mime(),
            bytes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    /// 3x2 image with a distinct colour per pixel.
    fn sample() -> DynamicImage {
        let mut img = RgbaImage::new(3, 2);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgba([(x * 80) as u8, (y * 120) as u8, 40, 255]);
        }
        DynamicImage::ImageRgba8(img)
    }

    fn sample_input() -> InputFile {
        let mut buf = Vec::new();
        sample()
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        InputFile::new("photo.png", buf)
    }

    #[test]
    fn quarter_turns_swap_canvas_dimensions() {
        let mut state = EditorState::default();
        assert_eq!(state.canvas_dimensions((3, 2)), (3, 2));
        state.rotate_clockwise();
        assert_eq!(state.canvas_dimensions((3, 2)), (2, 3));
        state.rotate_clockwise();
        assert_eq!(state.canvas_dimensions((3, 2)), (3, 2));
    }

    #[test]
    fn four_rotations_restore_orientation() {
        let original = sample();
        let before = render(&original, &EditorState::default());
        let mut state = EditorState::default();
        for _ in 0..4 {
            state.rotate_clockwise();
        }
        assert_eq!(state.rotation, Rotation::Deg0);
        assert_eq!(state.canvas_dimensions((3, 2)), (3, 2));
        assert_eq!(render(&original, &state), before);
    }

    #[test]
    fn rotation_is_clockwise() {
        let mut state = EditorState::default();
        state.set_rotation(Rotation::Deg90);
        let out = render(&sample(), &state);
        assert_eq!(out.dimensions(), (2, 3));
        // Bottom-left source pixel (0,1) lands at the top-left after a clockwise turn.
        assert_eq!(out.get_pixel(0, 0), sample().to_rgba8().get_pixel(0, 1));
    }

    #[test]
    fn flip_then_rotate_matches_canvas_transform_order() {
        let src = sample().to_rgba8();
        let mut state = EditorState::default();
        state.toggle_flip_horizontal();
        state.set_rotation(Rotation::Deg90);
        let out = render(&sample(), &state);
        let expected = imageops::rotate90(&imageops::flip_horizontal(&src));
        assert_eq!(out, expected);
    }

    #[test]
    fn custom_size_is_transposed_with_rotation() {
        let mut state = EditorState::default();
        state.set_size(Some(10), Some(4));
        state.set_rotation(Rotation::Deg270);
        assert_eq!(render(&sample(), &state).dimensions(), (4, 10));
        state.set_size(Some(0), None);
        assert_eq!(state.canvas_dimensions((3, 2)), (2, 1));
    }

    #[test]
    fn sliders_are_clamped() {
        let mut state = EditorState::default();
        state.set_brightness(500);
        state.set_saturation(201);
        assert_eq!(state.brightness, MAX_PERCENT);
        assert_eq!(state.saturation, MAX_PERCENT);
        state.reset_adjustments();
        assert_eq!(state, EditorState::default());
    }

    #[test]
    fn neutral_filters_are_identity() {
        let mut img = sample().to_rgba8();
        let before = img.clone();
        apply_colour_filters(&mut img, 100, 100, 100);
        for (a, b) in img.pixels().zip(before.pixels()) {
            for c in 0..4 {
                assert!((a[c] as i16 - b[c] as i16).abs() <= 1);
            }
        }
    }

    #[test]
    fn zero_brightness_is_black_and_zero_saturation_is_gray() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([200, 50, 10, 128]));
        apply_colour_filters(&mut img, 0, 100, 100);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 128]);

        let mut img = RgbaImage::from_pixel(1, 1, Rgba([200, 50, 10, 255]));
        apply_colour_filters(&mut img, 100, 100, 0);
        let px = img.get_pixel(0, 0);
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn adjustments_render_from_the_original() {
        let mut editor = ImageEditor::open(&sample_input()).unwrap();
        let neutral = editor.render();
        editor.adjust(|s| s.set_brightness(0));
        let back = editor.adjust(|s| s.set_brightness(100));
        assert_eq!(back, neutral);
    }

    #[test]
    fn export_is_png() {
        let mut editor = ImageEditor::open(&sample_input()).unwrap();
        editor.adjust(|s| s.rotate_clockwise());
        let out = editor.export().unwrap();
        assert_eq!(out.name, "photo_edited.png");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Png);
        let back = decode(&out.bytes).unwrap();
        assert_eq!((back.width(), back.height()), editor.canvas_dimensions());
        assert_eq!(editor.canvas_dimensions(), (2, 3));
    }

    #[test]
    fn rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(-90), Some(Rotation::Deg270));
        assert_eq!(Rotation::from_degrees(450), Some(Rotation::Deg90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert!((Rotation::Deg180.radians() - PI).abs() < 1e-12);
    }
}
