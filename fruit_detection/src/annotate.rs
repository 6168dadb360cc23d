use crate::{detection::Detection, error::AnnotationError, labels::ClassNames};
use ab_glyph::{FontVec, PxScale};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
    rect::Rect,
};
use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_STRIP_HEIGHT: u32 = 18;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const PALETTE: [[u8; 3]; 12] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
    [255, 128, 0],
    [255, 0, 128],
    [128, 255, 0],
    [0, 128, 255],
    [255, 255, 255],
    [128, 0, 255],
];

/// Renders detections onto the source image and stores the result as a
/// compressed JPEG.
pub struct Annotator {
    output_dir: PathBuf,
    url_prefix: String,
    jpeg_quality: u8,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(output_dir: impl Into<PathBuf>, url_prefix: impl Into<String>, jpeg_quality: u8) -> Self {
        Self {
            output_dir: output_dir.into(),
            url_prefix: url_prefix.into().trim_end_matches('/').to_string(),
            jpeg_quality: jpeg_quality.clamp(1, 100),
            font: None,
        }
    }

    /// Without a font only boxes and label strips are drawn.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self, AnnotationError> {
        let data = std::fs::read(path)
            .map_err(|e| AnnotationError::Font(format!("{}: {}", path.display(), e)))?;
        let font = FontVec::try_from_vec(data)
            .map_err(|e| AnnotationError::Font(format!("{}: {}", path.display(), e)))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn draw(&self, image: &DynamicImage, detections: &[Detection], names: &ClassNames) -> RgbImage {
        let mut canvas = image.to_rgb8();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        for detection in detections {
            let color = Rgb(names
                .color(detection.class_id)
                .unwrap_or(PALETTE[detection.class_id as usize % PALETTE.len()]));
            let [x1, y1, x2, y2] = detection.box_xyxy;
            let x1 = (x1.floor() as i32).clamp(0, width as i32 - 1);
            let y1 = (y1.floor() as i32).clamp(0, height as i32 - 1);
            let x2 = (x2.ceil() as i32).clamp(0, width as i32 - 1);
            let y2 = (y2.ceil() as i32).clamp(0, height as i32 - 1);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            for t in 0..BOX_THICKNESS {
                let w = x2 - x1 - 2 * t;
                let h = y2 - y1 - 2 * t;
                if w <= 0 || h <= 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(x1 + t, y1 + t).of_size(w as u32 + 1, h as u32 + 1),
                    color,
                );
            }

            let label = format!("{} {:.2}", detection.class_name, detection.confidence);
            self.draw_label(&mut canvas, &label, x1, y1, color);
        }

        canvas
    }

    fn draw_label(&self, canvas: &mut RgbImage, label: &str, x: i32, y: i32, color: Rgb<u8>) {
        let scale = PxScale::from(LABEL_FONT_SIZE);
        let text_width = match &self.font {
            Some(font) => text_size(scale, font, label).0 + 4,
            None => (label.len() as u32) * 8,
        };
        let strip_y = (y - LABEL_STRIP_HEIGHT as i32).max(0);
        let strip_width = text_width.min(canvas.width().saturating_sub(x as u32));
        if strip_width == 0 {
            return;
        }

        draw_filled_rect_mut(
            canvas,
            Rect::at(x, strip_y).of_size(strip_width, LABEL_STRIP_HEIGHT),
            color,
        );
        if let Some(font) = &self.font {
            draw_text_mut(canvas, TEXT_COLOR, x + 2, strip_y + 1, scale, font, label);
        }
    }

    /// Draws, encodes and writes the annotated image, returning the path to
    /// record in the result (`<url_prefix>/<file>`).
    pub fn save(
        &self,
        image: &DynamicImage,
        detections: &[Detection],
        names: &ClassNames,
    ) -> Result<String, AnnotationError> {
        let annotated = self.draw(image, detections, names);

        std::fs::create_dir_all(&self.output_dir).map_err(AnnotationError::OutputDir)?;
        let file_name = format!("{}_pred.jpg", uuid::Uuid::new_v4().simple());
        let out_path = self.output_dir.join(&file_name);

        let writer = BufWriter::new(File::create(&out_path)?);
        let mut encoder = JpegEncoder::new_with_quality(writer, self.jpeg_quality);
        if let Err(e) = encoder.encode_image(&annotated) {
            let _ = std::fs::remove_file(&out_path);
            return Err(e.into());
        }

        tracing::debug!("Saved annotated image to {}", out_path.display());
        Ok(format!("{}/{}", self.url_prefix, file_name))
    }
}
