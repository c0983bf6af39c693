//! Field layouts and the OCR collaborator boundary.
//!
//! A field layout is exported from Label-Studio as a JSON list of tasks,
//! each with annotations whose `labels` results carry a box in percent of
//! the image size. Boxes are converted to pixels of the rectified image,
//! padded, and cropped before being handed to a [`TextRecognizer`].

use crate::image::{ImageView, OwnedImage};
use crate::util::{FormMatchError, FormMatchResult};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Padding in pixels added around every field box.
pub const DEFAULT_FIELD_PADDING: usize = 5;

/// Supported OCR engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OcrEngine {
    Google,
    TrOcr,
    Tesseract,
}

impl OcrEngine {
    pub const ALL: [OcrEngine; 3] = [OcrEngine::Google, OcrEngine::TrOcr, OcrEngine::Tesseract];

    /// Tag used in configuration files.
    pub fn tag(self) -> &'static str {
        match self {
            OcrEngine::Google => "google",
            OcrEngine::TrOcr => "trocr",
            OcrEngine::Tesseract => "tesseract",
        }
    }
}

impl FromStr for OcrEngine {
    type Err = FormMatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OcrEngine::ALL
            .into_iter()
            .find(|engine| engine.tag() == s)
            .ok_or_else(|| FormMatchError::UnknownOcrEngine(s.to_owned()))
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Text recognition backend for cropped fields.
pub trait TextRecognizer {
    /// Engine implemented by this recognizer.
    fn engine(&self) -> OcrEngine;

    /// Reads the text in a cropped field image.
    fn recognize(&self, crop: ImageView<'_, f32>) -> FormMatchResult<String>;
}

/// Picks the recognizer implementing `engine`.
pub fn select_recognizer<'r>(
    engine: OcrEngine,
    recognizers: &[&'r dyn TextRecognizer],
) -> FormMatchResult<&'r dyn TextRecognizer> {
    recognizers
        .iter()
        .copied()
        .find(|r| r.engine() == engine)
        .ok_or_else(|| FormMatchError::UnknownOcrEngine(engine.tag().to_owned()))
}

/// Padded pixel box of one labeled field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldBox {
    pub label: String,
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

#[derive(Deserialize)]
struct LabelTask {
    #[serde(default)]
    annotations: Vec<LabelAnnotation>,
}

#[derive(Deserialize)]
struct LabelAnnotation {
    #[serde(default)]
    result: Vec<LabelResult>,
}

#[derive(Deserialize)]
struct LabelResult {
    #[serde(rename = "type")]
    kind: String,
    value: Option<LabelValue>,
}

#[derive(Deserialize)]
struct LabelValue {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
    #[serde(default)]
    labels: Vec<String>,
}

/// Ordered field boxes of one form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldLayout {
    fields: Vec<FieldBox>,
}

impl FieldLayout {
    pub fn new(fields: Vec<FieldBox>) -> Self {
        Self { fields }
    }

    /// Parses a Label-Studio export for an image of `width` x `height`.
    ///
    /// Only `labels` results are kept; a box takes its first label. Boxes
    /// are grown by `padding` on every side and clipped at the top-left
    /// image corner.
    pub fn from_label_json(
        json: &str,
        width: usize,
        height: usize,
        padding: usize,
    ) -> FormMatchResult<Self> {
        let tasks: Vec<LabelTask> =
            serde_json::from_str(json).map_err(|err| FormMatchError::InvalidLayout {
                reason: err.to_string(),
            })?;

        let (w, h, pad) = (width as f64, height as f64, padding as f64);
        let mut fields = Vec::new();
        let results = tasks
            .iter()
            .flat_map(|task| &task.annotations)
            .flat_map(|annotation| &annotation.result)
            .filter(|result| result.kind == "labels");
        for result in results {
            let Some(value) = &result.value else {
                return Err(FormMatchError::InvalidLayout {
                    reason: "labels result without a value".to_owned(),
                });
            };
            let Some(label) = value.labels.first() else {
                continue;
            };
            if !(value.width >= 0.0 && value.height >= 0.0) {
                return Err(FormMatchError::InvalidLayout {
                    reason: format!("field {label} has a negative extent"),
                });
            }
            let x0 = (value.x * w / 100.0 - pad).max(0.0).floor();
            let y0 = (value.y * h / 100.0 - pad).max(0.0).floor();
            let x1 = ((value.x + value.width) * w / 100.0 + pad).ceil();
            let y1 = ((value.y + value.height) * h / 100.0 + pad).ceil();
            fields.push(FieldBox {
                label: label.clone(),
                x: x0 as usize,
                y: y0 as usize,
                width: (x1 - x0).max(0.0) as usize,
                height: (y1 - y0).max(0.0) as usize,
            });
        }
        Ok(Self { fields })
    }

    /// Reads and parses a Label-Studio export file.
    pub fn load(
        path: impl AsRef<Path>,
        width: usize,
        height: usize,
        padding: usize,
    ) -> FormMatchResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|err| FormMatchError::io(path, err))?;
        Self::from_label_json(&json, width, height, padding)
    }

    pub fn fields(&self) -> &[FieldBox] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Crops `field` out of `image`, clipped to the image bounds.
pub fn crop_field(image: ImageView<'_, f32>, field: &FieldBox) -> FormMatchResult<OwnedImage> {
    let x1 = field.x.saturating_add(field.width).min(image.width());
    let y1 = field.y.saturating_add(field.height).min(image.height());
    if field.x >= x1 || field.y >= y1 {
        return Err(FormMatchError::InvalidLayout {
            reason: format!("field {} lies outside the image", field.label),
        });
    }
    let roi = image.roi(field.x, field.y, x1 - field.x, y1 - field.y)?;
    OwnedImage::from_view(roi)
}

/// Reads up to `limit` fields of `layout` in order, returning
/// `(label, text)` pairs.
pub fn read_fields<R: TextRecognizer + ?Sized>(
    image: ImageView<'_, f32>,
    layout: &FieldLayout,
    recognizer: &R,
    limit: Option<usize>,
) -> FormMatchResult<Vec<(String, String)>> {
    let take = limit.unwrap_or(usize::MAX);
    layout
        .fields()
        .iter()
        .take(take)
        .map(|field| {
            let crop = crop_field(image, field)?;
            let text = recognizer.recognize(crop.view())?;
            Ok((field.label.clone(), text.trim().to_owned()))
        })
        .collect()
}
