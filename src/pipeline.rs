//! Filesystem-level training and recognition.
//!
//! Training walks a root directory with one subfolder per form. Each folder
//! holds the reference scan, named after the folder, plus any number of
//! auxiliary scans of the same form filled in by hand. Templates are saved
//! next to the scans, so the same root doubles as the template store.
//!
//! Available when the `image-io` feature is enabled.

use crate::features::FeatureExtractor;
use crate::image::io::load_working_image;
use crate::matcher::{FormMatcher, Recognition};
use crate::template::{BuilderConfig, FormTemplate, TemplateBuilder, TemplateStore};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{FormMatchError, FormMatchResult};
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions accepted as scans (compared case-insensitively).
pub const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "tif", "tiff"];

const FRONT_MARKER: &str = "recto";
const BACK_MARKER: &str = "verso";

/// Outcome of a training run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingReport {
    /// Forms whose template was built and saved.
    pub trained: Vec<String>,
    /// Forms left alone because a template was already persisted.
    pub skipped: Vec<String>,
    /// Forms that failed, with the reason.
    pub failed: Vec<(String, FormMatchError)>,
}

impl TrainingReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

fn sorted_entries(dir: &Path) -> FormMatchResult<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)
        .map_err(|err| FormMatchError::io(dir, err))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| FormMatchError::io(dir, err))?;
    paths.sort();
    Ok(paths)
}

fn folder_name(path: &Path) -> FormMatchResult<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .ok_or(FormMatchError::InvalidInput("folder name is not valid UTF-8"))
}

/// Builds the template of the form stored in `folder`.
///
/// The reference is the image whose file stem equals the folder name; the
/// other images, in file-name order, are the auxiliary samples.
pub fn train_form<E: FeatureExtractor>(
    folder: &Path,
    extractor: &E,
    builder: &TemplateBuilder,
) -> FormMatchResult<FormTemplate> {
    let form = folder_name(folder)?;
    let size = builder.config().working_size;

    let mut reference = None;
    let mut auxiliary = Vec::new();
    for path in sorted_entries(folder)?.into_iter().filter(|p| is_image(p)) {
        let features = extractor.extract(load_working_image(&path, size)?.view())?;
        let is_reference = path.file_stem().and_then(|s| s.to_str()) == Some(form.as_str());
        if is_reference && reference.is_none() {
            reference = Some(features);
        } else {
            auxiliary.push(features);
        }
    }

    let reference = reference.ok_or_else(|| FormMatchError::MissingReferenceImage {
        form: form.clone(),
        folder: folder.to_path_buf(),
    })?;
    builder.build(&form, &reference, &auxiliary)
}

/// Trains every form folder under `root` and saves the templates there.
///
/// Without `force`, folders that already hold a persisted template are
/// skipped. A failing form, including a folder whose name is not valid
/// UTF-8, is logged and reported; the run continues.
/// Fails only when `root` cannot be listed or `cfg` is invalid.
pub fn train_forms<E: FeatureExtractor>(
    root: impl AsRef<Path>,
    extractor: &E,
    cfg: &BuilderConfig,
    force: bool,
) -> FormMatchResult<TrainingReport> {
    let root = root.as_ref();
    let _span = trace_span!("train_forms", force = force).entered();
    let builder = TemplateBuilder::new(cfg.clone())?;

    let mut report = TrainingReport::default();
    for folder in sorted_entries(root)?.into_iter().filter(|p| p.is_dir()) {
        let form = match folder_name(&folder) {
            Ok(form) => form,
            Err(err) => {
                let form = folder
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                trace_warn!("form_training_failed", form = form.as_str(), reason = "non-utf8 name");
                report.failed.push((form, err));
                continue;
            }
        };
        if !force && TemplateStore::contains_persisted(root, &form) {
            report.skipped.push(form);
            continue;
        }
        let outcome = train_form(&folder, extractor, &builder)
            .and_then(|template| TemplateStore::save(root, &template));
        match outcome {
            Ok(()) => report.trained.push(form),
            Err(err) => {
                let reason = err.to_string();
                trace_warn!(
                    "form_training_failed",
                    form = form.as_str(),
                    reason = reason.as_str()
                );
                report.failed.push((form, err));
            }
        }
    }
    trace_event!(
        "training_done",
        trained = report.trained.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len()
    );
    Ok(report)
}

/// Loads, normalizes and recognizes one scan.
pub fn recognize_path<E: FeatureExtractor>(
    path: impl AsRef<Path>,
    extractor: &E,
    matcher: &FormMatcher<'_>,
) -> FormMatchResult<Recognition> {
    let image = load_working_image(path, matcher.config().working_size)?;
    let scan = extractor.extract(image.view())?;
    matcher.recognize_features(&scan, image.view())
}

/// Per-scan result of a batch.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub outcome: FormMatchResult<Recognition>,
}

/// Recognizes scans one after another, in the given order.
///
/// A failing scan is logged and returned as a failed item; the remaining
/// scans are still processed.
pub fn recognize_batch<E, P>(paths: &[P], extractor: &E, matcher: &FormMatcher<'_>) -> Vec<BatchItem>
where
    E: FeatureExtractor,
    P: AsRef<Path>,
{
    let _span = trace_span!("recognize_batch", items = paths.len()).entered();
    paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            let outcome = recognize_path(path, extractor, matcher);
            if let Err(err) = &outcome {
                let item = path.display().to_string();
                let reason = err.to_string();
                trace_warn!(
                    "batch_item_failed",
                    path = item.as_str(),
                    reason = reason.as_str()
                );
            }
            BatchItem {
                path: path.to_path_buf(),
                outcome,
            }
        })
        .collect()
}

/// Path of the back side of a front scan: `name_R.ext` becomes `name_V.ext`.
///
/// Returns `None` when the file stem does not end in `_R`.
pub fn back_side_path(front: impl AsRef<Path>) -> Option<PathBuf> {
    let front = front.as_ref();
    let stem = front.file_stem()?.to_str()?;
    let base = stem.strip_suffix("_R")?;
    let mut name = format!("{base}_V");
    if let Some(ext) = front.extension().and_then(|e| e.to_str()) {
        name.push('.');
        name.push_str(ext);
    }
    Some(front.with_file_name(name))
}

/// Recognitions of both sides of a two-page form.
#[derive(Clone, Debug)]
pub struct PairRecognition {
    pub front: Recognition,
    pub back: Recognition,
}

/// Recognizes a front/back pair.
///
/// The front must resolve to a form whose name contains `recto` and the
/// back to one containing `verso`.
pub fn recognize_pair<E: FeatureExtractor>(
    front: impl AsRef<Path>,
    back: impl AsRef<Path>,
    extractor: &E,
    matcher: &FormMatcher<'_>,
) -> FormMatchResult<PairRecognition> {
    let front = recognize_path(front, extractor, matcher)?;
    let back = recognize_path(back, extractor, matcher)?;
    if !front.form_name.contains(FRONT_MARKER) {
        return Err(FormMatchError::SideMismatch {
            expected: FRONT_MARKER,
            form: front.form_name,
        });
    }
    if !back.form_name.contains(BACK_MARKER) {
        return Err(FormMatchError::SideMismatch {
            expected: BACK_MARKER,
            form: back.form_name,
        });
    }
    Ok(PairRecognition { front, back })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_side_replaces_suffix() {
        assert_eq!(
            back_side_path("scans/0042_R.jpg"),
            Some(PathBuf::from("scans/0042_V.jpg"))
        );
        assert_eq!(back_side_path("scans/0042_R"), Some(PathBuf::from("scans/0042_V")));
        assert_eq!(back_side_path("scans/0042.jpg"), None);
    }

    #[test]
    fn image_extensions_ignore_case() {
        assert!(is_image(Path::new("a/b.JPG")));
        assert!(is_image(Path::new("a/b.tiff")));
        assert!(!is_image(Path::new("a/b_descriptors.json")));
        assert!(!is_image(Path::new("a/b")));
    }
}
