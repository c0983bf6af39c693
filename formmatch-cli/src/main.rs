use clap::Parser;
use formmatch::fields::DEFAULT_FIELD_PADDING;
use formmatch::image::io::save_gray_image;
use formmatch::pipeline::{back_side_path, recognize_batch, recognize_pair, train_forms};
use formmatch::{
    BuilderConfig, FieldLayout, FormMatcher, MatcherConfig, OcrEngine, PatchExtractor,
    PatchExtractorConfig, RansacOptions, Recognition, TemplateStore, WorkingSize,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "FormMatch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
enum Mode {
    Train,
    #[default]
    Infer,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct WorkingSizeJson {
    width: usize,
    height: usize,
}

impl Default for WorkingSizeJson {
    fn default() -> Self {
        let size = WorkingSize::default();
        Self {
            width: size.width,
            height: size.height,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ExtractorJson {
    max_keypoints: usize,
    window_radius: usize,
    harris_k: f32,
    rel_threshold: f32,
    nms_radius: usize,
    patch_radius: usize,
    grid: usize,
}

impl Default for ExtractorJson {
    fn default() -> Self {
        let cfg = PatchExtractorConfig::default();
        Self {
            max_keypoints: cfg.max_keypoints,
            window_radius: cfg.window_radius,
            harris_k: cfg.harris_k,
            rel_threshold: cfg.rel_threshold,
            nms_radius: cfg.nms_radius,
            patch_radius: cfg.patch_radius,
            grid: cfg.grid,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RansacJson {
    max_iters: usize,
    thresh: f64,
    min_inliers: usize,
    confidence: f64,
    seed: u64,
    refit_on_inliers: bool,
}

impl Default for RansacJson {
    fn default() -> Self {
        let opts = RansacOptions::default();
        Self {
            max_iters: opts.max_iters,
            thresh: opts.thresh,
            min_inliers: opts.min_inliers,
            confidence: opts.confidence,
            seed: opts.seed,
            refit_on_inliers: opts.refit_on_inliers,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BuilderJson {
    top_k: usize,
    ratio: f32,
    skip_first_auxiliary: bool,
}

impl Default for BuilderJson {
    fn default() -> Self {
        let cfg = BuilderConfig::default();
        Self {
            top_k: cfg.top_k,
            ratio: cfg.ratio,
            skip_first_auxiliary: cfg.skip_first_auxiliary,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatcherJson {
    ratio: f32,
    min_matches: usize,
    parallel: bool,
}

impl Default for MatcherJson {
    fn default() -> Self {
        let cfg = MatcherConfig::default();
        Self {
            ratio: cfg.ratio,
            min_matches: cfg.min_matches,
            parallel: cfg.parallel,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FieldsJson {
    layouts_dir: Option<String>,
    padding: usize,
    /// Engine tag echoed in the output. The CLI emits field boxes only; text
    /// recognition is left to the named engine downstream.
    ocr: String,
    limit: Option<usize>,
}

impl Default for FieldsJson {
    fn default() -> Self {
        Self {
            layouts_dir: None,
            padding: DEFAULT_FIELD_PADDING,
            ocr: OcrEngine::Tesseract.tag().to_owned(),
            limit: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    mode: Mode,
    forms_root: String,
    force: bool,
    images: Vec<String>,
    pairs: bool,
    output_path: Option<String>,
    rectified_dir: Option<String>,
    working_size: WorkingSizeJson,
    extractor: ExtractorJson,
    ransac: RansacJson,
    builder: BuilderJson,
    matcher: MatcherJson,
    fields: FieldsJson,
}

impl Config {
    fn working_size(&self) -> Result<WorkingSize, formmatch::FormMatchError> {
        WorkingSize::new(self.working_size.width, self.working_size.height)
    }

    fn ransac(&self) -> RansacOptions {
        RansacOptions {
            max_iters: self.ransac.max_iters,
            thresh: self.ransac.thresh,
            min_inliers: self.ransac.min_inliers,
            confidence: self.ransac.confidence,
            seed: self.ransac.seed,
            refit_on_inliers: self.ransac.refit_on_inliers,
        }
    }

    fn ocr(&self) -> Result<OcrEngine, formmatch::FormMatchError> {
        self.fields.ocr.parse()
    }

    fn extractor(&self) -> Result<PatchExtractor, formmatch::FormMatchError> {
        PatchExtractor::new(PatchExtractorConfig {
            max_keypoints: self.extractor.max_keypoints,
            window_radius: self.extractor.window_radius,
            harris_k: self.extractor.harris_k,
            rel_threshold: self.extractor.rel_threshold,
            nms_radius: self.extractor.nms_radius,
            patch_radius: self.extractor.patch_radius,
            grid: self.extractor.grid,
        })
    }
}

#[derive(Debug, Serialize)]
struct FailureRecord {
    name: String,
    error: String,
}

#[derive(Debug, Serialize)]
struct TrainOutput {
    trained: Vec<String>,
    skipped: Vec<String>,
    failed: Vec<FailureRecord>,
}

#[derive(Debug, Serialize)]
struct ScoreRecord {
    form_name: String,
    good_matches: usize,
}

#[derive(Debug, Serialize)]
struct FieldRecord {
    label: String,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
}

#[derive(Debug, Serialize)]
struct RecognitionRecord {
    path: String,
    form_name: Option<String>,
    homography: Option<[f64; 9]>,
    inliers: usize,
    scores: Vec<ScoreRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rectified_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl RecognitionRecord {
    fn failed(path: &Path, error: impl ToString) -> Self {
        Self {
            path: path.display().to_string(),
            form_name: None,
            homography: None,
            inliers: 0,
            scores: Vec::new(),
            fields: Vec::new(),
            rectified_path: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct InferOutput {
    ocr: String,
    results: Vec<RecognitionRecord>,
}

fn describe(
    path: &Path,
    rec: &Recognition,
    config: &Config,
) -> Result<RecognitionRecord, Box<dyn std::error::Error>> {
    let fields = match &config.fields.layouts_dir {
        Some(dir) => {
            let layout_path = Path::new(dir).join(format!("{}.json", rec.form_name));
            let layout = FieldLayout::load(
                &layout_path,
                rec.rectified.width(),
                rec.rectified.height(),
                config.fields.padding,
            )?;
            layout
                .fields()
                .iter()
                .take(config.fields.limit.unwrap_or(usize::MAX))
                .map(|f| FieldRecord {
                    label: f.label.clone(),
                    x: f.x,
                    y: f.y,
                    width: f.width,
                    height: f.height,
                })
                .collect()
        }
        None => Vec::new(),
    };

    let rectified_path = match &config.rectified_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("scan");
            let out = Path::new(dir).join(format!("{stem}_rectified.png"));
            save_gray_image(&rec.rectified, &out)?;
            Some(out.display().to_string())
        }
        None => None,
    };

    Ok(RecognitionRecord {
        path: path.display().to_string(),
        form_name: Some(rec.form_name.clone()),
        homography: Some(rec.homography.to_row_major()),
        inliers: rec.inlier_count(),
        scores: rec
            .scores
            .iter()
            .map(|s| ScoreRecord {
                form_name: s.form_name.clone(),
                good_matches: s.good_matches,
            })
            .collect(),
        fields,
        rectified_path,
        error: None,
    })
}

/// Like [`describe`], but a layout or output failure becomes a failed record
/// that keeps the recognized form name.
fn record(path: &Path, rec: &Recognition, config: &Config) -> RecognitionRecord {
    match describe(path, rec, config) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                form = %rec.form_name,
                error = %err,
                "describe failed"
            );
            let mut record = RecognitionRecord::failed(path, err);
            record.form_name = Some(rec.form_name.clone());
            record
        }
    }
}

fn run_train(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    let extractor = config.extractor()?;
    let builder = BuilderConfig {
        working_size: config.working_size()?,
        top_k: config.builder.top_k,
        ratio: config.builder.ratio,
        skip_first_auxiliary: config.builder.skip_first_auxiliary,
        ransac: config.ransac(),
    };
    let report = train_forms(&config.forms_root, &extractor, &builder, config.force)?;
    tracing::info!(
        trained = report.trained.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "training finished"
    );
    let output = TrainOutput {
        trained: report.trained,
        skipped: report.skipped,
        failed: report
            .failed
            .into_iter()
            .map(|(name, err)| FailureRecord {
                name,
                error: err.to_string(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn run_infer(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    if config.images.is_empty() {
        return Err("images must list at least one scan in infer mode".into());
    }
    let ocr = config.ocr()?;
    let extractor = config.extractor()?;
    let store = TemplateStore::load(&config.forms_root)?;
    let matcher = FormMatcher::new(
        &store,
        MatcherConfig {
            working_size: config.working_size()?,
            ratio: config.matcher.ratio,
            min_matches: config.matcher.min_matches,
            ransac: config.ransac(),
            parallel: config.matcher.parallel,
        },
    )?;

    let mut results = Vec::new();
    if config.pairs {
        for front in config.images.iter().map(PathBuf::from) {
            let Some(back) = back_side_path(&front) else {
                results.push(RecognitionRecord::failed(&front, "front scan name must end in _R"));
                continue;
            };
            match recognize_pair(&front, &back, &extractor, &matcher) {
                Ok(pair) => {
                    results.push(record(&front, &pair.front, config));
                    results.push(record(&back, &pair.back, config));
                }
                Err(err) => results.push(RecognitionRecord::failed(&front, err)),
            }
        }
    } else {
        for item in recognize_batch(&config.images, &extractor, &matcher) {
            match &item.outcome {
                Ok(rec) => {
                    tracing::info!(path = %item.path.display(), form = %rec.form_name, "recognized");
                    results.push(record(&item.path, rec, config));
                }
                Err(err) => results.push(RecognitionRecord::failed(&item.path, err)),
            }
        }
    }

    let output = InferOutput {
        ocr: ocr.to_string(),
        results,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("formmatch=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.forms_root.is_empty() {
        return Err("forms_root must be set in the config".into());
    }

    let json = match config.mode {
        Mode::Train => run_train(&config)?,
        Mode::Infer => run_infer(&config)?,
    };

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use formmatch::{FormScore, Homography, OwnedImage};

    fn recognition(form: &str) -> Recognition {
        Recognition {
            form_name: form.to_owned(),
            homography: Homography::identity(),
            inlier_mask: vec![true; 6],
            keypoints: Vec::new(),
            rectified: OwnedImage::filled(40, 20, 0.5).unwrap(),
            scores: vec![FormScore {
                form_name: form.to_owned(),
                good_matches: 6,
            }],
        }
    }

    const LAYOUT: &str = r#"[{"annotations":[{"result":[
        {"type":"labels","value":{"x":10,"y":10,"width":50,"height":50,"labels":["name"]}}
    ]}]}]"#;

    #[test]
    fn missing_layout_fails_only_its_record() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("verso_b.json"), LAYOUT).unwrap();
        let config = Config {
            fields: FieldsJson {
                layouts_dir: Some(dir.path().display().to_string()),
                padding: 0,
                ..FieldsJson::default()
            },
            ..Config::default()
        };

        let records = [
            record(Path::new("0001_R.png"), &recognition("recto_a"), &config),
            record(Path::new("0001_V.png"), &recognition("verso_b"), &config),
        ];
        assert_eq!(records[0].form_name.as_deref(), Some("recto_a"));
        assert!(records[0].error.is_some());
        assert!(records[0].fields.is_empty());
        assert!(records[1].error.is_none());
        assert_eq!(records[1].inliers, 6);
        assert_eq!(records[1].fields.len(), 1);
        assert_eq!(records[1].fields[0].label, "name");
    }

    #[test]
    fn unwritable_rectified_dir_fails_only_its_record() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"").unwrap();
        let config = Config {
            rectified_dir: Some(blocker.join("out").display().to_string()),
            ..Config::default()
        };

        let rec = record(Path::new("0002.png"), &recognition("recto_a"), &config);
        assert_eq!(rec.form_name.as_deref(), Some("recto_a"));
        assert!(rec.error.is_some());
        assert!(rec.rectified_path.is_none());
    }

    #[test]
    fn ocr_tag_is_validated() {
        let mut config = Config::default();
        assert_eq!(config.ocr().unwrap(), OcrEngine::Tesseract);
        config.fields.ocr = "abbyy".to_owned();
        assert!(matches!(
            config.ocr(),
            Err(formmatch::FormMatchError::UnknownOcrEngine(tag)) if tag == "abbyy"
        ));
    }
}
