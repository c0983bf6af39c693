//! Template persistence.
//!
//! Each form lives in its own directory under a root:
//!
//! ```text
//! root/
//!   form_a/
//!     form_a_descriptors.json
//!     form_a_keypoints.json
//! ```
//!
//! Both files hold a `{ "rows": .., "cols": .., "data": [..] }` row-major
//! `f32` array. Keypoint arrays have two columns `(x, y)`.

use super::FormTemplate;
use crate::features::{FeatureSet, Keypoint};
use crate::trace::{trace_event, trace_span, trace_warn};
use crate::util::{FormMatchError, FormMatchResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name suffix of the persisted descriptor array.
pub const DESCRIPTORS_SUFFIX: &str = "_descriptors.json";
/// File name suffix of the persisted keypoint array.
pub const KEYPOINTS_SUFFIX: &str = "_keypoints.json";

#[derive(Debug, Serialize, Deserialize)]
struct PersistedArray {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl PersistedArray {
    fn read(path: &Path) -> FormMatchResult<Self> {
        let text = fs::read_to_string(path).map_err(|err| FormMatchError::io(path, err))?;
        let array: Self =
            serde_json::from_str(&text).map_err(|err| FormMatchError::Serialization {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        if array.rows.checked_mul(array.cols) != Some(array.data.len()) {
            return Err(FormMatchError::Serialization {
                path: path.to_path_buf(),
                reason: format!(
                    "{} values for a {}x{} array",
                    array.data.len(),
                    array.rows,
                    array.cols
                ),
            });
        }
        Ok(array)
    }

    fn write(&self, path: &Path) -> FormMatchResult<()> {
        let text = serde_json::to_string(self).map_err(|err| FormMatchError::Serialization {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        fs::write(path, text).map_err(|err| FormMatchError::io(path, err))
    }
}

fn descriptors_path(root: &Path, form: &str) -> PathBuf {
    root.join(form).join(format!("{form}{DESCRIPTORS_SUFFIX}"))
}

fn keypoints_path(root: &Path, form: &str) -> PathBuf {
    root.join(form).join(format!("{form}{KEYPOINTS_SUFFIX}"))
}

/// Ordered collection of templates keyed by form name.
///
/// Iteration follows insertion order, which [`TemplateStore::load`] makes
/// lexicographic by form name. Ties during recognition resolve to the
/// earlier template.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateStore {
    templates: Vec<FormTemplate>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a template, replacing one with the same form name in place.
    pub fn insert(&mut self, template: FormTemplate) {
        match self
            .templates
            .iter_mut()
            .find(|t| t.form_name() == template.form_name())
        {
            Some(slot) => *slot = template,
            None => self.templates.push(template),
        }
    }

    /// Looks up a template by form name.
    pub fn get(&self, form_name: &str) -> Option<&FormTemplate> {
        self.templates.iter().find(|t| t.form_name() == form_name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FormTemplate> {
        self.templates.iter()
    }

    /// Form names in store order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.iter().map(FormTemplate::form_name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Writes `template` under `root/{form}/`, creating the directory.
    pub fn save(root: impl AsRef<Path>, template: &FormTemplate) -> FormMatchResult<()> {
        let root = root.as_ref();
        let form = template.form_name();
        let dir = root.join(form);
        fs::create_dir_all(&dir).map_err(|err| FormMatchError::io(&dir, err))?;

        let features = template.features();
        let keypoints = PersistedArray {
            rows: features.len(),
            cols: 2,
            data: features.keypoints().iter().flat_map(|kp| [kp.x, kp.y]).collect(),
        };
        let descriptors = PersistedArray {
            rows: features.len(),
            cols: features.dim(),
            data: features.descriptors().to_vec(),
        };
        descriptors.write(&descriptors_path(root, form))?;
        keypoints.write(&keypoints_path(root, form))?;
        trace_event!("template_saved", pairs = features.len());
        Ok(())
    }

    /// Returns true if both persisted files of `form` exist under `root`.
    pub fn contains_persisted(root: impl AsRef<Path>, form: &str) -> bool {
        let root = root.as_ref();
        descriptors_path(root, form).is_file() && keypoints_path(root, form).is_file()
    }

    /// Loads the template of one form.
    pub fn load_form(root: impl AsRef<Path>, form: &str) -> FormMatchResult<FormTemplate> {
        let root = root.as_ref();
        let kp_path = keypoints_path(root, form);
        let descriptors = PersistedArray::read(&descriptors_path(root, form))?;
        let keypoints = PersistedArray::read(&kp_path)?;
        if keypoints.cols != 2 {
            return Err(FormMatchError::Serialization {
                path: kp_path,
                reason: format!("keypoint array has {} columns, expected 2", keypoints.cols),
            });
        }
        let keypoints = keypoints
            .data
            .chunks_exact(2)
            .map(|xy| Keypoint::new(xy[0], xy[1]))
            .collect();
        let features = FeatureSet::new(keypoints, descriptors.data, descriptors.cols)?;
        Ok(FormTemplate::new(form, features))
    }

    /// Loads every complete template found in the subfolders of `root`.
    ///
    /// Subfolders are visited in lexicographic order. Folders missing either
    /// file, or holding unreadable or misaligned arrays, are skipped with a
    /// warning. Fails only when `root` itself cannot be listed.
    pub fn load(root: impl AsRef<Path>) -> FormMatchResult<Self> {
        let root = root.as_ref();
        let _span = trace_span!("store_load").entered();

        let mut forms = Vec::new();
        for entry in fs::read_dir(root).map_err(|err| FormMatchError::io(root, err))? {
            let entry = entry.map_err(|err| FormMatchError::io(root, err))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str() {
                Some(name) => forms.push(name.to_owned()),
                None => {
                    let lossy = name.to_string_lossy();
                    trace_warn!(
                        "store_entry_skipped",
                        form = &*lossy,
                        reason = "non-utf8 name"
                    );
                }
            }
        }
        forms.sort();

        let mut store = Self::new();
        for form in &forms {
            if !Self::contains_persisted(root, form) {
                trace_warn!("store_entry_skipped", form = form.as_str(), reason = "incomplete");
                continue;
            }
            match Self::load_form(root, form) {
                Ok(template) => store.insert(template),
                Err(err) => {
                    let reason = err.to_string();
                    trace_warn!(
                        "store_entry_skipped",
                        form = form.as_str(),
                        reason = reason.as_str()
                    );
                }
            }
        }
        trace_event!("store_loaded", templates = store.len());
        Ok(store)
    }
}

impl<'a> IntoIterator for &'a TemplateStore {
    type Item = &'a FormTemplate;
    type IntoIter = std::slice::Iter<'a, FormTemplate>;

    fn into_iter(self) -> Self::IntoIter {
        self.templates.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(name: &str) -> FormTemplate {
        let features = FeatureSet::from_rows(
            vec![Keypoint::new(1.25, 2.5), Keypoint::new(0.1, 1e-7)],
            vec![vec![0.3, -0.7, 0.123_456_79], vec![1.0, f32::MIN_POSITIVE, -2.5]],
        )
        .unwrap();
        FormTemplate::new(name, features)
    }

    #[test]
    fn insert_replaces_same_name() {
        let mut store = TemplateStore::new();
        store.insert(template("b"));
        store.insert(template("a"));
        store.insert(template("b"));
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn save_then_load_form_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let t = template("recto_a");
        TemplateStore::save(dir.path(), &t).unwrap();
        assert!(TemplateStore::contains_persisted(dir.path(), "recto_a"));
        assert_eq!(TemplateStore::load_form(dir.path(), "recto_a").unwrap(), t);
    }

    #[test]
    fn misaligned_arrays_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        TemplateStore::save(dir.path(), &template("f")).unwrap();
        let path = dir.path().join("f").join("f_keypoints.json");
        fs::write(&path, r#"{"rows":1,"cols":2,"data":[1.0,2.0]}"#).unwrap();
        assert!(matches!(
            TemplateStore::load_form(dir.path(), "f"),
            Err(FormMatchError::DescriptorLengthMismatch { .. })
        ));
    }
}
