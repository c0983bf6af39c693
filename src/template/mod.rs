//! Form templates: consensus building and persistence.
//!
//! A [`FormTemplate`] is the consensus-filtered reference feature set of one
//! form layout. Templates are produced by the [`TemplateBuilder`] or loaded
//! by the [`TemplateStore`] and never change afterwards.

mod builder;
mod consensus;
mod store;

pub use builder::{BuilderConfig, TemplateBuilder};
pub use consensus::{select_top_k, InlierHistogram};
pub use store::{TemplateStore, DESCRIPTORS_SUFFIX, KEYPOINTS_SUFFIX};

use crate::features::FeatureSet;

/// Consensus-filtered reference features of one form.
#[derive(Clone, Debug, PartialEq)]
pub struct FormTemplate {
    form_name: String,
    features: FeatureSet,
}

impl FormTemplate {
    pub(crate) fn new(form_name: impl Into<String>, features: FeatureSet) -> Self {
        Self {
            form_name: form_name.into(),
            features,
        }
    }

    /// Form identifier (the training folder name).
    pub fn form_name(&self) -> &str {
        &self.form_name
    }

    /// Retained keypoints and descriptors, in rank order.
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Number of retained pairs.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the template retained no pairs.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
