//! Low-level building blocks for custom recognition pipelines.
//!
//! These expose the descriptor search, consensus steps, robust estimation
//! and resampling used by the high-level `TemplateBuilder` and `FormMatcher`.
//! Most users should prefer those two types.

pub use crate::candidate::nms::nms_2d;
pub use crate::candidate::peak::Peak;
pub use crate::geometry::ransac::ransac;
pub use crate::geometry::{dlt_homography, Estimator, RansacResult};
pub use crate::image::resize::resize_bilinear;
pub use crate::image::warp::warp_perspective;
pub use crate::kernel::{DefaultL2, DistanceKernel};
pub use crate::search::{knn2, ratio_test, KnnPair};
pub use crate::template::{select_top_k, InlierHistogram};
