//! Nearest-neighbor descriptor search and the ratio test.
//!
//! Both the template builder and the form matcher pair descriptors the same
//! way: a brute-force 2-NN search under the Euclidean distance, followed by
//! the ratio test that keeps a match only when its nearest neighbor is
//! clearly closer than the second-nearest.

mod knn;

pub use knn::{good_matches, knn2, ratio_test, DescriptorMatch, KnnPair};
