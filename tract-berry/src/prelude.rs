//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx3d, Point, Vec3};

pub use crate::{FeatureField, Geometry, LabelVolume, TractData, VolumeAttr};

pub use crate::classify::{Classifier, PeakClassifier, Prediction};

#[cfg(feature = "serde")]
pub use crate::classify::DecisionForest;

pub use crate::consts::tissue;

pub use crate::dataset::home_dataset_dir_with;
pub use crate::dataset::{self, open_npz};

pub use crate::fiber::{Fiber, PolyLines, StopReason, Tractogram, TrackingReport, VtkWrite};

pub use crate::track::{Tracker, TrackingControl, TrackingEvent, TrackingParams};

pub use crate::{TrackingError, TrackingResult};
