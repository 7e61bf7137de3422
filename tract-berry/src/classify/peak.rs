//! 峰值分类器: 特征场前三个分量即为该处的纤维主方向.

use super::{Classifier, Prediction};
use crate::error::{TrackingError, TrackingResult};
use crate::{sphere, Vec3};

/// 把特征场前三个分量视为峰值向量的确定性分类器.
///
/// 适用于张量主方向场和合成场. 方向类别是 2 次细分的正二十面体顶点 (162 个).
/// 类别 `d` 的概率正比于 `cos(d, peak)^sharpness`, 置信度为峰值向量模长
/// (截断到 1). 历史方向被忽略.
#[derive(Debug, Clone)]
pub struct PeakClassifier {
    directions: Vec<Vec3>,
    axial: bool,
    sharpness: i32,
}

impl PeakClassifier {
    /// 默认锐度.
    pub const DEFAULT_SHARPNESS: i32 = 8;

    /// 轴向峰值 (张量主方向没有正负之分).
    #[inline]
    pub fn axial() -> Self {
        Self::new(true, Self::DEFAULT_SHARPNESS)
    }

    /// 有向峰值. 与峰值方向夹角超过 90° 的类别概率为 0.
    #[inline]
    pub fn polar() -> Self {
        Self::new(false, Self::DEFAULT_SHARPNESS)
    }

    /// 指定是否轴向以及锐度. `sharpness` 至少为 1, 否则 panic.
    pub fn new(axial: bool, sharpness: i32) -> Self {
        assert!(sharpness >= 1);
        Self {
            directions: sphere::icosphere(2),
            axial,
            sharpness,
        }
    }
}

impl Classifier for PeakClassifier {
    #[inline]
    fn directions(&self) -> &[Vec3] {
        &self.directions
    }

    #[inline]
    fn is_axial(&self) -> bool {
        self.axial
    }

    fn validate_features(&self, field_components: usize, _history: usize) -> TrackingResult<()> {
        if field_components >= 3 {
            Ok(())
        } else {
            Err(TrackingError::FeatureLength(3, field_components))
        }
    }

    fn predict_into(&self, features: &[f32], out: &mut Prediction) {
        out.reset(self.directions.len());
        let [x, y, z] = match features {
            [x, y, z, ..] => [*x, *y, *z].map(f64::from),
            _ => return,
        };
        let peak = Vec3::new(x, y, z);
        let magnitude = peak.norm();
        if !magnitude.is_finite() || magnitude < 1e-6 {
            return;
        }
        let unit = peak / magnitude;

        let mut sum = 0.0;
        for (p, d) in out.probs.iter_mut().zip(self.directions.iter()) {
            let c = d.dot(&unit);
            let c = if self.axial { c.abs() } else { c.max(0.0) };
            let v = c.powi(self.sharpness);
            *p = v as f32;
            sum += v;
        }
        if sum <= 0.0 {
            return;
        }
        let confidence = magnitude.min(1.0);
        out.probs
            .iter_mut()
            .for_each(|p| *p = (*p as f64 / sum * confidence) as f32);
        out.no_fiber = (1.0 - confidence) as f32;
    }
}
