//! 方向分类器推断.
//!
//! 分类器把局部特征向量 (插值后的特征场分量 + 展平的历史方向)
//! 映射为一组离散方向类别上的概率分布, 以及一个 "无纤维" 概率.
//! 追踪器只依赖 [`Classifier`] trait, 分类器的训练不在本 crate 的范围内.

use crate::error::{TrackingError, TrackingResult};
use crate::Vec3;

#[cfg(feature = "serde")]
mod forest;
mod peak;

#[cfg(feature = "serde")]
pub use forest::{DecisionForest, ForestModel, ForestNode, ForestTree};
pub use peak::PeakClassifier;

/// 分类器单次推断的结果.
///
/// 该结构可以在多次推断之间复用以避免重复分配.
#[derive(Debug, Clone, Default)]
pub struct Prediction {
    /// 每个方向类别的概率, 与 [`Classifier::directions`] 一一对应.
    pub probs: Vec<f32>,

    /// "无纤维" 概率. `1 - no_fiber` 即该次推断的置信度.
    pub no_fiber: f32,
}

impl Prediction {
    /// 为 `n` 个方向类别创建全零结果, `no_fiber` 为 1.
    pub fn with_classes(n: usize) -> Self {
        Self {
            probs: vec![0.0; n],
            no_fiber: 1.0,
        }
    }

    /// 置信度, 即 `1 - no_fiber`, 截断到 `[0, 1]`.
    #[inline]
    pub fn confidence(&self) -> f64 {
        num::clamp(1.0 - self.no_fiber as f64, 0.0, 1.0)
    }

    /// 清空为 "无纤维".
    #[inline]
    pub fn reset(&mut self, n: usize) {
        self.probs.clear();
        self.probs.resize(n, 0.0);
        self.no_fiber = 1.0;
    }
}

/// 方向分类器.
///
/// 实现必须是只读的: 追踪期间同一个分类器在所有工作线程间共享.
pub trait Classifier: Sync {
    /// 方向类别, 均为单位向量.
    fn directions(&self) -> &[Vec3];

    /// 方向类别是否是轴向的 (即 `d` 与 `-d` 等价).
    ///
    /// 轴向类别在投票时会被翻转到与上一方向同侧.
    #[inline]
    fn is_axial(&self) -> bool {
        true
    }

    /// 检查特征场分量个数 `field_components` 与历史方向个数 `history`
    /// 能否组成该分类器可接受的特征向量.
    #[inline]
    fn validate_features(&self, field_components: usize, history: usize) -> TrackingResult<()> {
        let _ = (field_components, history);
        Ok(())
    }

    /// 对特征向量 `features` 推断, 结果写入 `out`.
    fn predict_into(&self, features: &[f32], out: &mut Prediction);

    /// 对特征向量 `features` 推断.
    fn predict(&self, features: &[f32]) -> Prediction {
        let mut out = Prediction::with_classes(self.directions().len());
        self.predict_into(features, &mut out);
        out
    }
}

/// 要求特征向量长度恰好为 `expected` 的检查.
#[inline]
pub(crate) fn exact_feature_len(
    expected: usize,
    field_components: usize,
    history: usize,
) -> TrackingResult<()> {
    let found = field_components + 3 * history;
    if found == expected {
        Ok(())
    } else {
        Err(TrackingError::FeatureLength(expected, found))
    }
}
