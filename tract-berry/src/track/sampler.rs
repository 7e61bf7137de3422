//! 邻域采样.

use std::f64::consts::PI;

use either::Either;
use rand::Rng;

use super::history::DirectionHistory;
use crate::classify::{Classifier, Prediction};
use crate::{sphere, Point, TractData, Vec3};

/// 采样点的放置方式.
#[derive(Debug, Clone)]
pub enum SamplingPattern {
    /// 固定的球面模板, 已乘以采样半径. 整次运行复用.
    Sphere(Vec<Vec3>),

    /// 每一步重新随机放置: 方向在球面上均匀分布, 半径在 `[0, radius]` 上均匀分布.
    Random {
        /// 采样点个数.
        count: usize,

        /// 采样半径.
        radius: f64,
    },
}

impl SamplingPattern {
    /// 半径为 `radius` 的 `count` 点螺旋球面模板.
    pub fn sphere(count: usize, radius: f64) -> Self {
        Self::Sphere(sphere::spiral(count).into_iter().map(|d| d * radius).collect())
    }

    /// 采样点个数.
    pub fn len(&self) -> usize {
        match self {
            Self::Sphere(t) => t.len(),
            Self::Random { count, .. } => *count,
        }
    }

    /// 是否没有采样点 (此时只评估中心点).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 本步的采样偏移.
    ///
    /// 若 `forward` 给出, 则丢弃与其点积为负的偏移 (位于后方的采样点).
    pub fn offsets<'a, R: Rng>(
        &'a self,
        forward: Option<Vec3>,
        rng: &'a mut R,
    ) -> impl Iterator<Item = Vec3> + 'a {
        let raw = match self {
            Self::Sphere(t) => Either::Left(t.iter().copied()),
            Self::Random { count, radius } => {
                let radius = *radius;
                Either::Right((0..*count).map(move |_| random_offset(rng, radius)))
            }
        };
        raw.filter(move |o| forward.map_or(true, |f| o.dot(&f) >= 0.0))
    }
}

/// 球内随机偏移: 方向均匀, 半径在 `[0, radius]` 上均匀.
fn random_offset<R: Rng>(rng: &mut R, radius: f64) -> Vec3 {
    let z: f64 = rng.gen_range(-1.0..=1.0);
    let phi: f64 = rng.gen_range(0.0..2.0 * PI);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let len = rng.gen_range(0.0..=radius);
    Vec3::new(r * phi.cos(), r * phi.sin(), z) * len
}

/// 在给定位置评估分类器.
///
/// 内部持有特征缓冲区与推断结果缓冲区, 每根流线 (每个工作线程) 一份.
pub(crate) struct FieldSampler<'a, C> {
    data: &'a TractData,
    classifier: &'a C,
    components: usize,
    features: Vec<f32>,
    prediction: Prediction,
}

impl<'a, C: Classifier> FieldSampler<'a, C> {
    pub fn new(data: &'a TractData, classifier: &'a C, history: usize) -> Self {
        let components = data.field.components();
        Self {
            data,
            classifier,
            components,
            features: vec![0.0; components + 3 * history],
            prediction: Prediction::with_classes(classifier.directions().len()),
        }
    }

    #[inline]
    pub fn classifier(&self) -> &'a C {
        self.classifier
    }

    #[inline]
    pub fn data(&self) -> &'a TractData {
        self.data
    }

    /// 评估 `p` 处的分类器. `p` 不允许追踪 (网格外, 掩膜外或停止区域内) 时返回 `None`.
    pub fn evaluate(&mut self, p: &Point, history: &DirectionHistory) -> Option<&Prediction> {
        if !self.data.is_valid_position(p) {
            return None;
        }
        let (field, past) = self.features.split_at_mut(self.components);
        if !self.data.field.interpolate_into(p, field) {
            return None;
        }
        history.write_features(past);
        self.classifier.predict_into(&self.features, &mut self.prediction);
        Some(&self.prediction)
    }
}
