//! 方向选择: 由邻域投票得到下一步的传播方向.

use itertools::Itertools;
use ordered_float::NotNan;
use rand::Rng;

use super::history::DirectionHistory;
use super::notify::{Subject, TrackingEvent};
use super::params::TrackingParams;
use super::sampler::{FieldSampler, SamplingPattern};
use crate::classify::{Classifier, Prediction};
use crate::consts::geom::{DIRECTION_EPS, FRONTAL_COS};
use crate::{Point, TractData, Vec3};

/// 单个采样点的投票.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vote {
    /// 单位方向.
    pub dir: Vec3,

    /// 权重, 即分类器置信度, 恒为正.
    pub weight: f64,
}

/// 把一次推断结果转为投票.
///
/// 与上一方向 `prev` 夹角余弦小于 `cos_threshold` 的类别概率视为 0.
/// 轴向类别先翻转到与 `prev` 同侧; 没有上一方向时翻转到与概率最大的类别同侧.
/// 置信度为 0 或没有存活类别时返回 `None`, 即一次否定投票.
pub fn vote<C: Classifier + ?Sized>(
    classifier: &C,
    pred: &Prediction,
    prev: Option<Vec3>,
    cos_threshold: f64,
) -> Option<Vote> {
    let weight = pred.confidence();
    if !(weight > 0.0) {
        return None;
    }
    let dirs = classifier.directions();
    let axial = classifier.is_axial();
    let reference = prev.or_else(|| {
        if !axial {
            return None;
        }
        pred.probs
            .iter()
            .position_max_by(|a, b| a.total_cmp(b))
            .map(|i| dirs[i])
    });

    let mut sum = Vec3::zeros();
    let mut mass = 0.0;
    for (d, &p) in dirs.iter().zip(pred.probs.iter()) {
        if !(p > 0.0) {
            continue;
        }
        let mut d = *d;
        if axial && reference.is_some_and(|r| d.dot(&r) < 0.0) {
            d = -d;
        }
        if prev.is_some_and(|l| d.dot(&l) < cos_threshold) {
            continue;
        }
        sum += d * p as f64;
        mass += p as f64;
    }
    let norm = sum.norm();
    if !(mass > 0.0) || !(norm > DIRECTION_EPS * mass) {
        return None;
    }
    Some(Vote {
        dir: sum / norm,
        weight,
    })
}

/// 投票箱.
#[derive(Debug)]
struct Ballot {
    sum: Vec3,
    best: Option<(NotNan<f64>, Vec3)>,
}

impl Ballot {
    fn new() -> Self {
        Self {
            sum: Vec3::zeros(),
            best: None,
        }
    }

    fn add(&mut self, v: Vote) {
        self.sum += v.dir * v.weight;
        if let Ok(w) = NotNan::new(v.weight) {
            if self.best.map_or(true, |(b, _)| w > b) {
                self.best = Some((w, v.dir));
            }
        }
    }

    /// 加权和方向. 和向量退化时由权重最大的一票决定; 没有任何正权重投票时返回 `None`.
    fn finish(self) -> Option<Vec3> {
        let (_, best) = self.best?;
        Some(self.sum.try_normalize(DIRECTION_EPS).unwrap_or(best))
    }
}

/// 方向选择器. 每个工作线程一份.
pub(crate) struct DirectionSelector<'a, C> {
    sampler: FieldSampler<'a, C>,
    pattern: &'a SamplingPattern,
    offsets: Vec<Vec3>,
    cos_threshold: f64,
    only_forward: bool,
    use_stop_votes: bool,
    avoid_stop: bool,
    deflection_mod: f64,
    events: Option<&'a Subject<TrackingEvent>>,
}

impl<'a, C: Classifier> DirectionSelector<'a, C> {
    /// `events` 非空时, 每一步的采样点都会作为 [`TrackingEvent::Sampled`] 发布.
    pub fn new(
        data: &'a TractData,
        classifier: &'a C,
        pattern: &'a SamplingPattern,
        params: &TrackingParams,
        events: Option<&'a Subject<TrackingEvent>>,
    ) -> Self {
        Self {
            sampler: FieldSampler::new(data, classifier, params.num_previous_directions),
            pattern,
            offsets: Vec::with_capacity(pattern.len()),
            cos_threshold: params.cos_threshold(),
            only_forward: params.only_forward_samples,
            use_stop_votes: params.use_stop_votes,
            avoid_stop: params.avoid_stop,
            deflection_mod: params.deflection_mod,
            events,
        }
    }

    #[inline]
    pub fn data(&self) -> &'a TractData {
        self.sampler.data()
    }

    /// 在 `p` 处评估并投票.
    fn vote_at(&mut self, p: &Point, history: &DirectionHistory) -> Option<Vote> {
        let classifier = self.sampler.classifier();
        let cos_threshold = self.cos_threshold;
        let prev = history.last();
        let pred = self.sampler.evaluate(p, history)?;
        vote(classifier, pred, prev, cos_threshold)
    }

    /// 选择 `pos` 处的下一步单位方向. 返回 `None` 表示应当停止.
    pub fn next_direction<R: Rng>(
        &mut self,
        pos: &Point,
        history: &DirectionHistory,
        rng: &mut R,
    ) -> Option<Vec3> {
        let prev = history.last();
        let mut ballot = Ballot::new();
        if let Some(v) = self.vote_at(pos, history) {
            ballot.add(v);
        }

        self.offsets.clear();
        let forward = prev.filter(|_| self.only_forward);
        self.offsets.extend(self.pattern.offsets(forward, rng));

        if let Some(events) = self.events {
            events.publish(&TrackingEvent::Sampled {
                position: *pos,
                samples: self.offsets.iter().map(|o| pos + o).collect(),
            });
        }

        let mut stop = false;
        for k in 0..self.offsets.len() {
            let offset = self.offsets[k];
            let sample = pos + offset;
            let frontal = prev.is_some_and(|l| {
                let n = offset.norm();
                n > DIRECTION_EPS && offset.dot(&l) / n > FRONTAL_COS
            });

            if !self.data().is_valid_position(&sample) {
                let Some(l) = prev.filter(|_| self.avoid_stop) else {
                    continue;
                };
                // 镜像: 前方点关于上一方向对称, 后方点取反.
                let mirrored = if frontal {
                    -offset + l * (2.0 * offset.dot(&l))
                } else {
                    -offset
                };
                if let Some(v) = self.vote_at(&(pos + mirrored), history) {
                    if let Some(u) = mirrored.try_normalize(DIRECTION_EPS) {
                        ballot.sum += u * self.deflection_mod;
                    }
                    ballot.add(v);
                }
                continue;
            }

            match self.vote_at(&sample, history) {
                Some(v) => ballot.add(v),
                None => stop |= self.use_stop_votes && frontal,
            }
        }
        if stop {
            return None;
        }

        let chosen = ballot.finish()?;
        match prev {
            Some(l) => (chosen + l * self.deflection_mod).try_normalize(DIRECTION_EPS),
            None => Some(chosen),
        }
    }
}
