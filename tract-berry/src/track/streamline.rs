//! 单根流线的逐步积分.

use rand::Rng;

use super::history::DirectionHistory;
use super::params::TrackingParams;
use super::selector::DirectionSelector;
use crate::classify::Classifier;
use crate::consts::geom::{CURVATURE_WINDOW_MM, DIRECTION_EPS, MAX_CURVATURE_DEG};
use crate::fiber::path_length;
use crate::{Fiber, Point, StopReason, Tractogram, Vec3};

/// 纤维定型后的去向.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 加入结果.
    Accepted,

    /// 过短被丢弃.
    Discarded,

    /// 过短被丢弃, 但作为灰质残段保留.
    GmStub,
}

/// 流线积分器的状态.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamlineState {
    /// 已放置种子, 尚未生长.
    Seeded,

    /// 正在生长.
    Growing,

    /// 当前生长方向已终止.
    Stopped(StopReason),

    /// 种子处理完毕. 参数为最后一根纤维的去向.
    Terminated(Outcome),
}

/// 单个方向的生长结果. `points[0]` 是种子点.
#[derive(Debug)]
struct Half {
    points: Vec<Point>,
    length: f64,
    stop: StopReason,
}

/// 后验曲率检查.
///
/// 取末尾路径长度至少为 5mm 的窗口 (路径不足 5mm 时取整条路径),
/// 累加窗口内相邻两段之间的转角. 累计转角超过 30° 时返回窗口起点下标,
/// 窗口内其后的点应当被裁掉.
pub fn curvature_violation(points: &[Point]) -> Option<usize> {
    let mut k = points.len().checked_sub(1)?;
    let mut dist = 0.0;
    let mut turn = 0f64;
    let mut later: Option<Vec3> = None;
    while k > 0 && dist < CURVATURE_WINDOW_MM {
        let s = points[k] - points[k - 1];
        dist += s.norm();
        k -= 1;
        // 零长度段不参与转角计算.
        let Some(s) = s.try_normalize(DIRECTION_EPS) else {
            continue;
        };
        if let Some(l) = later {
            turn += num::clamp(s.dot(&l), -1.0, 1.0).acos();
        }
        later = Some(s);
    }
    (turn.to_degrees() > MAX_CURVATURE_DEG).then_some(k)
}

/// 流线积分器. 每个工作线程一份, 依次处理该线程分区内的种子.
pub(crate) struct Integrator<'a, C> {
    selector: DirectionSelector<'a, C>,
    params: &'a TrackingParams,
    step: f64,
    history: DirectionHistory,
    state: StreamlineState,
}

impl<'a, C: Classifier> Integrator<'a, C> {
    pub fn new(selector: DirectionSelector<'a, C>, params: &'a TrackingParams, step: f64) -> Self {
        Self {
            selector,
            params,
            step,
            history: DirectionHistory::new(params.num_previous_directions),
            state: StreamlineState::Seeded,
        }
    }

    #[inline]
    pub fn state(&self) -> StreamlineState {
        self.state
    }

    /// 从 `seed` 出发追踪, 结果写入线程局部的 `out`. 返回被接受的纤维数.
    pub fn track_seed<R: Rng>(&mut self, seed: Point, rng: &mut R, out: &mut Tractogram) -> usize {
        self.state = StreamlineState::Seeded;
        let data = self.selector.data();
        if !data.is_valid_position(&seed) {
            self.state = StreamlineState::Terminated(Outcome::Discarded);
            out.report.discarded += 1;
            return 0;
        }

        self.history.restart(None);
        let Some(dir) = self.selector.next_direction(&seed, &self.history, rng) else {
            self.state = StreamlineState::Stopped(StopReason::NoDirection);
            out.report.record_stop(StopReason::NoDirection);
            self.state = StreamlineState::Terminated(Outcome::Discarded);
            out.report.discarded += 1;
            return 0;
        };

        let front = self.grow(seed, dir, 0.0, rng);
        out.report.record_stop(front.stop);
        let back = if self.params.seed_only_gm {
            None
        } else {
            let half = self.grow(seed, -dir, front.length, rng);
            out.report.record_stop(half.stop);
            Some(half)
        };

        let fibers = match back {
            None => vec![Fiber::new(front.points, seed, None, Some(front.stop))],
            Some(back) if self.params.concatenate_halves => {
                let mut points = Vec::with_capacity(front.points.len() + back.points.len() - 1);
                points.extend(back.points.iter().skip(1).rev());
                points.extend(front.points);
                vec![Fiber::new(points, seed, Some(back.stop), Some(front.stop))]
            }
            Some(back) => vec![
                Fiber::new(front.points, seed, None, Some(front.stop)),
                Fiber::new(back.points, seed, None, Some(back.stop)),
            ],
        };

        let mut accepted = 0;
        for fiber in fibers {
            let outcome = self.finalize(fiber, out);
            if outcome == Outcome::Accepted {
                accepted += 1;
            }
            self.state = StreamlineState::Terminated(outcome);
        }
        accepted
    }

    /// 定型: 过短的纤维被丢弃, 其中在灰质中终止的作为残段保留.
    fn finalize(&self, fiber: Fiber, out: &mut Tractogram) -> Outcome {
        if fiber.len() >= 2 && fiber.length() >= self.params.min_tract_length {
            out.report.accepted += 1;
            out.fibers.push(fiber);
            return Outcome::Accepted;
        }
        out.report.discarded += 1;
        if fiber.len() >= 2 && fiber.stopped_by(StopReason::GrayMatter) {
            out.gm_stubs.push(fiber);
            Outcome::GmStub
        } else {
            Outcome::Discarded
        }
    }

    /// 沿 `dir` 生长一个方向. `used` 是另一方向已经消耗的长度.
    fn grow<R: Rng>(&mut self, seed: Point, mut dir: Vec3, used: f64, rng: &mut R) -> Half {
        self.state = StreamlineState::Growing;
        self.history.restart(None);
        let data = self.selector.data();
        let mut points = vec![seed];
        let mut length = 0.0;
        let mut pos = seed;
        let mut gm_armed = !self.params.seed_only_gm;

        let stop = loop {
            let next = pos + dir * self.step;
            if !data.is_valid_position(&next) {
                break StopReason::Mask;
            }
            if used + length + self.step > self.params.max_tract_length {
                break StopReason::Length;
            }
            points.push(next);
            length += self.step;
            pos = next;

            if data.tissue.is_some() {
                let in_gm = data.is_gray_matter(&pos);
                if in_gm && gm_armed {
                    break StopReason::GrayMatter;
                }
                gm_armed |= !in_gm;
            }

            if self.params.aposteriori_curv_check {
                if let Some(k) = curvature_violation(&points) {
                    points.truncate(k + 1);
                    length = path_length(&points);
                    break StopReason::Curvature;
                }
            }

            self.history.push(dir);
            match self.selector.next_direction(&pos, &self.history, rng) {
                Some(d) => dir = d,
                None => break StopReason::NoDirection,
            }
        };
        self.state = StreamlineState::Stopped(stop);
        Half {
            points,
            length,
            stop,
        }
    }
}
