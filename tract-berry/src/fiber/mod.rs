//! 纤维与纤维集合.

use std::fmt;
use std::time::Duration;

use crate::Point;

mod save;

pub use save::VtkWrite;

/// 单个生长方向终止的原因. 这些都是正常结果而不是错误.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StopReason {
    /// 再走一步将超过最大纤维长度.
    Length,

    /// 下一个位置在网格外, 掩膜外或停止区域内.
    Mask,

    /// 最近一段路径弯曲过大.
    Curvature,

    /// 没有有效的传播方向.
    NoDirection,

    /// 进入灰质.
    GrayMatter,
}

impl StopReason {
    /// 全部终止原因.
    pub const ALL: [StopReason; 5] = [
        Self::Length,
        Self::Mask,
        Self::Curvature,
        Self::NoDirection,
        Self::GrayMatter,
    ];

    /// 在 [`Self::ALL`] 中的下标.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Length => 0,
            Self::Mask => 1,
            Self::Curvature => 2,
            Self::NoDirection => 3,
            Self::GrayMatter => 4,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Length => "length",
            Self::Mask => "mask",
            Self::Curvature => "curvature",
            Self::NoDirection => "no-direction",
            Self::GrayMatter => "gray-matter",
        };
        f.write_str(s)
    }
}

/// 折线的路径长度.
pub fn path_length(points: &[Point]) -> f64 {
    points
        .windows(2)
        .map(|w| (w[1] - w[0]).norm())
        .sum()
}

/// 一根已定型的纤维. 定型后不可再修改.
///
/// 点按照从 "起点端" 到 "终点端" 排列. 双向生长并拼接的纤维中,
/// 起点端是反向生长的末端, 终点端是正向生长的末端.
#[derive(Debug, Clone, PartialEq)]
pub struct Fiber {
    points: Vec<Point>,
    length: f64,
    seed: Point,
    start: Option<StopReason>,
    end: Option<StopReason>,
}

impl Fiber {
    /// 由点列创建纤维. `start` 与 `end` 分别是两端的终止原因,
    /// `None` 表示该端就是种子点 (单向生长).
    pub fn new(
        points: Vec<Point>,
        seed: Point,
        start: Option<StopReason>,
        end: Option<StopReason>,
    ) -> Self {
        let length = path_length(&points);
        Self {
            points,
            length,
            seed,
            start,
            end,
        }
    }

    /// 点列.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// 点数.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// 是否没有点.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 路径长度 (毫米).
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// 种子点.
    #[inline]
    pub fn seed(&self) -> &Point {
        &self.seed
    }

    /// 起点端的终止原因.
    #[inline]
    pub fn start_reason(&self) -> Option<StopReason> {
        self.start
    }

    /// 终点端的终止原因.
    #[inline]
    pub fn end_reason(&self) -> Option<StopReason> {
        self.end
    }

    /// 任意一端是否因为 `r` 而终止?
    #[inline]
    pub fn stopped_by(&self, r: StopReason) -> bool {
        self.start == Some(r) || self.end == Some(r)
    }

    /// 去除相邻重复点, 并重新计算长度. 只在清理阶段使用.
    pub(crate) fn dedup_points(&mut self, eps: f64) {
        self.points.dedup_by(|b, a| (*b - *a).norm() < eps);
        self.length = path_length(&self.points);
    }
}

/// 一次运行的统计.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingReport {
    /// 种子点总数.
    pub seeds: usize,

    /// 实际处理的种子点数. 被中止时小于 `seeds`.
    pub processed: usize,

    /// 被接受的纤维数 (清理之前).
    pub accepted: usize,

    /// 被丢弃的纤维数 (含灰质残段).
    pub discarded: usize,

    /// 清理阶段移除的纤维数.
    pub removed_by_cleanup: usize,

    /// 是否被中止.
    pub aborted: bool,

    /// 运行耗时.
    pub elapsed: Duration,

    stops: [usize; 5],
}

impl TrackingReport {
    /// 记录一次生长方向的终止.
    #[inline]
    pub fn record_stop(&mut self, r: StopReason) {
        self.stops[r.index()] += 1;
    }

    /// 因 `r` 而终止的生长方向个数.
    #[inline]
    pub fn stops(&self, r: StopReason) -> usize {
        self.stops[r.index()]
    }

    /// 合并另一个工作线程的统计. 耗时不参与合并.
    pub fn merge(&mut self, other: &TrackingReport) {
        self.seeds += other.seeds;
        self.processed += other.processed;
        self.accepted += other.accepted;
        self.discarded += other.discarded;
        self.removed_by_cleanup += other.removed_by_cleanup;
        self.aborted |= other.aborted;
        for (a, b) in self.stops.iter_mut().zip(other.stops) {
            *a += b;
        }
    }
}

impl fmt::Display for TrackingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seeds {}/{}, accepted {}, discarded {}, cleaned {}",
            self.processed, self.seeds, self.accepted, self.discarded, self.removed_by_cleanup
        )?;
        for r in StopReason::ALL {
            write!(f, ", {r} {}", self.stops(r))?;
        }
        if self.aborted {
            write!(f, " (aborted)")?;
        }
        Ok(())
    }
}

/// 追踪结果.
#[derive(Debug, Clone, Default)]
pub struct Tractogram {
    /// 被接受的纤维, 按分区顺序, 分区内按种子枚举顺序排列.
    pub fibers: Vec<Fiber>,

    /// 灰质残段: 因过短被丢弃, 但至少有一端在灰质中终止的纤维.
    pub gm_stubs: Vec<Fiber>,

    /// 统计.
    pub report: TrackingReport,
}

impl Tractogram {
    /// 纤维数.
    #[inline]
    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    /// 是否没有纤维.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    /// 转为折线数据.
    #[inline]
    pub fn to_polylines(&self) -> PolyLines {
        PolyLines::from_fibers(&self.fibers)
    }
}

/// 输出用的折线数据: 所有点展平存放, 第 `i` 条折线的点为
/// `points[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PolyLines {
    points: Vec<Point>,
    offsets: Vec<usize>,
}

impl PolyLines {
    /// 由纤维列表创建.
    pub fn from_fibers(fibers: &[Fiber]) -> Self {
        let total = fibers.iter().map(Fiber::len).sum();
        let mut points = Vec::with_capacity(total);
        let mut offsets = Vec::with_capacity(fibers.len() + 1);
        offsets.push(0);
        for f in fibers {
            points.extend_from_slice(f.points());
            offsets.push(points.len());
        }
        Self { points, offsets }
    }

    /// 折线条数.
    #[inline]
    pub fn num_lines(&self) -> usize {
        self.offsets.len() - 1
    }

    /// 总点数.
    #[inline]
    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// 所有点.
    #[inline]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// 折线偏移, 长度为 `num_lines() + 1`.
    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// 第 `i` 条折线.
    #[inline]
    pub fn line(&self, i: usize) -> &[Point] {
        &self.points[self.offsets[i]..self.offsets[i + 1]]
    }

    /// 按顺序遍历所有折线.
    pub fn lines(&self) -> impl Iterator<Item = &[Point]> + '_ {
        self.offsets
            .windows(2)
            .map(|w| &self.points[w[0]..w[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::{Fiber, PolyLines, StopReason, TrackingReport};
    use crate::Point;

    fn line(n: usize) -> Fiber {
        let pts = (0..n).map(|i| Point::new(i as f64, 0.0, 0.0)).collect();
        Fiber::new(pts, Point::origin(), None, Some(StopReason::Length))
    }

    #[test]
    fn test_fiber_length() {
        let f = line(5);
        assert_eq!(f.len(), 5);
        assert!((f.length() - 4.0).abs() < 1e-12);
        assert!(f.stopped_by(StopReason::Length));
        assert!(!f.stopped_by(StopReason::Mask));
    }

    #[test]
    fn test_polylines_layout() {
        let lines = PolyLines::from_fibers(&[line(3), line(2)]);
        assert_eq!(lines.num_lines(), 2);
        assert_eq!(lines.num_points(), 5);
        assert_eq!(lines.offsets(), &[0, 3, 5]);
        assert_eq!(lines.line(1).len(), 2);
        assert_eq!(lines.lines().map(<[Point]>::len).collect::<Vec<_>>(), vec![3, 2]);

        let empty = PolyLines::from_fibers(&[]);
        assert_eq!(empty.num_lines(), 0);
    }

    #[test]
    fn test_report_merge() {
        let mut a = TrackingReport::default();
        a.seeds = 2;
        a.record_stop(StopReason::Mask);
        let mut b = TrackingReport::default();
        b.seeds = 3;
        b.aborted = true;
        b.record_stop(StopReason::Mask);
        b.record_stop(StopReason::Length);
        a.merge(&b);
        assert_eq!(a.seeds, 5);
        assert!(a.aborted);
        assert_eq!(a.stops(StopReason::Mask), 2);
        assert_eq!(a.stops(StopReason::Length), 1);
        assert_eq!(a.stops(StopReason::Curvature), 0);
    }
}
