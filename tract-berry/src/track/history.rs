//! 历史方向队列.

use std::collections::VecDeque;

use crate::consts::geom::HISTORY_VALID_NORM;
use crate::Vec3;

/// 单根流线的历史方向, 最新的方向在最前面.
///
/// 队列长度固定为 `capacity`, 播种时用零向量填满; 零向量表示 "没有历史方向".
/// 即使 `capacity` 为 0, 最近一次的方向也会被单独记录, 供方向选择使用.
#[derive(Debug, Clone)]
pub struct DirectionHistory {
    dirs: VecDeque<Vec3>,
    last: Option<Vec3>,
}

impl DirectionHistory {
    /// 创建长度为 `capacity` 的空历史.
    pub fn new(capacity: usize) -> Self {
        Self {
            dirs: VecDeque::from(vec![Vec3::zeros(); capacity]),
            last: None,
        }
    }

    /// 以 `dir` 为唯一历史方向重新开始 (反向生长时使用).
    pub fn restart(&mut self, dir: Option<Vec3>) {
        self.dirs.iter_mut().for_each(|d| *d = Vec3::zeros());
        self.last = None;
        if let Some(d) = dir {
            self.push(d);
        }
    }

    /// 压入最新的方向, 丢弃最旧的方向.
    pub fn push(&mut self, dir: Vec3) {
        if !self.dirs.is_empty() {
            self.dirs.pop_back();
            self.dirs.push_front(dir);
        }
        self.last = Some(dir);
    }

    /// 最近一次的有效方向.
    #[inline]
    pub fn last(&self) -> Option<Vec3> {
        self.last.filter(|d| d.norm() > HISTORY_VALID_NORM)
    }

    /// 历史长度.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.dirs.len()
    }

    /// 把历史方向按 `(x, y, z)` 展平写入 `out`. `out` 长度必须为 `3 * capacity`.
    pub fn write_features(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), 3 * self.dirs.len());
        for (chunk, d) in out.chunks_exact_mut(3).zip(self.dirs.iter()) {
            chunk[0] = d.x as f32;
            chunk[1] = d.y as f32;
            chunk[2] = d.z as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DirectionHistory;
    use crate::Vec3;

    #[test]
    fn test_history_order_and_features() {
        let mut h = DirectionHistory::new(2);
        assert!(h.last().is_none());

        let mut out = [9f32; 6];
        h.write_features(&mut out);
        assert_eq!(out, [0.0; 6]);

        h.push(Vec3::x());
        h.push(Vec3::y());
        h.push(Vec3::z());
        assert_eq!(h.last(), Some(Vec3::z()));
        h.write_features(&mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

        h.restart(Some(-Vec3::x()));
        h.write_features(&mut out);
        assert_eq!(out, [-1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_zero_capacity_keeps_last() {
        let mut h = DirectionHistory::new(0);
        h.push(Vec3::y());
        assert_eq!(h.capacity(), 0);
        assert_eq!(h.last(), Some(Vec3::y()));
        h.write_features(&mut []);
    }
}
