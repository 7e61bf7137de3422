//! 合并各工作线程的结果, 并清理退化的几何.

use std::collections::HashSet;

use ordered_float::OrderedFloat;

use crate::consts::geom::DUPLICATE_POINT_MM;
use crate::{Fiber, Tractogram};

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelRefMutIterator, ParallelIterator};
    }
}

/// 按分区顺序合并工作线程的局部结果. `cleanup` 为真时再做一次清理.
///
/// 只能在所有工作线程结束后调用.
pub fn assemble(parts: Vec<Tractogram>, cleanup: bool) -> Tractogram {
    let mut out = Tractogram::default();
    for part in parts {
        out.report.merge(&part.report);
        out.fibers.extend(part.fibers);
        out.gm_stubs.extend(part.gm_stubs);
    }
    if cleanup {
        out.report.removed_by_cleanup = clean(&mut out.fibers);
    }
    out
}

/// 清理纤维列表, 返回被移除的纤维数.
///
/// 1. 去除相邻重复点;
/// 2. 去除点数不足 2 或长度近似为 0 的纤维;
/// 3. 去除与前面某根纤维完全相同的纤维.
///
/// 保留下来的纤维相对顺序不变.
pub fn clean(fibers: &mut Vec<Fiber>) -> usize {
    let before = fibers.len();

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            fibers
                .par_iter_mut()
                .for_each(|f| f.dedup_points(DUPLICATE_POINT_MM));
        } else {
            fibers
                .iter_mut()
                .for_each(|f| f.dedup_points(DUPLICATE_POINT_MM));
        }
    }

    fibers.retain(|f| f.len() >= 2 && f.length() > DUPLICATE_POINT_MM);

    let mut seen = HashSet::with_capacity(fibers.len());
    fibers.retain(|f| {
        let key: Vec<[OrderedFloat<f64>; 3]> = f
            .points()
            .iter()
            .map(|p| [p.x, p.y, p.z].map(OrderedFloat))
            .collect();
        seen.insert(key)
    });

    before - fibers.len()
}

#[cfg(test)]
mod tests {
    use super::{assemble, clean};
    use crate::{Fiber, Point, Tractogram};

    fn fiber(xs: &[f64]) -> Fiber {
        let pts = xs.iter().map(|x| Point::new(*x, 0.0, 0.0)).collect();
        Fiber::new(pts, Point::origin(), None, None)
    }

    #[test]
    fn test_clean_degenerate_and_duplicates() {
        let mut fibers = vec![
            fiber(&[0.0, 0.0, 1.0, 1.0, 2.0]),
            fiber(&[5.0]),
            fiber(&[3.0, 3.0]),
            fiber(&[0.0, 1.0, 2.0]),
            fiber(&[7.0, 8.0]),
        ];
        let removed = clean(&mut fibers);
        assert_eq!(removed, 3);
        assert_eq!(fibers.len(), 2);
        assert_eq!(fibers[0].len(), 3);
        assert!((fibers[0].length() - 2.0).abs() < 1e-12);
        assert_eq!(fibers[1].points()[0].x, 7.0);
    }

    #[test]
    fn test_assemble_keeps_partition_order() {
        let mut a = Tractogram::default();
        a.fibers.push(fiber(&[0.0, 1.0]));
        a.report.seeds = 1;
        let mut b = Tractogram::default();
        b.fibers.push(fiber(&[2.0, 3.0]));
        b.fibers.push(fiber(&[4.0, 5.0]));
        b.report.seeds = 2;

        let out = assemble(vec![a, b], false);
        assert_eq!(out.len(), 3);
        assert_eq!(out.report.seeds, 3);
        let firsts: Vec<f64> = out.fibers.iter().map(|f| f.points()[0].x).collect();
        assert_eq!(firsts, vec![0.0, 2.0, 4.0]);
    }
}
