//! 单组参数的运行统计.

use std::time::Duration;

use tract_berry::{StopReason, Tractogram, TrackingReport};

/// ablation 数据统计. 在多个受试者上累加.
#[derive(Clone, Debug, Default)]
pub struct Profile {
    /// 成功追踪的受试者个数.
    subjects: u64,

    /// 所有受试者的合并统计.
    report: TrackingReport,

    /// 清理后保留的纤维总数.
    fibers: u64,

    /// 纤维总点数.
    points: u64,

    /// 纤维总长度 (mm).
    length: f64,

    /// 追踪总耗时.
    elapsed: Duration,

    /// 最耗时的一次追踪.
    slowest: Option<Duration>,
}

impl Profile {
    /// 累加一个受试者的追踪结果.
    pub fn record(&mut self, t: &Tractogram) {
        self.subjects += 1;
        self.report.merge(&t.report);
        self.fibers += t.len() as u64;
        self.points += t.fibers.iter().map(|f| f.len() as u64).sum::<u64>();
        self.length += t.fibers.iter().map(|f| f.length()).sum::<f64>();
        self.elapsed += t.report.elapsed;
        self.slowest = self.slowest.max(Some(t.report.elapsed));
    }

    #[inline]
    pub fn get_subjects(&self) -> u64 {
        self.subjects
    }

    #[inline]
    pub fn get_report(&self) -> &TrackingReport {
        &self.report
    }

    #[inline]
    pub fn get_fibers(&self) -> u64 {
        self.fibers
    }

    /// 平均纤维长度 (mm). 没有纤维时返回 `None`.
    pub fn get_avg_length(&self) -> Option<f64> {
        (self.fibers != 0).then(|| self.length / self.fibers as f64)
    }

    /// 平均每根纤维的点数.
    pub fn get_avg_points(&self) -> Option<f64> {
        (self.fibers != 0).then(|| self.points as f64 / self.fibers as f64)
    }

    /// 种子接受率.
    pub fn get_accept_rate(&self) -> Option<f64> {
        let r = &self.report;
        (r.processed != 0).then(|| r.accepted as f64 / r.processed as f64)
    }

    /// 因 `reason` 终止的生长方向占全部终止的比例.
    pub fn get_stop_ratio(&self, reason: StopReason) -> Option<f64> {
        let total: usize = StopReason::ALL.iter().map(|r| self.report.stops(*r)).sum();
        (total != 0).then(|| self.report.stops(reason) as f64 / total as f64)
    }

    #[inline]
    pub fn get_total_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    #[inline]
    pub fn get_slowest(&self) -> Option<Duration> {
        self.slowest
    }
}
