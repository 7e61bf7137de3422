//! 追踪事件的发布/订阅.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::Point;

/// 订阅句柄. 句柄之间按值比较.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// 回调类型.
type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

/// 事件主题. 可以在多个工作线程中同时发布.
///
/// # 注意
///
/// 回调在发布者线程上同步执行, 期间持有读锁.
/// 在回调中调用 [`Self::subscribe`] 或 [`Self::unsubscribe`] 会死锁.
pub struct Subject<E> {
    next: AtomicU64,
    subscribers: RwLock<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> Default for Subject<E> {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(0),
            subscribers: RwLock::new(Vec::new()),
        }
    }
}

impl<E> std::fmt::Debug for Subject<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl<E> Subject<E> {
    /// 创建没有订阅者的主题.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册回调, 返回用于取消订阅的句柄.
    pub fn subscribe(&self, callback: Callback<E>) -> SubscriptionId {
        let id = SubscriptionId(self.next.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
        id
    }

    /// 取消订阅. 句柄不存在时返回 `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let before = subs.len();
        subs.retain(|(i, _)| *i != id);
        subs.len() != before
    }

    /// 按订阅顺序把事件交给每个回调.
    pub fn publish(&self, event: &E) {
        let subs = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
        for (_, cb) in subs.iter() {
            cb(event);
        }
    }

    /// 订阅者个数.
    pub fn len(&self) -> usize {
        self.subscribers.read().map_or(0, |s| s.len())
    }

    /// 是否没有订阅者.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 追踪过程中发布的事件.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingEvent {
    /// 所有工作线程启动前. 参数为种子点总数与工作线程数.
    Started {
        /// 种子点总数.
        seeds: usize,

        /// 工作线程数.
        workers: usize,
    },

    /// 一个种子点处理完毕.
    SeedFinished {
        /// 工作线程编号 (等于分区编号).
        worker: usize,

        /// 种子点.
        seed: Point,

        /// 该种子产生的被接受纤维数.
        accepted: usize,
    },

    /// 演示模式下, 某一步的中心点与全部采样点.
    Sampled {
        /// 当前位置.
        position: Point,

        /// 采样点位置.
        samples: Vec<Point>,
    },

    /// 合并结束. 参数为输出纤维数.
    Finished {
        /// 输出纤维数.
        fibers: usize,

        /// 是否被中止.
        aborted: bool,
    },
}
