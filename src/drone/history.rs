//! 分片执行记录

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::HistoryUid;

/// 一个分片在某个工作节点上的完成记录, 创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct PieceHistory {
    uid: HistoryUid,
    index: u64,
    size: u64,
    elapsed: Duration,
    completed_at: DateTime<Utc>,
}

impl PieceHistory {
    pub(crate) fn new(uid: HistoryUid, index: u64, size: u64, elapsed: Duration) -> Self {
        Self {
            uid,
            index,
            size,
            elapsed,
            completed_at: Utc::now(),
        }
    }

    pub fn uid(&self) -> HistoryUid {
        self.uid
    }

    /// 分片在原始区间中的偏移
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// 每秒处理的单元数
    pub fn throughput(&self) -> f64 {
        self.size as f64 / self.elapsed.as_secs_f64()
    }
}
