//! 工蜂(Drone)节点代理 - 主节点视角下的单个远程工作节点

pub mod history;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use crate::{HistoryUid, PoolError, ProcessId, Result};
use history::PieceHistory;

/// 工作节点句柄, 即其在工作池中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DroneId(pub usize);

impl fmt::Display for DroneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "drone#{}", self.0)
    }
}

/// 已派发但尚未完成的分片
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Piece {
    pub index: u64,
    pub size: u64,
}

/// 工作节点状态: 性能指标, 进行中的分片, 完成记录
pub struct ParallelDrone {
    id: DroneId,
    name: ProcessId,
    performance: f64,
    progress: HashMap<HistoryUid, Piece>,
    histories: BTreeMap<HistoryUid, PieceHistory>,
}

impl ParallelDrone {
    pub(crate) fn new(id: DroneId, name: ProcessId, performance: f64) -> Result<Self> {
        if !performance.is_finite() || performance <= 0.0 {
            return Err(PoolError::InvalidPerformance(performance));
        }
        Ok(Self {
            id,
            name,
            performance,
            progress: HashMap::new(),
            histories: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> DroneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 相对于工作池平均值的性能指标(1.0为平均)
    pub fn performance(&self) -> f64 {
        self.performance
    }

    pub(crate) fn set_performance(&mut self, performance: f64) {
        debug_assert!(performance > 0.0);
        self.performance = performance;
    }

    pub fn is_in_flight(&self, uid: HistoryUid) -> bool {
        self.progress.contains_key(&uid)
    }

    /// 进行中的任务序列号
    pub fn in_flight(&self) -> Vec<HistoryUid> {
        let mut uids: Vec<_> = self.progress.keys().copied().collect();
        uids.sort_unstable();
        uids
    }

    pub fn history(&self, uid: HistoryUid) -> Option<&PieceHistory> {
        self.histories.get(&uid)
    }

    pub fn history_len(&self) -> usize {
        self.histories.len()
    }

    pub fn histories(&self) -> impl Iterator<Item = &PieceHistory> {
        self.histories.values()
    }

    /// 登记已交给传输层的分片
    pub(crate) fn dispatch(&mut self, uid: HistoryUid, piece: Piece) {
        log::debug!(
            "{} ({}) takes piece [{}, +{}) of task {}",
            self.id, self.name, piece.index, piece.size, uid
        );
        self.progress.insert(uid, piece);
    }

    /// 登记分片完成; 同一uid只能完成一次
    pub(crate) fn record_completion(
        &mut self,
        uid: HistoryUid,
        size: u64,
        elapsed: Duration,
    ) -> Result<&PieceHistory> {
        if elapsed.is_zero() {
            return Err(PoolError::InvalidElapsed);
        }
        let piece = self
            .progress
            .remove(&uid)
            .ok_or(PoolError::PieceNotInFlight { drone: self.id.0, uid })?;

        if piece.size != size {
            log::warn!(
                "{} reported {} units for task {}, dispatched {}",
                self.id, size, uid, piece.size
            );
        }
        let history = PieceHistory::new(uid, piece.index, size, elapsed);
        Ok(self.histories.entry(uid).or_insert(history))
    }
}

impl fmt::Debug for ParallelDrone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParallelDrone")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("performance", &self.performance)
            .field("in_flight", &self.progress.len())
            .field("histories", &self.histories.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drone() -> ParallelDrone {
        ParallelDrone::new(DroneId(0), "worker-1".into(), 1.0).unwrap()
    }

    #[test]
    fn test_completion_moves_piece_to_history() {
        let mut d = drone();
        d.dispatch(5, Piece { index: 10, size: 20 });
        assert!(d.is_in_flight(5));

        let h = d.record_completion(5, 20, Duration::from_secs(2)).unwrap();
        assert_eq!(h.index(), 10);
        assert_eq!(h.throughput(), 10.0);
        assert!(!d.is_in_flight(5));
        assert_eq!(d.history_len(), 1);
    }

    #[test]
    fn test_completion_is_accepted_once() {
        let mut d = drone();
        d.dispatch(1, Piece { index: 0, size: 4 });
        d.record_completion(1, 4, Duration::from_millis(5)).unwrap();

        assert!(matches!(
            d.record_completion(1, 4, Duration::from_millis(5)),
            Err(PoolError::PieceNotInFlight { drone: 0, uid: 1 })
        ));
        assert_eq!(d.history_len(), 1);
    }

    #[test]
    fn test_zero_elapsed_keeps_piece_pending() {
        let mut d = drone();
        d.dispatch(2, Piece { index: 0, size: 4 });
        assert!(matches!(
            d.record_completion(2, 4, Duration::ZERO),
            Err(PoolError::InvalidElapsed)
        ));
        assert!(d.is_in_flight(2));
    }

    #[test]
    fn test_invalid_prior_rejected() {
        for prior in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(ParallelDrone::new(DroneId(0), "w".into(), prior).is_err());
        }
    }
}
