//! Queen模块实现 - 主节点: 切分任务, 派发分片, 汇总完成并重算性能指标

pub mod network;

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::balancer::{self, PerformanceCalculator, Sample};
use crate::config::HiveConfig;
use crate::drone::history::PieceHistory;
use crate::drone::{DroneId, ParallelDrone};
use crate::proto::{
    Invoke, InvokeListener, ListenerRegistry, INVOKE_HISTORY_UID, PIECE_INDEX, PIECE_SIZE,
    RESERVED_PARAMETERS,
};
use crate::{HistoryUid, PoolError, ProcessId, Result};
use network::Transport;

/// 受锁保护的工作池状态
struct HiveState {
    drones: Vec<ParallelDrone>,
    history_sequence: HistoryUid,
    finished: FinishedTasks,
}

impl HiveState {
    fn drone(&self, id: DroneId) -> Result<&ParallelDrone> {
        self.drones.get(id.0).ok_or(PoolError::InvalidDroneId(id.0))
    }

    fn drone_mut(&mut self, id: DroneId) -> Result<&mut ParallelDrone> {
        self.drones.get_mut(id.0).ok_or(PoolError::InvalidDroneId(id.0))
    }

    fn has_pending(&self) -> bool {
        self.drones.iter().any(|d| !d.in_flight().is_empty())
    }
}

/// 已完成重算的任务序列号
///
/// `through` 及以下的序列号全部完成, 只有乱序完成的序列号暂存在 `above` 中,
/// 按序完成时集合保持为空。
#[derive(Debug, Default)]
struct FinishedTasks {
    through: HistoryUid,
    above: BTreeSet<HistoryUid>,
}

impl FinishedTasks {
    fn contains(&self, uid: HistoryUid) -> bool {
        uid <= self.through || self.above.contains(&uid)
    }

    fn insert(&mut self, uid: HistoryUid) {
        if uid <= self.through {
            return;
        }
        self.above.insert(uid);
        while self.above.remove(&(self.through + 1)) {
            self.through += 1;
        }
    }

    fn pending_out_of_order(&self) -> usize {
        self.above.len()
    }
}

/// 并行任务主节点
///
/// 持有全部工作节点和任务序列号。所有状态修改都在同一把锁内完成,
/// 因此同一任务的"是否全部完成"检查与重算只会被一个调用方执行一次。
pub struct ParallelQueen {
    config: HiveConfig,
    calculator: PerformanceCalculator,
    transport: Arc<dyn Transport>,
    listeners: RwLock<ListenerRegistry>,
    state: Mutex<HiveState>,
}

impl ParallelQueen {
    /// 创建空的工作池
    pub fn new(config: HiveConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            calculator: PerformanceCalculator::new(config.stability_floor),
            config,
            transport,
            listeners: RwLock::new(ListenerRegistry::new()),
            state: Mutex::new(HiveState {
                drones: Vec::new(),
                history_sequence: 0,
                finished: FinishedTasks::default(),
            }),
        })
    }

    pub fn config(&self) -> &HiveConfig {
        &self.config
    }

    /// 注册新的工作节点, 只能在没有进行中任务时调用
    pub fn add_drone(&self, name: impl Into<ProcessId>, prior: Option<f64>) -> Result<DroneId> {
        let mut state = self.state.lock();
        if state.has_pending() {
            return Err(PoolError::PoolBusy);
        }

        let id = DroneId(state.drones.len());
        let performance = prior.unwrap_or(self.config.initial_performance);
        let drone = ParallelDrone::new(id, name.into(), performance)?;
        log::info!("{} ({}) joined with performance {:.3}", id, drone.name(), performance);
        state.drones.push(drone);
        Ok(id)
    }

    pub fn drone_count(&self) -> usize {
        self.state.lock().drones.len()
    }

    /// 最近一次分配的任务序列号, 尚未派发任何任务时为0
    pub fn history_sequence(&self) -> HistoryUid {
        self.state.lock().history_sequence
    }

    /// 按工作池顺序的性能指标
    pub fn performances(&self) -> Vec<f64> {
        self.state.lock().drones.iter().map(|d| d.performance()).collect()
    }

    pub fn performance(&self, id: DroneId) -> Result<f64> {
        Ok(self.state.lock().drone(id)?.performance())
    }

    pub fn drone_name(&self, id: DroneId) -> Result<ProcessId> {
        Ok(self.state.lock().drone(id)?.name().to_string())
    }

    pub fn in_flight(&self, id: DroneId) -> Result<Vec<HistoryUid>> {
        Ok(self.state.lock().drone(id)?.in_flight())
    }

    pub fn history(&self, id: DroneId, uid: HistoryUid) -> Result<Option<PieceHistory>> {
        Ok(self.state.lock().drone(id)?.history(uid).cloned())
    }

    pub fn history_len(&self, id: DroneId) -> Result<usize> {
        Ok(self.state.lock().drone(id)?.history_len())
    }

    /// 注册处理工作节点回传消息的监听函数, 返回是否替换了同名监听函数
    pub fn register_listener(&self, name: impl Into<String>, listener: impl InvokeListener + 'static) -> bool {
        let name = name.into();
        log::debug!("Listener `{}` registered", name);
        self.listeners.write().register(name, listener)
    }

    /// 工作节点回传的消息: 交给同名监听函数, 没有对应监听函数时返回 `false`
    ///
    /// 监听函数在读锁内执行, 不能在其中注册新的监听函数。
    pub fn reply_data(&self, invoke: &Invoke) -> bool {
        let handled = self.listeners.read().apply(invoke);
        if handled {
            metrics::counter!("hive_replies_handled_total").increment(1);
        } else {
            log::warn!("No listener for reply {}, dropped", invoke);
            metrics::counter!("hive_replies_dropped_total").increment(1);
        }
        handled
    }

    /// 把同一条消息原样发给所有工作节点, 不切分也不跟踪完成
    pub fn send_data(&self, invoke: &Invoke) -> Result<()> {
        let ids: Vec<DroneId> = self.state.lock().drones.iter().map(|d| d.id()).collect();
        let mut first_error = None;

        for id in ids {
            if let Err(e) = self.transport.deliver(id, invoke.clone()) {
                log::error!("Failed to broadcast {} to {}: {}", invoke, id, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// 按性能指标切分 `[start_index, start_index + total_size)` 并派发给各工作节点
    ///
    /// 返回本次任务的序列号。消息中已含保留参数或区间超出 `u64` 时在分配序列号之前报错,
    /// 不会产生任何网络活动。
    pub fn send_piece_data(&self, mut invoke: Invoke, start_index: u64, total_size: u64) -> Result<HistoryUid> {
        if let Some(name) = RESERVED_PARAMETERS.iter().find(|name| invoke.has(name)) {
            return Err(PoolError::ReservedParameter(name.to_string()));
        }
        if start_index.checked_add(total_size).is_none() {
            return Err(PoolError::RangeOverflow {
                start: start_index,
                size: total_size,
            });
        }

        let mut deliveries = Vec::new();
        let uid = {
            let mut state = self.state.lock();
            if state.drones.is_empty() {
                return Err(PoolError::NoDrones);
            }

            state.history_sequence += 1;
            let uid = state.history_sequence;
            invoke.append(INVOKE_HISTORY_UID, uid)?;

            let performances: Vec<f64> = state.drones.iter().map(|d| d.performance()).collect();
            let plan = balancer::plan_pieces(&performances, start_index, total_size);

            for (drone, piece) in state.drones.iter_mut().zip(plan) {
                let Some(piece) = piece else {
                    continue;
                };
                let mut message = invoke.clone();
                message.append(PIECE_INDEX, piece.index)?;
                message.append(PIECE_SIZE, piece.size)?;
                drone.dispatch(uid, piece);
                deliveries.push((drone.id(), message));
            }
            uid
        };

        log::debug!(
            "Task {} [{}, +{}) split into {} pieces",
            uid, start_index, total_size, deliveries.len()
        );
        metrics::counter!("hive_pieces_dispatched_total").increment(deliveries.len() as u64);

        // 传输层只做投递, 不在锁内执行
        for (id, message) in deliveries {
            if let Err(e) = self.transport.deliver(id, message) {
                // 分片保持进行中状态, 由外部监控发现停滞
                log::error!("Failed to deliver piece of task {} to {}: {}", uid, id, e);
                metrics::counter!("hive_delivery_failures_total").increment(1);
            }
        }
        Ok(uid)
    }

    /// 检查任务是否在所有工作节点上完成, 首次全部完成时重算性能指标
    ///
    /// 仍有节点持有该任务时返回 `false`; 完成后的重复调用返回 `true` 且不再重算。
    pub fn notify_end(&self, uid: HistoryUid) -> Result<bool> {
        let mut state = self.state.lock();
        self.notify_end_locked(&mut state, uid)
    }

    /// 传输层的完成回调: 登记完成记录后检查任务是否结束
    pub fn on_piece_complete(
        &self,
        drone: DroneId,
        uid: HistoryUid,
        size: u64,
        elapsed: Duration,
    ) -> Result<bool> {
        let mut state = self.state.lock();
        if uid == 0 || uid > state.history_sequence {
            return Err(PoolError::UnknownTask(uid));
        }
        state.drone_mut(drone)?.record_completion(uid, size, elapsed)?;
        metrics::counter!("hive_pieces_completed_total").increment(1);
        log::debug!("{} completed task {} ({} units in {:?})", drone, uid, size, elapsed);

        self.notify_end_locked(&mut state, uid)
    }

    fn notify_end_locked(&self, state: &mut HiveState, uid: HistoryUid) -> Result<bool> {
        if uid == 0 || uid > state.history_sequence {
            return Err(PoolError::UnknownTask(uid));
        }
        if state.finished.contains(uid) {
            return Ok(true);
        }
        if state.drones.iter().any(|d| d.is_in_flight(uid)) {
            return Ok(false);
        }

        self.recalibrate(state, uid);
        state.finished.insert(uid);
        Ok(true)
    }

    fn recalibrate(&self, state: &mut HiveState, uid: HistoryUid) {
        let participants: Vec<(usize, Sample)> = state
            .drones
            .iter()
            .enumerate()
            .filter_map(|(i, d)| {
                d.history(uid).map(|h| {
                    (
                        i,
                        Sample {
                            performance: d.performance(),
                            throughput: h.throughput(),
                            history_count: d.history_len(),
                        },
                    )
                })
            })
            .collect();

        if participants.is_empty() {
            log::debug!("Task {} had no pieces, performances unchanged", uid);
            return;
        }

        let samples: Vec<Sample> = participants.iter().map(|(_, s)| *s).collect();
        for ((i, _), performance) in participants.iter().zip(self.calculator.recalculate(&samples)) {
            state.drones[*i].set_performance(performance);
        }

        let mut performances: Vec<f64> = state.drones.iter().map(|d| d.performance()).collect();
        balancer::normalize(&mut performances);
        for (drone, performance) in state.drones.iter_mut().zip(performances) {
            drone.set_performance(performance);
            metrics::gauge!("hive_drone_performance", "drone" => drone.name().to_string())
                .set(performance);
        }

        metrics::counter!("hive_recalibrations_total").increment(1);
        log::info!(
            "Task {} finished on {} drones, performances recalibrated",
            uid,
            participants.len()
        );
    }
}

impl fmt::Debug for ParallelQueen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ParallelQueen")
            .field("drones", &state.drones)
            .field("history_sequence", &state.history_sequence)
            .field("finished_through", &state.finished.through)
            .field("finished_out_of_order", &state.finished.pending_out_of_order())
            .field("listeners", &*self.listeners.read())
            .field("transport", &self.transport)
            .finish()
    }
}
