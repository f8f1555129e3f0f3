use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use log::{debug, error, warn};

use crate::drone::DroneId;
use crate::proto::Invoke;
use crate::{HistoryUid, ParallelQueen};

/// 传输层送回的分片结果或回传消息
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// 分片执行完成
    Done {
        drone: DroneId,
        uid: HistoryUid,
        size: u64,
        elapsed: Duration,
    },
    /// 传输层报告失败, 分片保持进行中
    Failed {
        drone: DroneId,
        uid: HistoryUid,
        reason: String,
    },
    /// 工作节点回传的消息, 交给同名监听函数
    Reply {
        drone: DroneId,
        invoke: Invoke,
    },
}

/// 完成事件处理引擎
///
/// 单个tokio任务按到达顺序处理完成事件, 全部分片完成的任务序列号
/// 从 `next_finished` 取出。完成通知队列与事件队列同样以 `completion_queue` 为容量,
/// 队列满时丢弃通知, 任务状态仍可由 `ParallelQueen::notify_end` 查询。
pub struct CompletionEngine {
    sender: mpsc::Sender<Completion>,
    finished: mpsc::Receiver<HistoryUid>,
    shutdown_notify: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl CompletionEngine {
    /// 启动引擎, 必须在tokio运行时内调用
    pub fn start(queen: Arc<ParallelQueen>) -> Self {
        let capacity = queen.config().completion_queue;
        let (sender, mut receiver) = mpsc::channel(capacity);
        let (finished_tx, finished) = mpsc::channel(capacity);
        let shutdown_notify = Arc::new(Notify::new());
        let shutdown = shutdown_notify.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    completion = receiver.recv() => {
                        let Some(completion) = completion else {
                            break;
                        };
                        if let Some(uid) = Self::process(&queen, completion) {
                            match finished_tx.try_send(uid) {
                                Ok(()) => {}
                                Err(TrySendError::Full(uid)) => {
                                    warn!("Finished queue full, notification of task {} dropped", uid);
                                    metrics::counter!("hive_finished_dropped_total").increment(1);
                                }
                                // 接收端已丢弃时只是不再通知
                                Err(TrySendError::Closed(_)) => {}
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
            debug!("completion engine stopped");
        });

        Self {
            sender,
            finished,
            shutdown_notify,
            handle,
        }
    }

    fn process(queen: &ParallelQueen, completion: Completion) -> Option<HistoryUid> {
        match completion {
            Completion::Done { drone, uid, size, elapsed } => {
                match queen.on_piece_complete(drone, uid, size, elapsed) {
                    Ok(true) => Some(uid),
                    Ok(false) => None,
                    Err(e) => {
                        error!("Rejected completion of task {} from {}: {}", uid, drone, e);
                        None
                    }
                }
            }
            Completion::Failed { drone, uid, reason } => {
                warn!("{} failed task {}: {}", drone, uid, reason);
                metrics::counter!("hive_piece_failures_total").increment(1);
                None
            }
            Completion::Reply { drone, invoke } => {
                debug!("{} replied {}", drone, invoke);
                queen.reply_data(&invoke);
                None
            }
        }
    }

    /// 供传输层投递完成事件的发送端
    pub fn reporter(&self) -> mpsc::Sender<Completion> {
        self.sender.clone()
    }

    pub async fn report(&self, completion: Completion) {
        if let Err(e) = self.sender.send(completion).await {
            error!("完成事件投递失败: {}", e);
        }
    }

    /// 等待下一个全部完成的任务
    ///
    /// 不及时取出时超出容量的通知会被丢弃。
    pub async fn next_finished(&mut self) -> Option<HistoryUid> {
        self.finished.recv().await
    }

    /// 停止引擎, 未处理的事件被丢弃
    pub async fn shutdown(self) {
        self.shutdown_notify.notify_one();
        if let Err(e) = self.handle.await {
            error!("completion engine panicked: {}", e);
        }
    }
}
