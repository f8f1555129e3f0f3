//! 传输层接口 - 主节点只负责把消息交出去, 完成结果由回调送回

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::drone::DroneId;
use crate::proto::Invoke;

/// 网络通信错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("{0} is not connected")]
    NotConnected(DroneId),
    #[error("mailbox of {0} is full")]
    Full(DroneId),
    #[error("mailbox of {0} is closed")]
    Disconnected(DroneId),
}

/// 把消息送达远程工作节点
///
/// 实现必须立即返回; 分片完成后由传输层调用
/// `ParallelQueen::on_piece_complete` 或向 `CompletionEngine` 投递完成事件。
pub trait Transport: Send + Sync + fmt::Debug {
    fn deliver(&self, drone: DroneId, invoke: Invoke) -> Result<(), NetworkError>;
}

/// 进程内传输: 每个工作节点一个有界邮箱
pub struct ChannelTransport {
    capacity: usize,
    mailboxes: RwLock<HashMap<DroneId, Sender<Invoke>>>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            mailboxes: RwLock::new(HashMap::new()),
        }
    }

    /// 为工作节点建立邮箱, 返回其接收端; 重复连接会替换旧邮箱
    pub fn connect(&self, drone: DroneId) -> Receiver<Invoke> {
        let (tx, rx) = bounded(self.capacity);
        if self.mailboxes.write().insert(drone, tx).is_some() {
            log::warn!("{} reconnected, old mailbox dropped", drone);
        }
        rx
    }

    pub fn disconnect(&self, drone: DroneId) {
        self.mailboxes.write().remove(&drone);
    }
}

impl Transport for ChannelTransport {
    fn deliver(&self, drone: DroneId, invoke: Invoke) -> Result<(), NetworkError> {
        let mailboxes = self.mailboxes.read();
        let tx = mailboxes.get(&drone).ok_or(NetworkError::NotConnected(drone))?;
        tx.try_send(invoke).map_err(|e| match e {
            TrySendError::Full(_) => NetworkError::Full(drone),
            TrySendError::Disconnected(_) => NetworkError::Disconnected(drone),
        })
    }
}

impl fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("capacity", &self.capacity)
            .field("connected", &self.mailboxes.read().len())
            .finish()
    }
}
