//! ParallelHive 核心库入口 - 主节点按吞吐量切分任务并回收性能指标

mod queen;
mod drone;
pub mod proto;
pub mod balancer;
pub mod config;
pub mod engine;

/// 进程标识类型
pub type ProcessId = String;

/// 任务序列号(invoke_history_uid)
pub type HistoryUid = u64;

/// 消息构造错误
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    #[error("parameter `{0}` already exists in the invoke message")]
    NameCollision(String),
}

#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("网络通信错误: {0}")]
    Network(#[from] NetworkError),

    #[error("消息错误: {0}")]
    Invoke(#[from] InvokeError),

    #[error("parameter `{0}` is reserved by the parallel dispatcher, rename it")]
    ReservedParameter(String),

    #[error("range [{start}, +{size}) exceeds the u64 index space")]
    RangeOverflow { start: u64, size: u64 },

    #[error("工作池为空")]
    NoDrones,

    #[error("任务进行中, 不能修改工作池")]
    PoolBusy,

    #[error("无效的工作节点ID: {0}")]
    InvalidDroneId(usize),

    #[error("未知的任务序列号: {0}")]
    UnknownTask(HistoryUid),

    #[error("drone {drone} has no piece of task {uid} in flight")]
    PieceNotInFlight { drone: usize, uid: HistoryUid },

    #[error("elapsed time must be strictly positive")]
    InvalidElapsed,

    #[error("performance must be finite and positive, got {0}")]
    InvalidPerformance(f64),

    #[error("配置错误: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;

// 公开导出模块的公共接口
pub use queen::ParallelQueen;
pub use queen::network::{ChannelTransport, NetworkError, Transport};
pub use drone::{DroneId, ParallelDrone, Piece};
pub use drone::history::PieceHistory;
pub use proto::{Invoke, InvokeListener, InvokeParameter, ListenerRegistry, ParamValue, RESERVED_PARAMETERS};
pub use config::HiveConfig;
pub use engine::{Completion, CompletionEngine};
