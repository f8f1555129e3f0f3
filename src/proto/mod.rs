//! 远程调用消息定义

pub mod invoke;
pub mod listener;

pub use invoke::{Invoke, InvokeParameter, ParamValue};
pub use listener::{InvokeListener, ListenerRegistry};

/// 主节点注入的保留参数名: 任务序列号
pub const INVOKE_HISTORY_UID: &str = "invoke_history_uid";
/// 保留参数名: 分片在原始区间中的偏移
pub const PIECE_INDEX: &str = "piece_index";
/// 保留参数名: 分片包含的单元数
pub const PIECE_SIZE: &str = "piece_size";

/// 调用方消息中禁止出现的参数名
pub const RESERVED_PARAMETERS: [&str; 3] = [INVOKE_HISTORY_UID, PIECE_INDEX, PIECE_SIZE];
