//! 主节点配置

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::balancer::DEFAULT_STABILITY_FLOOR;
use crate::{PoolError, Result};

/// 工作池配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HiveConfig {
    /// 重算时旧指标保留比例的下限
    pub stability_floor: f64,
    /// 未指定先验值时新节点的性能指标
    pub initial_performance: f64,
    /// 完成事件队列容量
    pub completion_queue: usize,
}

impl Default for HiveConfig {
    fn default() -> Self {
        Self {
            stability_floor: DEFAULT_STABILITY_FLOOR,
            initial_performance: 1.0,
            completion_queue: 1024,
        }
    }
}

impl HiveConfig {
    /// 从JSON文本读取配置, 缺省字段取默认值
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| PoolError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PoolError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stability_floor > 0.0 && self.stability_floor <= 1.0) {
            return Err(PoolError::Config(format!(
                "stability_floor must be within (0, 1], got {}",
                self.stability_floor
            )));
        }
        if !self.initial_performance.is_finite() || self.initial_performance <= 0.0 {
            return Err(PoolError::Config(format!(
                "initial_performance must be positive, got {}",
                self.initial_performance
            )));
        }
        if self.completion_queue == 0 {
            return Err(PoolError::Config("completion_queue must be non-zero".into()));
        }
        Ok(())
    }
}
