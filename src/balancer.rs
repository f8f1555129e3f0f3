//! 性能指标计算模块
//!
//! 按性能指标切分任务区间, 并根据分片完成耗时做指数平滑与归一化

use crate::drone::Piece;

/// 默认的平滑下限: 旧指标至少保留30%
pub const DEFAULT_STABILITY_FLOOR: f64 = 0.3;

/// 按性能指标把 `[start_index, start_index + total_size)` 切成连续分片
///
/// 返回值与 `performances` 一一对应, 分到0个单元的节点为 `None`。
/// 最后一个节点吸收全部取整余量, 因此分片大小之和恰好等于 `total_size`。
/// 区间末端须不超过 `u64::MAX`, `ParallelQueen::send_piece_data` 在调用前检查。
pub fn plan_pieces(performances: &[f64], start_index: u64, total_size: u64) -> Vec<Option<Piece>> {
    let count = performances.len();
    let mut consumed = 0u64;

    performances
        .iter()
        .enumerate()
        .map(|(i, &performance)| {
            let remaining = total_size - consumed;
            let size = if i + 1 == count {
                remaining
            } else {
                let share = (total_size as f64 / count as f64 * performance).floor();
                // NaN和负数经 as 转换后为0
                (share as u64).min(remaining)
            };
            if size == 0 {
                return None;
            }

            let piece = Piece {
                index: start_index + consumed,
                size,
            };
            consumed += size;
            Some(piece)
        })
        .collect()
}

/// 参与一次重算的单个节点样本
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// 当前性能指标
    pub performance: f64,
    /// 本次分片的吞吐量(单元/秒)
    pub throughput: f64,
    /// 节点累计的完成记录数(含本次)
    pub history_count: usize,
}

/// 性能指标计算器
#[derive(Debug, Clone, Copy)]
pub struct PerformanceCalculator {
    stability_floor: f64,
}

impl Default for PerformanceCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_STABILITY_FLOOR)
    }
}

impl PerformanceCalculator {
    /// 创建新的计算器
    ///
    /// # 参数
    /// - stability_floor: 旧指标保留比例的下限(0-1)
    pub fn new(stability_floor: f64) -> Self {
        Self { stability_floor }
    }

    pub fn stability_floor(&self) -> f64 {
        self.stability_floor
    }

    /// 旧指标的保留比例: `max(floor, 1 / (history_count - 1))`
    ///
    /// 记录数不超过1时分母为0, 此时直接取下限, 让首个样本生效。
    pub fn stability_weight(&self, history_count: usize) -> f64 {
        if history_count <= 1 {
            return self.stability_floor;
        }
        self.stability_floor
            .max(1.0 / (history_count as f64 - 1.0))
            .min(1.0)
    }

    /// 计算参与节点的新指标(尚未归一化)
    ///
    /// 吞吐量先除以参与节点的平均吞吐量, 再与旧指标按保留比例加权。
    pub fn recalculate(&self, samples: &[Sample]) -> Vec<f64> {
        if samples.is_empty() {
            return Vec::new();
        }
        let average = samples.iter().map(|s| s.throughput).sum::<f64>() / samples.len() as f64;
        if average <= 0.0 || !average.is_finite() {
            log::warn!("average throughput is {}, keeping current performances", average);
            return samples.iter().map(|s| s.performance).collect();
        }

        samples
            .iter()
            .map(|s| {
                let relative = s.throughput / average;
                let weight = self.stability_weight(s.history_count);
                s.performance * weight + relative * (1.0 - weight)
            })
            .collect()
    }
}

/// 把所有指标除以平均值, 使工作池平均指标为1.0
pub fn normalize(performances: &mut [f64]) {
    if performances.is_empty() {
        return;
    }
    let average = performances.iter().sum::<f64>() / performances.len() as f64;
    if average <= 0.0 || !average.is_finite() {
        log::error!("refusing to normalize performances with average {}", average);
        return;
    }
    for p in performances.iter_mut() {
        *p /= average;
    }
}
