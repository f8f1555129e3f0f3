use parallel_hive::{DroneId, HiveConfig, Invoke, NetworkError, ParallelQueen, Transport};
use parking_lot::Mutex;
use std::sync::Arc;

/// 测试专用的传输层: 只记录投递的消息
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(DroneId, Invoke)>>,
    refuse: Option<DroneId>,
}

impl RecordingTransport {
    /// 投递给指定节点时返回错误
    pub fn refusing(drone: DroneId) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            refuse: Some(drone),
        }
    }

    pub fn sent(&self) -> Vec<(DroneId, Invoke)> {
        self.sent.lock().clone()
    }

    /// 指定任务的 (节点, piece_index, piece_size)
    pub fn pieces_of(&self, uid: u64) -> Vec<(DroneId, u64, u64)> {
        self.sent()
            .into_iter()
            .filter(|(_, invoke)| invoke.history_uid() == Some(uid))
            .map(|(id, invoke)| {
                (
                    id,
                    invoke.piece_index().expect("piece_index"),
                    invoke.piece_size().expect("piece_size"),
                )
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn deliver(&self, drone: DroneId, invoke: Invoke) -> Result<(), NetworkError> {
        if self.refuse == Some(drone) {
            return Err(NetworkError::NotConnected(drone));
        }
        self.sent.lock().push((drone, invoke));
        Ok(())
    }
}

/// 构造含指定先验性能的工作池
pub fn new_test_queen(priors: &[f64]) -> (Arc<ParallelQueen>, Arc<RecordingTransport>) {
    new_test_queen_with(priors, RecordingTransport::default())
}

pub fn new_test_queen_with(
    priors: &[f64],
    transport: RecordingTransport,
) -> (Arc<ParallelQueen>, Arc<RecordingTransport>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let transport = Arc::new(transport);
    let queen = ParallelQueen::new(HiveConfig::default(), transport.clone()).unwrap();
    for (i, &prior) in priors.iter().enumerate() {
        queen.add_drone(format!("node{}", i), Some(prior)).unwrap();
    }
    (Arc::new(queen), transport)
}

pub fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
