use parking_lot::Mutex;
use pipeworker_core::metrics::PipelineMetrics;
use std::time::Duration;

/// Metrics recorder keeping every observation for assertions
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    ceilings: Mutex<Vec<usize>>,
    batch_sizes: Mutex<Vec<u64>>,
    handler: Mutex<Vec<(String, bool)>>,
    pipe: Mutex<Vec<(String, bool)>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ceilings(&self) -> Vec<usize> {
        self.ceilings.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<u64> {
        self.batch_sizes.lock().clone()
    }

    pub fn handler_errors(&self) -> usize {
        self.handler.lock().iter().filter(|(_, e)| *e).count()
    }

    pub fn handler_calls(&self) -> usize {
        self.handler.lock().len()
    }

    pub fn pipe_completions(&self) -> usize {
        self.pipe.lock().len()
    }

    pub fn pipe_errors(&self) -> usize {
        self.pipe.lock().iter().filter(|(_, e)| *e).count()
    }

    /// Wait until `count` messages finished routing
    pub async fn wait_for_pipe(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.pipe_completions() < count {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

impl PipelineMetrics for RecordingMetrics {
    fn observe_handler_latency(&self, _worker: &str, source: &str, is_error: bool, _: Duration) {
        self.handler.lock().push((source.to_string(), is_error));
    }

    fn observe_pipe_latency(&self, _worker: &str, source: &str, is_error: bool, _: Duration) {
        self.pipe.lock().push((source.to_string(), is_error));
    }

    fn set_max_concurrency(&self, _worker: &str, ceiling: usize) {
        self.ceilings.lock().push(ceiling);
    }

    fn set_batch_size(&self, _worker: &str, completed: u64) {
        self.batch_sizes.lock().push(completed);
    }
}
