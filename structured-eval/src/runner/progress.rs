//! Progress observation for evaluation runs

/// Progress callback for tracking execution.
///
/// Called from the collector loop as items complete; implementations must
/// not block.
pub trait ProgressCallback: Send + Sync {
    fn on_start(&self, benchmark: &str, total: usize);
    fn on_item_complete(&self, item_id: &str, success: bool);
    fn on_progress(&self, completed: usize, total: usize);
}

/// Default no-op progress callback
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_start(&self, _benchmark: &str, _total: usize) {}
    fn on_item_complete(&self, _item_id: &str, _success: bool) {}
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Console progress callback
pub struct ConsoleProgress;

impl ProgressCallback for ConsoleProgress {
    fn on_start(&self, benchmark: &str, total: usize) {
        println!("Evaluating {} ({} items)", benchmark, total);
    }

    fn on_item_complete(&self, item_id: &str, success: bool) {
        let status = if success { "OK" } else { "FAILED" };
        println!("  {} {}", status, item_id);
    }

    fn on_progress(&self, completed: usize, total: usize) {
        println!("Progress: {}/{} items complete", completed, total);
    }
}
