/// Receives progress from pipeline runs and cache downloads.
/// Implementations forward updates to a terminal, a log or a UI.
pub trait ProgressReporter: Send + Sync {
    /// A pipeline (or other multi-step phase) begins.
    fn start_phase(&self, name: &str, total_steps: Option<u32>);

    /// Bytes received so far for the current download.
    fn update_bytes(&self, transferred: u64, total: Option<u64>);

    fn step_started(&self, _step: &str) {}

    /// A pipeline step finished. `cached` is true when its previous output was reused.
    fn step_finished(&self, step: &str, cached: bool, completed: u32, total: u32);

    fn done(&self, success: bool, message: Option<&str>);
}

/// Discards everything. The default for sessions built without a reporter.
pub struct SilentProgressReporter;

impl ProgressReporter for SilentProgressReporter {
    fn start_phase(&self, _name: &str, _total_steps: Option<u32>) {}
    fn update_bytes(&self, _transferred: u64, _total: Option<u64>) {}
    fn step_finished(&self, _step: &str, _cached: bool, _completed: u32, _total: u32) {}
    fn done(&self, _success: bool, _message: Option<&str>) {}
}

/// Forwards progress to the `log` facade.
pub struct LogProgressReporter;

impl ProgressReporter for LogProgressReporter {
    fn start_phase(&self, name: &str, total_steps: Option<u32>) {
        match total_steps {
            Some(total) => log::info!("{} ({} steps)", name, total),
            None => log::info!("{}", name),
        }
    }

    fn update_bytes(&self, transferred: u64, total: Option<u64>) {
        log::trace!("Transferred {} of {:?} bytes", transferred, total);
    }

    fn step_started(&self, step: &str) {
        log::debug!("{}: started", step);
    }

    fn step_finished(&self, step: &str, cached: bool, completed: u32, total: u32) {
        let state = if cached { "up to date" } else { "done" };
        log::info!("[{}/{}] {}: {}", completed, total, step, state);
    }

    fn done(&self, success: bool, message: Option<&str>) {
        match (success, message) {
            (true, Some(msg)) => log::info!("{}", msg),
            (false, Some(msg)) => log::error!("{}", msg),
            (true, None) => log::info!("Finished"),
            (false, None) => log::error!("Failed"),
        }
    }
}
