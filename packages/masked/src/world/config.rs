//! World configuration.

/// Settings for a `World`.
///
/// ```
/// use masked::world::WorldConfig;
///
/// let config = WorldConfig::default()
///     .worker_threads(4)
///     .thread_name("sim worker");
/// assert_eq!(config.get_worker_threads(), Some(4));
/// ```
#[derive(Clone, Debug)]
pub struct WorldConfig {
    worker_threads: Option<usize>,
    thread_name: String,
}

impl WorldConfig {
    /// Create the default configuration.
    pub fn new() -> WorldConfig {
        WorldConfig {
            worker_threads: None,
            thread_name: "masked worker".to_string(),
        }
    }

    /// Set the number of threads in the worker pool.
    ///
    /// By default there is one worker per available CPU. A system's slices are
    /// queued onto the pool, so this bounds how many of them run at once, not
    /// how many slices are made.
    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.max(1));
        self
    }

    /// Set the name prefix of worker threads.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Return the configured worker count, if one was set.
    pub fn get_worker_threads(&self) -> Option<usize> {
        self.worker_threads
    }

    /// Return the worker thread name prefix.
    pub fn get_thread_name(&self) -> &str {
        &self.thread_name
    }

    /// Return the number of workers to start, detecting the CPU count if no
    /// explicit value was configured.
    pub(crate) fn resolve_worker_threads(&self) -> usize {
        if let Some(threads) = self.worker_threads {
            return threads;
        }

        match std::thread::available_parallelism() {
            Ok(c) => c.get(),
            Err(err) => {
                log::error!("Cannot detect number of CPUs ({err}), using a single worker");
                1
            }
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        WorldConfig::new()
    }
}
