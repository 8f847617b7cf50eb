//! Debugging feature flags.

/// Activate the trace_time macro (scope-level timing of analyzers).
pub const LOG_PERFORMANCE: bool = cfg!(debug_assertions);

pub struct LogFlags {
    /// Log every analyzer start/finish inside the task graph.
    pub log_task_graph: bool,
    /// Log cache hits, joins on in-flight work, and expiries.
    pub log_cache: bool,
    /// Log per-iteration progress of EM and optimiser loops.
    pub log_fit_iterations: bool,
}

pub const DEBUG_FLAGS: LogFlags = LogFlags {
    log_task_graph: false,
    log_cache: false,
    log_fit_iterations: false,
};
