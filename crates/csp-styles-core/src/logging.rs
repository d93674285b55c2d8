//! Logging facilities for csp-styles.
//!
//! All diagnostics go through the `tracing` crate. To see them, install a
//! subscriber in the host application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("csp_styles=debug,csp_styles_core=trace")
//!     .init();
//! ```

/// Span names used for instrumented operations.
pub mod span_names {
    /// Microtask checkpoint span.
    pub const MICROTASKS: &str = "csp_styles::microtasks";
    /// Timer processing span.
    pub const TIMERS: &str = "csp_styles::timers";
    /// Rule collection pass span.
    pub const COLLECTION: &str = "csp_styles::collection";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Event-loop plumbing target.
    pub const CORE: &str = "csp_styles_core";
    /// Microtask queue target.
    pub const TASK: &str = "csp_styles_core::task";
    /// Timer queue target.
    pub const TIMER: &str = "csp_styles_core::timer";
    /// Stylesheet discovery and creation.
    pub const LOCATOR: &str = "csp_styles::locator";
    /// Rule insertion and reference counting.
    pub const RULES: &str = "csp_styles::rules";
    /// Deferred rule deletion.
    pub const COLLECTOR: &str = "csp_styles::collector";
    /// Host document backends.
    pub const HOST: &str = "csp_styles::host";
}
