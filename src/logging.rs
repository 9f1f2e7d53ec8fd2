//! Logging seam injected into every component of the pool.
//!
//! The pool never reaches for a global logger on its own. Callers hand a
//! [`Logger`] to [`PoolConfig`](crate::PoolConfig); when they don't, the
//! pool uses [`LogFacade`], which forwards to the [`log`] crate so the
//! embedding process decides where messages end up.

use std::fmt;

/// Two severity-leveled sinks consumed by the pool.
pub trait Logger: Send + Sync {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Forwards to `log::debug!` / `log::error!` under the `k8s_peerpool` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn debug(&self, args: fmt::Arguments<'_>) {
        log::debug!(target: "k8s_peerpool", "{}", args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        log::error!(target: "k8s_peerpool", "{}", args);
    }
}

/// Discards every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn error(&self, _args: fmt::Arguments<'_>) {}
}
