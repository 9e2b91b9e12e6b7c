//! Asynchronous delay abstraction pacing the periodic driver of the supervisor.
use embassy_time::Duration;

/// Delay source; must remain thread-safe when applicable.
pub trait NmDelay {
    /// Asynchronously wait for `duration`.
    fn delay<'a>(&'a mut self, duration: Duration) -> impl core::future::Future<Output = ()> + 'a;
}
