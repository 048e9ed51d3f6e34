//! Per-line handler capability

use crate::error::BoxError;
use crate::shutdown::CancelToken;

/// User logic invoked once per line, from whichever worker owns the file.
///
/// Lines of one file arrive in order on one thread; different files may be
/// handled concurrently, hence `Sync`. An error aborts the current file only.
pub trait LineHandler: Sync {
    fn handle(&self, cancel: &CancelToken, line: &[u8]) -> Result<(), BoxError>;
}

/// [`LineHandler`] backed by a closure, see [`handler_fn`].
#[derive(Clone, Copy)]
pub struct FnHandler<F>(F);

impl<F> LineHandler for FnHandler<F>
where
    F: Fn(&CancelToken, &[u8]) -> Result<(), BoxError> + Sync,
{
    fn handle(&self, cancel: &CancelToken, line: &[u8]) -> Result<(), BoxError> {
        (self.0)(cancel, line)
    }
}

/// Wrap a closure as a [`LineHandler`].
///
/// ```
/// use batchline_core::handler_fn;
///
/// let handler = handler_fn(|_cancel, line| {
///     if line.is_empty() {
///         return Err("empty line".into());
///     }
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&CancelToken, &[u8]) -> Result<(), BoxError> + Sync,
{
    FnHandler(f)
}
