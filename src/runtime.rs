//! Blocking bridge onto the tokio runtime
//!
//! Executors are async internally but the harness loop is synchronous. The
//! bridge must work whether or not the caller is already inside a runtime.

use std::future::Future;

use tokio::runtime::{Builder, Handle, RuntimeFlavor};

/// Drive `future` to completion from synchronous code.
///
/// - no runtime active: build a current-thread runtime and block on it
/// - multi-thread runtime active: `block_in_place` on the current handle
/// - current-thread runtime active: run on a dedicated thread with its own
///   runtime, since that runtime cannot be blocked from within
pub fn block_on<F>(future: F) -> std::io::Result<F::Output>
where
    F: Future + Send,
    F::Output: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| fresh_runtime().map(|rt| rt.block_on(future)))
                .join()
                .map_err(|_| std::io::Error::other("runtime bridge thread panicked"))?
        }),
        Err(_) => Ok(fresh_runtime()?.block_on(future)),
    }
}

fn fresh_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    Builder::new_current_thread().enable_all().build()
}
