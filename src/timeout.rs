//! Runtime-independent deadline helper.

use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline. Returns `None` when the deadline wins.
///
/// The losing future is dropped, which cancels it.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Option<T>
where
    F: Future<Output = T>,
{
    smol::future::or(async { Some(fut.await) }, async {
        smol::Timer::after(duration).await;
        None
    })
    .await
}
