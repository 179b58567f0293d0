//! Completion callbacks for callers that prefer them over awaiting.

use std::future::Future;

use crate::error::Result;

/// Await `operation`, hand its outcome to `callback`, then return it.
///
/// The callback sees exactly what the future resolved to.
///
/// ```
/// use serial_boot::protocol::callback::with_callback;
///
/// # tokio_test_block(async {
/// let value = with_callback(async { Ok(7u8) }, |result| {
///     assert_eq!(*result.as_ref().unwrap(), 7);
/// })
/// .await
/// .unwrap();
/// assert_eq!(value, 7);
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub async fn with_callback<T, F, C>(operation: F, callback: C) -> Result<T>
where
    F: Future<Output = Result<T>>,
    C: FnOnce(&Result<T>),
{
    let result = operation.await;
    callback(&result);
    result
}
