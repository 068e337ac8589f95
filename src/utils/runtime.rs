use anyhow::Result;

/// The host runs on one thread; every event handler is a discrete turn of this runtime.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
