use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::config::EmitterConfig;
use crate::error::{Result, SparkError};
use crate::listener::spark_over_unix;
use crate::spark::Spark;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Connect to a listening [`SparkListener`](crate::SparkListener).
pub fn connect(path: impl AsRef<Path>) -> Result<Spark> {
    connect_with_config(path, EmitterConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(path: impl AsRef<Path>, config: EmitterConfig) -> Result<Spark> {
    connect_with(path, config, |_| {})
}

/// Connect and run `setup` before the first inbound event is dispatched.
pub fn connect_with<F: FnOnce(&Spark)>(
    path: impl AsRef<Path>,
    config: EmitterConfig,
    setup: F,
) -> Result<Spark> {
    let path = path.as_ref();
    let stream = UnixStream::connect(path).map_err(|source| SparkError::Connect {
        path: path.to_path_buf(),
        source,
    })?;
    let id = format!("client-{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed));
    debug!(?path, spark = %id, "connected to unix domain socket");
    spark_over_unix(&id, stream, config, setup)
}
