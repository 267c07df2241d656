use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::config::EmitterConfig;
use crate::error::{Result, SparkError};
use crate::hub::Hub;
use crate::spark::Spark;
use crate::stream::{attach_sink, StreamSink};

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Listens on a Unix domain socket and turns each connection into a spark.
pub struct SparkListener {
    listener: UnixListener,
    path: PathBuf,
    config: EmitterConfig,
    next_spark_id: AtomicU64,
}

impl SparkListener {
    /// Bind to a Unix domain socket path.
    ///
    /// A stale socket at `path` is removed first; any other kind of file is
    /// left alone and the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bind_err = |source: std::io::Error| SparkError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(DEFAULT_SOCKET_MODE))
            .map_err(bind_err)?;

        info!(?path, "listening for sparks");
        Ok(Self {
            listener,
            path,
            config: EmitterConfig::default(),
            next_spark_id: AtomicU64::new(1),
        })
    }

    /// Override the config applied to accepted sparks.
    pub fn with_config(mut self, config: EmitterConfig) -> Self {
        self.config = config;
        self
    }

    /// Accept the next connection with an auto-generated id
    /// (`spark-1`, `spark-2`, ...).
    pub fn accept(&self) -> Result<Spark> {
        self.accept_with(|_| {})
    }

    /// Accept the next connection under an explicit id.
    pub fn accept_with_id(&self, spark_id: &str) -> Result<Spark> {
        self.accept_spark(spark_id, |_| {})
    }

    /// Accept the next connection and run `setup` on it before any inbound
    /// event is dispatched. Register listeners here to avoid missing the
    /// peer's first event.
    pub fn accept_with<F: FnOnce(&Spark)>(&self, setup: F) -> Result<Spark> {
        let id = self.next_spark_id.fetch_add(1, Ordering::Relaxed);
        self.accept_spark(&format!("spark-{id}"), setup)
    }

    /// Accept the next connection and track it in `hub`.
    pub fn accept_into(&self, hub: &Hub) -> Result<Spark> {
        self.accept_with(|spark| hub.insert(spark.clone()))
    }

    fn accept_spark<F: FnOnce(&Spark)>(&self, spark_id: &str, setup: F) -> Result<Spark> {
        let (stream, _addr) = self.listener.accept()?;
        debug!(spark = spark_id, "accepted connection");
        spark_over_unix(spark_id, stream, self.config.clone(), setup)
    }

    /// Bound socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }
}

impl Drop for SparkListener {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            debug!(path = ?self.path, error = %err, "socket cleanup skipped");
        }
    }
}

/// Build a spark over a connected Unix stream. Closing the spark shuts the
/// socket down.
pub(crate) fn spark_over_unix<F: FnOnce(&Spark)>(
    id: &str,
    stream: UnixStream,
    config: EmitterConfig,
    setup: F,
) -> Result<Spark> {
    stream.set_read_timeout(config.read_timeout)?;
    stream.set_write_timeout(config.write_timeout)?;
    let reader = stream.try_clone()?;
    let control = stream.try_clone()?;

    let sink = StreamSink::new(emitprims_frame::FrameWriter::with_config(
        stream,
        config.frame_config(),
    ))
    .with_shutdown(move || {
        let _ = control.shutdown(std::net::Shutdown::Both);
    });
    attach_sink(id, reader, sink, config, setup)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::*;
    use crate::connector::connect;

    fn make_sock_path(tag: &str) -> PathBuf {
        let dir = PathBuf::from(format!(
            "/tmp/emitp-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        dir.join("listener.sock")
    }

    fn cleanup(sock_path: &Path) {
        if let Some(parent) = sock_path.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
        true
    }

    #[test]
    fn accept_with_id_uses_caller_id_and_keeps_counter() {
        let sock_path = make_sock_path("named");
        let listener = SparkListener::bind(&sock_path).expect("listener should bind");

        let _c1 = connect(&sock_path).expect("first client should connect");
        let _c2 = connect(&sock_path).expect("second client should connect");
        let named = listener
            .accept_with_id("worker-7")
            .expect("named accept should succeed");
        let numbered = listener.accept().expect("numbered accept should succeed");

        assert_eq!(named.id(), "worker-7");
        assert!(named.is_open());
        assert_eq!(numbered.id(), "spark-1");
        cleanup(&sock_path);
    }

    #[test]
    fn accept_assigns_sequential_ids() {
        let sock_path = make_sock_path("ids");
        let listener = SparkListener::bind(&sock_path).expect("listener should bind");

        let _c1 = connect(&sock_path).expect("first client should connect");
        let _c2 = connect(&sock_path).expect("second client should connect");
        let first = listener.accept().expect("first accept");
        let second = listener.accept().expect("second accept");

        assert_eq!(first.id(), "spark-1");
        assert_eq!(second.id(), "spark-2");
        cleanup(&sock_path);
    }

    #[test]
    fn client_emits_and_server_acks() {
        let sock_path = make_sock_path("ack");
        let listener = SparkListener::bind(&sock_path).expect("listener should bind");
        let (tx, rx) = std::sync::mpsc::channel();

        let server = thread::spawn(move || {
            let spark = listener
                .accept_with(|spark| {
                    spark
                        .on("news", move |args, reply| {
                            let _ = tx.send(args.to_vec());
                            if let Some(reply) = reply {
                                reply.ok("received").expect("reply should send");
                            }
                        })
                        .expect("listener should register");
                })
                .expect("listener should accept");
            (listener, spark)
        });

        let client = connect(&sock_path).expect("client should connect");
        let outcome = client
            .request("news", vec![json!({ "hi": "hello", "num": 123456 })])
            .expect("request should send")
            .wait_timeout(Duration::from_secs(5));

        assert_eq!(outcome, Ok(json!("received")));
        let args = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("event should arrive");
        assert_eq!(args, vec![json!({ "hi": "hello", "num": 123456 })]);
        let _ = server.join().expect("server thread should finish");
        cleanup(&sock_path);
    }

    #[test]
    fn accept_into_hub_and_broadcast() {
        let sock_path = make_sock_path("hub");
        let listener = SparkListener::bind(&sock_path).expect("listener should bind");
        let hub = Hub::new();

        let inbox = Arc::new(Mutex::new(Vec::new()));
        let mut clients = Vec::new();
        for n in 0..3 {
            let client = connect(&sock_path).expect("client should connect");
            let inbox = inbox.clone();
            client
                .on("news", move |args, _| inbox.lock().unwrap().push((n, args.to_vec())))
                .expect("listener should register");
            clients.push(client);
            listener.accept_into(&hub).expect("accept should succeed");
        }
        assert_eq!(hub.len(), 3);

        let report = hub.broadcast("news", vec![json!("hi")]).expect("broadcast");
        assert_eq!(report.delivered_count(), 3);
        assert!(wait_until(|| inbox.lock().unwrap().len() == 3));
        assert!(inbox
            .lock()
            .unwrap()
            .iter()
            .all(|(_, args)| args == &vec![json!("hi")]));

        clients[1].close();
        assert!(wait_until(|| hub.len() == 2));
        cleanup(&sock_path);
    }

    #[test]
    fn bind_refuses_regular_file() {
        let sock_path = make_sock_path("file");
        std::fs::write(&sock_path, b"not a socket").expect("file should be writable");

        let err = SparkListener::bind(&sock_path)
            .err()
            .expect("bind should fail");
        assert!(matches!(err, SparkError::Bind { .. }));
        assert!(sock_path.exists());
        cleanup(&sock_path);
    }

    #[test]
    fn socket_file_removed_on_drop() {
        let sock_path = make_sock_path("drop");
        let listener = SparkListener::bind(&sock_path).expect("listener should bind");
        assert!(sock_path.exists());
        drop(listener);
        assert!(!sock_path.exists());
        cleanup(&sock_path);
    }
}
