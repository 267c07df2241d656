//! Sparks over byte streams.
//!
//! Outgoing frames go through a [`FrameWriter`] behind a mutex; incoming
//! frames are read on a dedicated thread and dispatched one at a time, in
//! arrival order. The spark closes when the stream reaches EOF or fails.

use std::io::{ErrorKind, Read, Write};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use emitprims_frame::{FrameError, FrameReader, FrameWriter};
use tracing::{debug, warn};

use crate::config::EmitterConfig;
use crate::error::Result;
use crate::spark::Spark;
use crate::transport::FrameSink;

type ShutdownHook = Box<dyn Fn() + Send + Sync + 'static>;

/// [`FrameSink`] that writes to a byte stream.
pub struct StreamSink<W> {
    writer: Mutex<FrameWriter<W>>,
    shutdown: Option<ShutdownHook>,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self {
            writer: Mutex::new(writer),
            shutdown: None,
        }
    }

    /// Run `hook` when the spark closes, typically to shut the socket down
    /// and unblock the reader thread.
    pub fn with_shutdown<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shutdown = Some(Box::new(hook));
        self
    }
}

impl<W: Write + Send> FrameSink for StreamSink<W> {
    fn send_frame(&self, frame: Bytes) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_raw(&frame)?;
        Ok(())
    }

    fn close(&self) {
        if let Some(shutdown) = &self.shutdown {
            shutdown();
        }
    }
}

/// Build a spark over a reader/writer pair and start its reader thread.
pub fn attach<R, W>(id: impl Into<String>, reader: R, writer: W, config: EmitterConfig) -> Result<Spark>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let sink = StreamSink::new(FrameWriter::with_config(writer, config.frame_config()));
    attach_sink(id, reader, sink, config, |_| {})
}

/// `setup` runs before the reader thread starts, so listeners it registers
/// see the peer's first event.
pub(crate) fn attach_sink<R, W, F>(
    id: impl Into<String>,
    reader: R,
    sink: StreamSink<W>,
    config: EmitterConfig,
    setup: F,
) -> Result<Spark>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
    F: FnOnce(&Spark),
{
    let reader = FrameReader::with_config(reader, config.frame_config());
    let spark = Spark::new(id, sink, config);
    setup(&spark);
    if let Err(err) = spawn_reader(spark.clone(), reader) {
        spark.close();
        return Err(err.into());
    }
    Ok(spark)
}

fn spawn_reader<R: Read + Send + 'static>(
    spark: Spark,
    reader: FrameReader<R>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("emitprims-read-{}", spark.id()))
        .spawn(move || read_loop(spark, reader))
}

fn read_loop<R: Read>(spark: Spark, mut reader: FrameReader<R>) {
    loop {
        match reader.read_packet() {
            Ok(packet) => spark.receive_packet(packet),
            Err(FrameError::Malformed(err)) => {
                warn!(spark = %spark.id(), error = %err, "dropping malformed packet");
            }
            Err(FrameError::ConnectionClosed) => {
                debug!(spark = %spark.id(), "peer closed stream");
                break;
            }
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                if !spark.is_open() {
                    break;
                }
            }
            Err(err) => {
                if spark.is_open() {
                    warn!(spark = %spark.id(), error = %err, "stream read failed");
                }
                break;
            }
        }
        if !spark.is_open() {
            break;
        }
    }
    spark.close();
}
