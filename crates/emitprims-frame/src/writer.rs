use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_packet, FrameConfig, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::packet::Packet;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete packets to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and write one packet (blocking).
    pub fn write_packet(&mut self, packet: &Packet) -> Result<()> {
        self.buf.clear();
        encode_packet(packet, &mut self.buf, self.config.max_payload_size)?;
        let encoded = self.buf.split().freeze();
        self.write_all(&encoded)
    }

    /// Write an already-framed buffer produced by
    /// [`encode_packet`](crate::codec::encode_packet).
    pub fn write_raw(&mut self, frame: &[u8]) -> Result<()> {
        let body = frame.len().saturating_sub(HEADER_SIZE);
        if body > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: body,
                max: self.config.max_payload_size,
            });
        }
        self.write_all(frame)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;
    use serde_json::json;

    use super::*;
    use crate::codec::{decode_packet, DEFAULT_MAX_PAYLOAD};

    #[test]
    fn write_then_decode() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer
            .write_packet(&Packet::with_ack("news", vec![json!("hi")], 1))
            .unwrap();
        writer
            .write_packet(&Packet::event("tick", vec![]))
            .unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let first = decode_packet(&mut wire, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        let second = decode_packet(&mut wire, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(first.ack, Some(1));
        assert_eq!(second.event, "tick");
        assert!(wire.is_empty());
    }

    #[test]
    fn write_raw_passes_frame_through() {
        let mut frame = BytesMut::new();
        encode_packet(
            &Packet::event("news", vec![json!(1)]),
            &mut frame,
            DEFAULT_MAX_PAYLOAD,
        )
        .unwrap();

        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_raw(&frame).unwrap();
        assert_eq!(writer.into_inner().into_inner(), frame.to_vec());
    }

    #[test]
    fn zero_length_write_reports_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer
            .write_packet(&Packet::event("news", vec![]))
            .unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn interrupted_writes_are_retried() {
        let mut writer = FrameWriter::new(FlakyWriter {
            interrupts_left: 2,
            written: Vec::new(),
        });
        writer
            .write_packet(&Packet::event("news", vec![]))
            .unwrap();
        assert!(!writer.get_ref().written.is_empty());
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct FlakyWriter {
        interrupts_left: usize,
        written: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.interrupts_left > 0 {
                self.interrupts_left -= 1;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
