use std::time::Duration;

use emitprims_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Per-connection emitter behavior.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Default acknowledgment window. `None` waits until reply or close.
    pub ack_timeout: Option<Duration>,
    /// Maximum encoded packet body in bytes.
    pub max_payload_size: usize,
    /// Socket read timeout. `None` blocks until data or EOF.
    pub read_timeout: Option<Duration>,
    /// Socket write timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            ack_timeout: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl EmitterConfig {
    /// Set the default acknowledgment window.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = Some(timeout);
        self
    }

    /// Wait for acknowledgments until reply or close.
    pub fn without_ack_timeout(mut self) -> Self {
        self.ack_timeout = None;
        self
    }

    /// Override the maximum packet body size.
    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    /// Frame codec settings derived from this config.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_timeout_disabled_by_default() {
        let config = EmitterConfig::default();
        assert_eq!(config.ack_timeout, None);
        assert_eq!(config.max_payload_size, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn builders_flow_into_frame_config() {
        let config = EmitterConfig::default()
            .with_ack_timeout(Duration::from_millis(50))
            .with_max_payload_size(1024);
        assert_eq!(config.ack_timeout, Some(Duration::from_millis(50)));
        assert_eq!(config.frame_config().max_payload_size, 1024);
        assert_eq!(config.without_ack_timeout().ack_timeout, None);
    }
}
