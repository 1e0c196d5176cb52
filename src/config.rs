// ABOUTME: Tunable configuration for a Framer, gathered behind a builder.
// ABOUTME: Defaults follow the reference net layer's: generous packet ceiling, no timeouts.

//! Tunable configuration for a [`crate::Framer`].

use std::time::Duration;

/// Every tunable of the packet-framing layer, gathered into one builder-constructed value.
///
/// Defaults follow the reference net layer's: a generous packet ceiling, a modest initial
/// buffer, no timeouts, and compression off.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    max_allowed_packet: u32,
    initial_buffer_capacity: usize,
    io_granularity: usize,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    retry_limit: u32,
    compress_enabled: bool,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_allowed_packet: 1024 * 1024 * 1024,
            initial_buffer_capacity: 16 * 1024,
            io_granularity: crate::wire::IO_GRANULARITY,
            read_timeout: None,
            write_timeout: None,
            retry_limit: 10,
            compress_enabled: false,
        }
    }
}

impl FramerConfig {
    pub fn builder() -> FramerConfigBuilder {
        FramerConfigBuilder::default()
    }

    pub fn max_allowed_packet(&self) -> u32 {
        self.max_allowed_packet
    }

    pub fn initial_buffer_capacity(&self) -> usize {
        self.initial_buffer_capacity
    }

    pub fn io_granularity(&self) -> usize {
        self.io_granularity
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    pub fn compress_enabled(&self) -> bool {
        self.compress_enabled
    }
}

/// Fluent builder for [`FramerConfig`], following this crate's existing builder idiom.
#[derive(Debug, Clone, Default)]
pub struct FramerConfigBuilder {
    inner: FramerConfig,
}

impl FramerConfigBuilder {
    pub fn max_allowed_packet(mut self, value: u32) -> Self {
        self.inner.max_allowed_packet = value;
        self
    }

    pub fn initial_buffer_capacity(mut self, value: usize) -> Self {
        self.inner.initial_buffer_capacity = value;
        self
    }

    pub fn io_granularity(mut self, value: usize) -> Self {
        self.inner.io_granularity = value.max(1);
        self
    }

    pub fn read_timeout(mut self, value: Option<Duration>) -> Self {
        self.inner.read_timeout = value;
        self
    }

    pub fn write_timeout(mut self, value: Option<Duration>) -> Self {
        self.inner.write_timeout = value;
        self
    }

    pub fn retry_limit(mut self, value: u32) -> Self {
        self.inner.retry_limit = value;
        self
    }

    pub fn compress_enabled(mut self, value: bool) -> Self {
        self.inner.compress_enabled = value;
        self
    }

    pub fn build(self) -> FramerConfig {
        self.inner
    }
}
