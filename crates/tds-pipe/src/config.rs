/// Configuration for a [`pipe`](crate::pipe()).
///
/// ```text
/// ┌─────────────────┬──────────────────────────────────────────────────┐
/// │ Field           │ Purpose                                          │
/// ├─────────────────┼──────────────────────────────────────────────────┤
/// │ high_water_mark │ Output chunks allowed to sit unread before the   │
/// │                 │ writer waits for the reader (minimum 1)          │
/// └─────────────────┴──────────────────────────────────────────────────┘
/// ```
///
/// A value of `0` is treated as `1`: the writer always needs room for at
/// least one chunk, otherwise a write could never make progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipeConfig {
    /// Backpressure threshold, in output chunks.
    pub high_water_mark: usize,
}

impl PipeConfig {
    /// Config with the given high-water mark.
    #[must_use]
    pub fn with_high_water_mark(high_water_mark: usize) -> Self {
        Self { high_water_mark }
    }

    /// The high-water mark actually enforced by the pipe.
    #[must_use]
    pub fn effective_high_water_mark(&self) -> usize {
        self.high_water_mark.max(1)
    }
}

impl Default for PipeConfig {
    /// One buffered output chunk, matching the usual transform-stream default.
    fn default() -> Self {
        Self { high_water_mark: 1 }
    }
}
