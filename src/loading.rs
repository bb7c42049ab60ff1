//! Progress reporting hooks used while loading and saving.

/// Receives progress while content is loaded or a save game is written.
///
/// Implementations must not fail; progress is purely informational.
pub trait Listener {
    fn set_label(&mut self, _label: &str) {}

    fn set_progress_range(&mut self, range: u64);

    fn set_progress(&mut self, value: u64);

    fn increase_progress(&mut self, _increase: u64) {}
}

/// A listener that ignores every update.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl Listener for NoProgress {
    fn set_progress_range(&mut self, _range: u64) {}

    fn set_progress(&mut self, _value: u64) {}
}

/// Progress range used for a single content file.
pub const FILE_PROGRESS: u64 = 1000;

/// Records progress updates, for asserting on in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingListener {
    pub range: u64,
    pub values: Vec<u64>,
    pub increments: u64,
    pub labels: Vec<String>,
}

#[cfg(test)]
impl Listener for RecordingListener {
    fn set_label(&mut self, label: &str) {
        self.labels.push(label.to_string());
    }

    fn set_progress_range(&mut self, range: u64) {
        self.range = range;
    }

    fn set_progress(&mut self, value: u64) {
        self.values.push(value);
    }

    fn increase_progress(&mut self, increase: u64) {
        self.increments += increase;
    }
}
