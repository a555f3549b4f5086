//! Append-only, per-job log buffer.

/// Ordered log lines of one job.
///
/// Lines are only ever appended. Once sealed (on the job's terminal
/// transition) the buffer is frozen and further appends are dropped.
#[derive(Debug, Default, Clone)]
pub struct LogSink {
    lines: Vec<String>,
    sealed: bool,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a line. Returns `false` if the sink is sealed.
    pub fn append(&mut self, line: impl Into<String>) -> bool {
        if self.sealed {
            return false;
        }
        self.lines.push(line.into());
        true
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Copies the current contents out.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.clone()
    }
}
