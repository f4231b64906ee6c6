//! Per-vector report sinks.
//!
//! Each replay call is handed its own [`Reporter`]. Lines go to an optional
//! report file as they are produced and to stderr either immediately or as
//! one block when the vector is done, so parallel runs never interleave.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Echo {
    /// Write each line to stderr as it is logged.
    Immediate,
    /// Hold lines until [`Reporter::finish`].
    Buffered,
    Silent,
}

pub struct Reporter {
    echo: Echo,
    lines: Vec<String>,
    file: Option<BufWriter<File>>,
    failed: bool,
}

impl Reporter {
    fn with_echo(echo: Echo) -> Self {
        Self {
            echo,
            lines: Vec::new(),
            file: None,
            failed: false,
        }
    }

    /// Reporter that prints every line to stderr straight away.
    pub fn console() -> Self {
        Self::with_echo(Echo::Immediate)
    }

    /// Reporter that prints its lines to stderr as one block on finish.
    pub fn buffered() -> Self {
        Self::with_echo(Echo::Buffered)
    }

    /// Reporter that only retains lines in memory.
    pub fn silent() -> Self {
        Self::with_echo(Echo::Silent)
    }

    /// Also write every line to `path` (truncating it).
    pub fn with_file(mut self, path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| anyhow!("failed to create file {}: {}", path.display(), e))?;
        self.file = Some(BufWriter::new(file));
        Ok(self)
    }

    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        if self.echo == Echo::Immediate {
            eprintln!("{}", line);
        }
        if let Some(file) = self.file.as_mut() {
            // A report file that cannot be written must not abort replay.
            if let Err(e) = writeln!(file, "{}", line) {
                tracing::warn!("failed to write report line: {}", e);
            }
        }
        self.lines.push(line);
    }

    /// Log a failure line and mark the report failed.
    pub fn error(&mut self, line: impl Into<String>) {
        self.failed = true;
        self.log(line);
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    /// Flush the report file and emit buffered console output.
    pub fn finish(mut self) -> Result<Vec<String>> {
        if self.echo == Echo::Buffered && !self.lines.is_empty() {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            for line in &self.lines {
                let _ = writeln!(handle, "{}", line);
            }
        }
        if let Some(mut file) = self.file.take() {
            file.flush()
                .map_err(|e| anyhow!("failed to flush report file: {}", e))?;
        }
        Ok(std::mem::take(&mut self.lines))
    }
}
