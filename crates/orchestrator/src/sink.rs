use engine::OutputSink;
use std::io::Write;
use std::sync::Arc;

/// Sink that forwards engine output to stdout as it arrives.
pub fn stdout_sink() -> OutputSink {
    Arc::new(|chunk: &str| {
        let mut stdout = std::io::stdout().lock();
        // A closed stdout only loses progress output.
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
    })
}
