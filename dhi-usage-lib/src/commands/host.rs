use std::io::Write;

/// The process environment a command runs in.
///
/// Commands never touch stdout, stderr, or `process::exit` directly, so tests can run them
/// in-process and inspect what they printed.
pub trait Host: Send + Sync {
    /// Reports, listings, and JSON documents
    fn output(&mut self) -> impl Write;

    /// Diagnostics meant for a person
    fn error(&mut self) -> impl Write;

    /// End the process with `code`. A test host may only record it.
    fn exit(&mut self, code: i32);
}
