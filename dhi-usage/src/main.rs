//! Track public repositories that pull images from the dhi.io registry.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use dhi_usage_lib::{Host, run};
use std::io::{Write, stderr, stdout};

/// Host bound to the real process: standard streams and `process::exit`.
#[derive(Debug, Clone, Copy, Default)]
struct ProcessHost;

#[cfg_attr(coverage_nightly, coverage(off))]
impl Host for ProcessHost {
    fn output(&mut self) -> impl Write {
        stdout().lock()
    }

    fn error(&mut self) -> impl Write {
        stderr().lock()
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}

#[tokio::main]
#[cfg_attr(coverage_nightly, coverage(off))]
async fn main() -> Result<(), ohno::AppError> {
    run(&mut ProcessHost, std::env::args()).await
}
