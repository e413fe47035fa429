//! proctest: a process-orchestration test harness.
//!
//! This crate launches external executables, captures their output and exit
//! status, and judges them against expected values. A test may start
//! long-running background processes first; those are always killed and
//! drained once the test's primary process has finished.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Process**: Spawn commands, capture output, manage background jobs
//!   (optionally wrapped in a container)
//! - **Check**: The [`Test`] trait, [`ProcessTest`] and the [`TestGroup`]
//!   composite
//! - **Report**: Ordered verdict log, console rendering, JUnit XML
//! - **Harness**: Build step plus the sequential run of every group
//! - **Config**: TOML scenario files
//!
//! # Example
//!
//! ```no_run
//! use proctest::{Command, Harness, ProcessRunner, ProcessTest, TestGroup};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let harness = Harness::new(ProcessRunner::in_current_dir()).group(
//!         TestGroup::named("dist").with_test(
//!             ProcessTest::output(Command::new("./client"), "File was sorted correctly.")
//!                 .with_background([Command::new("./server").arg("5000")]),
//!         ),
//!     );
//!
//!     let outcome = harness.run().await?;
//!     println!("{}", outcome.summary());
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod config;
pub mod format;
pub mod harness;
pub mod process;
pub mod report;

// Re-export commonly used types
pub use check::{Expectation, ProcessTest, Test, TestGroup};
pub use config::{Config, load_config};
pub use harness::{Harness, HarnessOutcome};
pub use process::{Command, ProcessResult, ProcessRunner};
pub use report::Report;
