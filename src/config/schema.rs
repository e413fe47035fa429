//! Configuration schema definitions for proctest.
//!
//! This module defines all types that can be deserialized from a TOML
//! scenario file. Tests are selected with an internally tagged `kind` field.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── HarnessConfig          - Working dir, warm-up, display defaults
//! ├── ContainerConfig        - Optional container wrapper for every command
//! ├── BuildConfig            - Optional build step run before the tests
//! └── GroupConfig[]          - Ordered top-level groups
//!     └── TestConfig[]       - Tagged enum selecting the test kind
//!         ├── ExitCode       - Compare the exit code
//!         ├── Output         - Compare trimmed stdout (with background jobs)
//!         └── Group          - Nested group
//! ```

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize};

/// Root configuration structure.
///
/// # TOML Structure
///
/// ```toml
/// [harness]
/// working_dir = "."
/// warmup_ms = 1000
///
/// [[groups]]
/// name = "local"
///
/// [[groups.tests]]
/// kind = "output"
/// name = "small1"
/// program = "java"
/// args = ["-cp", "app.jar", "Main", 10]
/// expected = "File was sorted correctly."
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Harness-wide settings (optional, has defaults).
    #[serde(default)]
    pub harness: HarnessConfig,

    /// Container wrapper applied to every command.
    pub container: Option<ContainerConfig>,

    /// Build step run before any test.
    pub build: Option<BuildConfig>,

    /// Top-level groups, run in order.
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// Harness-wide settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `working_dir` | None (directory of the config file) |
/// | `warmup_ms` | 1000 |
/// | `ready_host` | `127.0.0.1` |
/// | `ready_timeout_secs` | 10 |
/// | `truncate_lines` | None (no truncation) |
/// | `show_stderr` | false |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HarnessConfig {
    /// Working directory shared by every command.
    ///
    /// Relative paths are resolved against the directory of the config
    /// file; `~` is expanded.
    pub working_dir: Option<PathBuf>,

    /// Delay between starting background processes and the primary run.
    ///
    /// Default: 1000
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,

    /// Host used for `ready_ports` probes.
    #[serde(default = "default_ready_host")]
    pub ready_host: String,

    /// Upper bound on waiting for `ready_ports`.
    ///
    /// Default: 10
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Default line limit for captured text in descriptions.
    pub truncate_lines: Option<usize>,

    /// Default for showing captured stderr in descriptions.
    #[serde(default)]
    pub show_stderr: bool,

    /// Environment variables set for every command.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            warmup_ms: default_warmup_ms(),
            ready_host: default_ready_host(),
            ready_timeout_secs: default_ready_timeout(),
            truncate_lines: None,
            show_stderr: false,
            env: HashMap::new(),
        }
    }
}

fn default_warmup_ms() -> u64 {
    1000
}

fn default_ready_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ready_timeout() -> u64 {
    10
}

/// Container wrapper settings.
///
/// # Example
///
/// ```toml
/// [container]
/// image = "hpides/base-runner-image"
/// volumes = ["build/libs/app.jar:/app.jar", "data:/data"]
/// network = "host"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContainerConfig {
    /// Container runtime executable.
    ///
    /// Default: `docker`
    #[serde(default = "default_runtime")]
    pub runtime: String,

    /// Image every command runs in.
    pub image: String,

    /// Volume mounts in `host:container[:options]` format.
    #[serde(default)]
    pub volumes: Vec<String>,

    /// Network mode (`host`, `bridge`, `none`, ...).
    pub network: Option<String>,

    /// Environment variables passed into the container.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Extra runtime arguments placed before the image name.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_runtime() -> String {
    "docker".to_string()
}

/// Build step settings.
///
/// ```toml
/// [build]
/// command = "./gradlew shadowJar"
/// artifacts = ["build/libs/app.jar"]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// Build command, either a shell-style string or an argument list.
    pub command: CommandLine,

    /// Paths that must exist after the build.
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,
}

/// A command given as one string or as an argument vector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CommandLine {
    /// Split with shell quoting rules, e.g. `"./gradlew shadowJar"`.
    Line(String),

    /// Program followed by arguments.
    #[serde(deserialize_with = "stringified")]
    Argv(Vec<String>),
}

/// A group of tests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Group name, attributed to every entry its tests record.
    pub name: String,

    /// Member tests, run in order.
    #[serde(default)]
    pub tests: Vec<TestConfig>,
}

/// One test, selected by `kind`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestConfig {
    /// Compare the exit code.
    ExitCode(ExitCodeTestConfig),

    /// Compare trimmed standard output.
    Output(OutputTestConfig),

    /// Nested group.
    Group(GroupConfig),
}

/// An executable invocation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CommandConfig {
    /// Program to run.
    pub program: String,

    /// Positional arguments. Numbers and booleans are stringified.
    #[serde(default, deserialize_with = "stringified")]
    pub args: Vec<String>,

    /// Text fed to standard input.
    pub input: Option<String>,

    /// Working directory override, relative to the harness working dir.
    ///
    /// With a container configured this is the directory inside the
    /// container and should be absolute.
    pub working_dir: Option<PathBuf>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Settings of an exit-code test.
///
/// ```toml
/// [[groups.tests]]
/// kind = "exit_code"
/// program = "make"
/// args = ["check"]
/// expected_code = 0
/// show_stdout = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExitCodeTestConfig {
    #[serde(flatten)]
    pub command: CommandConfig,

    /// Expected exit code.
    ///
    /// Default: 0
    #[serde(default)]
    pub expected_code: i32,

    /// Show captured stdout in the description.
    #[serde(default)]
    pub show_stdout: bool,

    /// Show captured stderr; falls back to the harness default.
    pub show_stderr: Option<bool>,

    /// Line limit; falls back to the harness default.
    pub truncate_lines: Option<usize>,
}

/// Settings of an output test, optionally with background processes.
///
/// ```toml
/// [[groups.tests]]
/// kind = "output"
/// name = "small_dist"
/// program = "java"
/// args = ["-cp", "app.jar", "Client", "localhost:5000"]
/// expected = "File was sorted correctly."
/// background = [{ program = "java", args = ["-cp", "app.jar", "Server", 5000] }]
/// ready_ports = [5000]
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputTestConfig {
    /// Display name used instead of the command line.
    pub name: Option<String>,

    #[serde(flatten)]
    pub command: CommandConfig,

    /// Expected stdout, compared after trimming both sides.
    pub expected: String,

    /// Commands started in the background for the duration of the run.
    #[serde(default)]
    pub background: Vec<CommandConfig>,

    /// Ports to poll instead of sleeping a fixed warm-up delay.
    #[serde(default)]
    pub ready_ports: Vec<u16>,

    /// Warm-up override for this test. `run --warmup-ms` replaces it.
    pub warmup_ms: Option<u64>,

    /// Show captured stderr; falls back to the harness default.
    pub show_stderr: Option<bool>,

    /// Line limit; falls back to the harness default.
    pub truncate_lines: Option<usize>,
}

/// A positional argument as written in TOML.
#[derive(Deserialize)]
#[serde(untagged)]
enum Arg {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Arg {
    fn into_string(self) -> String {
        match self {
            Arg::Str(s) => s,
            Arg::Int(i) => i.to_string(),
            Arg::Float(f) => f.to_string(),
            Arg::Bool(b) => b.to_string(),
        }
    }
}

/// Deserializes a list of scalars into strings.
fn stringified<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let args = Vec::<Arg>::deserialize(deserializer)?;
    Ok(args.into_iter().map(Arg::into_string).collect())
}
