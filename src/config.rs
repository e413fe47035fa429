//! Configuration loading and schema definitions for proctest.
//!
//! A scenario file declares the groups and tests a harness runs, plus the
//! ambient settings every command shares (working directory, warm-up,
//! container wrapping, build step). This module loads the file and turns
//! it into a ready-to-run [`Harness`].

pub mod schema;

pub use schema::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crate::check::{DisplayOptions, ProcessTest, Test, TestGroup};
use crate::harness::{BuildStep, Harness};
use crate::process::{Command, ContainerWrapper, ProcessRunner, WarmUp};

/// Loads and validates a scenario file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
/// - The configuration fails [`Config::validate`]
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {}", path.display()))?;

    Ok(config)
}

/// Loads and validates a scenario from a TOML string.
///
/// # Example
///
/// ```
/// use proctest::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [[groups]]
///     name = "smoke"
///
///     [[groups.tests]]
///     kind = "output"
///     program = "echo"
///     args = ["hello"]
///     expected = "hello"
/// "#)?;
///
/// assert_eq!(config.groups.len(), 1);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Checks constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let Some(container) = &self.container
            && container.image.trim().is_empty()
        {
            bail!("container.image must not be empty");
        }

        if let Some(build) = &self.build
            && build.command.to_command()?.program.is_empty()
        {
            bail!("build.command must not be empty");
        }

        for group in &self.groups {
            group.validate()?;
        }

        Ok(())
    }

    /// Sets the warm-up delay for every test, dropping per-test
    /// `warmup_ms` values.
    pub fn override_warmup(&mut self, warmup_ms: u64) {
        self.harness.warmup_ms = warmup_ms;
        for group in &mut self.groups {
            group.clear_warmup();
        }
    }

    /// Total number of leaf tests across all groups.
    pub fn test_count(&self) -> usize {
        self.groups.iter().map(GroupConfig::test_count).sum()
    }

    /// Resolves the shared working directory.
    ///
    /// `base_dir` is the directory relative paths are anchored at,
    /// normally the directory containing the config file.
    pub fn working_dir(&self, base_dir: &Path) -> PathBuf {
        match &self.harness.working_dir {
            Some(dir) => {
                let expanded = shellexpand::tilde(&dir.to_string_lossy()).into_owned();
                base_dir.join(expanded)
            }
            None => base_dir.to_path_buf(),
        }
    }

    /// Builds the runner every command goes through.
    pub fn runner(&self, base_dir: &Path) -> ProcessRunner {
        let mut runner = ProcessRunner::new(self.working_dir(base_dir));

        let mut env: Vec<_> = self.harness.env.iter().collect();
        env.sort();
        for (key, value) in env {
            runner = runner.with_env(key, value);
        }

        if let Some(container) = &self.container {
            runner = runner.with_container(ContainerWrapper::from(container.clone()));
        }

        runner
    }

    /// Builds the harness described by this configuration.
    pub fn to_harness(&self, base_dir: &Path) -> Result<Harness> {
        let mut harness = Harness::new(self.runner(base_dir));

        if let Some(build) = &self.build {
            harness = harness.with_build(BuildStep {
                command: build.command.to_command()?,
                artifacts: build.artifacts.clone(),
            });
        }

        for group in &self.groups {
            harness = harness.group(group.to_group(&self.harness));
        }

        Ok(harness)
    }
}

impl CommandLine {
    /// Converts into a [`Command`].
    pub fn to_command(&self) -> Result<Command> {
        let parts = match self {
            CommandLine::Line(line) => shell_words::split(line)
                .with_context(|| format!("Failed to split command line: {}", line))?,
            CommandLine::Argv(argv) => argv.clone(),
        };

        let mut parts = parts.into_iter();
        let program = parts.next().unwrap_or_default();
        Ok(Command::new(program).args(parts))
    }
}

impl CommandConfig {
    /// Converts into a [`Command`].
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program).args(self.args.iter().cloned());

        if let Some(input) = &self.input {
            command = command.input(input);
        }
        if let Some(dir) = &self.working_dir {
            command = command.working_dir(dir);
        }

        let mut env: Vec<_> = self.env.iter().collect();
        env.sort();
        for (key, value) in env {
            command = command.env(key, value);
        }

        command
    }

    fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            bail!("program must not be empty");
        }
        Ok(())
    }
}

impl GroupConfig {
    /// Converts into a [`TestGroup`] using `defaults` for unset options.
    pub fn to_group(&self, defaults: &HarnessConfig) -> TestGroup {
        let mut group = TestGroup::named(&self.name);
        for test in &self.tests {
            group.push(test.to_test(defaults));
        }
        group
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("group name must not be empty");
        }

        for (index, test) in self.tests.iter().enumerate() {
            test.validate()
                .with_context(|| format!("in group `{}`, test #{}", self.name, index + 1))?;
        }
        Ok(())
    }

    fn clear_warmup(&mut self) {
        for test in &mut self.tests {
            match test {
                TestConfig::Output(cfg) => cfg.warmup_ms = None,
                TestConfig::Group(group) => group.clear_warmup(),
                TestConfig::ExitCode(_) => {}
            }
        }
    }

    fn test_count(&self) -> usize {
        self.tests
            .iter()
            .map(|test| match test {
                TestConfig::Group(group) => group.test_count(),
                _ => 1,
            })
            .sum()
    }
}

impl TestConfig {
    /// Converts into a runnable test using `defaults` for unset options.
    pub fn to_test(&self, defaults: &HarnessConfig) -> Box<dyn Test> {
        match self {
            TestConfig::ExitCode(cfg) => Box::new(
                ProcessTest::exit_code(cfg.command.to_command(), cfg.expected_code).with_display(
                    DisplayOptions {
                        show_stdout: cfg.show_stdout,
                        show_stderr: cfg.show_stderr.unwrap_or(defaults.show_stderr),
                        truncate_lines: cfg.truncate_lines.or(defaults.truncate_lines),
                    },
                ),
            ),
            TestConfig::Output(cfg) => {
                let warmup = WarmUp {
                    delay: Duration::from_millis(cfg.warmup_ms.unwrap_or(defaults.warmup_ms)),
                    ready_ports: cfg.ready_ports.clone(),
                    ready_host: defaults.ready_host.clone(),
                    ready_timeout: Duration::from_secs(defaults.ready_timeout_secs),
                };

                let mut test = ProcessTest::output(cfg.command.to_command(), &cfg.expected)
                    .with_background(cfg.background.iter().map(CommandConfig::to_command))
                    .with_warmup(warmup)
                    .with_display(DisplayOptions {
                        show_stdout: false,
                        show_stderr: cfg.show_stderr.unwrap_or(defaults.show_stderr),
                        truncate_lines: cfg.truncate_lines.or(defaults.truncate_lines),
                    });

                if let Some(name) = &cfg.name {
                    test = test.named(name);
                }

                Box::new(test)
            }
            TestConfig::Group(group) => Box::new(group.to_group(defaults)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            TestConfig::ExitCode(cfg) => cfg.command.validate(),
            TestConfig::Output(cfg) => {
                cfg.command.validate()?;
                for (index, background) in cfg.background.iter().enumerate() {
                    background
                        .validate()
                        .with_context(|| format!("background job #{}", index + 1))?;
                }
                Ok(())
            }
            TestConfig::Group(group) => group.validate(),
        }
    }
}
