//! Container wrapping for commands.
//!
//! When a container image is configured, every command is rewritten into an
//! invocation of the container runtime with the real program appended:
//!
//! ```text
//! java -cp app.jar Main 10
//!   becomes
//! docker run --rm --network host -v /abs/app.jar:/app.jar IMAGE java -cp app.jar Main 10
//! ```
//!
//! Capture and verdict logic never see the difference.
//!
//! # Example Configuration
//!
//! ```toml
//! [container]
//! runtime = "docker"
//! image = "hpides/base-runner-image"
//! volumes = ["build/libs/app.jar:/app.jar", "data:/data"]
//! network = "host"
//!
//! [container.env]
//! JAVA_OPTS = "-Xmx64m"
//! ```

use std::path::Path;

use super::Command;
use crate::config::ContainerConfig;

/// Rewrites commands so they run inside a container image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerWrapper {
    /// Container runtime executable (`docker`, `podman`, ...).
    pub runtime: String,

    /// Image every command runs in.
    pub image: String,

    /// Volume mounts in `host:container[:options]` format.
    ///
    /// Relative host paths are resolved against the runner's working
    /// directory; a leading `~` is expanded.
    pub volumes: Vec<String>,

    /// Network mode passed as `--network`.
    pub network: Option<String>,

    /// Environment variables passed with `-e`.
    pub env: Vec<(String, String)>,

    /// Extra runtime arguments inserted before the image name.
    pub extra_args: Vec<String>,
}

impl ContainerWrapper {
    /// Creates a docker wrapper for `image`.
    pub fn docker(image: impl Into<String>) -> Self {
        Self {
            runtime: "docker".to_string(),
            image: image.into(),
            volumes: Vec::new(),
            network: None,
            env: Vec::new(),
            extra_args: Vec::new(),
        }
    }

    /// Adds a volume mount.
    pub fn volume(mut self, spec: impl Into<String>) -> Self {
        self.volumes.push(spec.into());
        self
    }

    /// Sets the network mode.
    pub fn network(mut self, mode: impl Into<String>) -> Self {
        self.network = Some(mode.into());
        self
    }

    /// Wraps `cmd` into a container runtime invocation.
    ///
    /// Input text stays on the outer command. The command's own environment
    /// is forwarded with `-e` and its working directory with `-w`, so a
    /// working directory is a path inside the container.
    pub fn wrap(&self, cmd: &Command, base_dir: &Path) -> Command {
        self.wrap_named(cmd, base_dir, None)
    }

    /// Wraps a background job under a fixed container name.
    ///
    /// Killing the runtime client does not stop a detached container, so
    /// teardown must run [`kill_command`](Self::kill_command) with the same
    /// name.
    pub fn wrap_background(&self, cmd: &Command, base_dir: &Path) -> (Command, String) {
        let name = format!("proctest-{}", uuid::Uuid::new_v4());
        (self.wrap_named(cmd, base_dir, Some(&name)), name)
    }

    /// The runtime invocation that stops the container called `name`.
    pub fn kill_command(&self, name: &str) -> Command {
        Command::new(&self.runtime).args(["kill", name])
    }

    fn wrap_named(&self, cmd: &Command, base_dir: &Path, name: Option<&str>) -> Command {
        let mut wrapped = Command::new(&self.runtime).args(["run", "--rm"]);

        if let Some(name) = name {
            wrapped = wrapped.arg("--name").arg(name);
        }

        if cmd.stdin_text().is_some() {
            wrapped = wrapped.arg("-i");
        }

        if let Some(dir) = &cmd.working_dir {
            wrapped = wrapped.arg("-w").arg(dir.display().to_string());
        }

        if let Some(network) = &self.network {
            wrapped = wrapped.arg("--network").arg(network);
        }

        for volume in &self.volumes {
            wrapped = wrapped.arg("-v").arg(resolve_volume(volume, base_dir));
        }

        for (key, value) in self.env.iter().chain(cmd.env.iter()) {
            wrapped = wrapped.arg("-e").arg(format!("{}={}", key, value));
        }

        wrapped = wrapped
            .args(self.extra_args.iter().cloned())
            .arg(&self.image)
            .arg(&cmd.program)
            .args(cmd.args.iter().cloned());

        wrapped.input = cmd.input.clone();
        wrapped
    }
}

impl From<ContainerConfig> for ContainerWrapper {
    fn from(config: ContainerConfig) -> Self {
        let mut env: Vec<(String, String)> = config.env.into_iter().collect();
        env.sort();

        Self {
            runtime: config.runtime,
            image: config.image,
            volumes: config.volumes,
            network: config.network,
            env,
            extra_args: config.extra_args,
        }
    }
}

/// Makes the host part of a volume spec absolute.
fn resolve_volume(spec: &str, base_dir: &Path) -> String {
    let (host, rest) = match spec.split_once(':') {
        Some((host, rest)) => (host, Some(rest)),
        None => (spec, None),
    };

    let expanded = shellexpand::tilde(host);
    let host_path = Path::new(expanded.as_ref());
    let host = if host_path.is_absolute() {
        host_path.to_path_buf()
    } else {
        base_dir.join(host_path)
    };

    match rest {
        Some(rest) => format!("{}:{}", host.display(), rest),
        None => host.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_appends_real_program() {
        let wrapper = ContainerWrapper::docker("runner-image")
            .network("host")
            .volume("build/app.jar:/app.jar")
            .volume("/data:/data:ro");

        let cmd = Command::new("java").args(["-jar", "/app.jar", "10"]);
        let wrapped = wrapper.wrap(&cmd, Path::new("/work"));

        assert_eq!(wrapped.program, "docker");
        assert_eq!(
            wrapped.args,
            vec![
                "run",
                "--rm",
                "--network",
                "host",
                "-v",
                "/work/build/app.jar:/app.jar",
                "-v",
                "/data:/data:ro",
                "runner-image",
                "java",
                "-jar",
                "/app.jar",
                "10",
            ]
        );
    }

    #[test]
    fn test_wrap_forwards_input_and_env() {
        let wrapper = ContainerWrapper::docker("img");
        let cmd = Command::new("cat").input("data").env("K", "V");
        let wrapped = wrapper.wrap(&cmd, Path::new("/work"));

        assert_eq!(wrapped.args, vec!["run", "--rm", "-i", "-e", "K=V", "img", "cat"]);
        assert_eq!(wrapped.stdin_text(), Some("data"));
        assert!(wrapped.env.is_empty());
    }

    #[test]
    fn test_wrap_passes_working_dir_into_container() {
        let wrapper = ContainerWrapper::docker("img");
        let cmd = Command::new("ls").working_dir("/app/data");
        let wrapped = wrapper.wrap(&cmd, Path::new("/work"));

        assert_eq!(wrapped.args, vec!["run", "--rm", "-w", "/app/data", "img", "ls"]);
        assert_eq!(wrapped.working_dir, None);
    }

    #[test]
    fn test_background_jobs_are_named_and_killable() {
        let wrapper = ContainerWrapper::docker("img").network("host");
        let cmd = Command::new("server").arg("5000");

        let (wrapped, name) = wrapper.wrap_background(&cmd, Path::new("/work"));
        assert!(name.starts_with("proctest-"));
        assert_eq!(
            wrapped.args,
            vec!["run", "--rm", "--name", name.as_str(), "--network", "host", "img", "server", "5000"]
        );

        let kill = wrapper.kill_command(&name);
        assert_eq!(kill.program, "docker");
        assert_eq!(kill.args, vec!["kill".to_string(), name.clone()]);

        let (_, other) = wrapper.wrap_background(&cmd, Path::new("/work"));
        assert_ne!(name, other);
    }

    #[test]
    fn test_resolve_volume_without_container_path() {
        assert_eq!(resolve_volume("cache", Path::new("/base")), "/base/cache");
    }
}
