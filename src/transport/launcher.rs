use std::io;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Stdio;

#[cfg(test)]
use mockall::automock;

use super::ConnectionTarget;

// -----------------------------------------------------------------------------
// LaunchSpec

/// The ssh invocation for one transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl LaunchSpec {
    /// Build `[-p <port>] [<user>@]<host> "<command> '<path>'"`.
    pub fn new(program: impl Into<PathBuf>, target: &ConnectionTarget, command: &str) -> Self {
        let mut args = Vec::with_capacity(4);
        if let Some(port) = target.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if target.user.is_empty() {
            args.push(target.host.clone());
        } else {
            args.push(format!("{}@{}", target.user, target.host));
        }
        // The remote side runs this through a shell
        args.push(format!("{} '{}'", command, target.path.replace('\'', r"'\''")));

        Self {
            program: program.into(),
            args,
        }
    }

    /// The arguments as a single string, as they would be typed in a shell.
    pub fn command_line(&self) -> String {
        self.args
            .iter()
            .map(|arg| {
                if arg.contains(char::is_whitespace) {
                    format!("\"{arg}\"")
                } else {
                    arg.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// -----------------------------------------------------------------------------
// Launcher trait

/// Starts the ssh process for a stream.
///
/// Implementations must hand back a child whose stdin, stdout and stderr are
/// all piped.
#[cfg_attr(test, automock)]
pub trait Launcher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child>;
}

/// Spawns the executable directly, without a shell.
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<Child> {
        spawn_piped(Command::new(&spec.program).args(&spec.args))
    }
}

pub(crate) fn spawn_piped(command: &mut Command) -> io::Result<Child> {
    command
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}
