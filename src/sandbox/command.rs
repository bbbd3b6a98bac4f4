use tracing::debug;

use crate::config::types::ToolKind;
use crate::sandbox::ExecutionRequest;

/// Directory inside the sandbox that receives the submitted source.
pub const SOURCE_DIR: &str = "/tmp";

/// Fixed name of the submitted source file. Never derived from user input.
pub const SOURCE_FILE_NAME: &str = "main.py";

/// Flags pyright understands out of the shared flag set.
const PYRIGHT_FLAGS: &[&str] = &["verbose"];

/// The argv a sandbox runs for one request.
///
/// Always an argument vector handed to the container engine as-is; no shell
/// is involved, so request strings are never interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    argv: Vec<String>,
}

impl CommandLine {
    /// Build the tool invocation for a request.
    pub fn resolve(request: &ExecutionRequest) -> Self {
        let mut argv = Vec::new();

        match request.tool() {
            ToolKind::Mypy | ToolKind::Basedmypy => {
                // basedmypy images ship it under the mypy entry point
                argv.push("mypy".to_string());
                argv.extend(["--cache-dir", "/dev/null"].map(String::from));
                argv.push("--python-version".to_string());
                argv.push(request.python_version().to_string());
                for flag in request.flags() {
                    argv.push(format!("--{}", flag));
                }
            }
            ToolKind::Pyright => {
                argv.push("pyright".to_string());
                argv.push("--pythonversion".to_string());
                argv.push(request.python_version().to_string());
                for flag in request.flags() {
                    if PYRIGHT_FLAGS.contains(&flag.as_str()) {
                        argv.push(format!("--{}", flag));
                    } else {
                        debug!(flag = %flag, "Flag has no pyright equivalent, skipping");
                    }
                }
            }
        }

        argv.push(SOURCE_FILE_NAME.to_string());
        Self { argv }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn into_argv(self) -> Vec<String> {
        self.argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn request(tool: ToolKind, flags: &[&str]) -> ExecutionRequest {
        ExecutionRequest::new(
            "1+1".to_string(),
            "3.12".to_string(),
            tool,
            "latest".to_string(),
            flags.iter().map(|f| f.to_string()).collect::<BTreeSet<_>>(),
        )
    }

    #[test]
    fn test_mypy_command_line() {
        let cmd = CommandLine::resolve(&request(ToolKind::Mypy, &["strict", "verbose"]));
        assert_eq!(
            cmd.argv(),
            [
                "mypy",
                "--cache-dir",
                "/dev/null",
                "--python-version",
                "3.12",
                "--strict",
                "--verbose",
                "main.py"
            ]
        );
        assert_eq!(cmd.argv()[0], "mypy");
    }

    #[test]
    fn test_basedmypy_uses_mypy_entry_point() {
        let cmd = CommandLine::resolve(&request(ToolKind::Basedmypy, &[]));
        assert_eq!(cmd.argv()[0], "mypy");
        assert_eq!(cmd.argv().last().unwrap(), SOURCE_FILE_NAME);
    }

    #[test]
    fn test_pyright_keeps_only_known_flags() {
        let cmd = CommandLine::resolve(&request(ToolKind::Pyright, &["strict", "verbose"]));
        assert_eq!(
            cmd.into_argv(),
            vec!["pyright", "--pythonversion", "3.12", "--verbose", "main.py"]
        );
    }

    #[test]
    fn test_source_never_reaches_argv() {
        let req = ExecutionRequest::new(
            "import os; os.system('rm -rf /')".to_string(),
            "3.11".to_string(),
            ToolKind::Mypy,
            "latest".to_string(),
            BTreeSet::new(),
        );
        let cmd = CommandLine::resolve(&req);
        assert!(cmd.argv().iter().all(|arg| !arg.contains("os.system")));
    }
}
