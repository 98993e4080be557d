use std::process::Command;

/// Builds the process that will interpret a command line.
pub trait ShellLauncher {
    fn command(&self, command_line: &str) -> Command;

    /// Program name, used in logs and error messages.
    fn program(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// `sh -c <command>`
    Posix,
    /// `cmd.exe /c <command>`
    WindowsCmd,
}

impl Shell {
    /// Pick the shell for the host this binary is running on.
    pub fn detect() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: &str) -> Self {
        if os.to_lowercase().contains("windows") {
            Shell::WindowsCmd
        } else {
            Shell::Posix
        }
    }

    fn flag(&self) -> &'static str {
        match self {
            Shell::Posix => "-c",
            Shell::WindowsCmd => "/c",
        }
    }
}

impl ShellLauncher for Shell {
    fn command(&self, command_line: &str) -> Command {
        // The whole line goes in as one argument; the shell does the splitting.
        let mut command = Command::new(self.program());
        command.arg(self.flag()).arg(command_line);
        command
    }

    fn program(&self) -> &str {
        match self {
            Shell::Posix => "sh",
            Shell::WindowsCmd => "cmd.exe",
        }
    }
}
