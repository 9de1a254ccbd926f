use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

// ============================================================================
// CommandSpec - Argv-style Process Execution Specification
// ============================================================================

/// Specification for a command to execute.
///
/// All process execution goes through this type to ensure argv-style invocation.
/// Arguments are discrete elements rather than shell strings, so values such
/// as `$(whoami)` or `a; rm -rf /` are delivered to the program verbatim.
///
/// # Example
///
/// ```rust
/// use libstack_runner::CommandSpec;
/// use std::ffi::OsString;
///
/// let cmd = CommandSpec::new("docker")
///     .args(["compose", "-p", "dspace", "up", "-d"])
///     .cwd("/opt/dspace");
///
/// assert_eq!(cmd.program, OsString::from("docker"));
/// assert_eq!(cmd.args.len(), 5);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// The program to execute
    pub program: OsString,
    /// Arguments as discrete elements (NOT shell strings)
    pub args: Vec<OsString>,
    /// Optional working directory
    pub cwd: Option<PathBuf>,
    /// Environment overrides, applied on top of the inherited environment
    pub env: BTreeMap<OsString, OsString>,
}

impl CommandSpec {
    /// Create a new `CommandSpec` with the given program.
    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Build a command from an argv vector (`argv[0]` is the program).
    ///
    /// Returns `None` for an empty vector.
    #[must_use]
    pub fn from_argv<I, S>(argv: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let mut iter = argv.into_iter();
        let program = iter.next()?;
        Some(Self::new(program).args(iter))
    }

    /// Add a single argument to the command.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments to the command.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory for the command.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set an environment variable for the command.
    #[must_use]
    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set multiple environment variables for the command.
    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        for (key, value) in envs {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Program name as a lossy UTF-8 string, for diagnostics.
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Convert this `CommandSpec` into a `std::process::Command`.
    ///
    /// The resulting `Command` uses argv-style argument passing.
    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd
    }
}

/// Renders the command line for logs and error reports.
///
/// Arguments containing whitespace or quotes are single-quoted. The output is
/// for humans only and is never fed back to a shell.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", display_arg(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", display_arg(arg))?;
        }
        Ok(())
    }
}

fn display_arg(arg: &OsString) -> String {
    let text = arg.to_string_lossy();
    if text.is_empty() {
        return "''".to_string();
    }
    if text.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", text.replace('\'', "'\\''"))
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_spec_new() {
        let cmd = CommandSpec::new("psql");
        assert_eq!(cmd.program, OsString::from("psql"));
        assert!(cmd.args.is_empty());
        assert!(cmd.cwd.is_none());
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn test_from_argv() {
        let cmd = CommandSpec::from_argv(["pm2", "save"]).unwrap();
        assert_eq!(cmd.program, OsString::from("pm2"));
        assert_eq!(cmd.args, vec![OsString::from("save")]);

        let empty: Vec<String> = Vec::new();
        assert!(CommandSpec::from_argv(empty).is_none());
    }

    #[test]
    fn test_command_spec_builder_chain() {
        let cmd = CommandSpec::new("mvn")
            .arg("package")
            .args(["-Dmirage2.on=true", "-q"])
            .cwd("/opt/dspace-src")
            .env("MAVEN_OPTS", "-Xmx1g")
            .envs([("JAVA_HOME", "/usr/lib/jvm/java-17")]);

        assert_eq!(cmd.args.len(), 3);
        assert_eq!(cmd.cwd, Some(PathBuf::from("/opt/dspace-src")));
        assert_eq!(cmd.env.len(), 2);
        assert_eq!(
            cmd.env.get(&OsString::from("MAVEN_OPTS")),
            Some(&OsString::from("-Xmx1g"))
        );
    }

    #[test]
    fn test_shell_metacharacters_preserved() {
        let cmd = CommandSpec::new("echo")
            .arg("$(whoami)")
            .arg("`id`")
            .arg("a; rm -rf /");

        assert_eq!(cmd.args[0], OsString::from("$(whoami)"));
        assert_eq!(cmd.args[1], OsString::from("`id`"));
        assert_eq!(cmd.args[2], OsString::from("a; rm -rf /"));
    }

    #[test]
    fn test_display_quotes_only_when_needed() {
        let cmd = CommandSpec::new("psql")
            .args(["-tAc", "SELECT 1 FROM pg_roles WHERE rolname='dspace'"])
            .arg("");
        assert_eq!(
            cmd.to_string(),
            "psql -tAc 'SELECT 1 FROM pg_roles WHERE rolname='\\''dspace'\\''' ''"
        );

        let plain = CommandSpec::new("pm2").arg("save");
        assert_eq!(plain.to_string(), "pm2 save");
    }
}
