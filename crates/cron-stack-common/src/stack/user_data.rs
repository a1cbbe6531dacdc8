//! Instance user data: the shell script run once on first boot

use serde::Serialize;

use super::StackError;

/// Characters that could break a double-quoted bash string or enable injection
const FORBIDDEN: &[char] = &['"', '\\', '`', '$', '\n', '\r'];

/// Check that `value` is safe to interpolate into user data.
///
/// Rejects empty values and `"`, `\`, `` ` ``, `$` and newlines.
pub fn validate_shell_input(value: &str, field: &'static str) -> Result<(), StackError> {
    if value.is_empty() {
        return Err(StackError::EmptyValue { field });
    }
    if let Some(found) = value.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(StackError::UnsafeShellInput { field, found });
    }
    Ok(())
}

/// Ordered list of shell commands for a Linux instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UserData {
    commands: Vec<String>,
}

impl UserData {
    pub const SHEBANG: &'static str = "#!/bin/bash";

    pub fn for_linux() -> Self {
        Self::default()
    }

    pub fn add_commands<I, S>(&mut self, commands: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Render as a script: the shebang, then one command per line
    pub fn render(&self) -> String {
        let mut script = String::from(Self::SHEBANG);
        script.push('\n');
        for command in &self.commands {
            script.push_str(command);
            script.push('\n');
        }
        script
    }
}
