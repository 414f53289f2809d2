use anyhow::Result;
use anyhow::bail;
use git2::ConfigLevel;

use crate::App;

impl App {
    /// Print a git configuration value, optionally from a single level.
    pub async fn cmd_config(
        &self,
        key: &str,
        level: Option<ConfigLevel>,
        stdout: &mut impl std::io::Write,
    ) -> Result<String> {
        let Some(value) = self.git.config_string(key, level).await? else {
            bail!("Config key not found: {key}");
        };
        writeln!(stdout, "{value}")?;
        Ok(value)
    }
}
