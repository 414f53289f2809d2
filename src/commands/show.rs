use anyhow::Result;
use colored::Colorize;

use crate::App;
use crate::commit::CommitInfo;

impl App {
    /// Describe the commit `revision` resolves to, as text or JSON.
    pub async fn cmd_show(
        &self,
        revision: &str,
        json: bool,
        stdout: &mut impl std::io::Write,
    ) -> Result<CommitInfo> {
        let info = self.git.commit_info(revision).await?;

        if json {
            serde_json::to_writer_pretty(&mut *stdout, &info)?;
            writeln!(stdout)?;
            return Ok(info);
        }

        writeln!(stdout, "{}", format!("commit {}", info.sha()).yellow())?;
        if info.parents.len() > 1 {
            let parents: Vec<_> = info
                .parents
                .iter()
                .map(|id| id.to_string()[..crate::commit::SHORT_ID_LENGTH].to_string())
                .collect();
            writeln!(stdout, "Merge: {}", parents.join(" "))?;
        }
        writeln!(
            stdout,
            "Author: {} <{}>",
            info.author.name, info.author.email
        )?;
        writeln!(stdout)?;
        for line in info.message.lines() {
            writeln!(stdout, "    {line}")?;
        }
        for note in &info.notes {
            writeln!(stdout)?;
            writeln!(stdout, "Notes:")?;
            for line in note.lines() {
                writeln!(stdout, "    {line}")?;
            }
        }

        Ok(info)
    }
}
