use anyhow::Result;
use anyhow::bail;
use colored::Colorize;
use tracing::instrument;

use crate::App;
use crate::push::PushResult;

impl App {
    /// Push `branch` to the branch of the same name on `remote`.
    ///
    /// Fails if the remote rejects the update.
    #[instrument(skip(self, stdout))]
    pub async fn cmd_push(
        &self,
        remote: &str,
        branch: &str,
        stdout: &mut impl std::io::Write,
    ) -> Result<PushResult> {
        let result = self.git.push(remote, branch).await?;
        write_push_result(stdout, &result)?;
        if !result.is_success() {
            bail!(rejection_message(&result));
        }
        Ok(result)
    }
}

/// Error text naming every reference the remote refused.
pub(crate) fn rejection_message(result: &PushResult) -> String {
    let references: Vec<_> = result
        .rejected()
        .map(|update| update.reference.as_str())
        .collect();
    format!(
        "Push to {} was rejected for {}",
        result.remote,
        references.join(", ")
    )
}

pub(crate) fn write_push_result(
    stdout: &mut impl std::io::Write,
    result: &PushResult,
) -> Result<()> {
    if result.updates.is_empty() {
        writeln!(stdout, "Nothing pushed to {}", result.remote)?;
    }
    for update in &result.updates {
        match &update.message {
            None => writeln!(
                stdout,
                "{} Pushed {} to {}",
                "✓".green(),
                update.reference,
                result.remote
            )?,
            Some(message) => writeln!(
                stdout,
                "{} Rejected {} by {}: {}",
                "✗".red(),
                update.reference,
                result.remote,
                message
            )?,
        }
    }
    Ok(())
}
