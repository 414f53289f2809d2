use anyhow::Result;
use anyhow::bail;
use tracing::instrument;

use super::push::rejection_message;
use super::push::write_push_result;
use crate::App;
use crate::send::SendBranchResult;
use crate::send::SendStep;

impl App {
    /// Send branches to `remote`.
    ///
    /// 1. Fetch `remote`.
    /// 2. For each branch, in order:
    ///    - Merge `<remote>/<branch>` into the local branch. Stop at the first
    ///      branch with conflicts.
    ///    - Push the branch.
    ///
    /// Every step taken is reported, even when a later one fails.
    #[instrument(skip(self, stdout))]
    pub async fn cmd_send(
        &self,
        remote: &str,
        branches: &[String],
        stdout: &mut impl std::io::Write,
    ) -> Result<SendBranchResult> {
        if branches.is_empty() {
            bail!("No branches to send");
        }

        self.git.fetch(remote).await?;

        let mut result = SendBranchResult::new();
        let mut conflicted = None;
        for branch in branches {
            let merge = self.git.merge_upstream(remote, branch).await?;
            let has_conflicts = merge.has_conflicts();
            result.merge_results.push(merge);
            if has_conflicts {
                conflicted = Some(branch);
                break;
            }
            result.push_results.push(self.git.push(remote, branch).await?);
        }

        write_send_result(stdout, remote, branches, &result)?;

        if let Some(branch) = conflicted {
            bail!("Merging {remote}/{branch} into {branch} has conflicts; resolve them and send again");
        }
        if let Some(push) = result.push_results.iter().find(|push| !push.is_success()) {
            bail!(rejection_message(push));
        }

        Ok(result)
    }
}

fn write_send_result(
    stdout: &mut impl std::io::Write,
    remote: &str,
    branches: &[String],
    result: &SendBranchResult,
) -> Result<()> {
    let mut merged = branches.iter();
    for step in result {
        match step {
            SendStep::Merge(merge) => {
                let branch = merged.next().map(String::as_str).unwrap_or_default();
                match &merge.commit {
                    Some(commit) => writeln!(
                        stdout,
                        "Merged {remote}/{branch} into {branch}: {} ({})",
                        merge.status,
                        commit.short_id()
                    )?,
                    None => writeln!(
                        stdout,
                        "Merged {remote}/{branch} into {branch}: {}",
                        merge.status
                    )?,
                }
            }
            SendStep::Push(push) => write_push_result(stdout, push)?,
        }
    }
    Ok(())
}
