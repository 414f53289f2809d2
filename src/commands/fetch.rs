use anyhow::Result;
use tracing::instrument;

use crate::App;
use crate::clients::git::FetchStats;

impl App {
    /// Fetch the configured refspecs of `remote`.
    #[instrument(skip(self, stdout))]
    pub async fn cmd_fetch(
        &self,
        remote: &str,
        stdout: &mut impl std::io::Write,
    ) -> Result<FetchStats> {
        let stats = self.git.fetch(remote).await?;
        writeln!(
            stdout,
            "Fetched {remote}: {} objects received ({} bytes), {} indexed",
            stats.received_objects, stats.received_bytes, stats.indexed_objects
        )?;
        Ok(stats)
    }
}
