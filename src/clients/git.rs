use std::path;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use git2::ConfigLevel;
use git2::ErrorCode;
use git2::FetchOptions;
use git2::PushOptions;
use git2::RemoteCallbacks;
use git2::Repository;
use git2::build::CheckoutBuilder;
use log::debug;
use log::info;
use serde::Serialize;

use crate::commit::CommitInfo;
use crate::config::ConfigExt;
use crate::merge::MergeResult;
use crate::merge::MergeStatus;
use crate::push::PushResult;
use crate::push::PushUpdate;

// -----------------------------------------------------------------------------
// Types

/// Git client.
///
/// Every operation opens the repository on tokio's blocking pool, since
/// libgit2 (and the ssh transport underneath it) blocks.
pub struct GitClient {
    path: path::PathBuf,
}

/// Transfer counters reported after a fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    pub received_objects: usize,
    pub indexed_objects: usize,
    pub local_objects: usize,
    pub received_bytes: usize,
}

// -----------------------------------------------------------------------------
// GitClient impl

impl GitClient {
    pub fn new(path: path::PathBuf) -> Self {
        Self { path }
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::discover(&path)
                .with_context(|| format!("Failed to open repository at {}", path.display()))?;
            f(&repo)
        })
        .await
        .context("Git task failed")?
    }

    /// Fetch the configured refspecs of `remote`.
    pub async fn fetch(&self, remote: &str) -> Result<FetchStats> {
        let name = remote.to_string();
        self.with_repo(move |repo| {
            let mut remote = repo
                .find_remote(&name)
                .with_context(|| format!("Remote not found: {name}"))?;

            let mut callbacks = RemoteCallbacks::new();
            callbacks.sideband_progress(log_remote_progress);
            let mut options = FetchOptions::new();
            options.remote_callbacks(callbacks);

            remote
                .fetch::<&str>(&[], Some(&mut options), None)
                .with_context(|| format!("Failed to fetch from {name}"))?;

            let stats = remote.stats();
            Ok(FetchStats {
                received_objects: stats.received_objects(),
                indexed_objects: stats.indexed_objects(),
                local_objects: stats.local_objects(),
                received_bytes: stats.received_bytes(),
            })
        })
        .await
    }

    /// Push a local branch to the branch of the same name on `remote`.
    pub async fn push(&self, remote: &str, branch: &str) -> Result<PushResult> {
        let name = remote.to_string();
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        self.with_repo(move |repo| {
            let mut remote = repo
                .find_remote(&name)
                .with_context(|| format!("Remote not found: {name}"))?;

            let mut updates = Vec::new();
            {
                let mut callbacks = RemoteCallbacks::new();
                callbacks.sideband_progress(log_remote_progress);
                callbacks.push_update_reference(|reference, status| {
                    updates.push(PushUpdate {
                        reference: reference.to_string(),
                        message: status.map(str::to_string),
                    });
                    Ok(())
                });
                let mut options = PushOptions::new();
                options.remote_callbacks(callbacks);

                remote
                    .push(&[refspec.as_str()], Some(&mut options))
                    .with_context(|| format!("Failed to push {refspec} to {name}"))?;
            }

            Ok(PushResult::new(name, updates))
        })
        .await
    }

    /// Merge `<remote>/<branch>` into the local `branch`.
    ///
    /// Fast-forwards when possible, otherwise writes a merge commit. Conflicts
    /// leave the branch untouched.
    pub async fn merge_upstream(&self, remote: &str, branch: &str) -> Result<MergeResult> {
        let branch = branch.to_string();
        let upstream = format!("refs/remotes/{remote}/{branch}");
        self.with_repo(move |repo| merge_into_branch(repo, &branch, &upstream))
            .await
    }

    pub async fn commit_info(&self, revision: &str) -> Result<CommitInfo> {
        let revision = revision.to_string();
        self.with_repo(move |repo| {
            let commit = repo
                .revparse_single(&revision)
                .and_then(|object| object.peel_to_commit())
                .with_context(|| format!("No commit found for revision: {revision}"))?;
            Ok(CommitInfo::new(repo, &commit)?)
        })
        .await
    }

    pub async fn config_string(
        &self,
        key: &str,
        level: Option<ConfigLevel>,
    ) -> Result<Option<String>> {
        let key = key.to_string();
        self.with_repo(move |repo| {
            let config = repo.config().context("Failed to read git configuration")?;
            let value = match level {
                Some(level) => config.get_string_at(&key, level)?,
                None => config.get_string_opt(&key)?,
            };
            Ok(value)
        })
        .await
    }
}

fn log_remote_progress(data: &[u8]) -> bool {
    for line in String::from_utf8_lossy(data)
        .split(['\r', '\n'])
        .filter(|line| !line.is_empty())
    {
        info!(target: "remote", "{line}");
    }
    true
}

fn merge_into_branch(repo: &Repository, branch: &str, upstream: &str) -> Result<MergeResult> {
    let upstream_commit = match repo.revparse_single(upstream) {
        Ok(object) => Some(object.peel_to_commit()?),
        Err(err) if err.code() == ErrorCode::NotFound => None,
        Err(err) => return Err(err).with_context(|| format!("Invalid upstream: {upstream}")),
    };

    let local_name = format!("refs/heads/{branch}");
    let local_ref = match repo.find_reference(&local_name) {
        Ok(reference) => Some(reference),
        Err(err) if err.code() == ErrorCode::NotFound => None,
        Err(err) => return Err(err.into()),
    };

    let (mut local_ref, upstream_commit) = match (local_ref, upstream_commit) {
        (Some(local_ref), Some(upstream_commit)) => (local_ref, upstream_commit),
        // Nothing on the remote yet
        (Some(_), None) => return Ok(MergeResult::new(MergeStatus::UpToDate, None)),
        (None, Some(upstream_commit)) => {
            debug!("creating {branch} at {upstream}");
            repo.branch(branch, &upstream_commit, false)?;
            let info = CommitInfo::new(repo, &upstream_commit)?;
            return Ok(MergeResult::new(MergeStatus::FastForward, Some(info)));
        }
        (None, None) => bail!("Branch not found: {branch}"),
    };
    let local_commit = local_ref.peel_to_commit()?;
    let is_head = repo
        .head()
        .ok()
        .and_then(|head| head.name().map(|name| name == local_name))
        .unwrap_or(false);

    let annotated = repo.find_annotated_commit(upstream_commit.id())?;
    let (analysis, _) = repo.merge_analysis_for_ref(&local_ref, &[&annotated])?;

    if analysis.is_up_to_date() {
        return Ok(MergeResult::new(MergeStatus::UpToDate, None));
    }

    if analysis.is_fast_forward() {
        if is_head {
            checkout_safe(repo, &upstream_commit)?;
        }
        local_ref.set_target(
            upstream_commit.id(),
            &format!("merge {upstream}: Fast-forward"),
        )?;
        let info = CommitInfo::new(repo, &upstream_commit)?;
        return Ok(MergeResult::new(MergeStatus::FastForward, Some(info)));
    }

    let mut index = repo.merge_commits(&local_commit, &upstream_commit, None)?;
    if index.has_conflicts() {
        return Ok(MergeResult::new(MergeStatus::Conflicts, None));
    }

    let tree = repo.find_tree(index.write_tree_to(repo)?)?;
    let signature = repo.signature().context("No git identity configured")?;
    let message = format!("Merge {upstream} into {branch}");
    let merge_id = repo.commit(
        None,
        &signature,
        &signature,
        &message,
        &tree,
        &[&local_commit, &upstream_commit],
    )?;
    let merge_commit = repo.find_commit(merge_id)?;
    if is_head {
        checkout_safe(repo, &merge_commit)?;
    }
    local_ref.set_target(merge_id, &message)?;

    let info = CommitInfo::new(repo, &merge_commit)?;
    Ok(MergeResult::new(MergeStatus::NonFastForward, Some(info)))
}

/// Bring the working tree to `commit` before the checked-out branch moves
/// there, refusing to overwrite local modifications.
fn checkout_safe(repo: &Repository, commit: &git2::Commit<'_>) -> Result<()> {
    repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
        .context("Local changes would be overwritten by the merge")
}

#[cfg(test)]
mod tests {
    use git2::Oid;
    use git2::Signature;

    use super::*;

    /// A bare "origin" and a clone of it with one commit on main.
    struct Fixture {
        _dir: tempfile::TempDir,
        origin: Repository,
        local: Repository,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let origin = Repository::init_bare(dir.path().join("origin.git")).unwrap();
            let local = Repository::init(dir.path().join("local")).unwrap();
            {
                let mut config = local.config().unwrap();
                config.set_str("user.name", "Test User").unwrap();
                config.set_str("user.email", "test@example.com").unwrap();
            }
            let origin_url = dir.path().join("origin.git");
            local
                .remote("origin", origin_url.to_str().unwrap())
                .unwrap();
            local.set_head("refs/heads/main").unwrap();
            commit(&local, "refs/heads/main", "base", "base\n", &[]);
            local
                .checkout_head(Some(CheckoutBuilder::new().force()))
                .unwrap();
            Self {
                _dir: dir,
                origin,
                local,
            }
        }

        fn client(&self) -> GitClient {
            GitClient::new(self.local.workdir().unwrap().to_path_buf())
        }

        fn tip(&self, reference: &str) -> Oid {
            self.local.refname_to_id(reference).unwrap()
        }
    }

    /// Commit `contents` as file `name` on top of `parents`, updating `reference`.
    fn commit(
        repo: &Repository,
        reference: &str,
        name: &str,
        contents: &str,
        parents: &[Oid],
    ) -> Oid {
        let signature = Signature::now("Test User", "test@example.com").unwrap();
        let blob = repo.blob(contents.as_bytes()).unwrap();
        let mut builder = repo.treebuilder(None).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let parents: Vec<_> = parents.iter().map(|id| repo.find_commit(*id).unwrap()).collect();
        let parents: Vec<_> = parents.iter().collect();
        repo.commit(Some(reference), &signature, &signature, name, &tree, &parents)
            .unwrap()
    }

    fn set_remote_tracking(repo: &Repository, branch: &str, id: Oid) {
        repo.reference(&format!("refs/remotes/origin/{branch}"), id, true, "test")
            .unwrap();
    }

    #[tokio::test]
    async fn test_push_then_fetch() {
        let fixture = Fixture::new();
        let client = fixture.client();

        let result = client.push("origin", "main").await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.remote, "origin");
        assert_eq!(
            result.updates,
            vec![PushUpdate {
                reference: "refs/heads/main".to_string(),
                message: None,
            }]
        );
        assert_eq!(
            fixture.origin.refname_to_id("refs/heads/main").unwrap(),
            fixture.tip("refs/heads/main")
        );

        client.fetch("origin").await.unwrap();
        assert_eq!(
            fixture.tip("refs/remotes/origin/main"),
            fixture.tip("refs/heads/main")
        );
    }

    #[tokio::test]
    async fn test_unknown_remote() {
        let fixture = Fixture::new();
        let err = fixture.client().fetch("nowhere").await.unwrap_err();
        assert_eq!(err.to_string(), "Remote not found: nowhere");
    }

    #[tokio::test]
    async fn test_merge_up_to_date() {
        let fixture = Fixture::new();
        set_remote_tracking(&fixture.local, "main", fixture.tip("refs/heads/main"));

        let result = fixture.client().merge_upstream("origin", "main").await.unwrap();
        assert_eq!(result, MergeResult::new(MergeStatus::UpToDate, None));
    }

    #[tokio::test]
    async fn test_merge_fast_forward() {
        let fixture = Fixture::new();
        let base = fixture.tip("refs/heads/main");
        let ahead = commit(&fixture.local, "refs/remotes/origin/main", "ahead", "1\n", &[base]);

        let result = fixture.client().merge_upstream("origin", "main").await.unwrap();
        assert_eq!(result.status, MergeStatus::FastForward);
        assert_eq!(result.commit.map(|c| c.id), Some(ahead));
        assert_eq!(fixture.tip("refs/heads/main"), ahead);
    }

    #[tokio::test]
    async fn test_merge_creates_missing_branch() {
        let fixture = Fixture::new();
        let base = fixture.tip("refs/heads/main");
        set_remote_tracking(&fixture.local, "topic", base);

        let result = fixture.client().merge_upstream("origin", "topic").await.unwrap();
        assert_eq!(result.status, MergeStatus::FastForward);
        assert_eq!(fixture.tip("refs/heads/topic"), base);
    }

    #[tokio::test]
    async fn test_merge_without_upstream() {
        let fixture = Fixture::new();
        let client = fixture.client();

        let result = client.merge_upstream("origin", "main").await.unwrap();
        assert_eq!(result.status, MergeStatus::UpToDate);

        let err = client.merge_upstream("origin", "nowhere").await.unwrap_err();
        assert_eq!(err.to_string(), "Branch not found: nowhere");
    }

    #[tokio::test]
    async fn test_merge_commit() {
        let fixture = Fixture::new();
        let base = fixture.tip("refs/heads/main");
        let theirs = commit(&fixture.local, "refs/remotes/origin/side", "theirs", "t\n", &[base]);
        let ours = commit(&fixture.local, "refs/heads/side", "ours", "o\n", &[base]);

        let result = fixture.client().merge_upstream("origin", "side").await.unwrap();
        assert_eq!(result.status, MergeStatus::NonFastForward);
        let merged = result.commit.unwrap();
        assert_eq!(merged.parents, vec![ours, theirs]);
        assert_eq!(merged.message, "Merge refs/remotes/origin/side into side");
        assert_eq!(fixture.tip("refs/heads/side"), merged.id);
    }

    #[tokio::test]
    async fn test_merge_conflicts_leave_branch() {
        let fixture = Fixture::new();
        let base = fixture.tip("refs/heads/main");
        commit(&fixture.local, "refs/remotes/origin/side", "base", "theirs\n", &[base]);
        let ours = commit(&fixture.local, "refs/heads/side", "base", "ours\n", &[base]);

        let result = fixture.client().merge_upstream("origin", "side").await.unwrap();
        assert!(result.has_conflicts());
        assert_eq!(fixture.tip("refs/heads/side"), ours);
    }

    #[tokio::test]
    async fn test_commit_info_and_config() {
        let fixture = Fixture::new();
        let client = fixture.client();

        let info = client.commit_info("main").await.unwrap();
        assert_eq!(info.id, fixture.tip("refs/heads/main"));
        assert_eq!(info.message_short, "base");

        assert_eq!(
            client.config_string("user.name", None).await.unwrap(),
            Some("Test User".to_string())
        );
        assert_eq!(
            client
                .config_string("user.name", Some(ConfigLevel::Local))
                .await
                .unwrap(),
            Some("Test User".to_string())
        );
        assert_eq!(client.config_string("sshexe.nothing", None).await.unwrap(), None);
        assert!(client.commit_info("no-such-rev").await.is_err());
    }
}
