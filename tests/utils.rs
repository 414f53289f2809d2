#![allow(dead_code)]

use std::path::Path;
use std::path::PathBuf;
use std::sync::OnceLock;

use git2::Oid;
use git2::Repository;
use git2::Signature;
use git2::build::CheckoutBuilder;
use git_automation::transport;
use git_automation::transport::SshExeOptions;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer as _;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Stand-in for `ssh`: ignores the connection arguments and runs the remote
/// command locally, from the filesystem root so that the relative repository
/// path taken from the URL resolves.
const FAKE_SSH: &str = r#"#!/bin/sh
for last; do :; done
cd / && exec sh -c "$last"
"#;

/// Writes the fake ssh script once and routes `ssh://` through it.
pub fn register_fake_ssh() -> anyhow::Result<()> {
    static PROGRAM: OnceLock<Result<PathBuf, String>> = OnceLock::new();
    let program = PROGRAM
        .get_or_init(|| write_fake_ssh().map_err(|err| err.to_string()))
        .clone()
        .map_err(anyhow::Error::msg)?;

    transport::register(
        "ssh",
        SshExeOptions {
            program,
            upload_pack: "git upload-pack".to_string(),
            receive_pack: "git receive-pack".to_string(),
            ..SshExeOptions::default()
        },
    )?;
    Ok(())
}

fn write_fake_ssh() -> anyhow::Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt as _;

    let path = Path::new(env!("CARGO_TARGET_TMPDIR"))
        .join(format!("fake-ssh-{}", std::process::id()));
    std::fs::write(&path, FAKE_SSH)?;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    Ok(path)
}

/// The `ssh://` URL the transport maps to `path` on this machine.
pub fn ssh_url(path: &Path) -> String {
    format!("ssh://git@localhost{}", path.display())
}

/// Creates an empty bare repository to act as the remote.
pub fn create_origin(dir: &Path) -> anyhow::Result<Repository> {
    Ok(Repository::init_bare(dir)?)
}

/// Creates a working repository with an identity, `main` checked out holding
/// one commit, and `origin` pointing at `origin_url`.
pub fn create_local(dir: &Path, origin_url: &str) -> anyhow::Result<Repository> {
    let repo = create_empty(dir, origin_url)?;
    commit(&repo, "refs/heads/main", "base", "base\n", &[])?;
    checkout(&repo, "main")?;
    Ok(repo)
}

/// Creates a working repository with an identity and `origin` pointing at
/// `origin_url`, but no commits.
pub fn create_empty(dir: &Path, origin_url: &str) -> anyhow::Result<Repository> {
    let repo = Repository::init(dir)?;
    {
        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;
    }
    repo.remote("origin", origin_url)?;
    Ok(repo)
}

/// Points HEAD at `branch` and makes the working tree match it.
pub fn checkout(repo: &Repository, branch: &str) -> anyhow::Result<()> {
    repo.set_head(&format!("refs/heads/{branch}"))?;
    repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
    Ok(())
}

/// Commits `contents` as file `name` on top of `parents`, updating `reference`.
pub fn commit(
    repo: &Repository,
    reference: &str,
    name: &str,
    contents: &str,
    parents: &[Oid],
) -> anyhow::Result<Oid> {
    let signature = Signature::now("Test User", "test@example.com")?;
    let blob = repo.blob(contents.as_bytes())?;
    let mut builder = repo.treebuilder(None)?;
    builder.insert(name, blob, 0o100644)?;
    let tree = repo.find_tree(builder.write()?)?;
    let parents = parents
        .iter()
        .map(|id| repo.find_commit(*id))
        .collect::<Result<Vec<_>, _>>()?;
    let parents: Vec<_> = parents.iter().collect();
    Ok(repo.commit(Some(reference), &signature, &signature, name, &tree, &parents)?)
}

pub fn setup_logging() -> anyhow::Result<()> {
    let timer = tracing_subscriber::fmt::time::ChronoLocal::new("%H:%M:%S%.3f".into());
    let format = tracing_subscriber::fmt::format().with_timer(timer);
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()?;
    let subscriber = tracing_subscriber::fmt::layer()
        .event_format(format)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_test_writer()
        .with_filter(filter);
    tracing_subscriber::registry().with(subscriber).init();
    Ok(())
}

pub enum TestDir {
    Temp(tempfile::TempDir),
    Kept(PathBuf),
}

impl TestDir {
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;

        if std::env::var("DEBUG_TESTS").is_ok() {
            let path = temp_dir.keep();
            eprintln!("Test directory kept at: {}", path.display());
            Ok(TestDir::Kept(path))
        } else {
            Ok(TestDir::Temp(temp_dir))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            TestDir::Temp(t) => t.path(),
            TestDir::Kept(p) => p.as_path(),
        }
    }
}
