use git2::Commit;
use git2::ErrorCode;
use git2::Oid;
use git2::Repository;
use git2::Signature;
use serde::Serialize;
use serde::Serializer;

/// Length of the abbreviated commit id used in command output.
pub const SHORT_ID_LENGTH: usize = 7;

/// A read-only copy of a commit's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub author: SignatureInfo,
    pub committer: SignatureInfo,
    /// Message encoding, when the commit declares one.
    pub encoding: Option<String>,
    #[serde(serialize_with = "serialize_oid")]
    pub id: Oid,
    pub message: String,
    /// The first paragraph of the message on a single line.
    pub message_short: String,
    /// Notes attached under the default notes reference.
    pub notes: Vec<String>,
    #[serde(serialize_with = "serialize_oids")]
    pub parents: Vec<Oid>,
}

/// Who made a commit, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureInfo {
    pub name: String,
    pub email: String,
    /// Seconds since the epoch.
    pub when: i64,
    /// Timezone offset in minutes.
    pub offset_minutes: i32,
}

impl CommitInfo {
    pub fn new(repo: &Repository, commit: &Commit<'_>) -> Result<Self, git2::Error> {
        let notes = match repo.find_note(None, commit.id()) {
            Ok(note) => note.message().map(str::to_string).into_iter().collect(),
            Err(err) if err.code() == ErrorCode::NotFound => Vec::new(),
            Err(err) => return Err(err),
        };

        Ok(Self {
            author: SignatureInfo::from(&commit.author()),
            committer: SignatureInfo::from(&commit.committer()),
            encoding: commit.message_encoding().map(str::to_string),
            id: commit.id(),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
            message_short: commit.summary().unwrap_or_default().to_string(),
            notes,
            parents: commit.parent_ids().collect(),
        })
    }

    pub fn sha(&self) -> String {
        self.id.to_string()
    }

    pub fn short_id(&self) -> String {
        self.sha()[..SHORT_ID_LENGTH].to_string()
    }
}

impl From<&Signature<'_>> for SignatureInfo {
    fn from(signature: &Signature<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
            when: signature.when().seconds(),
            offset_minutes: signature.when().offset_minutes(),
        }
    }
}

fn serialize_oid<S: Serializer>(oid: &Oid, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(oid)
}

fn serialize_oids<S: Serializer>(oids: &[Oid], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(oids.iter().map(Oid::to_string))
}
