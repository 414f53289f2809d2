use serde::Serialize;

/// The remote's verdict on one pushed reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushUpdate {
    pub reference: String,
    /// Why the remote rejected the update, if it did.
    pub message: Option<String>,
}

impl PushUpdate {
    pub fn is_success(&self) -> bool {
        self.message.is_none()
    }
}

/// The outcome of a push to one remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushResult {
    pub remote: String,
    pub updates: Vec<PushUpdate>,
}

impl PushResult {
    pub fn new(remote: impl Into<String>, updates: Vec<PushUpdate>) -> Self {
        Self {
            remote: remote.into(),
            updates,
        }
    }

    pub fn is_success(&self) -> bool {
        self.updates.iter().all(PushUpdate::is_success)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &PushUpdate> {
        self.updates.iter().filter(|update| !update.is_success())
    }
}
