use std::path;

use crate::clients::git::GitClient;
use crate::config::Config;

pub struct App {
    pub config: Config,
    pub git: GitClient,
}

impl App {
    pub fn new(config: Config, path: path::PathBuf) -> Self {
        Self {
            config,
            git: GitClient::new(path),
        }
    }
}
