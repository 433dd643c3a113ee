pub mod appspec;
pub mod artifacts;
pub mod deploy;
pub mod grant;
pub mod init;
pub mod probe;
pub mod stack;

use std::path::{Path, PathBuf};

use anyhow::Context;

use launchpad_core::LaunchpadConfig;
use launchpad_state::StateStore;

const LEDGER_FILE: &str = "ledger.redb";

/// A loaded `launchpad.toml` and the directory holding its ledger.
pub struct Workspace {
    pub config: LaunchpadConfig,
    pub state_dir: PathBuf,
}

impl Workspace {
    pub fn load(config: &Path, state_dir: &Path) -> anyhow::Result<Self> {
        let config = LaunchpadConfig::load(config)
            .with_context(|| format!("reading {}", config.display()))?;
        config.validate()?;
        Ok(Self {
            config,
            state_dir: state_dir.to_path_buf(),
        })
    }

    pub fn open_state(&self) -> anyhow::Result<StateStore> {
        std::fs::create_dir_all(&self.state_dir)
            .with_context(|| format!("creating {}", self.state_dir.display()))?;
        let path = self.state_dir.join(LEDGER_FILE);
        StateStore::open(&path).with_context(|| format!("opening ledger {}", path.display()))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use launchpad_core::Topology;

    /// A workspace in a temp dir for stack srv/staging/ap-southeast-1/123.
    pub fn workspace(dir: &Path, topology: Topology) -> Workspace {
        let mut config = LaunchpadConfig::scaffold("srv", "staging", "backend");
        config.stack.region = "ap-southeast-1".to_string();
        config.stack.account_id = "123".to_string();
        config.topology = topology;
        Workspace {
            config,
            state_dir: dir.join(".launchpad"),
        }
    }
}
