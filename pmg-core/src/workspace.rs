//! Working-tree root and the locations of the state files kept beside it.

use crate::config::{ClientConfig, Identity};
use crate::error::{PmgError, Result};
use crate::prompt::Prompt;
use crate::store::MetadataStore;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the internal state directory at the working-tree root.
pub const STATE_DIR: &str = ".pmg";

/// Name of the ignore-rule file at the working-tree root.
pub const IGNORE_FILE: &str = ".pmgignore";

const DEFAULT_IGNORE: &str = "# One path, directory or name per line\n.git\ntarget\nnode_modules\n";

/// A working tree and its state directory.
///
/// Every engine operation receives one of these explicitly; nothing reads
/// the process working directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    state_dir: PathBuf,
}

impl Workspace {
    /// Describe a working tree rooted at `root`. Does not touch the disk.
    pub fn new(root: &Path) -> Self {
        let root = root.to_path_buf();
        let state_dir = root.join(STATE_DIR);
        Self { root, state_dir }
    }

    /// Open an initialized working tree, failing if the state directory is absent.
    pub fn open(root: &Path) -> Result<Self> {
        let ws = Self::new(root);
        if !ws.is_initialized() {
            return Err(PmgError::NotInitialized(STATE_DIR.to_string()));
        }
        Ok(ws)
    }

    /// Walk up from `start` to the nearest directory containing a state directory.
    pub fn discover(start: &Path) -> Result<Self> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(STATE_DIR).is_dir() {
                return Ok(Self::new(dir));
            }
            current = dir.parent();
        }
        Err(PmgError::NotInitialized(STATE_DIR.to_string()))
    }

    /// Create the state directory, metadata store, identity and default config.
    ///
    /// Asks for the author, API token and project name through `prompt`.
    pub fn init(root: &Path, prompt: &mut dyn Prompt) -> Result<Self> {
        let ws = Self::new(root);
        if ws.is_initialized() {
            return Err(PmgError::AlreadyInitialized(ws.state_dir.display().to_string()));
        }

        let author = prompt.ask("Username as used on the website:")?;
        if author.is_empty() {
            return Err(PmgError::ConfigurationMissing("author is required".to_string()));
        }
        let token = prompt.ask("API key from the website:")?;
        let project_name = prompt.ask("Project name (visible on the website):")?;
        if project_name.is_empty() {
            return Err(PmgError::ConfigurationMissing("project name is required".to_string()));
        }

        fs::create_dir_all(&ws.state_dir)?;
        MetadataStore::open(&ws.db_path())?;
        Identity { author, token, project_name }.save(&ws.state_dir)?;
        ClientConfig::default().save(&ws.state_dir)?;
        if !ws.ignore_path().exists() {
            fs::write(ws.ignore_path(), DEFAULT_IGNORE)?;
        }
        tracing::info!("Initialized PMG working tree at {:?}", ws.root);
        Ok(ws)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn is_initialized(&self) -> bool {
        self.state_dir.is_dir()
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("vcs.db")
    }

    pub fn staging_path(&self) -> PathBuf {
        self.state_dir.join("staged")
    }

    pub fn ignore_path(&self) -> PathBuf {
        self.root.join(IGNORE_FILE)
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.state_dir.join("pull-scratch")
    }

    /// Absolute location of a working-tree-relative path.
    pub fn resolve(&self, rel_path: &str) -> PathBuf {
        rel_path
            .split('/')
            .filter(|c| !c.is_empty())
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ScriptedPrompt;
    use tempfile::TempDir;

    #[test]
    fn test_open_requires_state_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Workspace::open(tmp.path()),
            Err(PmgError::NotInitialized(_))
        ));
        std::fs::create_dir(tmp.path().join(STATE_DIR)).unwrap();
        assert!(Workspace::open(tmp.path()).is_ok());
    }

    #[test]
    fn test_init_creates_state() {
        let tmp = TempDir::new().unwrap();
        let mut prompt = ScriptedPrompt::new(["alice", "secret", "demo"]);
        let ws = Workspace::init(tmp.path(), &mut prompt).unwrap();

        assert!(ws.db_path().exists());
        assert!(ws.ignore_path().exists());
        let identity = Identity::require(ws.state_dir()).unwrap();
        assert_eq!(identity.author, "alice");
        assert_eq!(identity.project_name, "demo");

        let mut again = ScriptedPrompt::new(["bob", "x", "y"]);
        assert!(matches!(
            Workspace::init(tmp.path(), &mut again),
            Err(PmgError::AlreadyInitialized(_))
        ));
    }

    #[test]
    fn test_init_requires_author() {
        let tmp = TempDir::new().unwrap();
        let mut prompt = ScriptedPrompt::new([""]);
        assert!(matches!(
            Workspace::init(tmp.path(), &mut prompt),
            Err(PmgError::ConfigurationMissing(_))
        ));
        assert!(!tmp.path().join(STATE_DIR).exists());
    }

    #[test]
    fn test_discover_from_subdirectory() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join(STATE_DIR)).unwrap();
        let nested = tmp.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let ws = Workspace::discover(&nested).unwrap();
        assert_eq!(ws.root(), tmp.path());
    }

    #[test]
    fn test_resolve_relative_path() {
        let ws = Workspace::new(Path::new("/work"));
        assert_eq!(ws.resolve("src/main.rs"), Path::new("/work/src/main.rs"));
    }
}
