use std::path::{Path, PathBuf};

/// Immutable per-run context handed to every component.
///
/// The hosted-CI equivalent of this data lives in ambient environment
/// variables; here it is explicit so components never reach into the
/// process environment themselves.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub workdir: PathBuf,
    pub branch: Option<String>,
    pub tag: Option<String>,
    /// Global environment pairs applied to every spawned command.
    pub env: Vec<(String, String)>,
}

impl RunContext {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            branch: None,
            tag: None,
            env: Vec::new(),
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch.filter(|b| !b.is_empty());
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag.filter(|t| !t.is_empty());
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn tag_present(&self) -> bool {
        self.tag.is_some()
    }
}
