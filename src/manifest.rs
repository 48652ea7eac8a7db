use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Declarative pipeline manifest: one YAML document describing a full
/// provision/install/test/report/deploy run.
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub runtime: Option<RuntimeSpec>,
    #[serde(default)]
    pub packages: Vec<String>,
    /// Installer template for system packages, e.g. `apt-get install -y`.
    #[serde(default)]
    pub package_command: Option<String>,
    /// Global environment pairs applied to every command in the run.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub install: Vec<InstallSpec>,
    pub stages: Vec<StageSpec>,
    #[serde(default)]
    pub after_success: Vec<String>,
    #[serde(default)]
    pub deploy: Option<DeploySpec>,
    #[serde(default)]
    pub branches: Option<BranchFilter>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest file: {}", path.display()))?;
        let manifest: Manifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest YAML: {}", path.display()))?;
        Ok(manifest)
    }

    pub fn global_env(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSpec {
    pub language: String,
    #[serde(default)]
    pub version: Option<String>,
    /// Override for the readiness probe; defaults to `<language> --version`.
    #[serde(default)]
    pub probe: Option<String>,
}

impl RuntimeSpec {
    pub fn probe_command(&self) -> String {
        self.probe
            .clone()
            .unwrap_or_else(|| format!("{} --version", self.language))
    }
}

/// Whether a failing step fails the run or is merely logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    Required,
    BestEffort,
}

/// Install entry: either a bare command string or a command with an
/// explicit failure policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InstallSpec {
    Command(String),
    Detailed {
        run: String,
        #[serde(default)]
        policy: FailurePolicy,
    },
}

impl InstallSpec {
    pub fn command(&self) -> &str {
        match self {
            InstallSpec::Command(run) => run,
            InstallSpec::Detailed { run, .. } => run,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        match self {
            InstallSpec::Command(_) => FailurePolicy::Required,
            InstallSpec::Detailed { policy, .. } => *policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageSpec {
    pub name: String,
    #[serde(default)]
    pub policy: FailurePolicy,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeploySpec {
    pub provider: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Name of the environment variable carrying the registry credential.
    /// The value is resolved only at deploy time and never logged.
    pub password_env: String,
    #[serde(default)]
    pub build: Vec<String>,
    /// Glob patterns selecting the built artifact files.
    #[serde(default)]
    pub artifacts: Vec<String>,
    /// Upload command template; `{artifact}` and `{username}` are expanded
    /// per artifact file.
    pub upload: String,
    #[serde(default)]
    pub on: TriggerSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriggerSpec {
    #[serde(default = "default_tags_trigger")]
    pub tags: bool,
}

impl Default for TriggerSpec {
    fn default() -> Self {
        Self { tags: true }
    }
}

fn default_tags_trigger() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchFilter {
    #[serde(default)]
    pub only: Vec<String>,
}

impl BranchFilter {
    /// An empty filter allows every branch. An unknown branch (detached
    /// context) is not allowed through a non-empty filter.
    pub fn allows(&self, branch: Option<&str>) -> bool {
        if self.only.is_empty() {
            return true;
        }
        branch.is_some_and(|b| self.only.iter().any(|only| only == b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let yaml = r#"
version: 1
runtime:
  language: python
  version: "3.8"
packages: [libgl1]
env:
  CI: "true"
install:
  - pip install -r requirements.txt
  - run: pip install extras
    policy: best-effort
stages:
  - name: lint
    policy: best-effort
    commands: ["flake8 ."]
  - name: test
    commands: ["pytest"]
after_success:
  - codecov
deploy:
  provider: registry
  username: builder
  password_env: REGISTRY_TOKEN
  build: ["make dist"]
  artifacts: ["dist/*"]
  upload: "registry-upload --user {username} {artifact}"
branches:
  only: [master]
"#;
        let manifest: Manifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.stages.len(), 2);
        assert_eq!(manifest.stages[0].policy, FailurePolicy::BestEffort);
        assert_eq!(manifest.stages[1].policy, FailurePolicy::Required);
        assert_eq!(manifest.install[0].policy(), FailurePolicy::Required);
        assert_eq!(manifest.install[1].policy(), FailurePolicy::BestEffort);
        let deploy = manifest.deploy.unwrap();
        assert!(deploy.on.tags);
        assert_eq!(deploy.password_env, "REGISTRY_TOKEN");
    }

    #[test]
    fn runtime_probe_defaults_to_version_flag() {
        let runtime = RuntimeSpec {
            language: "python".into(),
            version: Some("3.8".into()),
            probe: None,
        };
        assert_eq!(runtime.probe_command(), "python --version");
    }

    #[test]
    fn branch_filter_semantics() {
        let filter = BranchFilter {
            only: vec!["master".into()],
        };
        assert!(filter.allows(Some("master")));
        assert!(!filter.allows(Some("feature/x")));
        assert!(!filter.allows(None));
        assert!(BranchFilter::default().allows(None));
    }
}
