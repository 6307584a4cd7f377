use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PbirError, Result};
use crate::rules::{default_rules, RuleSpec};
use crate::sanitize::SanitizeAction;

pub const CONFIG_FILE_NAME: &str = "pbir-utils.json";

/// Contents of `pbir-utils.json`. Every field is optional.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PbirConfig {
    pub sanitize: SanitizeConfig,
    pub rules: Option<Vec<RuleSpec>>,
    pub fail_on_warning: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SanitizeConfig {
    pub actions: Option<Vec<String>>,
}

impl PbirConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let value = pbir_fs::read_json(path)?;
        serde_json::from_value(value).map_err(|err| PbirError::Config {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }

    /// Load the first config found: `explicit`, then `<report>/pbir-utils.json`, then the
    /// report folder's parent. Without any, the defaults apply.
    pub fn discover(explicit: Option<&Path>, report_root: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.is_file() {
                return Err(PbirError::Config {
                    path: path.to_path_buf(),
                    message: "file not found".to_string(),
                });
            }
            return Self::load(path);
        }

        let candidates: Vec<PathBuf> = report_root
            .into_iter()
            .flat_map(|root| [Some(root), root.parent()])
            .flatten()
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .collect();
        for candidate in candidates {
            if candidate.is_file() {
                log::debug!("using config {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }

    /// Configured sanitize actions, or every built-in action in canonical order.
    pub fn sanitize_actions(&self) -> Vec<String> {
        match &self.sanitize.actions {
            Some(actions) => actions.clone(),
            None => SanitizeAction::ALL
                .iter()
                .map(|action| action.as_str().to_string())
                .collect(),
        }
    }

    pub fn rules(&self) -> Vec<RuleSpec> {
        self.rules.clone().unwrap_or_else(default_rules)
    }
}
