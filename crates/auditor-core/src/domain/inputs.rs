//! Static run inputs, fixed before execution starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Target identifiers for one audit run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInputs {
    pub run_id: Uuid,
    /// Named targets, e.g. `repo` → clone URL, `report` → document path.
    pub targets: BTreeMap<String, String>,
}

impl RunInputs {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            targets: BTreeMap::new(),
        }
    }

    /// Add a named target.
    pub fn with_target(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.targets.insert(name.into(), value.into());
        self
    }

    /// Look up a target, ignoring blank values.
    pub fn target(&self, name: &str) -> Option<&str> {
        self.targets
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

impl Default for RunInputs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_target_is_absent() {
        let inputs = RunInputs::new()
            .with_target("repo", "https://github.com/org/repo")
            .with_target("report", "  ");
        assert_eq!(inputs.target("repo"), Some("https://github.com/org/repo"));
        assert_eq!(inputs.target("report"), None);
        assert_eq!(inputs.target("missing"), None);
    }
}
