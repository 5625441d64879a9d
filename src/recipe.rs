//! Tool recipe YAML: validation and the ordered steps an agent executes.
//!
//! ```yaml
//! tools:
//!   - name: terraform
//!     version: "1.7"
//!     network: true
//! requires: [AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY]
//! steps:
//!   - terraform init
//!   - run: terraform plan
//!     timeout: 300
//!     env: { TF_IN_AUTOMATION: "1" }
//! ```

use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;

use crate::error::{PlaneError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub name: String,
    pub version: String,
    pub checksum: Option<String>,
    pub env: BTreeMap<String, String>,
    pub network: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub run: String,
    pub env: BTreeMap<String, String>,
    /// Seconds
    pub timeout: Option<u64>,
    pub cwd: Option<String>,
}

impl Step {
    pub fn command(run: impl Into<String>) -> Self {
        Self {
            run: run.into(),
            env: BTreeMap::new(),
            timeout: None,
            cwd: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Recipe {
    pub tools: Vec<Tool>,
    steps: Vec<Step>,
    /// Input keys the agent must obtain before executing
    pub requires: Vec<String>,
}

impl Recipe {
    /// Steps in execution order.
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Default steps when a work item has no recipe steps, picked by title keywords.
    pub fn inferred_steps(title: &str) -> Vec<Step> {
        let t = title.to_lowercase();
        let rules: [(&[&str], &[&str]); 5] = [
            (&["build"], &["echo '[build] resolve deps'", "echo '[build] compile'"]),
            (&["test", "unit"], &["echo '[test] run unit tests'"]),
            (&["integration", "e2e"], &["echo '[integration] run end-to-end tests'"]),
            (&["plan"], &["echo '[infra] plan changes'"]),
            (&["apply", "deploy"], &["echo '[deploy] rollout changes'"]),
        ];

        let mut steps: Vec<Step> = rules
            .iter()
            .filter(|(keys, _)| keys.iter().any(|k| t.contains(k)))
            .flat_map(|(_, cmds)| cmds.iter().map(|c| Step::command(*c)))
            .collect();
        if steps.is_empty() {
            steps = vec![Step::command("echo 'start'"), Step::command("echo 'done'")];
        }
        steps
    }
}

fn invalid(msg: impl Into<String>) -> PlaneError {
    PlaneError::InvalidInput(msg.into())
}

fn get<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.get(Value::String(key.to_string()))
}

/// Render a scalar as text; `None` for null, sequences and mappings.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn env_map(value: Option<&Value>, what: &str) -> Result<BTreeMap<String, String>> {
    let Some(value) = value else {
        return Ok(BTreeMap::new());
    };
    let map = value
        .as_mapping()
        .ok_or_else(|| invalid(format!("{}.env must be a mapping", what)))?;
    map.iter()
        .map(|(k, v)| {
            let key = scalar_text(k).ok_or_else(|| invalid(format!("{}.env keys must be scalars", what)))?;
            let val = scalar_text(v).unwrap_or_default();
            Ok((key, val))
        })
        .collect()
}

fn required_text(map: &Mapping, key: &str, what: &str) -> Result<String> {
    get(map, key)
        .and_then(scalar_text)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| invalid(format!("{}.{} is required", what, key)))
}

fn parse_tool(value: &Value) -> Result<Tool> {
    let map = value
        .as_mapping()
        .ok_or_else(|| invalid("tool entries must be mappings"))?;
    let network = match get(map, "network") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid("tool.network must be boolean")),
    };
    Ok(Tool {
        name: required_text(map, "name", "tool")?,
        version: required_text(map, "version", "tool")?,
        checksum: get(map, "checksum").and_then(scalar_text),
        env: env_map(get(map, "env"), "tool")?,
        network,
    })
}

fn parse_step(value: &Value) -> Result<Step> {
    match value {
        Value::String(s) if s.trim().is_empty() => Err(invalid("step string must be non-empty")),
        Value::String(s) => Ok(Step::command(s.trim())),
        Value::Mapping(map) => {
            let run = match get(map, "run") {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                _ => return Err(invalid("step.run must be a non-empty string")),
            };
            let timeout = match get(map, "timeout") {
                None => None,
                Some(v) => match v.as_u64() {
                    Some(secs) if secs > 0 => Some(secs),
                    _ => return Err(invalid("step.timeout must be positive integer seconds")),
                },
            };
            let cwd = match get(map, "cwd") {
                None => None,
                Some(Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(invalid("step.cwd must be a string if provided")),
            };
            Ok(Step {
                run,
                env: env_map(get(map, "env"), "step")?,
                timeout,
                cwd,
            })
        }
        _ => Err(invalid("steps entries must be strings or mappings")),
    }
}

/// Parse and validate recipe YAML.
pub fn validate(yaml: &str) -> Result<Recipe> {
    let root: Value = serde_yaml::from_str(yaml)?;
    let map = root.as_mapping().ok_or_else(|| invalid("recipe must be a mapping"))?;

    let tools = match get(map, "tools") {
        Some(Value::Sequence(items)) if !items.is_empty() => {
            items.iter().map(parse_tool).collect::<Result<Vec<_>>>()?
        }
        _ => return Err(invalid("tools must be a non-empty list")),
    };

    let steps = match get(map, "steps") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) if !items.is_empty() => {
            items.iter().map(parse_step).collect::<Result<Vec<_>>>()?
        }
        Some(_) => return Err(invalid("steps must be a non-empty list")),
    };

    let requires = match get(map, "requires") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
                _ => Err(invalid("requires entries must be non-empty strings")),
            })
            .collect::<Result<Vec<_>>>()?,
        Some(_) => return Err(invalid("requires must be a list")),
    };

    Ok(Recipe { tools, steps, requires })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
tools:
  - name: terraform
    version: 1.7
    network: true
    env:
      TF_LOG: info
requires: [AWS_ACCESS_KEY_ID]
steps:
  - terraform init
  - run: terraform plan
    timeout: 300
    cwd: infra
    env: { TF_IN_AUTOMATION: 1 }
"#;

    fn err_of(yaml: &str) -> String {
        validate(yaml).unwrap_err().to_string()
    }

    #[test]
    fn test_full_recipe() {
        let recipe = validate(FULL).unwrap();
        assert_eq!(recipe.tools[0].name, "terraform");
        assert_eq!(recipe.tools[0].version, "1.7");
        assert!(recipe.tools[0].network);
        assert_eq!(recipe.requires, vec!["AWS_ACCESS_KEY_ID"]);

        let steps = recipe.steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0], Step::command("terraform init"));
        assert_eq!(steps[1].timeout, Some(300));
        assert_eq!(steps[1].cwd.as_deref(), Some("infra"));
        assert_eq!(steps[1].env.get("TF_IN_AUTOMATION").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_root_must_be_mapping() {
        assert!(err_of("- a\n- b\n").contains("recipe must be a mapping"));
    }

    #[test]
    fn test_tools_required() {
        assert!(err_of("steps: [ls]\n").contains("tools must be a non-empty list"));
        assert!(err_of("tools: []\n").contains("tools must be a non-empty list"));
    }

    #[test]
    fn test_tool_fields() {
        assert!(err_of("tools: [{version: 1}]\n").contains("tool.name is required"));
        assert!(err_of("tools: [{name: tf}]\n").contains("tool.version is required"));
        assert!(err_of("tools: [{name: tf, version: 1, network: yes-please}]\n").contains("tool.network"));
        assert!(err_of("tools: [{name: tf, version: 1, env: [a]}]\n").contains("tool.env must be a mapping"));
        assert!(err_of("tools: [tf]\n").contains("tool entries must be mappings"));
    }

    #[test]
    fn test_step_rules() {
        let base = "tools: [{name: tf, version: 1}]\n";
        assert!(err_of(&format!("{}steps: []\n", base)).contains("steps must be a non-empty list"));
        assert!(err_of(&format!("{}steps: ['  ']\n", base)).contains("step string must be non-empty"));
        assert!(err_of(&format!("{}steps: [{{run: ''}}]\n", base)).contains("step.run"));
        assert!(err_of(&format!("{}steps: [{{run: ls, timeout: 0}}]\n", base)).contains("step.timeout"));
        assert!(err_of(&format!("{}steps: [{{run: ls, cwd: 3}}]\n", base)).contains("step.cwd"));
        assert!(err_of(&format!("{}steps: [[ls]]\n", base)).contains("strings or mappings"));
    }

    #[test]
    fn test_steps_optional() {
        let recipe = validate("tools: [{name: tf, version: 1}]\n").unwrap();
        assert!(recipe.steps().is_empty());
        assert!(recipe.requires.is_empty());
    }

    #[test]
    fn test_inferred_steps_by_title() {
        let steps = Recipe::inferred_steps("Build and deploy api");
        let runs: Vec<&str> = steps.iter().map(|s| s.run.as_str()).collect();
        assert_eq!(
            runs,
            vec![
                "echo '[build] resolve deps'",
                "echo '[build] compile'",
                "echo '[deploy] rollout changes'"
            ]
        );
        assert_eq!(Recipe::inferred_steps("misc").len(), 2);
    }
}
