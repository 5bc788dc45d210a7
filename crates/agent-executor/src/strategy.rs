use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Declarative analysis strategy, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyFile {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    /// trend | pattern | reversal | framework
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub core_rules: Vec<i64>,
    #[serde(default)]
    pub required_tools: Vec<String>,
    pub instructions: String,
}

const BUILTIN_STRATEGIES: &[&str] = &[
    include_str!("strategies/trend_following.yaml"),
    include_str!("strategies/chan_theory.yaml"),
    include_str!("strategies/swing_reversal.yaml"),
];

/// Load built-in strategies, then overlay the user directory. A user
/// file with a built-in's `name` replaces it.
pub fn load_strategies(user_dir: Option<&Path>) -> Vec<StrategyFile> {
    let mut by_name: BTreeMap<String, StrategyFile> = BTreeMap::new();

    for raw in BUILTIN_STRATEGIES {
        match serde_yaml::from_str::<StrategyFile>(raw) {
            Ok(strategy) => {
                by_name.insert(strategy.name.clone(), strategy);
            }
            Err(e) => tracing::error!("built-in strategy failed to parse: {e}"),
        }
    }

    if let Some(dir) = user_dir {
        match std::fs::read_dir(dir) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let is_yaml = path
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e == "yaml" || e == "yml");
                    if !is_yaml {
                        continue;
                    }
                    match std::fs::read_to_string(&path)
                        .map_err(|e| e.to_string())
                        .and_then(|raw| {
                            serde_yaml::from_str::<StrategyFile>(&raw).map_err(|e| e.to_string())
                        }) {
                        Ok(strategy) => {
                            if by_name.contains_key(&strategy.name) {
                                tracing::info!("user strategy {} overrides built-in", strategy.name);
                            }
                            by_name.insert(strategy.name.clone(), strategy);
                        }
                        Err(e) => tracing::warn!("skipping strategy {:?}: {e}", path),
                    }
                }
            }
            Err(e) => tracing::warn!("strategy dir {:?} unreadable: {e}", dir),
        }
    }

    by_name.into_values().collect()
}

/// Select strategies by name; "all" or an empty selection keeps all.
pub fn select<'a>(strategies: &'a [StrategyFile], wanted: &[String]) -> Vec<&'a StrategyFile> {
    if wanted.is_empty() || wanted.iter().any(|w| w == "all") {
        return strategies.iter().collect();
    }
    strategies.iter().filter(|s| wanted.iter().any(|w| w == &s.name)).collect()
}

/// Concatenate selected strategies into the system-prompt section.
pub fn compose_instructions(selected: &[&StrategyFile]) -> String {
    selected
        .iter()
        .map(|s| {
            let title = if s.display_name.is_empty() { &s.name } else { &s.display_name };
            format!("### {title}\n\n{}", s.instructions.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_parse_and_have_instructions() {
        let strategies = load_strategies(None);
        assert!(strategies.len() >= 3);
        for s in &strategies {
            assert!(!s.instructions.trim().is_empty(), "{} has no instructions", s.name);
            assert!(!s.category.is_empty());
        }
    }

    #[test]
    fn user_dir_overrides_builtin_by_name() {
        let dir = std::env::temp_dir().join(format!("strategies-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("trend_following.yaml"),
            "name: trend_following\ndisplay_name: Custom Trend\ncategory: trend\ninstructions: my rules\n",
        )
        .unwrap();

        let strategies = load_strategies(Some(&dir));
        let trend = strategies.iter().find(|s| s.name == "trend_following").unwrap();
        assert_eq!(trend.display_name, "Custom Trend");
        assert_eq!(trend.instructions, "my rules");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn selection_by_name() {
        let strategies = load_strategies(None);
        let picked = select(&strategies, &["chan_theory".to_string()]);
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].name, "chan_theory");

        let all = select(&strategies, &["all".to_string()]);
        assert_eq!(all.len(), strategies.len());
    }

    #[test]
    fn composed_instructions_concatenate_in_order() {
        let strategies = load_strategies(None);
        let picked = select(&strategies, &[]);
        let composed = compose_instructions(&picked);
        for s in &strategies {
            assert!(composed.contains(s.instructions.trim()));
        }
    }
}
