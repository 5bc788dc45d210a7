use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use llm_router::ToolSchema;
use serde_json::Value;

/// One callable tool exposed to the agent.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// Name-keyed tool collection with provider-namespace stripping.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.tools.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Schemas in the normalized (OpenAI function) representation.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Some providers return namespaced names like
    /// `default_api:get_realtime_quote`; dispatch on the bare name.
    fn strip_namespace(name: &str) -> &str {
        name.rsplit(&[':', '.'][..]).next().unwrap_or(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, String> {
        let bare = Self::strip_namespace(name);
        let tool = self
            .tools
            .get(bare)
            .ok_or_else(|| format!("unknown tool: {name}"))?;
        tool.execute(args).await
    }
}
