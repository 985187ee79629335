use std::collections::HashMap;

use crate::models::{Tool, ToolArgument, ToolId};

/// Metadata a producer publishes about a tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolAnnouncement {
    pub id: ToolId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub args: Vec<ToolArgument>,
}

/// Index of the distinct tools seen in the trace, kept in first-seen order.
///
/// Entries are only ever touched by [`crate::store::TraceStore`] while it
/// applies a mutation, so the index can never disagree with the contexts
/// that reference it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolRegistry {
    order: Vec<ToolId>,
    tools: HashMap<ToolId, Tool>,
}

impl ToolRegistry {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, tool_id: &str) -> Option<&Tool> {
        self.tools.get(tool_id)
    }

    pub fn contains(&self, tool_id: &str) -> bool {
        self.tools.contains_key(tool_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tool> + '_ {
        self.order.iter().filter_map(|id| self.tools.get(id))
    }

    pub fn sorted_by_name(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.iter().collect();
        tools.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.id.cmp(&b.id))
        });
        tools
    }

    pub(crate) fn observe_context(&mut self, tool_id: &str, tool_name: Option<&str>) {
        self.entry(tool_id).context_count += 1;
        self.observe_name(tool_id, tool_name);
    }

    /// Takes a context-supplied display name unless the tool was announced.
    pub(crate) fn observe_name(&mut self, tool_id: &str, tool_name: Option<&str>) {
        let Some(tool) = self.tools.get_mut(tool_id) else {
            return;
        };
        if tool.announced {
            return;
        }
        if let Some(name) = tool_name.map(str::trim).filter(|name| !name.is_empty()) {
            tool.name = name.to_string();
        }
    }

    pub(crate) fn release_context(&mut self, tool_id: &str) {
        if let Some(tool) = self.tools.get_mut(tool_id) {
            tool.context_count = tool.context_count.saturating_sub(1);
        }
    }

    pub(crate) fn announce(&mut self, announcement: ToolAnnouncement) {
        let ToolAnnouncement {
            id,
            name,
            description,
            args,
        } = announcement;

        let tool = self.entry(&id);
        tool.announced = true;
        if let Some(name) = name.filter(|name| !name.trim().is_empty()) {
            tool.name = name;
        }
        if description.is_some() {
            tool.description = description;
        }
        if !args.is_empty() {
            tool.args = args;
        }
    }

    pub(crate) fn clear(&mut self) {
        self.order.clear();
        self.tools.clear();
    }

    fn entry(&mut self, tool_id: &str) -> &mut Tool {
        if !self.tools.contains_key(tool_id) {
            self.order.push(tool_id.to_string());
        }
        self.tools.entry(tool_id.to_string()).or_insert_with(|| Tool {
            id: tool_id.to_string(),
            name: tool_id.to_string(),
            description: None,
            args: Vec::new(),
            context_count: 0,
            announced: false,
        })
    }
}
