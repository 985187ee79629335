use std::collections::HashMap;

use crate::models::{value_text, Context, ContextId, TraceEvent};
use crate::store::TraceStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    /// The node's own text matches the query.
    Direct,
    /// Only a descendant matches; the node stays visible to keep the tree
    /// connected.
    Indirect,
    Hidden,
}

impl Visibility {
    pub fn is_visible(self) -> bool {
        !matches!(self, Visibility::Hidden)
    }
}

/// Per-node visibility for one query over the whole store or a subtree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchResult {
    query: String,
    visibility: HashMap<ContextId, Visibility>,
}

impl SearchResult {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_filtering(&self) -> bool {
        !self.query.is_empty()
    }

    /// Nodes outside the computed scope are reported hidden.
    pub fn visibility(&self, id: &str) -> Visibility {
        self.visibility
            .get(id)
            .copied()
            .unwrap_or(Visibility::Hidden)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.visibility(id).is_visible()
    }

    pub fn direct_matches(&self) -> usize {
        self.visibility
            .values()
            .filter(|visibility| **visibility == Visibility::Direct)
            .count()
    }
}

pub struct SearchFilter;

impl SearchFilter {
    pub fn compute(store: &TraceStore, query: &str) -> SearchResult {
        let roots: Vec<&str> = store.root_ids().iter().map(String::as_str).collect();
        Self::compute_from(store, &roots, query)
    }

    pub fn compute_subtree(store: &TraceStore, root: &str, query: &str) -> SearchResult {
        Self::compute_from(store, &[root], query)
    }

    fn compute_from(store: &TraceStore, roots: &[&str], query: &str) -> SearchResult {
        let needle = normalize_query(query);

        // pre-order walk; reversing it visits every child before its parent
        let mut preorder: Vec<&Context> = Vec::new();
        let mut stack: Vec<&str> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(ctx) = store.context(id) else {
                continue;
            };
            preorder.push(ctx);
            stack.extend(ctx.children.iter().rev().map(String::as_str));
        }

        let mut visibility: HashMap<ContextId, Visibility> =
            HashMap::with_capacity(preorder.len());
        for ctx in preorder.iter().rev() {
            let state = if needle.is_empty() || context_matches(store, ctx, &needle) {
                Visibility::Direct
            } else if ctx.children.iter().any(|child| {
                visibility
                    .get(child)
                    .map(|child| child.is_visible())
                    .unwrap_or(false)
            }) {
                Visibility::Indirect
            } else {
                Visibility::Hidden
            };
            visibility.insert(ctx.id.clone(), state);
        }

        SearchResult {
            query: needle,
            visibility,
        }
    }
}

/// Whether the subtree rooted at `id` contains a match for `query`.
pub fn visible(store: &TraceStore, id: &str, query: &str) -> bool {
    SearchFilter::compute_subtree(store, id, query).is_visible(id)
}

pub fn event_matches(event: &TraceEvent, query: &str) -> bool {
    let needle = normalize_query(query);
    needle.is_empty() || event_text_matches(event, &needle)
}

fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn context_matches(store: &TraceStore, ctx: &Context, needle: &str) -> bool {
    if contains(&ctx.label, needle) || contains(&ctx.id, needle) {
        return true;
    }
    let announced = ctx
        .tool_id
        .as_deref()
        .and_then(|tool_id| store.tools().get(tool_id))
        .map(|tool| tool.name.as_str());
    if [ctx.tool_id.as_deref(), ctx.tool_name.as_deref(), announced]
        .into_iter()
        .flatten()
        .any(|tool| contains(tool, needle))
    {
        return true;
    }
    if ctx.error.as_deref().map(|err| contains(err, needle)).unwrap_or(false) {
        return true;
    }
    if contains(&value_text(&ctx.args), needle) || contains(&value_text(&ctx.output), needle) {
        return true;
    }
    store
        .events(&ctx.id)
        .any(|event| event_text_matches(event, needle))
}

fn event_text_matches(event: &TraceEvent, needle: &str) -> bool {
    contains(event.kind.as_str(), needle) || contains(&value_text(&event.payload), needle)
}
