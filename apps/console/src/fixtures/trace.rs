use serde_json::{json, Value};

const BASE_MS: i64 = 1_717_000_000_000;

fn at(offset_ms: i64) -> i64 {
    BASE_MS + offset_ms
}

/// A short agent run: a ReAct agent calling web search and Wikipedia,
/// one failed fetch, and an event that arrives before its context.
pub fn sample_session() -> Vec<String> {
    sample_messages()
        .into_iter()
        .map(|message| message.to_string())
        .collect()
}

pub fn sample_messages() -> Vec<Value> {
    vec![
        json!({
            "type": "tool",
            "data": {
                "id": "websearch",
                "name": "Web Search",
                "description": "Searches the web and returns ranked results",
                "args": [
                    { "name": "query", "type": "str", "description": "Search terms", "required": true },
                    { "name": "limit", "type": "int", "description": "Maximum results", "required": false }
                ]
            }
        }),
        json!({
            "type": "tool",
            "data": {
                "id": "wikipedia",
                "name": "Wikipedia",
                "description": "Looks up a topic on Wikipedia",
                "args": [
                    { "name": "topic", "type": "str", "description": "Article title", "required": true }
                ]
            }
        }),
        json!({
            "type": "context",
            "data": {
                "id": "ctx-agent",
                "label": "ReAct agent",
                "tool_id": "react",
                "tool_name": "ReAct",
                "args": { "task": "Who designed the Rust language?" },
                "timestamp": at(0)
            }
        }),
        json!({
            "type": "event",
            "data": {
                "id": "ev-1",
                "context_id": "ctx-agent",
                "timestamp": at(5),
                "kind": "agent_prompt",
                "payload": "Thought: I should search for the history of Rust."
            }
        }),
        json!({
            "type": "context",
            "data": {
                "id": "ctx-search",
                "parent_id": "ctx-agent",
                "tool_id": "websearch",
                "args": { "query": "rust programming language history" },
                "timestamp": at(12)
            }
        }),
        json!({
            "type": "event",
            "data": {
                "id": "ev-2",
                "context_id": "ctx-search",
                "timestamp": at(12),
                "kind": "tool_called",
                "payload": { "query": "rust programming language history" }
            }
        }),
        // arrives before the context that owns it
        json!({
            "type": "event",
            "data": {
                "id": "ev-3",
                "context_id": "ctx-fetch",
                "timestamp": "1717000000140",
                "kind": "tool_exception",
                "payload": { "error": "HTTP 503 fetching https://example.org/rust" }
            }
        }),
        json!({
            "type": "context",
            "data": {
                "id": "ctx-fetch",
                "parent_id": "ctx-search",
                "label": "fetch result page",
                "timestamp": at(150)
            }
        }),
        json!({
            "type": "context_closed",
            "data": {
                "id": "ctx-fetch",
                "error": "HTTP 503",
                "timestamp": at(160)
            }
        }),
        json!({
            "type": "context_closed",
            "data": {
                "id": "ctx-search",
                "output": [{ "title": "Rust (programming language)", "url": "https://en.wikipedia.org/wiki/Rust_(programming_language)" }],
                "timestamp": at(210)
            }
        }),
        json!({
            "type": "context",
            "data": {
                "id": "ctx-wiki",
                "parent_id": "ctx-agent",
                "tool_id": "wikipedia",
                "args": { "topic": "Rust (programming language)" },
                "timestamp": at(220)
            }
        }),
        json!({
            "type": "event",
            "data": {
                "id": "ev-4",
                "context_id": "ctx-wiki",
                "timestamp": at(340),
                "kind": "tool_return",
                "payload": "Rust was started by Graydon Hoare at Mozilla Research."
            }
        }),
        json!({
            "type": "context_closed",
            "data": { "id": "ctx-wiki", "status": "completed", "timestamp": at(341) }
        }),
        json!({
            "type": "event",
            "data": {
                "id": "ev-5",
                "context_id": "ctx-agent",
                "timestamp": at(420),
                "kind": "agent_llm_response",
                "payload": "Final answer: Graydon Hoare."
            }
        }),
        json!({
            "type": "context_closed",
            "data": { "id": "ctx-agent", "output": "Graydon Hoare", "timestamp": at(430) }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContextOrigin, ContextStatus};
    use crate::services::dispatcher::EventDispatcher;
    use crate::store::TraceStore;

    #[test]
    fn sample_session_replays_cleanly() {
        let dispatcher = EventDispatcher::default();
        let mut store = TraceStore::new();
        for raw in sample_session() {
            dispatcher.dispatch(&mut store, &raw).unwrap();
        }

        let roots: Vec<&str> = store.roots().map(|ctx| ctx.id.as_str()).collect();
        assert_eq!(roots, vec!["ctx-agent"]);

        let fetch = store.context("ctx-fetch").unwrap();
        assert_eq!(fetch.origin, ContextOrigin::Declared);
        assert_eq!(fetch.parent_id.as_deref(), Some("ctx-search"));
        assert_eq!(fetch.status, ContextStatus::Errored);
        assert_eq!(fetch.events, vec!["ev-3".to_string()]);

        assert_eq!(store.event_count(), 5);
        assert_eq!(store.tools().get("websearch").unwrap().context_count, 1);
        assert_eq!(store.tools().get("react").unwrap().name, "ReAct");
        assert!(store.placeholders().next().is_none());
    }
}
