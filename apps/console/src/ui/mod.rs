pub mod connection_bar;
pub mod timeline;
pub mod tools;
pub mod trace_tree;

use serde_json::Value;
use time::OffsetDateTime;

use crate::models::{value_text, ContextStatus, EventKind};
use crate::services::connection::ConnectionState;

pub(crate) const TH_CLASS: &str = "px-3 py-2 text-left text-[11px] font-semibold uppercase tracking-wide";
pub(crate) const TD_CLASS: &str = "px-3 py-2 align-top";
pub(crate) const PANEL_CLASS: &str =
    "rounded-lg border border-slate-200 bg-white p-4 shadow-sm dark:border-slate-700 dark:bg-slate-800";
pub(crate) const EMPTY_CLASS: &str = "text-xs text-slate-500 italic";

const PREVIEW_CHARS: usize = 240;

/// Wall-clock milliseconds since the epoch.
pub fn now_ms() -> i64 {
    #[cfg(target_arch = "wasm32")]
    {
        js_sys::Date::now() as i64
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
    }
}

/// `HH:MM:SS.mmm` in UTC; the raw number when out of range.
pub fn format_timestamp(ms: i64) -> String {
    match OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000) {
        Ok(at) => format!(
            "{:02}:{:02}:{:02}.{:03}",
            at.hour(),
            at.minute(),
            at.second(),
            at.millisecond()
        ),
        Err(_) => ms.to_string(),
    }
}

pub fn format_duration(ms: i64) -> String {
    if ms < 1_000 {
        format!("{ms} ms")
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

pub fn preview(value: &Value) -> String {
    let text = value_text(value);
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let mut cut: String = text.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

pub fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

pub fn status_class(status: ContextStatus) -> &'static str {
    match status {
        ContextStatus::Running => "rounded bg-sky-100 px-2 py-0.5 text-[11px] text-sky-700",
        ContextStatus::Completed => "rounded bg-emerald-100 px-2 py-0.5 text-[11px] text-emerald-700",
        ContextStatus::Errored => "rounded bg-rose-100 px-2 py-0.5 text-[11px] text-rose-700",
        ContextStatus::Cancelled => "rounded bg-slate-200 px-2 py-0.5 text-[11px] text-slate-600",
    }
}

pub fn kind_class(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::ToolCalled | EventKind::ChildContextCreated => {
            "rounded bg-indigo-50 px-1.5 text-[11px] font-mono text-indigo-700"
        }
        EventKind::ToolReturn => "rounded bg-emerald-50 px-1.5 text-[11px] font-mono text-emerald-700",
        EventKind::ToolException => "rounded bg-rose-50 px-1.5 text-[11px] font-mono text-rose-700",
        EventKind::AgentPrompt | EventKind::AgentLlmResponse => {
            "rounded bg-amber-50 px-1.5 text-[11px] font-mono text-amber-700"
        }
        EventKind::ContextUpdate | EventKind::Other(_) => {
            "rounded bg-slate-100 px-1.5 text-[11px] font-mono text-slate-600"
        }
    }
}

pub fn connection_class(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "rounded-full bg-slate-200 px-3 py-1 text-xs text-slate-700",
        ConnectionState::Connecting => "rounded-full bg-amber-100 px-3 py-1 text-xs text-amber-700",
        ConnectionState::Connected => "rounded-full bg-emerald-100 px-3 py-1 text-xs text-emerald-700",
        ConnectionState::Error => "rounded-full bg-rose-100 px-3 py-1 text-xs text-rose-700",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_render_as_utc_clock_time() {
        assert_eq!(format_timestamp(1_717_000_000_000), "16:26:40.000");
        assert_eq!(format_timestamp(1_717_000_000_140), "16:26:40.140");
    }

    #[test]
    fn durations_pick_a_readable_unit() {
        assert_eq!(format_duration(340), "340 ms");
        assert_eq!(format_duration(1_500), "1.5 s");
        assert_eq!(format_duration(125_000), "2m 5s");
    }

    #[test]
    fn previews_truncate_long_payloads() {
        let long = json!("x".repeat(500));
        let text = preview(&long);
        assert_eq!(text.chars().count(), PREVIEW_CHARS + 1);
        assert!(text.ends_with('…'));
        assert_eq!(preview(&json!("short")), "short");
    }
}
