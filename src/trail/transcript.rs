use crate::error::TrailError;
use crate::trail::exchange::filter_last_exchanges;
use crate::trail::tokens::{TokenCounters, reconcile_totals};
use crate::trail::util::truncate_with_ellipsis;
use anyhow::{Context, Result};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Plan-mode affordances; they carry no work of their own.
const NOISE_TOOLS: [&str; 2] = ["EnterPlanMode", "ExitPlanMode"];

/// Injected notices that share the user role with real prompts.
const META_MARKERS: [&str; 10] = [
    "<command-name>",
    "<command-message>",
    "<command-args>",
    "<local-command-stdout>",
    "<local-command-stderr>",
    "Caveat: The messages below were generated by the user while running local commands",
    "<system-reminder>",
    "<user-memory-input>",
    "Error reading memory file",
    "[Request interrupted by user",
];

const TOOL_TARGET_KEYS: [&str; 6] = [
    "command",
    "file_path",
    "path",
    "pattern",
    "url",
    "description",
];
const MAX_TOOL_TARGET_CHARS: usize = 200;
const PROGRESS_TOOL: &str = "TodoWrite";
const SUB_SESSION_TOOL: &str = "Task";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Prompt,
    Response,
    ToolCall,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub timestamp: String,
    pub kind: InteractionKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub content: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub timestamp: String,
    pub items: Vec<TaskItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubSession {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub timestamp: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedSession {
    pub session_id: String,
    pub start_time: String,
    pub end_time: String,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub tool_name: String,
    pub plan_slug: Option<String>,
    pub interactions: Vec<Interaction>,
    pub tokens: TokenCounters,
    pub progress_snapshots: Vec<ProgressSnapshot>,
    pub sub_sessions: Vec<SubSession>,
    pub attachments: Vec<AttachmentRef>,
    #[serde(skip)]
    pub source_path: PathBuf,
}

impl ParsedSession {
    pub fn count(&self, kind: InteractionKind) -> usize {
        self.interactions.iter().filter(|i| i.kind == kind).count()
    }

    pub fn duration_ms(&self) -> Option<i64> {
        let start = DateTime::parse_from_rfc3339(&self.start_time).ok()?;
        let end = DateTime::parse_from_rfc3339(&self.end_time).ok()?;
        Some((end - start).num_milliseconds().max(0))
    }
}

#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub last_exchanges: usize,
    pub tool_name: String,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            last_exchanges: 0,
            tool_name: "claude-code".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct RawLogRecord {
    timestamp: Option<String>,
    session_id: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    slug: Option<String>,
    record_type: Option<String>,
    is_meta: bool,
    role: Option<String>,
    content: Option<Value>,
    usage: Option<TokenCounters>,
    model: Option<String>,
}

fn non_empty_str(root: &Value, key: &str) -> Option<String> {
    root.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
}

fn parse_usage(usage: &Value) -> Option<TokenCounters> {
    if !usage.is_object() {
        return None;
    }
    let field = |key: &str| usage.get(key).and_then(Value::as_u64).unwrap_or(0);
    Some(TokenCounters {
        input: field("input_tokens"),
        output: field("output_tokens"),
        cache_create: field("cache_creation_input_tokens"),
        cache_read: field("cache_read_input_tokens"),
    })
}

impl RawLogRecord {
    fn from_line(line: &str) -> Option<Self> {
        let root: Value = serde_json::from_str(line).ok()?;
        if !root.is_object() {
            return None;
        }
        let message = root.get("message");
        Some(Self {
            timestamp: non_empty_str(&root, "timestamp"),
            session_id: non_empty_str(&root, "sessionId"),
            cwd: non_empty_str(&root, "cwd"),
            git_branch: non_empty_str(&root, "gitBranch"),
            slug: non_empty_str(&root, "slug"),
            record_type: non_empty_str(&root, "type"),
            is_meta: root.get("isMeta").and_then(Value::as_bool).unwrap_or(false),
            role: message.and_then(|m| non_empty_str(m, "role")),
            content: message.and_then(|m| m.get("content")).cloned(),
            usage: message.and_then(|m| m.get("usage")).and_then(parse_usage),
            model: message.and_then(|m| non_empty_str(m, "model")),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct ToolCallRecord {
    id: Option<String>,
    name: String,
    input: Value,
}

#[derive(Debug, Clone, PartialEq)]
struct PromptRecord {
    text: Option<String>,
    attachments: Vec<(String, Option<String>, Option<u64>)>,
}

#[derive(Debug, Clone, PartialEq)]
struct ResponseRecord {
    text: Option<String>,
    tool_calls: Vec<ToolCallRecord>,
    usage: Option<TokenCounters>,
    model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum ClassifiedRecord {
    Prompt(PromptRecord),
    Response(ResponseRecord),
    Unrecognized,
}

pub fn is_meta_text(text: &str) -> bool {
    let trimmed = text.trim_start();
    META_MARKERS.iter().any(|marker| trimmed.starts_with(marker))
}

fn content_blocks(content: Option<&Value>) -> &[Value] {
    content
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn block_type(block: &Value) -> &str {
    block.get("type").and_then(Value::as_str).unwrap_or("")
}

/// Normalize string-or-blocks content into one trimmed string.
fn extract_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter(|b| block_type(b) == "text")
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

fn extract_attachments(content: Option<&Value>) -> Vec<(String, Option<String>, Option<u64>)> {
    let mut out = Vec::new();
    for block in content_blocks(content) {
        let kind = block_type(block);
        if kind != "image" && kind != "document" {
            continue;
        }
        let source = block.get("source");
        let media_type = source.and_then(|s| non_empty_str(s, "media_type"));
        let size_bytes = source
            .and_then(|s| s.get("data"))
            .and_then(Value::as_str)
            .map(|data| (data.len() as u64) * 3 / 4);
        out.push((kind.to_string(), media_type, size_bytes));
    }
    out
}

fn extract_tool_calls(content: Option<&Value>) -> Vec<ToolCallRecord> {
    content_blocks(content)
        .iter()
        .filter(|b| block_type(b) == "tool_use")
        .filter_map(|b| {
            let name = non_empty_str(b, "name")?;
            Some(ToolCallRecord {
                id: non_empty_str(b, "id"),
                name,
                input: b.get("input").cloned().unwrap_or(Value::Null),
            })
        })
        .filter(|call| !NOISE_TOOLS.contains(&call.name.as_str()))
        .collect()
}

fn classify(record: &RawLogRecord) -> ClassifiedRecord {
    let record_type = record.record_type.as_deref().unwrap_or("");
    let role = record.role.as_deref().unwrap_or("");

    if record_type == "user" && role == "user" {
        let content = record.content.as_ref();
        let text = extract_text(content);
        let is_prompt = !record.is_meta && !text.is_empty() && !is_meta_text(&text);
        return ClassifiedRecord::Prompt(PromptRecord {
            text: is_prompt.then_some(text),
            attachments: extract_attachments(content),
        });
    }

    if record_type == "assistant" && role == "assistant" {
        let content = record.content.as_ref();
        let text = extract_text(content);
        return ClassifiedRecord::Response(ResponseRecord {
            text: (!text.is_empty()).then_some(text),
            tool_calls: extract_tool_calls(content),
            usage: record.usage,
            model: record.model.clone(),
        });
    }

    ClassifiedRecord::Unrecognized
}

fn tool_call_content(name: &str, input: &Value) -> String {
    let target = TOOL_TARGET_KEYS
        .iter()
        .find_map(|key| non_empty_str(input, key));
    match target {
        Some(target) => format!(
            "{name}: {}",
            truncate_with_ellipsis(&target, MAX_TOOL_TARGET_CHARS)
        ),
        None => name.to_string(),
    }
}

fn progress_items(input: &Value) -> Vec<TaskItem> {
    input
        .get("todos")
        .and_then(Value::as_array)
        .map(|todos| {
            todos
                .iter()
                .filter_map(|todo| {
                    Some(TaskItem {
                        content: non_empty_str(todo, "content")?,
                        status: non_empty_str(todo, "status").unwrap_or_else(|| "pending".into()),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct SessionAccumulator {
    session_id: Option<String>,
    cwd: Option<String>,
    git_branch: Option<String>,
    slug: Option<String>,
    start_time: Option<String>,
    end_time: Option<String>,
}

fn set_if_absent(slot: &mut Option<String>, value: &Option<String>) {
    if slot.is_none()
        && let Some(v) = value
    {
        *slot = Some(v.clone());
    }
}

impl SessionAccumulator {
    fn observe(&mut self, record: &RawLogRecord) {
        set_if_absent(&mut self.session_id, &record.session_id);
        set_if_absent(&mut self.cwd, &record.cwd);
        set_if_absent(&mut self.git_branch, &record.git_branch);
        set_if_absent(&mut self.slug, &record.slug);
        if let Some(ts) = &record.timestamp {
            set_if_absent(&mut self.start_time, &record.timestamp);
            self.end_time = Some(ts.clone());
        }
    }
}

#[derive(Debug, Default)]
struct SessionBuilder {
    meta: SessionAccumulator,
    interactions: Vec<Interaction>,
    tokens: TokenCounters,
    progress_snapshots: Vec<ProgressSnapshot>,
    sub_sessions: Vec<SubSession>,
    attachments: Vec<AttachmentRef>,
}

impl SessionBuilder {
    fn push_record(&mut self, record: &RawLogRecord) {
        self.meta.observe(record);
        let timestamp = record
            .timestamp
            .clone()
            .or_else(|| self.meta.end_time.clone())
            .unwrap_or_default();

        match classify(record) {
            ClassifiedRecord::Prompt(prompt) => {
                for (kind, media_type, size_bytes) in prompt.attachments {
                    self.attachments.push(AttachmentRef {
                        timestamp: timestamp.clone(),
                        kind,
                        media_type,
                        size_bytes,
                    });
                }
                if let Some(text) = prompt.text {
                    self.interactions.push(Interaction {
                        timestamp,
                        kind: InteractionKind::Prompt,
                        content: text,
                        tool_name: None,
                        input_tokens: None,
                        output_tokens: None,
                        metadata: BTreeMap::new(),
                    });
                }
            }
            ClassifiedRecord::Response(response) => {
                if let Some(usage) = response.usage {
                    self.tokens.add(&usage);
                }
                // A tool-only turn hands its usage to its first tool call.
                let mut tool_usage = response.usage.filter(|_| response.text.is_none());
                if let Some(text) = response.text {
                    let mut metadata = BTreeMap::new();
                    if let Some(model) = response.model {
                        metadata.insert("model".to_string(), model);
                    }
                    self.interactions.push(Interaction {
                        timestamp: timestamp.clone(),
                        kind: InteractionKind::Response,
                        content: text,
                        tool_name: None,
                        input_tokens: response.usage.map(|u| u.input),
                        output_tokens: response.usage.map(|u| u.output),
                        metadata,
                    });
                }
                for call in response.tool_calls {
                    self.push_tool_call(&timestamp, call, tool_usage.take());
                }
            }
            ClassifiedRecord::Unrecognized => {}
        }
    }

    fn push_tool_call(&mut self, timestamp: &str, call: ToolCallRecord, usage: Option<TokenCounters>) {
        if call.name == PROGRESS_TOOL {
            let items = progress_items(&call.input);
            if !items.is_empty() {
                self.progress_snapshots.push(ProgressSnapshot {
                    timestamp: timestamp.to_string(),
                    items,
                });
            }
        } else if call.name == SUB_SESSION_TOOL {
            self.sub_sessions.push(SubSession {
                timestamp: timestamp.to_string(),
                agent_type: non_empty_str(&call.input, "subagent_type"),
                description: non_empty_str(&call.input, "description")
                    .unwrap_or_else(|| SUB_SESSION_TOOL.to_string()),
            });
        }

        let mut metadata = BTreeMap::new();
        if let Some(id) = call.id {
            metadata.insert("tool_use_id".to_string(), id);
        }
        self.interactions.push(Interaction {
            timestamp: timestamp.to_string(),
            kind: InteractionKind::ToolCall,
            content: tool_call_content(&call.name, &call.input),
            tool_name: Some(call.name),
            input_tokens: usage.map(|u| u.input),
            output_tokens: usage.map(|u| u.output),
            metadata,
        });
    }

    fn finish(self, source_path: &Path, opts: &ParseOptions) -> Result<ParsedSession> {
        let Some(start_time) = self.meta.start_time else {
            return Err(TrailError::EmptyTranscript(source_path.display().to_string()).into());
        };
        let end_time = self.meta.end_time.unwrap_or_else(|| start_time.clone());
        let session_id = self
            .meta
            .session_id
            .unwrap_or_else(|| session_id_from_path(source_path));

        let pre_filter = self.tokens;
        let before = self.interactions.len();
        let interactions = filter_last_exchanges(self.interactions, opts.last_exchanges);
        let tokens = if interactions.len() == before {
            pre_filter
        } else {
            reconcile_totals(&interactions, pre_filter)
        };

        let (progress_snapshots, sub_sessions, attachments) =
            match window_start(&interactions, opts.last_exchanges) {
                Some(cutoff) => (
                    keep_from(self.progress_snapshots, &cutoff, |s| &s.timestamp),
                    keep_from(self.sub_sessions, &cutoff, |s| &s.timestamp),
                    keep_from(self.attachments, &cutoff, |a| &a.timestamp),
                ),
                None => (self.progress_snapshots, self.sub_sessions, self.attachments),
            };

        Ok(ParsedSession {
            session_id,
            start_time,
            end_time,
            cwd: self.meta.cwd,
            git_branch: self.meta.git_branch,
            tool_name: opts.tool_name.clone(),
            plan_slug: self.meta.slug,
            interactions,
            tokens,
            progress_snapshots,
            sub_sessions,
            attachments,
            source_path: source_path.to_path_buf(),
        })
    }
}

fn window_start(interactions: &[Interaction], last_exchanges: usize) -> Option<String> {
    if last_exchanges == 0 {
        return None;
    }
    interactions
        .first()
        .map(|i| i.timestamp.clone())
        .filter(|ts| !ts.is_empty())
}

fn at_or_after(timestamp: &str, cutoff: &str) -> bool {
    match (
        DateTime::parse_from_rfc3339(timestamp),
        DateTime::parse_from_rfc3339(cutoff),
    ) {
        (Ok(ts), Ok(cut)) => ts >= cut,
        _ => timestamp >= cutoff,
    }
}

fn keep_from<T>(items: Vec<T>, cutoff: &str, ts: impl Fn(&T) -> &String) -> Vec<T> {
    items
        .into_iter()
        .filter(|item| at_or_after(ts(item), cutoff))
        .collect()
}

pub fn session_id_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("session")
        .to_string()
}

pub fn parse_transcript<R: BufRead>(
    reader: R,
    source_path: &Path,
    opts: &ParseOptions,
) -> Result<ParsedSession> {
    let mut builder = SessionBuilder::default();

    for line in reader.split(b'\n') {
        let raw =
            line.with_context(|| format!("failed to read line from {}", source_path.display()))?;
        let decoded = String::from_utf8_lossy(&raw);
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(record) = RawLogRecord::from_line(trimmed) else {
            continue;
        };
        builder.push_record(&record);
    }

    builder.finish(source_path, opts)
}

pub fn parse_transcript_file(path: &Path, opts: &ParseOptions) -> Result<ParsedSession> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    parse_transcript(BufReader::new(file), path, opts)
}

/// First `cwd` recorded in a transcript, without building the session.
pub fn peek_cwd(path: &Path) -> Option<String> {
    let file = fs::File::open(path).ok()?;
    BufReader::new(file)
        .split(b'\n')
        .map_while(|line| line.ok())
        .filter_map(|raw| RawLogRecord::from_line(String::from_utf8_lossy(&raw).trim()))
        .find_map(|record| record.cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrailError;
    use serde_json::json;

    fn parse(lines: &[Value], last: usize) -> Result<ParsedSession> {
        let raw = lines
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        let opts = ParseOptions {
            last_exchanges: last,
            ..ParseOptions::default()
        };
        parse_transcript(raw.as_bytes(), Path::new("/tmp/abc-123.jsonl"), &opts)
    }

    fn user(ts: &str, text: &str) -> Value {
        json!({
            "type": "user",
            "timestamp": ts,
            "sessionId": "sess-1",
            "cwd": "/work/repo",
            "gitBranch": "main",
            "message": {"role": "user", "content": text}
        })
    }

    fn assistant(ts: &str, text: &str, input: u64, output: u64) -> Value {
        json!({
            "type": "assistant",
            "timestamp": ts,
            "message": {
                "role": "assistant",
                "model": "claude-sonnet",
                "content": [{"type": "text", "text": text}],
                "usage": {"input_tokens": input, "output_tokens": output}
            }
        })
    }

    #[test]
    fn two_exchanges_with_last_one_keeps_final_pair() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "first question"),
            assistant("2025-01-01T00:00:01Z", "first answer", 10, 5),
            user("2025-01-01T00:00:02Z", "second question"),
            assistant("2025-01-01T00:00:03Z", "second answer", 10, 5),
        ];
        let session = parse(&lines, 1).expect("parse");
        assert_eq!(session.count(InteractionKind::Prompt), 1);
        assert_eq!(session.count(InteractionKind::Response), 1);
        assert_eq!(session.interactions[0].content, "second question");
        assert_eq!(session.tokens.input, 10);
        assert_eq!(session.tokens.output, 5);
    }

    #[test]
    fn metadata_is_first_wins_and_times_span_records() {
        let mut later = user("2025-01-01T00:05:00Z", "again");
        later["sessionId"] = json!("other");
        later["cwd"] = json!("/elsewhere");
        let lines = vec![
            json!({"type": "summary", "summary": "no timestamp here"}),
            user("2025-01-01T00:00:00Z", "hello"),
            later,
        ];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!(session.session_id, "sess-1");
        assert_eq!(session.cwd.as_deref(), Some("/work/repo"));
        assert_eq!(session.git_branch.as_deref(), Some("main"));
        assert_eq!(session.start_time, "2025-01-01T00:00:00Z");
        assert_eq!(session.end_time, "2025-01-01T00:05:00Z");
        assert!(session.start_time <= session.end_time);
        assert_eq!(session.duration_ms(), Some(300_000));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let raw = format!(
            "not json at all\n\n{}\n{{\"broken\": \n42\n",
            user("2025-01-01T00:00:00Z", "hi")
        );
        let session = parse_transcript(
            raw.as_bytes(),
            Path::new("/tmp/x.jsonl"),
            &ParseOptions::default(),
        )
        .expect("parse");
        assert_eq!(session.interactions.len(), 1);
    }

    #[test]
    fn all_noise_transcript_is_empty_transcript_error() {
        for raw in ["", "garbage\n{}\n[1,2]\n", "{\"type\":\"user\"}\n"] {
            let err = parse_transcript(
                raw.as_bytes(),
                Path::new("/tmp/empty.jsonl"),
                &ParseOptions::default(),
            )
            .unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<TrailError>(),
                    Some(TrailError::EmptyTranscript(_))
                ),
                "unexpected error for {raw:?}: {err:#}"
            );
        }
    }

    #[test]
    fn meta_markers_are_never_prompts() {
        for marker in META_MARKERS {
            let lines = vec![user(
                "2025-01-01T00:00:00Z",
                &format!("{marker} trailing text"),
            )];
            let session = parse(&lines, 0).expect("parse");
            assert_eq!(
                session.count(InteractionKind::Prompt),
                0,
                "marker {marker} leaked as prompt"
            );
        }
    }

    #[test]
    fn is_meta_records_are_not_prompts() {
        let mut line = user("2025-01-01T00:00:00Z", "looks human");
        line["isMeta"] = json!(true);
        let session = parse(&[line], 0).expect("parse");
        assert!(session.interactions.is_empty());
    }

    #[test]
    fn missing_session_id_uses_file_stem() {
        let lines = vec![json!({
            "type": "user",
            "timestamp": "2025-01-01T00:00:00Z",
            "message": {"role": "user", "content": "hi"}
        })];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!(session.session_id, "abc-123");
    }

    #[test]
    fn role_mismatch_is_unrecognized() {
        let lines = vec![json!({
            "type": "user",
            "timestamp": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "odd"}
        })];
        let session = parse(&lines, 0).expect("parse");
        assert!(session.interactions.is_empty());
    }

    #[test]
    fn tool_only_turn_counts_usage_without_response() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "run it"),
            json!({
                "type": "assistant",
                "timestamp": "2025-01-01T00:00:01Z",
                "message": {
                    "role": "assistant",
                    "content": [
                        {"type": "tool_use", "id": "tu_1", "name": "Bash", "input": {"command": "ls -la"}},
                        {"type": "tool_use", "id": "tu_2", "name": "ExitPlanMode", "input": {}}
                    ],
                    "usage": {
                        "input_tokens": 7,
                        "output_tokens": 3,
                        "cache_creation_input_tokens": 100,
                        "cache_read_input_tokens": 200
                    }
                }
            }),
        ];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!(session.count(InteractionKind::Response), 0);
        assert_eq!(session.count(InteractionKind::ToolCall), 1);
        let call = &session.interactions[1];
        assert_eq!(call.content, "Bash: ls -la");
        assert_eq!(call.tool_name.as_deref(), Some("Bash"));
        assert_eq!(call.metadata.get("tool_use_id").map(String::as_str), Some("tu_1"));
        assert_eq!(session.tokens.input, 7);
        assert_eq!(session.tokens.output, 3);
        assert_eq!(session.tokens.cache_create, 100);
        assert_eq!(session.tokens.cache_read, 200);
    }

    #[test]
    fn response_blocks_join_with_newline() {
        let lines = vec![json!({
            "type": "assistant",
            "timestamp": "2025-01-01T00:00:00Z",
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "  line one"},
                    {"type": "thinking", "thinking": "hidden"},
                    {"type": "text", "text": "line two  "}
                ]
            }
        })];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!(session.interactions[0].content, "line one\nline two");
    }

    #[test]
    fn tool_call_without_target_falls_back_to_name() {
        assert_eq!(tool_call_content("WebSearch", &json!({"q": 1})), "WebSearch");
        assert_eq!(tool_call_content("Read", &Value::Null), "Read");
    }

    #[test]
    fn supplementary_groups_are_collected() {
        let lines = vec![
            json!({
                "type": "user",
                "timestamp": "2025-01-01T00:00:00Z",
                "message": {"role": "user", "content": [
                    {"type": "text", "text": "see screenshot"},
                    {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAABBBB"}}
                ]}
            }),
            json!({
                "type": "assistant",
                "timestamp": "2025-01-01T00:00:01Z",
                "message": {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "t1", "name": "TodoWrite", "input": {"todos": [
                        {"content": "write parser", "status": "in_progress"},
                        {"content": "ship", "status": "pending"}
                    ]}},
                    {"type": "tool_use", "id": "t2", "name": "Task", "input": {
                        "subagent_type": "explorer", "description": "scan repo", "prompt": "secret plan"
                    }}
                ]}
            }),
        ];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!(session.attachments.len(), 1);
        assert_eq!(session.attachments[0].media_type.as_deref(), Some("image/png"));
        assert_eq!(session.attachments[0].size_bytes, Some(6));
        assert_eq!(session.progress_snapshots.len(), 1);
        assert_eq!(session.progress_snapshots[0].items.len(), 2);
        assert_eq!(session.sub_sessions.len(), 1);
        assert_eq!(session.sub_sessions[0].agent_type.as_deref(), Some("explorer"));
        assert_eq!(session.count(InteractionKind::ToolCall), 2);
    }

    #[test]
    fn window_drops_supplementary_entries_before_cut() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "first"),
            json!({
                "type": "assistant",
                "timestamp": "2025-01-01T00:00:01Z",
                "message": {"role": "assistant", "content": [
                    {"type": "tool_use", "name": "Task", "input": {"description": "early"}}
                ]}
            }),
            user("2025-01-01T00:00:02Z", "second"),
            json!({
                "type": "assistant",
                "timestamp": "2025-01-01T00:00:03Z",
                "message": {"role": "assistant", "content": [
                    {"type": "tool_use", "name": "Task", "input": {"description": "late"}}
                ]}
            }),
        ];
        let session = parse(&lines, 1).expect("parse");
        assert_eq!(session.sub_sessions.len(), 1);
        assert_eq!(session.sub_sessions[0].description, "late");
    }

    fn tool_only_turn(ts: &str, input: u64, output: u64) -> Value {
        json!({
            "type": "assistant",
            "timestamp": ts,
            "message": {
                "role": "assistant",
                "content": [
                    {"type": "tool_use", "id": "tu_9", "name": "Read", "input": {"file_path": "src/lib.rs"}},
                    {"type": "tool_use", "id": "tu_10", "name": "Grep", "input": {"pattern": "fn main"}}
                ],
                "usage": {"input_tokens": input, "output_tokens": output}
            }
        })
    }

    #[test]
    fn unbounded_parse_keeps_tool_only_usage() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "look around"),
            assistant("2025-01-01T00:00:01Z", "sure", 10, 5),
            tool_only_turn("2025-01-01T00:00:02Z", 7, 3),
        ];
        let session = parse(&lines, 0).expect("parse");
        assert_eq!((session.tokens.input, session.tokens.output), (17, 8));

        let calls = session
            .interactions
            .iter()
            .filter(|i| i.kind == InteractionKind::ToolCall)
            .collect::<Vec<_>>();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].input_tokens, calls[0].output_tokens), (Some(7), Some(3)));
        assert_eq!((calls[1].input_tokens, calls[1].output_tokens), (None, None));
    }

    #[test]
    fn window_sum_includes_tool_only_turns_inside_it() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "first"),
            assistant("2025-01-01T00:00:01Z", "one", 50, 50),
            user("2025-01-01T00:00:02Z", "second"),
            assistant("2025-01-01T00:00:03Z", "two", 10, 5),
            tool_only_turn("2025-01-01T00:00:04Z", 7, 3),
        ];
        let session = parse(&lines, 1).expect("parse");
        assert_eq!((session.tokens.input, session.tokens.output), (17, 8));
    }

    #[test]
    fn window_larger_than_prompt_count_keeps_session_totals() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "only"),
            assistant("2025-01-01T00:00:01Z", "answer", 10, 5),
            tool_only_turn("2025-01-01T00:00:02Z", 7, 3),
        ];
        let session = parse(&lines, 4).expect("parse");
        assert_eq!((session.tokens.input, session.tokens.output), (17, 8));
    }

    #[test]
    fn window_falls_back_to_pre_filter_tokens() {
        let lines = vec![
            user("2025-01-01T00:00:00Z", "first"),
            assistant("2025-01-01T00:00:01Z", "answer", 10, 5),
            user("2025-01-01T00:00:02Z", "second, never answered"),
        ];
        let session = parse(&lines, 1).expect("parse");
        assert_eq!(session.interactions.len(), 1);
        assert_eq!(session.tokens.input, 10);
        assert_eq!(session.tokens.output, 5);
    }

    #[test]
    fn peek_cwd_skips_records_without_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.jsonl");
        let body = [
            "not json".to_string(),
            json!({"type": "summary"}).to_string(),
            json!({"type": "user", "cwd": "/src/web"}).to_string(),
            json!({"type": "user", "cwd": "/src/other"}).to_string(),
        ]
        .join("\n");
        fs::write(&path, body).expect("write");
        assert_eq!(peek_cwd(&path).as_deref(), Some("/src/web"));
        assert_eq!(peek_cwd(&dir.path().join("missing.jsonl")), None);
    }
}
