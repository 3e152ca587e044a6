//! Response Interpreter
//!
//! Turns a raw model completion into an [`Interpretation`]: a reasoning
//! trace, a final answer, tool calls and an optional hand-off target.
//!
//! Models disagree on output conventions, so the text is run through a fixed,
//! ordered list of extraction strategies. Each one reads the same text and
//! adds what it recognises; none of them can fail the parse. Tool-call JSON
//! is normalised by an ordered list of matchers, one per vendor shape.
//!
//! ```text
//! THOUGHT: I need the file first
//! ACTION: {"tool": "read_file", "parameters": {"path": "README.md"}}
//! FINAL ANSWER: Reading the readme now.
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::tool::ToolCall;

/// Thought recorded when the model gave no structured reasoning
pub const PLACEHOLDER_THOUGHT: &str = "No explicit reasoning provided";

static SECTION_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?mi)^[ \t]*(?:\*\*)?(THOUGHT|ACTION[ _]INPUT|ACTION|OBSERVATION|REASONING|ANALYSIS|ANSWER|RESPONSE|FINAL[ _]ANSWER|TOOL_CALL|TOOL|DELEGATE|HANDOFF)(?:\*\*)?[ \t]*:",
    )
    .expect("SECTION_LABEL is a compile-time constant")
});

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:tool_call|tool|json)[ \t]*\r?\n?(.*?)```")
        .expect("FENCED_BLOCK is a compile-time constant")
});

static TAGGED_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<tool_call>(.*?)</tool_call>")
        .expect("TAGGED_CALL is a compile-time constant")
});

static BRACKET_CALLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[TOOL_CALLS\]").expect("BRACKET_CALLS is a compile-time constant")
});

static TOOL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[`'\x22]?([A-Za-z][A-Za-z0-9_.\-]*)[`'\x22]?$")
        .expect("TOOL_NAME is a compile-time constant")
});

static AGENT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[@`'\x22]?([A-Za-z0-9_\-]+)").expect("AGENT_NAME is a compile-time constant")
});

/// Looser "final answer" phrasings, tried in order when no sentinel matched
static FALLBACK_ANSWERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?is)<final_answer>(.*?)</final_answer>",
        r"(?is)\*\*final[ _]answer\*\*\s*:?\s*(.+)",
        r"(?is)final[ _]answer\s*[:\-]\s*(.+)",
        r"(?is)the final answer is\s*:?\s*(.+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("fallback answer patterns are compile-time constants"))
    .collect()
});

/// One step of the model's reasoning trace
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

impl ReasoningStep {
    fn thought(thought: impl Into<String>) -> Self {
        Self {
            thought: thought.into(),
            action: None,
            observation: None,
        }
    }
}

/// Structured view of one completion. Always well-formed: `steps` is never
/// empty, and an unrecognised completion yields an empty answer and no calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub steps: Vec<ReasoningStep>,
    pub final_answer: String,
    pub tool_calls: Vec<ToolCall>,

    /// Agent the model asked to hand off to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegate_to: Option<String>,
}

impl Interpretation {
    /// True when nothing usable was extracted
    pub fn is_empty(&self) -> bool {
        self.final_answer.is_empty() && self.tool_calls.is_empty() && self.delegate_to.is_none()
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Normalises one parsed JSON object into a tool call, or declines
pub type ToolCallMatcher = fn(&Map<String, Value>) -> Option<ToolCall>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Label {
    Thought,
    Action,
    ActionInput,
    Observation,
    Reasoning,
    Analysis,
    Answer,
    Response,
    FinalAnswer,
    ToolCall,
    Delegate,
}

impl Label {
    fn parse(raw: &str) -> Option<Self> {
        let upper = raw.to_ascii_uppercase().replace(' ', "_");
        Some(match upper.as_str() {
            "THOUGHT" => Self::Thought,
            "ACTION" => Self::Action,
            "ACTION_INPUT" => Self::ActionInput,
            "OBSERVATION" => Self::Observation,
            "REASONING" => Self::Reasoning,
            "ANALYSIS" => Self::Analysis,
            "ANSWER" => Self::Answer,
            "RESPONSE" => Self::Response,
            "FINAL_ANSWER" => Self::FinalAnswer,
            "TOOL" | "TOOL_CALL" => Self::ToolCall,
            "DELEGATE" | "HANDOFF" => Self::Delegate,
            _ => return None,
        })
    }
}

/// A labelled span of the completion, running to the next label
struct Section<'a> {
    label: Label,
    body: &'a str,
    /// Byte offset of `body` in the full text
    offset: usize,
}

/// Pre-split completion shared by all strategies
struct Scan<'a> {
    text: &'a str,
    sections: Vec<Section<'a>>,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        let labels: Vec<(Label, usize, usize)> = SECTION_LABEL
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let label = Label::parse(caps.get(1)?.as_str())?;
                Some((label, whole.start(), whole.end()))
            })
            .collect();

        let sections = labels
            .iter()
            .enumerate()
            .map(|(i, &(label, _, body_start))| {
                let body_end = labels.get(i + 1).map_or(text.len(), |next| next.1);
                Section {
                    label,
                    body: &text[body_start..body_end],
                    offset: body_start,
                }
            })
            .collect();

        Self { text, sections }
    }

    fn bodies(&self, label: Label) -> impl Iterator<Item = &Section<'a>> {
        self.sections.iter().filter(move |s| s.label == label)
    }

    fn first(&self, label: Label) -> Option<&'a str> {
        self.bodies(label)
            .map(|s| s.body.trim())
            .find(|b| !b.is_empty())
    }
}

// Answer sources, strongest first.
const RANK_FINAL_ANSWER: u8 = 0;
const RANK_ANSWER: u8 = 1;
const RANK_RESPONSE: u8 = 2;

/// Accumulates what the strategies find
#[derive(Default)]
struct Extraction {
    steps: Vec<ReasoningStep>,
    answer: Option<(u8, String)>,
    tool_calls: Vec<ToolCall>,
    seen_fragments: HashSet<usize>,
    delegate_to: Option<String>,
}

impl Extraction {
    fn offer_answer(&mut self, rank: u8, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if self.answer.as_ref().is_none_or(|(held, _)| rank < *held) {
            self.answer = Some((rank, text.to_string()));
        }
    }
}

type Strategy = fn(&ResponseInterpreter, &Scan<'_>, &mut Extraction);

/// Extraction strategies, in priority order
const STRATEGIES: &[(&str, Strategy)] = &[
    ("react_trace", react_trace),
    ("reasoning_answer", reasoning_answer),
    ("analysis_response", analysis_response),
    ("final_answer_sentinel", final_answer_sentinel),
    ("sentinel_tool_calls", sentinel_tool_calls),
    ("fenced_tool_calls", fenced_tool_calls),
    ("tagged_tool_calls", tagged_tool_calls),
    ("bracketed_tool_calls", bracketed_tool_calls),
    ("delegation", delegation),
    ("inline_tool_calls", inline_tool_calls),
];

/// THOUGHT / ACTION / OBSERVATION traces
fn react_trace(_: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    let mut current: Option<ReasoningStep> = None;

    for section in &scan.sections {
        let body = section.body.trim();
        match section.label {
            Label::Thought => {
                if let Some(step) = current.take() {
                    out.steps.push(step);
                }
                current = Some(ReasoningStep::thought(body));
            }
            Label::Action => {
                let step = current.get_or_insert_with(|| ReasoningStep::thought(""));
                if step.action.is_some() {
                    let done = std::mem::replace(step, ReasoningStep::thought(""));
                    out.steps.push(done);
                }
                if let Some(step) = current.as_mut() {
                    step.action = Some(body.to_string());
                }
            }
            Label::Observation => {
                if let Some(step) = current.as_mut() {
                    step.observation = Some(body.to_string());
                }
            }
            _ => {}
        }
    }

    if let Some(step) = current {
        out.steps.push(step);
    }
}

/// REASONING: ... ANSWER: ...
fn reasoning_answer(_: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    if let Some(reasoning) = scan.first(Label::Reasoning) {
        out.steps.push(ReasoningStep::thought(reasoning));
    }
    if let Some(answer) = scan.first(Label::Answer) {
        out.offer_answer(RANK_ANSWER, answer);
    }
}

/// ANALYSIS: ... RESPONSE: ...
fn analysis_response(_: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    if let Some(analysis) = scan.first(Label::Analysis) {
        out.steps.push(ReasoningStep::thought(analysis));
    }
    if let Some(response) = scan.first(Label::Response) {
        out.offer_answer(RANK_RESPONSE, response);
    }
}

/// FINAL ANSWER: / FINAL_ANSWER:
fn final_answer_sentinel(_: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    if let Some(answer) = scan.first(Label::FinalAnswer) {
        out.offer_answer(RANK_FINAL_ANSWER, answer);
    }
}

/// JSON following TOOL:, TOOL_CALL: or ACTION:, plus a bare `ACTION: name`
/// paired with the `ACTION INPUT:` right after it
fn sentinel_tool_calls(interp: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    for (i, section) in scan.sections.iter().enumerate() {
        match section.label {
            Label::ToolCall => interp.collect_fragments(section.body, section.offset, out),
            Label::Action => match TOOL_NAME.captures(section.body.trim()).and_then(|c| c.get(1)) {
                Some(name) => {
                    if let Some(input) = scan
                        .sections
                        .get(i + 1)
                        .filter(|next| next.label == Label::ActionInput)
                    {
                        interp.pair_action_input(name.as_str(), input, out);
                    }
                }
                None => interp.collect_fragments(section.body, section.offset, out),
            },
            _ => {}
        }
    }
}

/// ```tool / ```json fenced blocks
fn fenced_tool_calls(interp: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    for caps in FENCED_BLOCK.captures_iter(scan.text) {
        if let Some(body) = caps.get(1) {
            interp.collect_fragments(body.as_str(), body.start(), out);
        }
    }
}

/// <tool_call>...</tool_call>
fn tagged_tool_calls(interp: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    for caps in TAGGED_CALL.captures_iter(scan.text) {
        if let Some(body) = caps.get(1) {
            interp.collect_fragments(body.as_str(), body.start(), out);
        }
    }
}

/// [TOOL_CALLS] [...] (the array directly after the marker)
fn bracketed_tool_calls(interp: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    for marker in BRACKET_CALLS.find_iter(scan.text) {
        let rest = &scan.text[marker.end()..];
        let trimmed = rest.trim_start();
        let offset = marker.end() + (rest.len() - trimmed.len());
        if let Some(end) = balanced_end(trimmed, 0) {
            interp.parse_fragment(&trimmed[..end], offset, out);
        }
    }
}

/// DELEGATE: agent / HANDOFF: agent
fn delegation(_: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    let target = scan
        .bodies(Label::Delegate)
        .filter_map(|s| AGENT_NAME.captures(s.body.trim()))
        .find_map(|caps| caps.get(1).map(|m| m.as_str().to_string()));

    if target.is_some() {
        out.delegate_to = target;
    }
}

/// Bare JSON anywhere in the prose. Runs last so labelled, fenced and
/// tagged fragments have already claimed their offsets.
fn inline_tool_calls(interp: &ResponseInterpreter, scan: &Scan<'_>, out: &mut Extraction) {
    let text = scan.text;
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find(['{', '[']) {
        let start = cursor + rel;
        let Some(end) = balanced_end(text, start) else {
            cursor = start + 1;
            continue;
        };
        if out.seen_fragments.contains(&start) {
            cursor = end;
            continue;
        }
        let calls = serde_json::from_str::<Value>(&text[start..end])
            .map(|value| interp.normalize(&value))
            .unwrap_or_default();
        if calls.is_empty() {
            // Not a call itself, but a call may be nested inside
            cursor = start + 1;
        } else {
            out.seen_fragments.insert(start);
            out.tool_calls.extend(calls);
            cursor = end;
        }
    }
}

/// Byte index one past the bracket that closes the one at `start`, skipping
/// brackets inside JSON strings. `None` when the fragment is unterminated.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if !matches!(bytes.get(start), Some(b'{' | b'[')) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn object_arg(value: Option<&Value>) -> Option<Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map.clone()),
        // Some vendors send arguments as a JSON-encoded string
        Value::String(raw) => serde_json::from_str(raw).ok(),
        Value::Null => Some(Map::new()),
        _ => None,
    }
}

fn str_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// `{"type": "function", "function": {"name": .., "arguments": ..}}`
fn nested_function(obj: &Map<String, Value>) -> Option<ToolCall> {
    let inner = obj.get("function")?.as_object()?;
    let name = str_field(inner, "name")?;
    let params = object_arg(inner.get("arguments").or_else(|| inner.get("parameters")))
        .unwrap_or_default();
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"tool": .., "parameters": {..}}`
fn tool_parameters(obj: &Map<String, Value>) -> Option<ToolCall> {
    let name = str_field(obj, "tool")?;
    let params = object_arg(obj.get("parameters"))?;
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"function": .., "arguments": {..}}`
fn function_arguments(obj: &Map<String, Value>) -> Option<ToolCall> {
    let name = str_field(obj, "function")?;
    let params = object_arg(obj.get("arguments")).unwrap_or_default();
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"name": .., "params" | "parameters" | "arguments" | "input": {..}}`
fn name_params(obj: &Map<String, Value>) -> Option<ToolCall> {
    let name = str_field(obj, "name")?;
    let params = ["params", "parameters", "arguments", "input"]
        .iter()
        .find_map(|key| object_arg(obj.get(*key)))?;
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"tool": .., "args": {..}}`
fn tool_args(obj: &Map<String, Value>) -> Option<ToolCall> {
    let name = str_field(obj, "tool")?;
    let params = object_arg(obj.get("args"))?;
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"action": .., "action_input": {..}}`
fn action_input(obj: &Map<String, Value>) -> Option<ToolCall> {
    let name = str_field(obj, "action")?;
    let params = match obj.get("action_input")? {
        Value::String(raw) => serde_json::from_str(raw)
            .unwrap_or_else(|_| Map::from_iter([("input".to_string(), Value::String(raw.clone()))])),
        other => object_arg(Some(other))?,
    };
    Some(ToolCall::new(name).with_parameters(params))
}

/// `{"tool": "search", "q": "x"}`: every other key becomes a parameter
fn flattened(obj: &Map<String, Value>) -> Option<ToolCall> {
    let key = ["tool", "action", "name"]
        .into_iter()
        .find(|k| str_field(obj, k).is_some())?;
    let name = str_field(obj, key)?;
    let params = obj
        .iter()
        .filter(|(k, _)| *k != key && *k != "id")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Some(ToolCall::new(name).with_parameters(params))
}

/// Built-in matchers. New conventions are appended, never special-cased.
pub const DEFAULT_MATCHERS: &[ToolCallMatcher] = &[
    nested_function,
    tool_parameters,
    function_arguments,
    name_params,
    tool_args,
    action_input,
    flattened,
];

/// Converts raw completions into [`Interpretation`]s
#[derive(Clone, Debug)]
pub struct ResponseInterpreter {
    matchers: Vec<ToolCallMatcher>,
}

impl Default for ResponseInterpreter {
    fn default() -> Self {
        Self {
            matchers: DEFAULT_MATCHERS.to_vec(),
        }
    }
}

impl ResponseInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a matcher for another vendor convention (tried last)
    #[must_use]
    pub fn with_matcher(mut self, matcher: ToolCallMatcher) -> Self {
        self.matchers.push(matcher);
        self
    }

    /// Interpret a completion. Never fails.
    pub fn interpret(&self, raw: &str) -> Interpretation {
        let scan = Scan::new(raw);
        let mut out = Extraction::default();

        for (name, strategy) in STRATEGIES {
            let before = (out.steps.len(), out.tool_calls.len(), out.answer.is_some());
            strategy(self, &scan, &mut out);
            let after = (out.steps.len(), out.tool_calls.len(), out.answer.is_some());
            if before != after {
                debug!(strategy = name, "Extraction strategy contributed");
            }
        }

        let final_answer = match out.answer {
            Some((_, answer)) => answer,
            None => fallback_answer(raw).unwrap_or_default(),
        };

        let mut steps = out.steps;
        if steps.is_empty() {
            steps.push(ReasoningStep::thought(PLACEHOLDER_THOUGHT));
        }

        Interpretation {
            steps,
            final_answer,
            tool_calls: out.tool_calls,
            delegate_to: out.delegate_to,
        }
    }

    /// Normalise a parsed JSON value into tool calls. Arrays and
    /// `{"tool_calls": [...]}` wrappers expand to one call per element.
    pub fn normalize(&self, value: &Value) -> Vec<ToolCall> {
        match value {
            Value::Array(items) => items.iter().flat_map(|v| self.normalize(v)).collect(),
            Value::Object(obj) => {
                if let Some(inner @ Value::Array(_)) = obj.get("tool_calls") {
                    return self.normalize(inner);
                }
                self.matchers
                    .iter()
                    .find_map(|matcher| matcher(obj))
                    .map(|mut call| {
                        call.id = str_field(obj, "id").map(str::to_string);
                        call
                    })
                    .into_iter()
                    .collect()
            }
            _ => Vec::new(),
        }
    }

    /// Parse every top-level JSON fragment inside `body`
    fn collect_fragments(&self, body: &str, offset: usize, out: &mut Extraction) {
        let mut cursor = 0;
        while let Some(rel) = body[cursor..].find(['{', '[']) {
            let start = cursor + rel;
            let Some(end) = balanced_end(body, start) else {
                debug!(offset = offset + start, "Dropping unterminated tool-call fragment");
                break;
            };
            self.parse_fragment(&body[start..end], offset + start, out);
            cursor = end;
        }
    }

    /// `ACTION: name` + `ACTION INPUT: {..}`, read as an `action`/`action_input` object
    fn pair_action_input(&self, name: &str, input: &Section<'_>, out: &mut Extraction) {
        let body = input.body.trim();
        let offset = input.offset + (input.body.len() - input.body.trim_start().len());

        let action_input = if body.is_empty() {
            Value::Object(Map::new())
        } else if let Some(end) = balanced_end(body, 0) {
            if !out.seen_fragments.insert(offset) {
                return;
            }
            match serde_json::from_str::<Value>(&body[..end]) {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, "Dropping malformed action input");
                    return;
                }
            }
        } else {
            Value::String(body.to_string())
        };

        let pair = Map::from_iter([
            ("action".to_string(), Value::String(name.to_string())),
            ("action_input".to_string(), action_input),
        ]);
        out.tool_calls.extend(self.normalize(&Value::Object(pair)));
    }

    fn parse_fragment(&self, fragment: &str, offset: usize, out: &mut Extraction) {
        if !out.seen_fragments.insert(offset) {
            return;
        }
        match serde_json::from_str::<Value>(fragment) {
            Ok(value) => out.tool_calls.extend(self.normalize(&value)),
            Err(err) => debug!(error = %err, "Dropping malformed tool-call fragment"),
        }
    }
}

fn fallback_answer(raw: &str) -> Option<String> {
    FALLBACK_ANSWERS.iter().find_map(|re| {
        re.captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret(text: &str) -> Interpretation {
        ResponseInterpreter::new().interpret(text)
    }

    #[test]
    fn test_function_arguments_shape() {
        let out = interpret(r#"TOOL: {"function":"search","arguments":{"q":"x"}}"#);
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].tool, "search");
        assert_eq!(Value::Object(out.tool_calls[0].parameters.clone()), json!({"q": "x"}));
    }

    #[test]
    fn test_unrecognised_text_is_empty_not_error() {
        let out = interpret("Sure, I think the weather is nice today.");
        assert_eq!(out.steps, vec![ReasoningStep::thought(PLACEHOLDER_THOUGHT)]);
        assert_eq!(out.final_answer, "");
        assert!(out.tool_calls.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_fragment_dropped_others_kept() {
        let text = r#"TOOL_CALL: {"tool": "read_file", "parameters": {path: broken}}
TOOL_CALL: {"tool": "list_directory", "parameters": {"path": "."}}
FINAL ANSWER: Listing the directory instead."#;
        let out = interpret(text);
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].tool, "list_directory");
        assert_eq!(out.final_answer, "Listing the directory instead.");
    }

    #[test]
    fn test_react_trace() {
        let text = "THOUGHT: I should look at the file\n\
                    ACTION: {\"tool\": \"read_file\", \"parameters\": {\"path\": \"a.rs\"}}\n\
                    OBSERVATION: file has 10 lines\n\
                    THOUGHT: Now I know\n\
                    FINAL_ANSWER: It has ten lines.";
        let out = interpret(text);
        assert_eq!(out.steps.len(), 2);
        assert_eq!(out.steps[0].thought, "I should look at the file");
        assert!(out.steps[0].action.as_deref().unwrap().contains("read_file"));
        assert_eq!(out.steps[0].observation.as_deref(), Some("file has 10 lines"));
        assert_eq!(out.steps[1].thought, "Now I know");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.final_answer, "It has ten lines.");
    }

    #[test]
    fn test_reasoning_and_analysis_sentinels() {
        let out = interpret("REASONING: two plus two\nANSWER: 4");
        assert_eq!(out.steps[0].thought, "two plus two");
        assert_eq!(out.final_answer, "4");

        let out = interpret("ANALYSIS: user greets me\nRESPONSE: Hello!");
        assert_eq!(out.steps[0].thought, "user greets me");
        assert_eq!(out.final_answer, "Hello!");
    }

    #[test]
    fn test_final_answer_outranks_answer() {
        let out = interpret("ANSWER: draft\nFINAL ANSWER: polished");
        assert_eq!(out.final_answer, "polished");
    }

    #[test]
    fn test_fallback_answer_patterns() {
        assert_eq!(interpret("blah blah. Final answer - 42").final_answer, "42");
        assert_eq!(interpret("**Final Answer**: done").final_answer, "done");
        assert_eq!(
            interpret("<final_answer>wrapped</final_answer> trailing").final_answer,
            "wrapped"
        );
    }

    #[test]
    fn test_vendor_shapes_normalise() {
        let interp = ResponseInterpreter::new();
        let shapes = [
            json!({"tool": "t", "parameters": {"a": 1}}),
            json!({"function": "t", "arguments": {"a": 1}}),
            json!({"function": "t", "arguments": "{\"a\": 1}"}),
            json!({"name": "t", "params": {"a": 1}}),
            json!({"name": "t", "input": {"a": 1}}),
            json!({"tool": "t", "args": {"a": 1}}),
            json!({"tool": "t", "a": 1}),
            json!({"type": "function", "function": {"name": "t", "arguments": "{\"a\":1}"}}),
            json!({"action": "t", "action_input": {"a": 1}}),
        ];
        for shape in shapes {
            let calls = interp.normalize(&shape);
            assert_eq!(calls.len(), 1, "{shape}");
            assert_eq!(calls[0].tool, "t", "{shape}");
            assert_eq!(calls[0].parameters.get("a"), Some(&json!(1)), "{shape}");
        }
        assert!(interp.normalize(&json!({"nothing": "here"})).is_empty());
    }

    #[test]
    fn test_bracketed_and_tagged_shapes() {
        let text = r#"[TOOL_CALLS] [{"name": "a", "arguments": {}}, {"name": "b", "arguments": {"x": 1}}]"#;
        let out = interpret(text);
        let names: Vec<_> = out.tool_calls.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(names, ["a", "b"]);

        let text = "<tool_call>\n{\"name\": \"c\", \"arguments\": {\"id\": 3}}\n</tool_call>";
        let out = interpret(text);
        assert_eq!(out.tool_calls[0].tool, "c");
        assert_eq!(out.tool_calls[0].parameters["id"], json!(3));
    }

    #[test]
    fn test_fenced_block_inside_sentinel_counted_once() {
        let text = "TOOL:\n```json\n{\"tool\": \"x\", \"parameters\": {}}\n```";
        let out = interpret(text);
        assert_eq!(out.tool_calls.len(), 1);
    }

    #[test]
    fn test_call_id_preserved() {
        let out = interpret(r#"TOOL: {"id": "call_1", "tool": "x", "parameters": {"k": "v"}}"#);
        assert_eq!(out.tool_calls[0].id.as_deref(), Some("call_1"));
        assert!(!out.tool_calls[0].parameters.contains_key("id"));
    }

    #[test]
    fn test_delegation_sentinel() {
        let out = interpret("ANALYSIS: this is about files\nDELEGATE: @files");
        assert_eq!(out.delegate_to.as_deref(), Some("files"));
        assert!(!out.is_empty());
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scanner() {
        let out = interpret(r#"TOOL: {"tool": "echo", "parameters": {"text": "a } b { c"}}"#);
        assert_eq!(out.tool_calls[0].parameters["text"], json!("a } b { c"));
    }

    #[test]
    fn test_action_name_paired_with_action_input() {
        let out = interpret("Thought: need file\nAction: read_file\nAction Input: {\"path\": \"README.md\"}");
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].tool, "read_file");
        assert_eq!(out.tool_calls[0].parameters["path"], json!("README.md"));
        assert_eq!(out.steps[0].thought, "need file");
        assert_eq!(out.steps[0].action.as_deref(), Some("read_file"));

        let out = interpret("ACTION: `search`\nACTION_INPUT: rust traits");
        assert_eq!(out.tool_calls[0].tool, "search");
        assert_eq!(out.tool_calls[0].parameters["input"], json!("rust traits"));
    }

    #[test]
    fn test_bare_action_without_input_is_not_a_call() {
        let out = interpret("THOUGHT: maybe later\nACTION: read_file\nFINAL ANSWER: not yet");
        assert!(out.tool_calls.is_empty());
        assert_eq!(out.final_answer, "not yet");
    }

    #[test]
    fn test_inline_json_in_prose() {
        let out = interpret(r#"I'll read it. {"tool": "read_file", "parameters": {"path": "README.md"}}"#);
        assert_eq!(out.tool_calls.len(), 1);
        assert_eq!(out.tool_calls[0].tool, "read_file");
        assert_eq!(out.tool_calls[0].parameters["path"], json!("README.md"));
    }

    #[test]
    fn test_inline_scan_skips_claimed_and_plain_json() {
        let text = r#"Here is some data: {"count": 3, "items": [1, 2]} and a wrapped call {"result": {"name": "b", "arguments": {}}}
TOOL: {"tool": "a", "parameters": {}}"#;
        let out = interpret(text);
        let names: Vec<_> = out.tool_calls.iter().map(|c| c.tool.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn test_unterminated_fragment_keeps_answer() {
        let out = interpret("TOOL: {\"tool\": \"x\", \"parameters\": {\nANSWER: partial");
        assert!(out.tool_calls.is_empty());
        assert_eq!(out.final_answer, "partial");
    }
}
