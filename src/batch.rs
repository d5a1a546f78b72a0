//! Request and response files for the external batch classifier.
//!
//! Requests are JSON lines keyed by record identifier (`custom_id`), one chat
//! completion per record. Responses come back as JSON lines keyed the same
//! way; the label is pulled out of the free-text reply on a best-effort basis.
//! Nothing here talks to the network.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::audit::{AuditSink, emit};
use crate::constants::annotate::DEFAULT_TEXT_FIELD;
use crate::constants::batch::{
    CATEGORY_KEY, CONCLUSION_PLACEHOLDER, DEFAULT_MODEL, MAX_TOKENS, NO_JSON_LABEL,
    OUTPUT_COLUMN, REQUEST_METHOD, REQUEST_URL, RESPONSE_FORMAT, SYSTEM_PROMPT,
    TAXONOMY_PLACEHOLDER,
};
use crate::constants::loader::ID_COLUMN;
use crate::data::Table;
use crate::errors::PrepError;
use crate::transport::tsv::write_table;
use crate::types::{ColumnName, Label, RecordId};

/// One chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    pub content: String,
}

/// `{"type": "json_object"}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: ResponseFormat,
    pub max_tokens: u32,
}

/// One line of a request file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub custom_id: RecordId,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

#[derive(Debug, Deserialize)]
struct ResponseLine {
    custom_id: RecordId,
    response: ResponseEnvelope,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    body: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Prompt material and column names used to build requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSettings {
    pub model: String,
    /// Template with `{taxonomy}` and `{conclusion}` placeholders; `{{`/`}}` are literal braces.
    pub prompt_template: String,
    pub taxonomy: String,
    pub id_column: ColumnName,
    pub text_column: ColumnName,
}

impl RequestSettings {
    pub fn new(prompt_template: impl Into<String>, taxonomy: impl Into<String>) -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            prompt_template: prompt_template.into(),
            taxonomy: taxonomy.into(),
            id_column: ID_COLUMN.to_string(),
            text_column: DEFAULT_TEXT_FIELD.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Substitute `{taxonomy}` and `{conclusion}` in one pass over `template`.
///
/// Substituted text is not rescanned. Any other `{...}` is rejected.
pub fn render_prompt(template: &str, taxonomy: &str, conclusion: &str) -> Result<String, PrepError> {
    let mut rendered = String::with_capacity(template.len() + taxonomy.len() + conclusion.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        rendered.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{{") {
            rendered.push('{');
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            rendered.push('}');
            rest = after;
        } else if let Some(after) = tail.strip_prefix(TAXONOMY_PLACEHOLDER) {
            rendered.push_str(taxonomy);
            rest = after;
        } else if let Some(after) = tail.strip_prefix(CONCLUSION_PLACEHOLDER) {
            rendered.push_str(conclusion);
            rest = after;
        } else {
            let near: String = tail.chars().take(24).collect();
            return Err(PrepError::Configuration(format!(
                "unsupported placeholder in prompt template near '{near}'"
            )));
        }
    }
    rendered.push_str(rest);
    Ok(rendered)
}

/// One request per row of `table`. A missing text cell is sent as empty text.
pub fn build_requests(
    table: &Table,
    settings: &RequestSettings,
) -> Result<Vec<BatchRequest>, PrepError> {
    let id_idx = require_column(table, &settings.id_column)?;
    let text_idx = require_column(table, &settings.text_column)?;

    let mut requests = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let Some(id) = table.cell(row, id_idx) else {
            debug!(row, "skipping request row without identifier");
            continue;
        };
        let conclusion = table.cell(row, text_idx).unwrap_or_default();
        let prompt = render_prompt(&settings.prompt_template, &settings.taxonomy, conclusion)?;
        requests.push(BatchRequest {
            custom_id: id.to_string(),
            method: REQUEST_METHOD.to_string(),
            url: REQUEST_URL.to_string(),
            body: RequestBody {
                model: settings.model.clone(),
                messages: vec![
                    ChatMessage {
                        role: "system".to_string(),
                        content: SYSTEM_PROMPT.to_string(),
                    },
                    ChatMessage {
                        role: "user".to_string(),
                        content: prompt,
                    },
                ],
                response_format: ResponseFormat {
                    kind: RESPONSE_FORMAT.to_string(),
                },
                max_tokens: MAX_TOKENS,
            },
        });
    }
    Ok(requests)
}

/// Write `requests` as JSON lines.
pub fn write_request_file(
    requests: &[BatchRequest],
    path: &Path,
    sink: Option<&dyn AuditSink>,
) -> Result<(), PrepError> {
    let mut writer = BufWriter::new(File::create(path)?);
    for request in requests {
        serde_json::to_writer(&mut writer, request)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    emit(
        sink,
        format!("* wrote {} requests to {}!", requests.len(), path.display()),
    );
    Ok(())
}

/// Read a response file into `(identifier, cleaned label)` pairs, in file order.
pub fn read_response_file(path: &Path) -> Result<Vec<(RecordId, Label)>, PrepError> {
    let content = fs::read_to_string(path)?;
    let mut labels = Vec::new();
    for (line_idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: ResponseLine = serde_json::from_str(line).map_err(|err| {
            PrepError::parse(path, format!("line {}: {err}", line_idx + 1))
        })?;
        let Some(choice) = parsed.response.body.choices.into_iter().next() else {
            return Err(PrepError::missing_field(
                "choices",
                format!("response for {}", parsed.custom_id),
            ));
        };
        labels.push((parsed.custom_id, clean_label(&choice.message.content)?));
    }
    Ok(labels)
}

/// Extract the category label from a free-text classifier reply.
///
/// Takes the span from the first `{` to the last `}`, reads its `category`,
/// keeps the part after the last `-`, drops everything but ASCII letters,
/// whitespace and `/`, and lower-cases the result.
pub fn clean_label(raw: &str) -> Result<Label, PrepError> {
    let span = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => return Ok(NO_JSON_LABEL.to_string()),
    };
    let payload: Value = serde_json::from_str(span)?;
    let category = payload
        .get(CATEGORY_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| PrepError::missing_field(CATEGORY_KEY, "classification payload"))?;
    let tail = category.rsplit('-').next().unwrap_or(category).trim();
    let kept: String = tail
        .chars()
        .filter(|ch| ch.is_ascii_alphabetic() || ch.is_whitespace() || *ch == '/')
        .collect();
    Ok(kept.trim().to_lowercase())
}

/// Write `(identifier, label)` pairs as a two-column table.
pub fn write_label_table(
    labels: &[(RecordId, Label)],
    path: &Path,
    sink: Option<&dyn AuditSink>,
) -> Result<(), PrepError> {
    let mut table = Table::with_columns([ID_COLUMN, OUTPUT_COLUMN]);
    for (id, label) in labels {
        table.push_row(vec![Some(id.clone()), Some(label.clone())]);
    }
    write_table(&table, path)?;
    emit(
        sink,
        format!("* converted {} responses to {}!", labels.len(), path.display()),
    );
    Ok(())
}

fn require_column(table: &Table, column: &str) -> Result<usize, PrepError> {
    table
        .column_index(column)
        .ok_or_else(|| PrepError::Configuration(format!("request table has no column '{column}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use tempfile::tempdir;

    #[test]
    fn render_prompt_substitutes_once_and_unescapes_braces() {
        let rendered = render_prompt(
            "Taxonomy:\n{taxonomy}\nSentence: {conclusion}\nReply as {{\"category\": ...}}",
            "1 - new finding",
            "We show {conclusion} literally.",
        )
        .unwrap();
        assert_eq!(
            rendered,
            "Taxonomy:\n1 - new finding\nSentence: We show {conclusion} literally.\nReply as {\"category\": ...}"
        );
        assert!(matches!(
            render_prompt("{unknown}", "t", "c"),
            Err(PrepError::Configuration(_))
        ));
    }

    #[test]
    fn requests_carry_identifier_and_prompt() {
        let mut table = Table::with_columns(["pmid", "conclusions"]);
        table.push_row(vec![Some("0012".into()), Some("A novel result.".into())]);
        table.push_row(vec![None, Some("orphan".into())]);
        table.push_row(vec![Some("7".into()), None]);
        let settings = RequestSettings::new("{taxonomy}|{conclusion}", "TAX").with_model("m");

        let requests = build_requests(&table, &settings).unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].custom_id, "0012");
        assert_eq!(requests[0].body.model, "m");
        assert_eq!(requests[0].body.messages[0].role, "system");
        assert_eq!(requests[0].body.messages[1].content, "TAX|A novel result.");
        assert_eq!(requests[1].body.messages[1].content, "TAX|");

        let line = serde_json::to_value(&requests[0]).unwrap();
        assert_eq!(line["method"], "POST");
        assert_eq!(line["url"], "/v1/chat/completions");
        assert_eq!(line["body"]["response_format"]["type"], "json_object");
        assert_eq!(line["body"]["max_tokens"], 1000);
    }

    #[test]
    fn request_file_is_one_json_object_per_line() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("requests.jsonl");
        let mut table = Table::with_columns(["pmid", "conclusions"]);
        table.push_row(vec![Some("1".into()), Some("first".into())]);
        table.push_row(vec![Some("2".into()), Some("second".into())]);
        let requests = build_requests(&table, &RequestSettings::new("{conclusion}", "")).unwrap();
        let sink = MemorySink::new();
        write_request_file(&requests, &path, Some(&sink)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<BatchRequest> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed, requests);
        assert!(sink.contains("* wrote 2 requests to"));
    }

    #[test]
    fn clean_label_extracts_category_tail() {
        assert_eq!(
            clean_label("Sure! {\"category\": \"2 - New Finding!\"} Done.").unwrap(),
            "new finding"
        );
        assert_eq!(
            clean_label("{\"category\": \"Incremental/Confirmatory\"}").unwrap(),
            "incremental/confirmatory"
        );
        assert_eq!(clean_label("no payload here").unwrap(), "No JSON found");
        assert_eq!(clean_label("} backwards {").unwrap(), "No JSON found");
        assert!(matches!(clean_label("{not json}"), Err(PrepError::Json(_))));
        assert!(matches!(
            clean_label("{\"label\": \"x\"}"),
            Err(PrepError::MissingField { .. })
        ));
    }

    #[test]
    fn response_file_converts_to_label_table() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("responses.jsonl");
        let output = temp.path().join("labels.tsv");
        let line = |id: &str, content: &str| {
            serde_json::json!({
                "custom_id": id,
                "response": {"body": {"choices": [{"message": {"role": "assistant", "content": content}}]}}
            })
            .to_string()
        };
        std::fs::write(
            &input,
            format!(
                "{}\n\n{}\n",
                line("31", "{\"category\": \"1 - New finding\"}"),
                line("32", "I cannot classify this.")
            ),
        )
        .unwrap();

        let labels = read_response_file(&input).unwrap();
        assert_eq!(
            labels,
            vec![
                ("31".to_string(), "new finding".to_string()),
                ("32".to_string(), "No JSON found".to_string()),
            ]
        );
        let sink = MemorySink::new();
        write_label_table(&labels, &output, Some(&sink)).unwrap();
        assert_eq!(
            std::fs::read_to_string(&output).unwrap(),
            "pmid\toutput\n31\tnew finding\n32\tNo JSON found\n"
        );
    }

    #[test]
    fn malformed_response_line_reports_position() {
        let temp = tempdir().unwrap();
        let input = temp.path().join("responses.jsonl");
        std::fs::write(&input, "{\"custom_id\": \"1\"}\n").unwrap();
        let err = read_response_file(&input).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
