//! Built-in condition kinds (§4.4): `text`, `limiter`, `time`,
//! `checkbox`, `select`, and one `custom` example (`author_is_op`) that
//! needs a moderator-API lookup to resolve, demonstrating
//! `_show_unprocessed` (§4.4 "such conditions carry `_show_unprocessed =
//! true` so that context recording can elide the expensive fetch when
//! the rule short-circuited earlier").

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use forumod_contracts::content_like::ContentLike;
use forumod_contracts::moderator::ModeratorClient;
use forumod_model::{ConditionDescriptor, ModelError};

use super::{OptionDesc, OptionKind};

/// A template's pass/fail check plus the value it records for
/// `ProcessContext` (§4.5 "Context persistence"). `show_unprocessed`
/// mirrors `_show_unprocessed` from §4.4: `true` means the template's
/// value is expensive to compute and should be recorded as "not
/// evaluated" rather than force-evaluated purely for context when a
/// rule's evaluation already short-circuited past it.
#[async_trait]
pub trait ConditionTemplate: Send + Sync + std::fmt::Debug {
    async fn evaluate(&self, content: &dyn ContentLike, client: &dyn ModeratorClient) -> bool;

    fn show_unprocessed(&self) -> bool {
        false
    }
}

/// A condition attached to a rule, built from its descriptor by
/// [`super::ConditionRegistry`]. `template` is `None` when the
/// descriptor's `type`/`options` failed validation — `valid` is then
/// `false` and the condition is excluded from evaluation (§7).
pub struct Condition {
    pub type_tag: String,
    pub key: Option<String>,
    pub priority: f32,
    pub valid: bool,
    template: Option<Box<dyn ConditionTemplate>>,
}

impl std::fmt::Debug for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Condition")
            .field("type_tag", &self.type_tag)
            .field("key", &self.key)
            .field("priority", &self.priority)
            .field("valid", &self.valid)
            .finish()
    }
}

impl Condition {
    pub fn valid(desc: &ConditionDescriptor, template: Box<dyn ConditionTemplate>) -> Self {
        Self {
            type_tag: desc.type_tag.clone(),
            key: desc.key.clone(),
            priority: desc.priority,
            valid: true,
            template: Some(template),
        }
    }

    pub fn invalid(desc: &ConditionDescriptor) -> Self {
        Self {
            type_tag: desc.type_tag.clone(),
            key: desc.key.clone(),
            priority: desc.priority,
            valid: false,
            template: None,
        }
    }

    pub fn identity(&self) -> String {
        match &self.key {
            Some(key) => format!("{}:{key}", self.type_tag),
            None => self.type_tag.clone(),
        }
    }

    pub fn show_unprocessed(&self) -> bool {
        self.template
            .as_ref()
            .map(|t| t.show_unprocessed())
            .unwrap_or(false)
    }

    /// Evaluates the condition. An invalid condition is always `false`
    /// and is never supposed to reach this path (the evaluator filters
    /// invalid conditions out of its rule groups first).
    pub async fn evaluate(&self, content: &dyn ContentLike, client: &dyn ModeratorClient) -> bool {
        match &self.template {
            Some(t) => t.evaluate(content, client).await,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------
// text
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TextOptionsRaw {
    text: String,
    #[serde(default)]
    is_regex: bool,
    #[serde(default)]
    ignore_case: bool,
    #[serde(default = "default_text_attr")]
    attr: TextAttr,
}

fn default_text_attr() -> TextAttr {
    TextAttr::ContentText
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TextAttr {
    ContentText,
    Title,
    UserName,
}

#[derive(Debug)]
struct TextCondition {
    text: String,
    ignore_case: bool,
    attr: TextAttr,
    regex: Option<Regex>,
}

fn text_attr_value<'a>(content: &'a dyn ContentLike, attr: TextAttr) -> &'a str {
    match attr {
        TextAttr::ContentText => content.text(),
        TextAttr::Title => content.title(),
        TextAttr::UserName => content.user().display_name(),
    }
}

#[async_trait]
impl ConditionTemplate for TextCondition {
    async fn evaluate(&self, content: &dyn ContentLike, _client: &dyn ModeratorClient) -> bool {
        let haystack = text_attr_value(content, self.attr);
        if let Some(re) = &self.regex {
            re.is_match(haystack)
        } else if self.ignore_case {
            haystack.to_lowercase().contains(&self.text.to_lowercase())
        } else {
            haystack.contains(&self.text)
        }
    }
}

pub fn build_text(options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    let raw: TextOptionsRaw = serde_json::from_value(options.clone())?;
    if raw.text.is_empty() {
        return Err(ModelError::InvalidOption("text condition: text must not be empty".into()));
    }
    let regex = if raw.is_regex {
        let pattern = if raw.ignore_case {
            format!("(?i){}", raw.text)
        } else {
            raw.text.clone()
        };
        Some(Regex::new(&pattern)?)
    } else {
        None
    };
    Ok(Box::new(TextCondition {
        text: raw.text,
        ignore_case: raw.ignore_case,
        attr: raw.attr,
        regex,
    }))
}

pub fn text_option_descs() -> Vec<OptionDesc> {
    vec![
        OptionDesc {
            key: "text",
            label: "Match text",
            default: Value::String(String::new()),
            kind: OptionKind::Text,
        },
        OptionDesc {
            key: "is_regex",
            label: "Treat as regex",
            default: Value::Bool(false),
            kind: OptionKind::Bool,
        },
        OptionDesc {
            key: "ignore_case",
            label: "Ignore case",
            default: Value::Bool(false),
            kind: OptionKind::Bool,
        },
    ]
}

// ---------------------------------------------------------------------
// limiter
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct LimiterOptionsRaw {
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
    #[serde(default)]
    eq: Option<f64>,
    #[serde(default = "default_numeric_attr")]
    attr: NumericAttr,
}

fn default_numeric_attr() -> NumericAttr {
    NumericAttr::Floor
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NumericAttr {
    Floor,
    CreateTime,
    UserLevel,
}

fn numeric_attr_value(content: &dyn ContentLike, attr: NumericAttr) -> f64 {
    match attr {
        NumericAttr::Floor => content.floor() as f64,
        NumericAttr::CreateTime => content.create_time() as f64,
        NumericAttr::UserLevel => content.user().level as f64,
    }
}

#[derive(Debug)]
struct LimiterCondition {
    min: Option<f64>,
    max: Option<f64>,
    attr: NumericAttr,
}

#[async_trait]
impl ConditionTemplate for LimiterCondition {
    async fn evaluate(&self, content: &dyn ContentLike, _client: &dyn ModeratorClient) -> bool {
        let value = numeric_attr_value(content, self.attr);
        let min_ok = self.min.map(|m| value >= m).unwrap_or(true);
        let max_ok = self.max.map(|m| value <= m).unwrap_or(true);
        min_ok && max_ok
    }
}

pub fn build_limiter(options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    let raw: LimiterOptionsRaw = serde_json::from_value(options.clone())?;
    let (min, max) = match raw.eq {
        Some(eq) => (Some(eq), Some(eq)),
        None => (raw.min, raw.max),
    };
    if min.is_none() && max.is_none() {
        return Err(ModelError::InvalidOption(
            "limiter condition: at least one of min/max/eq must be set".into(),
        ));
    }
    Ok(Box::new(LimiterCondition {
        min,
        max,
        attr: raw.attr,
    }))
}

pub fn limiter_option_descs() -> Vec<OptionDesc> {
    vec![
        OptionDesc {
            key: "min",
            label: "Minimum",
            default: Value::Null,
            kind: OptionKind::Number,
        },
        OptionDesc {
            key: "max",
            label: "Maximum",
            default: Value::Null,
            kind: OptionKind::Number,
        },
        OptionDesc {
            key: "eq",
            label: "Exactly",
            default: Value::Null,
            kind: OptionKind::Number,
        },
    ]
}

// ---------------------------------------------------------------------
// time
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TimeOptionsRaw {
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug)]
struct TimeCondition {
    start: Option<i64>,
    end: Option<i64>,
}

#[async_trait]
impl ConditionTemplate for TimeCondition {
    async fn evaluate(&self, content: &dyn ContentLike, _client: &dyn ModeratorClient) -> bool {
        let t = content.create_time();
        let start_ok = self.start.map(|s| t >= s).unwrap_or(true);
        let end_ok = self.end.map(|e| t <= e).unwrap_or(true);
        start_ok && end_ok
    }
}

fn parse_time_bound(raw: &str) -> Result<i64, ModelError> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map(|dt| dt.and_utc().timestamp())
        .map_err(|_| ModelError::InvalidOption(format!("time condition: bad timestamp {raw:?}")))
}

pub fn build_time(options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    let raw: TimeOptionsRaw = serde_json::from_value(options.clone())?;
    let start = raw.start.as_deref().map(parse_time_bound).transpose()?;
    let end = raw.end.as_deref().map(parse_time_bound).transpose()?;
    if start.is_none() && end.is_none() {
        return Err(ModelError::InvalidOption(
            "time condition: at least one of start/end must be set".into(),
        ));
    }
    Ok(Box::new(TimeCondition { start, end }))
}

pub fn time_option_descs() -> Vec<OptionDesc> {
    vec![
        OptionDesc {
            key: "start",
            label: "Start (YYYY-MM-DD HH:MM:SS)",
            default: Value::Null,
            kind: OptionKind::Text,
        },
        OptionDesc {
            key: "end",
            label: "End (YYYY-MM-DD HH:MM:SS)",
            default: Value::Null,
            kind: OptionKind::Text,
        },
    ]
}

// ---------------------------------------------------------------------
// checkbox
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CheckboxOptionsRaw {
    #[serde(default)]
    values: Vec<String>,
}

#[derive(Debug)]
struct CheckboxCondition {
    values: Vec<String>,
}

#[async_trait]
impl ConditionTemplate for CheckboxCondition {
    async fn evaluate(&self, content: &dyn ContentLike, _client: &dyn ModeratorClient) -> bool {
        self.values.iter().any(|v| v == content.kind().as_str())
    }
}

pub fn build_checkbox(options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    let raw: CheckboxOptionsRaw = serde_json::from_value(options.clone())?;
    if raw.values.is_empty() {
        return Err(ModelError::InvalidOption(
            "checkbox condition: values must not be empty".into(),
        ));
    }
    Ok(Box::new(CheckboxCondition { values: raw.values }))
}

pub fn checkbox_option_descs() -> Vec<OptionDesc> {
    vec![OptionDesc {
        key: "values",
        label: "Content types",
        default: Value::Array(vec![]),
        kind: OptionKind::Select,
    }]
}

// ---------------------------------------------------------------------
// select
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SelectOptionsRaw {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug)]
struct SelectCondition {
    value: String,
}

#[async_trait]
impl ConditionTemplate for SelectCondition {
    async fn evaluate(&self, content: &dyn ContentLike, _client: &dyn ModeratorClient) -> bool {
        content.kind().as_str() == self.value
    }
}

pub fn build_select(options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    let raw: SelectOptionsRaw = serde_json::from_value(options.clone())?;
    let value = raw
        .value
        .ok_or_else(|| ModelError::InvalidOption("select condition: value must be set".into()))?;
    Ok(Box::new(SelectCondition { value }))
}

pub fn select_option_descs() -> Vec<OptionDesc> {
    vec![OptionDesc {
        key: "value",
        label: "Content type",
        default: Value::Null,
        kind: OptionKind::Select,
    }]
}

// ---------------------------------------------------------------------
// custom: author_is_op
// ---------------------------------------------------------------------

/// Whether the content's author is the original poster of its own
/// thread. Takes no options, but needs a moderator-API lookup to
/// resolve (`ModeratorClient::is_thread_author`), so it carries
/// `_show_unprocessed = true`: a rule that short-circuits before
/// reaching this condition shouldn't pay for the lookup just to record
/// context (§4.4).
#[derive(Debug)]
struct AuthorIsOpCondition;

#[async_trait]
impl ConditionTemplate for AuthorIsOpCondition {
    async fn evaluate(&self, content: &dyn ContentLike, client: &dyn ModeratorClient) -> bool {
        if content.is_thread() {
            return true;
        }
        client.is_thread_author(content).await.unwrap_or(false)
    }

    fn show_unprocessed(&self) -> bool {
        true
    }
}

pub fn build_author_is_op(_options: &Value) -> Result<Box<dyn ConditionTemplate>, ModelError> {
    Ok(Box::new(AuthorIsOpCondition))
}

pub fn author_is_op_option_descs() -> Vec<OptionDesc> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_requires_nonempty() {
        assert!(build_text(&serde_json::json!({"text": ""})).is_err());
        assert!(build_text(&serde_json::json!({"text": "spam"})).is_ok());
    }

    #[test]
    fn limiter_requires_a_bound() {
        assert!(build_limiter(&serde_json::json!({})).is_err());
        assert!(build_limiter(&serde_json::json!({"min": 1.0})).is_ok());
        assert!(build_limiter(&serde_json::json!({"eq": 5.0})).is_ok());
    }

    #[test]
    fn time_requires_a_bound() {
        assert!(build_time(&serde_json::json!({})).is_err());
        assert!(build_time(&serde_json::json!({"start": "2024-01-01 00:00:00"})).is_ok());
    }

    #[test]
    fn checkbox_requires_nonempty_values() {
        assert!(build_checkbox(&serde_json::json!({"values": []})).is_err());
        assert!(build_checkbox(&serde_json::json!({"values": ["thread"]})).is_ok());
    }

    #[test]
    fn select_requires_value() {
        assert!(build_select(&serde_json::json!({})).is_err());
        assert!(build_select(&serde_json::json!({"value": "thread"})).is_ok());
    }
}
