//! The rule and rule-group evaluator (C3, §4.5-§4.6): compiles a user's
//! `RuleConfig` list into runnable `CompiledRule`s, evaluates
//! whitelist-then-blacklist precedence, and records deduplicated
//! condition context.

use std::collections::BTreeMap;

use forumod_contracts::content_like::ContentLike;
use forumod_contracts::moderator::{ModeratorClient, ModeratorOperation};
use forumod_model::config::{ForumConfig, UserConfig};
use forumod_model::ids::UserId;
use forumod_model::process::{ProcessContext, ProcessLog, RuleContext, StepStatus};
use forumod_model::rule::{LogicExpr, OperationDescriptor, RuleConfig};
use serde_json::Value;

use crate::error::Result;
use crate::registry::{build_operations, expand_operations, Condition, ConditionRegistry};

/// A rule compiled against a registry: its conditions built and
/// (in)validated, its boolean-expression `logic` (if any) parsed once,
/// and its operation group built into runnable templates.
pub struct CompiledRule {
    pub name: String,
    pub manual_confirm: bool,
    pub whitelist: bool,
    pub force_record_context: bool,
    conditions: Vec<Condition>,
    logic: Option<LogicExpr>,
    pub operations: Vec<(Box<dyn ModeratorOperation>, bool)>,
    /// Declarative twin of `operations`, same order, kept so the
    /// dispatcher can snapshot the non-direct remainder into a
    /// `ConfirmData` for later re-execution (§3 `ConfirmData.operations`).
    pub op_descs: Vec<OperationDescriptor>,
}

impl CompiledRule {
    pub fn compile(rule: &RuleConfig, registry: &ConditionRegistry) -> Result<Self> {
        let conditions = rule.conditions.iter().map(|d| registry.build(d)).collect();
        let logic = match &rule.logic {
            Some(spec) => {
                let mut spec = spec.clone();
                Some(spec.ast()?.clone())
            }
            None => None,
        };
        let op_descs = expand_operations(&rule.operations)?;
        let operations = build_operations(&op_descs)?;
        Ok(Self {
            name: rule.name.clone(),
            manual_confirm: rule.manual_confirm,
            whitelist: rule.whitelist,
            force_record_context: rule.force_record_context,
            conditions,
            logic,
            operations,
            op_descs,
        })
    }

    async fn check(&self, content: &dyn ContentLike, client: &dyn ModeratorClient) -> RuleCheck {
        match &self.logic {
            None => evaluate_strict_and(&self.conditions, content, client).await,
            Some(ast) => evaluate_logic(&self.conditions, ast, content, client).await,
        }
    }
}

/// One rule's evaluation outcome (§4.5 `CheckResult`): whether it
/// matched, the `step_status` to persist, and every condition index
/// whose truth was actually computed, paired with its result.
struct RuleCheck {
    result: bool,
    step_status: StepStatus,
    values: BTreeMap<usize, bool>,
}

/// Strict-AND, priority-descending, short-circuit-on-false (§4.5,
/// "without logic").
async fn evaluate_strict_and(
    conditions: &[Condition],
    content: &dyn ContentLike,
    client: &dyn ModeratorClient,
) -> RuleCheck {
    let mut order: Vec<usize> = conditions
        .iter()
        .enumerate()
        .filter(|(_, c)| c.valid)
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| {
        conditions[b]
            .priority
            .partial_cmp(&conditions[a].priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut values = BTreeMap::new();
    for idx in order {
        let ok = conditions[idx].evaluate(content, client).await;
        values.insert(idx, ok);
        if !ok {
            return RuleCheck {
                result: false,
                step_status: StepStatus::ShortCircuit { index: idx },
                values,
            };
        }
    }
    RuleCheck {
        result: true,
        step_status: StepStatus::Matched,
        values,
    }
}

/// `logic`-driven evaluation with priority-group re-ordering and
/// early-true detection (§4.5, "with logic").
async fn evaluate_logic(
    conditions: &[Condition],
    ast: &LogicExpr,
    content: &dyn ContentLike,
    client: &dyn ModeratorClient,
) -> RuleCheck {
    let necessary = ast.necessary_indices();
    let mut order: Vec<usize> = conditions
        .iter()
        .enumerate()
        .filter(|(_, c)| c.valid)
        .map(|(i, _)| i)
        .collect();
    order.sort_by(|&a, &b| {
        let boost = |i: usize| if necessary.contains(&i) { 0.5 } else { 0.0 };
        let pa = conditions[a].priority + boost(a);
        let pb = conditions[b].priority + boost(b);
        pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut known = BTreeMap::new();
    for idx in order {
        let ok = conditions[idx].evaluate(content, client).await;
        known.insert(idx, ok);
        if ast.eval_partial(&known) {
            return RuleCheck {
                result: true,
                step_status: partition(&known),
                values: known,
            };
        }
    }
    let result = ast.eval_partial(&known);
    RuleCheck {
        result,
        step_status: partition(&known),
        values: known,
    }
}

fn partition(known: &BTreeMap<usize, bool>) -> StepStatus {
    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for (&idx, &ok) in known {
        if ok {
            successes.push(idx);
        } else {
            failures.push(idx);
        }
    }
    StepStatus::Partition { successes, failures }
}

/// Per-user rule driver (§4.5 "Processer"): whitelist rules veto action,
/// blacklist rules select the operation group to run.
pub struct Processer {
    pub whitelist_rules: Vec<CompiledRule>,
    pub blacklist_rules: Vec<CompiledRule>,
    fast_process: bool,
    record_all_context: bool,
}

impl Processer {
    pub fn compile(user: &UserConfig, registry: &ConditionRegistry) -> Result<Self> {
        let mut whitelist_rules = Vec::new();
        let mut blacklist_rules = Vec::new();
        for rule in &user.rules {
            let compiled = CompiledRule::compile(rule, registry)?;
            if compiled.whitelist {
                whitelist_rules.push(compiled);
            } else {
                blacklist_rules.push(compiled);
            }
        }
        Ok(Self {
            whitelist_rules,
            blacklist_rules,
            fast_process: user.process.fast_process,
            record_all_context: user.process.record_all_context,
        })
    }

    /// §4.6 step 1: whether `content` is even in scope for this user.
    pub fn accepts(&self, content: &dyn ContentLike, forum: &ForumConfig, user_enabled: bool) -> bool {
        user_enabled && content.fname() == forum.fname.as_str() && forum.wants(content.kind())
    }

    /// Evaluates whitelist rules, then (if none match) blacklist rules,
    /// per §4.5 steps 2-3. Returns the matched blacklist rule's index
    /// into `blacklist_rules` (`None` if a whitelist rule vetoed action
    /// or nothing matched) plus the audit rows to persist.
    pub async fn process(
        &self,
        content: &dyn ContentLike,
        client: &dyn ModeratorClient,
        user: UserId,
        now: i64,
    ) -> (Option<usize>, ProcessLog, ProcessContext) {
        let pid = content.pid();
        let tid = content.tid();
        let mut conditions_ctx: Vec<(String, Value)> = Vec::new();
        let mut rule_contexts: Vec<RuleContext> = Vec::new();

        for rule in &self.whitelist_rules {
            let check = rule.check(content, client).await;
            if check.result || self.record_all_context || rule.force_record_context {
                record(rule, &check, &mut conditions_ctx, &mut rule_contexts);
            }
            if check.result {
                let log = ProcessLog {
                    pid,
                    user,
                    tid,
                    create_time: content.create_time(),
                    process_time: now,
                    result_rule: Some(rule.name.clone()),
                    is_whitelist: Some(true),
                };
                let context = ProcessContext {
                    pid,
                    user,
                    rules: rule_contexts,
                    conditions: conditions_ctx,
                };
                return (None, log, context);
            }
        }

        let mut matched: Option<usize> = None;
        for (i, rule) in self.blacklist_rules.iter().enumerate() {
            let check = rule.check(content, client).await;
            let is_match = check.result;
            if is_match || self.record_all_context || rule.force_record_context {
                record(rule, &check, &mut conditions_ctx, &mut rule_contexts);
            }
            if is_match && matched.is_none() {
                matched = Some(i);
                if self.fast_process {
                    break;
                }
            }
        }

        let result_rule = matched.map(|i| self.blacklist_rules[i].name.clone());
        let log = ProcessLog {
            pid,
            user,
            tid,
            create_time: content.create_time(),
            process_time: now,
            result_rule,
            is_whitelist: matched.map(|_| false),
        };
        let context = ProcessContext {
            pid,
            user,
            rules: rule_contexts,
            conditions: conditions_ctx,
        };
        (matched, log, context)
    }
}

/// Merges one rule's touched conditions into the deduplicated
/// `conditions_ctx` list (keyed by `"type:key"` identity, §4.5) and
/// appends its `RuleContext` summary.
fn record(
    rule: &CompiledRule,
    check: &RuleCheck,
    conditions_ctx: &mut Vec<(String, Value)>,
    rule_contexts: &mut Vec<RuleContext>,
) {
    let mut indices = Vec::with_capacity(check.values.len());
    for (&idx, &value) in &check.values {
        let identity = rule.conditions[idx].identity();
        let pos = match conditions_ctx.iter().position(|(id, _)| id == &identity) {
            Some(p) => p,
            None => {
                conditions_ctx.push((identity, Value::Bool(value)));
                conditions_ctx.len() - 1
            }
        };
        indices.push(pos);
    }
    rule_contexts.push(RuleContext {
        rule_name: rule.name.clone(),
        condition_indices: indices,
        step_status: check.step_status.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use forumod_contracts::error::ContractError;
    use forumod_contracts::moderator::ClientStatus;
    use forumod_model::content::{Comment, Content};
    use forumod_model::config::{ForumConfig, ProcessConfig};
    use forumod_model::ids::{Fname, Pid, Tid, UserId as ModelUserId};
    use forumod_model::rule::{ConditionDescriptor, OperationSpec, OperationShorthand};
    use forumod_model::user::User;

    struct FakeClient;

    #[async_trait]
    impl ModeratorClient for FakeClient {
        fn status(&self) -> ClientStatus {
            ClientStatus::Success
        }
        async fn delete(&self, _content: &dyn ContentLike) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn delete_thread(
            &self,
            _fname: &str,
            _tid: forumod_model::ids::Tid,
        ) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn block(
            &self,
            _content: &dyn ContentLike,
            _day: u32,
            _reason: &str,
        ) -> std::result::Result<bool, ContractError> {
            Ok(true)
        }
        async fn is_thread_author(
            &self,
            _content: &dyn ContentLike,
        ) -> std::result::Result<bool, ContractError> {
            Ok(false)
        }
    }

    fn sample_content(text: &str, user_name: &str) -> Content {
        Content::Comment(Comment {
            fname: Fname::from("f1"),
            tid: Tid(100),
            pid: Pid(101),
            title: "hi".into(),
            text: text.into(),
            create_time: 1_700_000_000,
            floor: 2,
            user: User {
                user_id: forumod_model::ids::UserId(7),
                user_name: Some(user_name.into()),
                nick_name: "nick".into(),
                portrait: "p".into(),
                level: 3,
            },
        })
    }

    fn rule(name: &str, whitelist: bool, text: &str) -> RuleConfig {
        rule_with_attr(name, whitelist, text, "content_text")
    }

    fn rule_with_attr(name: &str, whitelist: bool, text: &str, attr: &str) -> RuleConfig {
        RuleConfig {
            name: name.into(),
            manual_confirm: false,
            operations: OperationSpec::Shorthand(OperationShorthand::Delete),
            conditions: vec![ConditionDescriptor {
                type_tag: "text".into(),
                options: serde_json::json!({"text": text, "attr": attr}),
                priority: 50.0,
                key: None,
            }],
            last_modify: 0,
            whitelist,
            force_record_context: false,
            logic: None,
        }
    }

    #[tokio::test]
    async fn whitelist_vetoes_blacklist_match() {
        let registry = ConditionRegistry::builtin();
        let user = UserConfig {
            username: "u".into(),
            password: None,
            code: None,
            password_last_update: None,
            forum: ForumConfig {
                fname: Fname::from("f1"),
                bduss: None,
                stoken: None,
                block_day: 1,
                block_reason: String::new(),
                thread: true,
                post: true,
                comment: true,
            },
            process: ProcessConfig::default(),
            rules: vec![rule_with_attr("W", true, "good", "user_name"), rule("B", false, "spam")],
            enable: true,
            permission: String::new(),
        };
        let processer = Processer::compile(&user, &registry).unwrap();
        let content = sample_content("spam link", "good");
        let client = FakeClient;
        let (matched, log, _ctx) = processer
            .process(&content, &client, ModelUserId(1), 1_700_000_100)
            .await;
        assert!(matched.is_none());
        assert_eq!(log.result_rule.as_deref(), Some("W"));
        assert_eq!(log.is_whitelist, Some(true));
    }

    #[tokio::test]
    async fn blacklist_matches_when_no_whitelist_hit() {
        let registry = ConditionRegistry::builtin();
        let user = UserConfig {
            username: "u".into(),
            password: None,
            code: None,
            password_last_update: None,
            forum: ForumConfig {
                fname: Fname::from("f1"),
                bduss: None,
                stoken: None,
                block_day: 1,
                block_reason: String::new(),
                thread: true,
                post: true,
                comment: true,
            },
            process: ProcessConfig::default(),
            rules: vec![rule_with_attr("W", true, "good", "user_name"), rule("B", false, "spam")],
            enable: true,
            permission: String::new(),
        };
        let processer = Processer::compile(&user, &registry).unwrap();
        let content = sample_content("spam link", "bad");
        let client = FakeClient;
        let (matched, log, _ctx) = processer
            .process(&content, &client, ModelUserId(1), 1_700_000_100)
            .await;
        assert_eq!(matched, Some(0));
        assert_eq!(log.result_rule.as_deref(), Some("B"));
        assert_eq!(log.is_whitelist, Some(false));
    }
}
