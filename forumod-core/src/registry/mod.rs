//! The condition/operation registry (C2, §4.4): a tag-indexed table
//! mapping a registered string `type` to its option schema, constructor,
//! and (for `custom` kinds) the `option_descs` the admin UI renders.
//!
//! Deserialization of a `ConditionDescriptor`/`OperationDescriptor` goes
//! through here: look up `type`, validate `options` against the
//! registered schema, and build a runnable template. An unregistered tag
//! or a schema mismatch makes the condition/operation permanently
//! invalid at load time (§7 "Rule options invalid") rather than failing
//! at evaluation time.

pub mod conditions;
pub mod operations;

use std::collections::HashMap;

use forumod_contracts::moderator::ModeratorOperation;
use forumod_model::{ConditionDescriptor, ModelError, OperationDescriptor};

pub use conditions::{Condition, ConditionTemplate};
pub use operations::build_operation;

/// One `{key, label, default, kind}` entry a `custom` condition/operation
/// declares so the admin UI can render its options form (§4.4).
#[derive(Debug, Clone)]
pub struct OptionDesc {
    pub key: &'static str,
    pub label: &'static str,
    pub default: serde_json::Value,
    pub kind: OptionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Text,
    Number,
    Bool,
    Select,
}

type ConditionBuilder = fn(&serde_json::Value) -> Result<Box<dyn ConditionTemplate>, ModelError>;

struct ConditionEntry {
    build: ConditionBuilder,
    option_descs: Vec<OptionDesc>,
}

/// The process-wide table of registered condition kinds. Built once at
/// startup from `ConditionRegistry::builtin()`; plugins extend it via
/// `register_custom`.
pub struct ConditionRegistry {
    entries: HashMap<&'static str, ConditionEntry>,
}

impl ConditionRegistry {
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register_builtin("text", conditions::build_text, conditions::text_option_descs());
        registry.register_builtin(
            "limiter",
            conditions::build_limiter,
            conditions::limiter_option_descs(),
        );
        registry.register_builtin("time", conditions::build_time, conditions::time_option_descs());
        registry.register_builtin(
            "checkbox",
            conditions::build_checkbox,
            conditions::checkbox_option_descs(),
        );
        registry.register_builtin(
            "select",
            conditions::build_select,
            conditions::select_option_descs(),
        );
        registry
            .register_custom(
                "author_is_op",
                conditions::build_author_is_op,
                conditions::author_is_op_option_descs(),
                &[],
            )
            .expect("built-in custom condition descs must match its option fields");
        registry
    }

    fn register_builtin(
        &mut self,
        tag: &'static str,
        build: ConditionBuilder,
        option_descs: Vec<OptionDesc>,
    ) {
        self.entries.insert(tag, ConditionEntry { build, option_descs });
    }

    /// Registers a `custom` condition kind. Fails fast if `option_descs`'
    /// key set doesn't exactly match `option_fields` — the set of option
    /// keys the concrete type actually reads (§4.4 "registration fails
    /// fast if the set of declared descs does not exactly match the set
    /// of option fields").
    pub fn register_custom(
        &mut self,
        tag: &'static str,
        build: ConditionBuilder,
        option_descs: Vec<OptionDesc>,
        option_fields: &[&'static str],
    ) -> Result<(), ModelError> {
        let declared: std::collections::BTreeSet<&str> =
            option_descs.iter().map(|d| d.key).collect();
        let actual: std::collections::BTreeSet<&str> = option_fields.iter().copied().collect();
        if declared != actual {
            return Err(ModelError::InvalidOption(format!(
                "custom condition {tag:?} declared option_descs {declared:?} but its fields are {actual:?}"
            )));
        }
        self.entries.insert(tag, ConditionEntry { build, option_descs });
        Ok(())
    }

    pub fn option_descs(&self, tag: &str) -> Option<&[OptionDesc]> {
        self.entries.get(tag).map(|e| e.option_descs.as_slice())
    }

    /// Builds a `Condition` from a descriptor. Never returns an error:
    /// an unregistered tag or a template constructor failure produces an
    /// invalid `Condition` (`valid == false`), which the evaluator (C3)
    /// then silently excludes from its rule groups (§7).
    pub fn build(&self, desc: &ConditionDescriptor) -> Condition {
        match self.entries.get(desc.type_tag.as_str()) {
            Some(entry) => match (entry.build)(&desc.options) {
                Ok(template) => Condition::valid(desc, template),
                Err(_) => Condition::invalid(desc),
            },
            None => Condition::invalid(desc),
        }
    }
}

/// Expands an `OperationSpec` shorthand token into its equivalent
/// descriptor list (§3), and validates/builds each descriptor against
/// the operation registry (§4.4). Operations have no analogous "invalid
/// and silently skipped" path in the spec — an unregistered operation
/// `type` is a configuration error the rule's owner must fix, so this
/// returns `Err` instead of swallowing it.
pub fn expand_operations(
    spec: &forumod_model::OperationSpec,
) -> Result<Vec<OperationDescriptor>, ModelError> {
    use forumod_model::OperationShorthand as Sh;
    Ok(match spec {
        forumod_model::OperationSpec::List(list) => list.clone(),
        forumod_model::OperationSpec::Shorthand(Sh::Ignore) => vec![],
        forumod_model::OperationSpec::Shorthand(Sh::Delete) => vec![OperationDescriptor {
            type_tag: "delete".into(),
            options: serde_json::Value::Null,
            direct: false,
        }],
        forumod_model::OperationSpec::Shorthand(Sh::Block) => vec![OperationDescriptor {
            type_tag: "block".into(),
            options: serde_json::Value::Null,
            direct: false,
        }],
        forumod_model::OperationSpec::Shorthand(Sh::DeleteAndBlock) => vec![
            OperationDescriptor {
                type_tag: "delete".into(),
                options: serde_json::Value::Null,
                direct: false,
            },
            OperationDescriptor {
                type_tag: "block".into(),
                options: serde_json::Value::Null,
                direct: false,
            },
        ],
    })
}

/// Builds every descriptor in an already-expanded operation list,
/// pairing each built operation with the `direct` flag its descriptor
/// carried (the registry doesn't encode `direct` on the trait itself,
/// since it's a per-use-site override rather than a property of the
/// operation kind).
pub fn build_operations(
    descriptors: &[OperationDescriptor],
) -> Result<Vec<(Box<dyn ModeratorOperation>, bool)>, ModelError> {
    descriptors
        .iter()
        .map(|desc| {
            build_operation(&desc.type_tag, &desc.options).map(|op| (op, desc.direct))
        })
        .collect()
}
