//! Synthesis of observation and compiled variants.
//!
//! Both operations only inspect their inputs and return a plan; neither
//! executes anything. Loading a compiled plan is the manager's job.

use std::{collections::BTreeSet, sync::Arc};

use regex::Regex;
use strata_db::BindingKey;

use crate::{
    artifact::{CompiledPlan, PLAN_FORMAT},
    error::SpecializationError,
    identity::ProcedureIdentity,
    observation::ObservationState,
    shape::{ArgumentMapping, Slot},
    source::{ReturnKind, SourceTransformer},
};

/// Suffix given to the observation variant of a procedure.
const OBSERVED_SUFFIX: &str = "__observed";

/// The observation variant of a procedure: its statically known signature.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPlan {
    pub identity: ProcedureIdentity,
    pub variant: String,
    pub arity: usize,
    pub params: Vec<String>,
    pub param_types: Vec<String>,
}

pub struct Specializer {
    transformer: Arc<dyn SourceTransformer>,
}

impl Specializer {
    pub fn new(transformer: Arc<dyn SourceTransformer>) -> Self {
        Self { transformer }
    }

    pub fn transformer(&self) -> &dyn SourceTransformer {
        self.transformer.as_ref()
    }

    /// Derives the observation variant of `identity`.
    ///
    /// Fails when the argument positions of the procedure cannot be
    /// determined statically or its result is not owned.
    pub fn synthesize_observation_variant(
        &self,
        identity: &ProcedureIdentity,
    ) -> Result<ObservationPlan, SpecializationError> {
        let fail = |message: String| SpecializationError::transformation(identity, message);

        let tree = self
            .transformer
            .parse(identity.owner())
            .ok_or_else(|| fail(format!("source of `{}` could not be parsed", identity.owner())))?;
        let node = self
            .transformer
            .locate(&tree, identity.procedure())
            .ok_or_else(|| fail(format!("procedure `{}` not found", identity.procedure())))?;

        if node.returns == ReturnKind::Reference {
            return Err(fail("procedure returns a reference".into()));
        }
        for param in &node.params {
            if param.by_ref {
                return Err(fail(format!("parameter `{}` is taken by reference", param.name)));
            }
            if param.variadic {
                return Err(fail(format!("parameter `{}` is variadic", param.name)));
            }
            if param.has_default {
                return Err(fail(format!("parameter `{}` has a default value", param.name)));
            }
        }

        let variant = self
            .transformer
            .rename(node, &format!("{}{OBSERVED_SUFFIX}", node.name));
        let types = self.transformer.declared_types(&tree);

        Ok(ObservationPlan {
            identity: identity.clone(),
            arity: variant.arity(),
            params: variant.params.iter().map(|p| p.name.clone()).collect(),
            param_types: node
                .params
                .iter()
                .map(|p| {
                    types
                        .get(&format!("{}.{}", node.name, p.name))
                        .cloned()
                        .unwrap_or_else(|| p.ty.clone())
                })
                .collect(),
            variant: variant.name,
        })
    }

    /// Freezes a ready observation state into a compiled plan.
    pub fn synthesize_compiled_variant(
        &self,
        plan: &ObservationPlan,
        state: &ObservationState,
    ) -> Result<CompiledPlan, SpecializationError> {
        let identity = &plan.identity;
        let fail = |message: String| SpecializationError::generation(identity, message);

        let sql = state
            .frozen_query_text
            .as_ref()
            .ok_or_else(|| fail("no frozen query text".into()))?;
        let bindings = state
            .binding_map
            .as_ref()
            .ok_or_else(|| fail("binding mapping was never frozen".into()))?;
        let metadata = state
            .metadata_map
            .as_ref()
            .ok_or_else(|| fail("metadata mapping was never frozen".into()))?;
        let extension = state
            .extension_snapshot
            .as_ref()
            .ok_or_else(|| fail("extension state was never frozen".into()))?;

        check_slots(bindings, plan.arity).map_err(&fail)?;
        check_slots(metadata, plan.arity).map_err(&fail)?;
        check_placeholders(sql, bindings).map_err(&fail)?;

        Ok(CompiledPlan {
            format: PLAN_FORMAT,
            key: identity.key(),
            owner: identity.owner().to_string(),
            procedure: identity.procedure().to_string(),
            arity: plan.arity,
            sql: sql.clone(),
            bindings: entries(bindings),
            metadata: entries(metadata),
            extension: extension.clone(),
        })
    }
}

fn entries(mapping: &ArgumentMapping) -> Vec<(BindingKey, Slot)> {
    mapping
        .iter()
        .map(|(key, slot)| (key.clone(), slot.clone()))
        .collect()
}

fn check_slots(mapping: &ArgumentMapping, arity: usize) -> Result<(), String> {
    for (key, slot) in mapping {
        if let Slot::Argument(idx) = slot {
            if *idx >= arity {
                return Err(format!(
                    "{key} maps to argument {idx} of a procedure taking {arity}"
                ));
            }
        }
    }
    Ok(())
}

/// Verifies that the frozen text can actually receive the frozen bindings.
fn check_placeholders(sql: &str, bindings: &ArgumentMapping) -> Result<(), String> {
    let positional: BTreeSet<usize> = bindings
        .keys()
        .filter_map(|key| match key {
            BindingKey::Index(idx) => Some(*idx),
            BindingKey::Name(_) => None,
        })
        .collect();

    if positional.iter().copied().ne(0..positional.len()) {
        return Err("positional bindings are not numbered 0..n".into());
    }

    let placeholders = count_placeholders(sql);
    if placeholders != positional.len() {
        return Err(format!(
            "query text has {placeholders} placeholders for {} positional bindings",
            positional.len()
        ));
    }

    for key in bindings.keys() {
        if let BindingKey::Name(name) = key {
            let bare = name.trim_start_matches([':', '@', '$']);
            let pattern = format!(r"[:@$]{}\b", regex::escape(bare));
            let found = Regex::new(&pattern)
                .map(|re| re.is_match(sql))
                .unwrap_or(false);
            if !found {
                return Err(format!("named binding {key} does not occur in the query text"));
            }
        }
    }

    Ok(())
}

/// Counts `?` placeholders outside quoted literals and identifiers.
fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    let mut quote: Option<char> = None;

    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => {
                match c {
                    '\'' | '"' | '`' => quote = Some(c),
                    '?' => count += 1,
                    _ => {}
                }
            }
        }
    }

    count
}
