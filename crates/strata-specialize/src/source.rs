//! Procedure sources.
//!
//! Specialization needs to know the static signature of a procedure before
//! it can be observed: how many arguments it takes, whether each one is
//! passed by value, and whether it returns an owned result. That knowledge
//! comes from a [`SourceTransformer`]. The bundled implementation,
//! [`DeclaredSources`], is a registry that owners fill at startup with a
//! declared [`SourceTree`] per owner type.

use std::collections::{BTreeMap, HashMap};

use strata_utils::hash::checksum_bytes;

/// Length of the source checksum used in procedure identities.
pub const CHECKSUM_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    /// Returns an owned value.
    Value,
    /// Returns a reference into the receiver.
    Reference,
}

/// A declared procedure parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub ty: String,
    pub by_ref: bool,
    pub variadic: bool,
    pub has_default: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            by_ref: false,
            variadic: false,
            has_default: false,
        }
    }

    pub fn by_ref(mut self) -> Self {
        self.by_ref = true;
        self
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }
}

/// A procedure located in an owner's source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureNode {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: ReturnKind,
    pub body: String,
}

impl ProcedureNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ReturnKind::Value,
            body: String::new(),
        }
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, returns: ReturnKind) -> Self {
        self.returns = returns;
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

/// The parsed source of one owner type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub owner: String,
    pub source: String,
    pub procedures: Vec<ProcedureNode>,
}

impl SourceTree {
    pub fn new(owner: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            source: source.into(),
            procedures: Vec::new(),
        }
    }

    pub fn procedure(mut self, node: ProcedureNode) -> Self {
        self.procedures.push(node);
        self
    }

    /// Truncated blake3 digest of the source text and the declared
    /// procedure bodies.
    pub fn checksum(&self) -> String {
        let mut input = self.source.clone().into_bytes();
        for node in &self.procedures {
            input.push(0);
            input.extend_from_slice(node.name.as_bytes());
            input.push(0);
            input.extend_from_slice(node.body.as_bytes());
        }

        let mut digest = checksum_bytes(&input);
        digest.truncate(CHECKSUM_LEN);
        digest
    }
}

/// Parses owner sources and manipulates the resulting trees.
pub trait SourceTransformer: Send + Sync {
    fn parse(&self, owner: &str) -> Option<SourceTree>;

    fn locate<'a>(&self, tree: &'a SourceTree, procedure: &str) -> Option<&'a ProcedureNode> {
        tree.procedures.iter().find(|node| node.name == procedure)
    }

    /// Declared parameter types keyed by `procedure.param`.
    fn declared_types(&self, tree: &SourceTree) -> BTreeMap<String, String> {
        tree.procedures
            .iter()
            .flat_map(|node| {
                node.params
                    .iter()
                    .map(move |param| (format!("{}.{}", node.name, param.name), param.ty.clone()))
            })
            .collect()
    }

    /// Copies `node` under a new name.
    fn rename(&self, node: &ProcedureNode, new_name: &str) -> ProcedureNode {
        ProcedureNode {
            name: new_name.to_string(),
            ..node.clone()
        }
    }
}

/// Registry of declared owner sources.
#[derive(Debug, Default, Clone)]
pub struct DeclaredSources {
    trees: HashMap<String, SourceTree>,
}

impl DeclaredSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tree`, replacing an earlier declaration for the same owner.
    pub fn register(&mut self, tree: SourceTree) {
        self.trees.insert(tree.owner.clone(), tree);
    }

    pub fn with(mut self, tree: SourceTree) -> Self {
        self.register(tree);
        self
    }

    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.trees.keys().map(String::as_str)
    }
}

impl SourceTransformer for DeclaredSources {
    fn parse(&self, owner: &str) -> Option<SourceTree> {
        self.trees.get(owner).cloned()
    }
}
