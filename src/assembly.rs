use std::{
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    ops::Index,
};

use ecow::{EcoString, EcoVec};
use indexmap::IndexMap;
use serde::*;

use crate::{FunctionId, Node, SigNode, Signature};

/// The function bodies of a compilation unit
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Assembly {
    /// Functions
    pub(crate) functions: EcoVec<Node>,
    /// Named functions, in order of definition
    pub(crate) names: IndexMap<EcoString, Function>,
}

/// A user function
///
/// This does not actually contain the function's code.
/// It is a lightweight handle that can be used to look up the function's code in an [`Assembly`].
///
/// It also contains the function's [`FunctionId`] and [`Signature`].
#[derive(Clone)]
pub struct Function {
    /// The function's id
    pub id: FunctionId,
    /// The function's signature
    pub sig: Signature,
    pub(crate) index: usize,
    hash: u64,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ← {}", self.id, self.sig)
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.sig == other.sig && self.hash == other.hash
    }
}

impl Eq for Function {}

impl Hash for Function {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Serialize for Function {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (&self.id, &self.sig, &self.index, &self.hash).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Function {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (id, sig, index, hash) =
            <(FunctionId, Signature, usize, u64)>::deserialize(deserializer)?;
        Ok(Function {
            id,
            sig,
            index,
            hash,
        })
    }
}

impl Assembly {
    /// Get the [`SigNode`] for a function
    pub fn sig_node(&self, f: &Function) -> Option<SigNode> {
        self.get(f).map(|node| SigNode::new(f.sig, node.clone()))
    }
    /// Get the body of a function, if it belongs to this assembly
    pub fn get(&self, f: &Function) -> Option<&Node> {
        self.functions.get(f.index)
    }
    /// Look up a named function
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.names.get(name)
    }
    /// Iterate over the named functions
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.names.values()
    }
    /// Add a function to the assembly
    pub fn add_function(&mut self, id: FunctionId, sig: Signature, root: Node) -> Function {
        let mut hasher = DefaultHasher::new();
        root.hash(&mut hasher);
        let hash = hasher.finish();
        self.functions.push(root);
        let index = self.functions.len() - 1;
        let func = Function {
            id,
            sig,
            index,
            hash,
        };
        if let FunctionId::Named(name) = &func.id {
            self.names.insert(name.clone(), func.clone());
        }
        func
    }
}

impl Index<&Function> for Assembly {
    type Output = Node;
    #[track_caller]
    fn index(&self, func: &Function) -> &Self::Output {
        match self.functions.get(func.index) {
            Some(node) => node,
            None => panic!("{}({:?}) not found in assembly", func.id, func.index),
        }
    }
}
