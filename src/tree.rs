use std::{
    borrow::Borrow,
    collections::hash_map::DefaultHasher,
    fmt,
    hash::{Hash, Hasher},
    mem::{discriminant, swap, take},
    ops::Deref,
    slice,
};

use ecow::{eco_vec, EcoVec};
use indexmap::IndexSet;
use serde::*;

use crate::{
    check::{nodes_clean_sig, nodes_sig, SigCheckError},
    Assembly, Function, FunctionId, ImplPrimitive, Primitive, Signature, Value,
};

node!(
    /// Push some values to the under stack
    PushUnder(n(usize), span(usize)),
    /// Copy some values to the under stack
    CopyToUnder(n(usize), span(usize)),
    /// Pop some values from the under stack
    PopUnder(n(usize), span(usize)),
    /// Push a value onto the stack
    Push(val(Value)),
    /// Run a primitive function
    (#[serde(untagged)] rep),
    Prim(prim(Primitive), span(usize)),
    /// Run an implementation primitive function
    (#[serde(untagged)] rep),
    ImplPrim(prim(ImplPrimitive), span(usize)),
    /// Run a modifier
    (#[serde(untagged)] rep),
    Mod(prim(Primitive), args(Ops), span(usize)),
    /// Run an implementation modifier
    (#[serde(untagged)] rep),
    ImplMod(prim(ImplPrimitive), args(Ops), span(usize)),
    /// Call a function
    (#[serde(untagged)] rep),
    Call(func(Function), span(usize)),
    /// Run some nodes in sequence.
    ///
    /// Do not edit the list directly. Use functions like [`Node::push`] and [`Node::prepend`] instead.
    (#[serde(untagged)] rep),
    Run(nodes(EcoVec<Node>)),
);

/// A node with a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct SigNode {
    /// The node
    pub node: Node,
    /// The signature
    pub sig: Signature,
}

impl SigNode {
    /// Create a new signature node
    pub fn new(sig: impl Into<Signature>, node: impl Into<Node>) -> Self {
        Self {
            node: node.into(),
            sig: sig.into(),
        }
    }
}

impl From<SigNode> for Node {
    fn from(sn: SigNode) -> Self {
        sn.node
    }
}

impl Serialize for SigNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.sig.args(), self.sig.outputs(), &self.node).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SigNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (args, outputs, node) = <(usize, usize, Node)>::deserialize(deserializer)?;
        Ok(SigNode::new(Signature::new(args, outputs), node))
    }
}

/// The function arguments of a modifier
pub type Ops = EcoVec<SigNode>;

impl Default for Node {
    fn default() -> Self {
        Self::empty()
    }
}

impl Node {
    /// Create an empty node
    pub const fn empty() -> Self {
        Self::Run(EcoVec::new())
    }
    /// Create a push node from a value
    pub fn new_push(val: impl Into<Value>) -> Self {
        Self::Push(val.into())
    }
    /// Get a slice of the nodes in this node
    pub fn as_slice(&self) -> &[Node] {
        if let Node::Run(nodes) = self {
            nodes
        } else {
            slice::from_ref(self)
        }
    }
    /// Turn the node into a vector
    pub fn into_vec(self) -> EcoVec<Node> {
        if let Node::Run(nodes) = self {
            nodes
        } else {
            eco_vec![self]
        }
    }
    /// Get a mutable vector of the nodes in this node
    ///
    /// Transforms the node into a [`Node::Run`] if it is not already a [`Node::Run`]
    fn as_vec(&mut self) -> &mut EcoVec<Node> {
        if !matches!(self, Node::Run(_)) {
            let first = take(self);
            *self = Node::Run(eco_vec![first]);
        }
        match self {
            Node::Run(nodes) => nodes,
            _ => unreachable!(),
        }
    }
    /// Push a node onto the end of the node
    ///
    /// Transforms the node into a [`Node::Run`] if it is not already a [`Node::Run`]
    pub fn push(&mut self, mut node: Node) {
        if let Node::Run(nodes) = self {
            if nodes.is_empty() {
                *self = node;
            } else {
                match node {
                    Node::Run(other) => nodes.extend(other),
                    node => nodes.push(node),
                }
            }
        } else if let Node::Run(nodes) = &node {
            if !nodes.is_empty() {
                swap(self, &mut node);
                self.as_vec().insert(0, node);
            }
        } else {
            self.as_vec().push(node);
        }
    }
    /// Push a node onto the beginning of the node
    ///
    /// Transforms the node into a [`Node::Run`] if it is not already a [`Node::Run`]
    pub fn prepend(&mut self, mut node: Node) {
        if let Node::Run(nodes) = self {
            if nodes.is_empty() {
                *self = node;
            } else {
                match node {
                    Node::Run(mut other) => {
                        swap(nodes, &mut other);
                        nodes.extend(other)
                    }
                    node => nodes.insert(0, node),
                }
            }
        } else if let Node::Run(nodes) = &node {
            if !nodes.is_empty() {
                swap(self, &mut node);
                self.as_vec().push(node);
            }
        } else {
            self.as_vec().insert(0, node);
        }
    }
    pub(crate) fn as_primitive(&self) -> Option<Primitive> {
        match self {
            Node::Prim(prim, _) => Some(*prim),
            _ => None,
        }
    }
    /// Get the identity a custom inverse would be registered under
    pub(crate) fn function_id(&self) -> Option<FunctionId> {
        match self {
            Node::Prim(prim, _) | Node::Mod(prim, ..) => Some(FunctionId::Primitive(*prim)),
            Node::ImplPrim(prim, _) | Node::ImplMod(prim, ..) => Some(FunctionId::Impl(*prim)),
            Node::Call(func, _) => Some(func.id.clone()),
            _ => None,
        }
    }
    /// Hash the node along with every span in it
    pub(crate) fn hash_with_span<H: Hasher>(&self, hasher: &mut H) {
        self.hash(hasher);
        self.hash_spans(hasher);
    }
    fn hash_spans<H: Hasher>(&self, hasher: &mut H) {
        match self {
            Node::Run(nodes) => nodes.iter().for_each(|node| node.hash_spans(hasher)),
            Node::Mod(_, args, span) | Node::ImplMod(_, args, span) => {
                span.hash(hasher);
                for arg in args {
                    arg.node.hash_spans(hasher);
                }
            }
            node => node.span().hash(hasher),
        }
    }
    /// Check if two nodes are the same, spans included
    pub(crate) fn same_with_spans(&self, other: &Self) -> bool {
        use Node::*;
        fn same_ops(a: &Ops, b: &Ops) -> bool {
            a.len() == b.len()
                && (a.iter().zip(b)).all(|(a, b)| a.sig == b.sig && a.node.same_with_spans(&b.node))
        }
        match (self, other) {
            (Run(a), Run(b)) => {
                a.len() == b.len() && (a.iter().zip(b)).all(|(a, b)| a.same_with_spans(b))
            }
            (Push(a), Push(b)) => a == b,
            (Prim(a, sa), Prim(b, sb)) => a == b && sa == sb,
            (ImplPrim(a, sa), ImplPrim(b, sb)) => a == b && sa == sb,
            (Mod(a, aa, sa), Mod(b, ab, sb)) => a == b && sa == sb && same_ops(aa, ab),
            (ImplMod(a, aa, sa), ImplMod(b, ab, sb)) => a == b && sa == sb && same_ops(aa, ab),
            (Call(a, sa), Call(b, sb)) => a == b && sa == sb,
            (PushUnder(a, sa), PushUnder(b, sb))
            | (CopyToUnder(a, sa), CopyToUnder(b, sb))
            | (PopUnder(a, sa), PopUnder(b, sb)) => a == b && sa == sb,
            _ => false,
        }
    }
    /// Get the signature of this node
    pub fn sig(&self) -> Result<Signature, SigCheckError> {
        nodes_sig(self.as_slice())
    }
    /// Get the signature of this node if it is well-formed and does not touch the under stack
    pub fn clean_sig(&self) -> Option<Signature> {
        nodes_clean_sig(self.as_slice())
    }
    /// Pair this node with its signature
    pub fn sig_node(self) -> Result<SigNode, SigCheckError> {
        let sig = self.sig()?;
        Ok(SigNode::new(sig, self))
    }
}

impl From<&[Node]> for Node {
    fn from(nodes: &[Node]) -> Self {
        Node::from_iter(nodes.iter().cloned())
    }
}

impl<const N: usize> From<[Node; N]> for Node {
    fn from(nodes: [Node; N]) -> Self {
        Node::from_iter(nodes)
    }
}

impl FromIterator<Node> for Node {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        let mut iter = iter.into_iter();
        let Some(mut node) = iter.next() else {
            return Node::default();
        };
        for n in iter {
            node.push(n);
        }
        node
    }
}

impl Extend<Node> for Node {
    fn extend<T: IntoIterator<Item = Node>>(&mut self, iter: T) {
        for node in iter {
            self.push(node);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Run(eco_vec) => {
                let mut tuple = f.debug_tuple("");
                for node in eco_vec {
                    tuple.field(node);
                }
                tuple.finish()
            }
            Node::Push(value) => write!(f, "push {value}"),
            Node::Prim(prim, _) => write!(f, "{prim}"),
            Node::ImplPrim(impl_prim, _) => write!(f, "{impl_prim}"),
            Node::Mod(prim, args, _) => {
                let mut tuple = f.debug_tuple(&prim.to_string());
                for sn in args {
                    tuple.field(&sn.node);
                }
                tuple.finish()
            }
            Node::ImplMod(impl_prim, args, _) => {
                let mut tuple = f.debug_tuple(&impl_prim.to_string());
                for sn in args {
                    tuple.field(&sn.node);
                }
                tuple.finish()
            }
            Node::Call(func, _) => write!(f, "call {}", func.id),
            Node::PushUnder(count, _) => write!(f, "push-u-{count}"),
            Node::CopyToUnder(count, _) => write!(f, "copy-u-{count}"),
            Node::PopUnder(count, _) => write!(f, "pop-u-{count}"),
        }
    }
}

/// Levels of purity for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Purity {
    /// The operation visibly affects the environment
    Mutating,
    /// The operation reads from the environment but does not visibly affect it
    Impure,
    /// The operation is completely pure
    Pure,
}

impl Node {
    /// Check if the node is pure
    pub fn is_pure<'a>(&'a self, min_purity: Purity, asm: &'a Assembly) -> bool {
        fn recurse<'a>(
            node: &'a Node,
            purity: Purity,
            asm: &'a Assembly,
            visited: &mut IndexSet<&'a Function>,
        ) -> bool {
            let len = visited.len();
            let is = match node {
                Node::Run(nodes) => nodes.iter().all(|node| recurse(node, purity, asm, visited)),
                Node::Prim(prim, _) => prim.purity() >= purity,
                Node::ImplPrim(prim, _) => prim.purity() >= purity,
                Node::Mod(prim, args, _) => {
                    prim.purity() >= purity
                        && args
                            .iter()
                            .all(|arg| recurse(&arg.node, purity, asm, visited))
                }
                Node::ImplMod(prim, args, _) => {
                    prim.purity() >= purity
                        && args
                            .iter()
                            .all(|arg| recurse(&arg.node, purity, asm, visited))
                }
                Node::Call(func, _) => {
                    visited.insert(func)
                        && asm
                            .get(func)
                            .is_some_and(|body| recurse(body, purity, asm, visited))
                }
                _ => true,
            };
            visited.truncate(len);
            is
        }
        recurse(self, min_purity, asm, &mut IndexSet::new())
    }
}

impl Deref for Node {
    type Target = [Node];
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[Node]> for Node {
    fn as_ref(&self) -> &[Node] {
        self.as_slice()
    }
}

impl Borrow<[Node]> for Node {
    fn borrow(&self) -> &[Node] {
        self.as_slice()
    }
}

impl<'a> IntoIterator for &'a Node {
    type Item = &'a Node;
    type IntoIter = slice::Iter<'a, Node>;
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl IntoIterator for Node {
    type Item = Node;
    type IntoIter = ecow::vec::IntoIter<Node>;
    fn into_iter(self) -> Self::IntoIter {
        self.into_vec().into_iter()
    }
}

macro_rules! node {
    ($(
        $(#[$attr:meta])*
        $((#[$rep_attr:meta] rep),)?
        $name:ident
        $(($($tup_name:ident($tup_type:ty)),* $(,)?))?
        $({$($field_name:ident : $field_type:ty),* $(,)?})?
    ),* $(,)?) => {
        /// A pipeline tree node
        ///
        /// A node is a tree structure of instructions. It can be used as both a single unit as well as a list.
        #[derive(Clone, Serialize, Deserialize)]
        #[repr(u8)]
        #[allow(missing_docs)]
        #[serde(from = "NodeRep", into = "NodeRep")]
        pub enum Node {
            $(
                $(#[$attr])*
                $name $(($($tup_type),*))? $({$($field_name : $field_type),*})?,
            )*
        }

        macro_rules! field_span {
            (span, $sp:ident) => {
                return Some($sp)
            };
            ($sp:ident, $sp2:ident) => {};
        }

        impl Node {
            /// Get the span index of this instruction
            #[allow(unreachable_code, unused)]
            pub fn span(&self) -> Option<usize> {
                if let Node::Run(nodes) = &self {
                    return nodes.iter().find_map(Node::span);
                }
                (|| match self {
                    $(
                        Self::$name $(($($tup_name),*))? $({$($field_name),*})? => {
                            $($(field_span!($tup_name, $tup_name);)*)*
                            $($(field_span!($field_name, $field_name);)*)*
                            return None;
                        },
                    )*
                })().copied()
            }
        }

        impl PartialEq for Node {
            #[allow(unused_variables)]
            fn eq(&self, other: &Self) -> bool {
                let mut hasher = DefaultHasher::new();
                self.hash(&mut hasher);
                let hash = hasher.finish();
                let mut other_hasher = DefaultHasher::new();
                other.hash(&mut other_hasher);
                let other_hash = other_hasher.finish();
                hash == other_hash
            }
        }

        impl Eq for Node {}

        impl Hash for Node {
            #[allow(unused_variables)]
            fn hash<H: Hasher>(&self, state: &mut H) {
                macro_rules! hash_field {
                    (span) => {};
                    ($nm:ident) => {Hash::hash($nm, state)};
                }
                match self {
                    $(
                        Self::$name $(($($tup_name),*))? $({$($field_name),*})? => {
                            discriminant(self).hash(state);
                            $($(hash_field!($field_name);)*)?
                            $($(hash_field!($tup_name);)*)?
                        }
                    )*
                }
            }
        }

        #[derive(Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub(crate) enum NodeRep {
            #[serde(rename = "e")]
            Empty(),
            $(
                $(#[$rep_attr])?
                $name(
                    $($($tup_type),*)?
                    $($($field_type),*)?
                ),
            )*
        }

        impl From<NodeRep> for Node {
            fn from(rep: NodeRep) -> Self {
                match rep {
                    NodeRep::Empty() => Self::empty(),
                    $(
                        NodeRep::$name (
                            $($($tup_name,)*)?
                            $($($field_name,)*)?
                        ) => Self::$name $(($($tup_name),*))? $({$($field_name),*})?,
                    )*
                }
            }
        }

        impl From<Node> for NodeRep {
            fn from(instr: Node) -> Self {
                match instr {
                    Node::Run(nodes) if nodes.is_empty() => NodeRep::Empty(),
                    $(
                        Node::$name $(($($tup_name),*))? $({$($field_name),*})? => NodeRep::$name (
                            $($($tup_name),*)?
                            $($($field_name),*)?
                        ),
                    )*
                }
            }
        }
    };
}
use node;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn push_and_prepend_flatten() {
        let mut node = Node::empty();
        node.push(Node::Prim(Primitive::Add, 0));
        assert!(matches!(node, Node::Prim(Primitive::Add, 0)));
        node.push(Node::from([
            Node::new_push(1),
            Node::Prim(Primitive::Mul, 1),
        ]));
        assert_eq!(node.len(), 3);
        node.prepend(Node::from([Node::Prim(Primitive::Dup, 2), Node::empty()]));
        assert_eq!(node.len(), 4);
        assert!(matches!(node[0], Node::Prim(Primitive::Dup, 2)));
        assert!(matches!(node[3], Node::Prim(Primitive::Mul, 1)));
    }

    #[test]
    fn equality_ignores_spans() {
        let a = Node::from([Node::new_push(2), Node::Prim(Primitive::Add, 0)]);
        let b = Node::from([Node::new_push(2), Node::Prim(Primitive::Add, 7)]);
        assert_eq!(a, b);
        assert_eq!(b.span(), Some(7));
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash_with_span(&mut ha);
        b.hash_with_span(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
        assert!(!a.same_with_spans(&b));
        assert!(a.same_with_spans(&a.clone()));
    }

    #[test]
    fn nested_spans_are_compared() {
        let inner = |span| Node::Prim(Primitive::Neg, span).sig_node().unwrap();
        let a = Node::Mod(Primitive::Dip, eco_vec![inner(1)], 0);
        let b = Node::Mod(Primitive::Dip, eco_vec![inner(2)], 0);
        assert_eq!(a, b);
        assert_eq!(a.span(), b.span());
        assert!(!a.same_with_spans(&b));
        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash_with_span(&mut ha);
        b.hash_with_span(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }

    #[test]
    fn purity() {
        let asm = Assembly::default();
        let pure = Node::from([Node::new_push(1), Node::Prim(Primitive::Add, 0)]);
        let impure = Node::from([Node::Prim(Primitive::Now, 0), Node::Prim(Primitive::Add, 0)]);
        assert!(pure.is_pure(Purity::Pure, &asm));
        assert!(!impure.is_pure(Purity::Pure, &asm));
        assert!(impure.is_pure(Purity::Impure, &asm));
    }
}
