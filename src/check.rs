use std::{cmp::Ordering, fmt};

use serde::*;

use crate::{ImplPrimitive, Node, Primitive, SigNode, Signature, Value};

/// Count the number of arguments and outputs of a list of nodes
pub fn nodes_sig(nodes: &[Node]) -> Result<Signature, SigCheckError> {
    if let [Node::Prim(prim, _)] = nodes {
        if let Some(sig) = prim.sig() {
            return Ok(sig);
        }
    }
    let mut env = VirtualEnv::default();
    env.nodes(nodes)?;
    env.sig()
}

/// Count the number of arguments and outputs of a list of nodes,
/// but only if it is well-formed and does not touch the under stack
pub fn nodes_clean_sig(nodes: &[Node]) -> Option<Signature> {
    let sig = nodes_sig(nodes).ok()?;
    if sig.under_args() != 0 || sig.under_outputs() != 0 {
        return None;
    }
    Some(sig)
}

/// Get the signature of each non-empty prefix of some nodes, shortest first
///
/// Stops at the first prefix that is not well-formed.
pub(crate) fn prefix_sigs(nodes: &[Node]) -> impl Iterator<Item = Signature> + '_ {
    let mut env = VirtualEnv::default();
    nodes.iter().map_while(move |node| {
        env.node(node).ok()?;
        env.sig().ok()
    })
}

/// An error produced when a pipeline's signature cannot be determined
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SigCheckError {
    /// The error message
    pub message: String,
    /// Whether the signature could not be determined statically,
    /// rather than being outright invalid
    pub ambiguous: bool,
}

impl SigCheckError {
    /// Mark the error as ambiguous
    pub fn ambiguous(self) -> Self {
        Self {
            ambiguous: true,
            ..self
        }
    }
}

impl<'a> From<&'a str> for SigCheckError {
    fn from(s: &'a str) -> Self {
        Self {
            message: s.to_string(),
            ambiguous: false,
        }
    }
}

impl From<String> for SigCheckError {
    fn from(s: String) -> Self {
        Self {
            message: s,
            ambiguous: false,
        }
    }
}

impl fmt::Display for SigCheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for SigCheckError {}

#[derive(Debug, Clone)]
enum BasicValue {
    Num(f64),
    Other,
}

impl BasicValue {
    fn from_val(value: &Value) -> Self {
        match value {
            Value::Num(n) => BasicValue::Num(*n),
            Value::List(_) => BasicValue::Other,
        }
    }
}

/// An environment that emulates the executor but only keeps track of the stack heights
///
/// Values that a pipeline pulls from below its starting height are counted as arguments.
#[derive(Default)]
struct VirtualEnv {
    stack: Vec<BasicValue>,
    args: usize,
    under_height: usize,
    under_args: usize,
}

impl VirtualEnv {
    fn sig(&self) -> Result<Signature, SigCheckError> {
        let counts = [self.args, self.stack.len(), self.under_args, self.under_height];
        check_counts(&counts)?;
        Ok(Signature::new(self.args, self.stack.len()).with_under(self.under_args, self.under_height))
    }
    fn pop(&mut self) -> BasicValue {
        self.stack.pop().unwrap_or_else(|| {
            self.args += 1;
            BasicValue::Other
        })
    }
    fn pop_under(&mut self, n: usize) {
        let from_height = n.min(self.under_height);
        self.under_height -= from_height;
        self.under_args += n - from_height;
    }
    fn handle_sig(&mut self, sig: Signature) {
        self.handle_counts(sig.args(), sig.outputs(), sig.under());
    }
    fn handle_counts(&mut self, args: usize, outputs: usize, under: Signature) {
        for _ in 0..args {
            self.pop();
        }
        for _ in 0..outputs {
            self.stack.push(BasicValue::Other);
        }
        self.pop_under(under.args());
        self.under_height += under.outputs();
    }
    /// Repeat a function a number of times given by the value on top
    ///
    /// With an inverse, a negative count repeats the inverse instead.
    fn repeat(&mut self, f: &SigNode, inv: Option<&SigNode>) -> Result<(), SigCheckError> {
        let count = match self.pop() {
            BasicValue::Num(n) if n.fract() == 0.0 && (n >= 0.0 || inv.is_some()) => Some(n),
            _ => None,
        };
        let (f, count) = match (count, inv) {
            (Some(n), Some(inv)) if n < 0.0 => (inv, Some((-n) as usize)),
            (n, _) => (f, n.map(|n| n as usize)),
        };
        match count {
            _ if f.sig.args() == f.sig.outputs() => self.handle_sig(f.sig),
            Some(0) => {}
            Some(n) => {
                let counts = repeat_counts(f.sig.args(), f.sig.outputs(), n)
                    .zip(repeat_counts(f.sig.under_args(), f.sig.under_outputs(), n));
                let Some(((args, outputs), (under_args, under_outputs))) = counts else {
                    return Err(too_many(usize::MAX));
                };
                check_counts(&[args, outputs, under_args, under_outputs])?;
                let under = Signature::new(under_args, under_outputs);
                self.handle_counts(args, outputs, under);
            }
            None => {
                return Err(SigCheckError::from(format!(
                    "{} with a non-constant repetition count \
                    must use a function with equal arguments and outputs, \
                    but its function has signature {}",
                    Primitive::Repeat.name(),
                    f.sig
                ))
                .ambiguous())
            }
        }
        Ok(())
    }
    fn nodes(&mut self, nodes: &[Node]) -> Result<(), SigCheckError> {
        for node in nodes {
            self.node(node)?;
        }
        Ok(())
    }
    fn node(&mut self, node: &Node) -> Result<(), SigCheckError> {
        use Primitive::*;
        match node {
            Node::Run(nodes) => self.nodes(nodes)?,
            Node::Push(val) => self.stack.push(BasicValue::from_val(val)),
            Node::Prim(Identity, _) => {
                let a = self.pop();
                self.stack.push(a);
            }
            Node::Prim(Dup, _) => {
                let a = self.pop();
                self.stack.push(a.clone());
                self.stack.push(a);
            }
            Node::Prim(Flip, _) => {
                let a = self.pop();
                let b = self.pop();
                self.stack.push(a);
                self.stack.push(b);
            }
            Node::Prim(Over, _) => {
                let a = self.pop();
                let b = self.pop();
                self.stack.push(b.clone());
                self.stack.push(a);
                self.stack.push(b);
            }
            Node::Prim(prim, _) => {
                let sig = prim.sig().ok_or_else(|| {
                    SigCheckError::from(format!("{} must be used with a function", prim.name()))
                })?;
                self.handle_sig(sig);
            }
            Node::ImplPrim(prim, _) => {
                let sig = prim.sig().ok_or_else(|| {
                    SigCheckError::from(format!("{prim} must be used with a function"))
                })?;
                self.handle_sig(sig);
            }
            Node::Mod(Repeat, args, _) => {
                let [f] = args.as_slice() else {
                    return Err(wrong_arg_count(Repeat, args.len()));
                };
                self.repeat(f, None)?;
            }
            Node::ImplMod(ImplPrimitive::RepeatWithInverse, args, _) => {
                let [f, inv] = args.as_slice() else {
                    return Err(SigCheckError::from(format!(
                        "{} cannot be used with {} function(s)",
                        ImplPrimitive::RepeatWithInverse,
                        args.len()
                    )));
                };
                self.repeat(f, Some(inv))?;
            }
            Node::Mod(prim, args, _) => {
                let sig = modifier_sig(*prim, args)?;
                self.handle_sig(sig);
            }
            Node::ImplMod(prim, args, _) => {
                let sig = impl_modifier_sig(*prim, args)?;
                self.handle_sig(sig);
            }
            Node::Call(func, _) => self.handle_sig(func.sig),
            Node::PushUnder(n, _) => {
                for _ in 0..*n {
                    self.pop();
                }
                self.under_height += n;
            }
            Node::CopyToUnder(n, _) => {
                for _ in 0..*n {
                    self.pop();
                }
                for _ in 0..*n {
                    self.stack.push(BasicValue::Other);
                }
                self.under_height += n;
            }
            Node::PopUnder(n, _) => {
                self.pop_under(*n);
                for _ in 0..*n {
                    self.stack.push(BasicValue::Other);
                }
            }
        }
        Ok(())
    }
}

/// The arguments and outputs of running a function `n` times
fn repeat_counts(args: usize, outputs: usize, n: usize) -> Option<(usize, usize)> {
    Some(match args.cmp(&outputs) {
        Ordering::Equal => (args, outputs),
        Ordering::Less => (args, (outputs - args).checked_mul(n)?.checked_add(args)?),
        Ordering::Greater => (
            (args - outputs).checked_mul(n - 1)?.checked_add(args)?,
            outputs,
        ),
    })
}

fn too_many(count: usize) -> SigCheckError {
    SigCheckError::from(if count == usize::MAX {
        format!(
            "Signature has more than {} arguments or outputs",
            Signature::MAX_COUNT
        )
    } else {
        format!(
            "Signature would have {count} arguments or outputs, but the maximum is {}",
            Signature::MAX_COUNT
        )
    })
}

fn check_counts(counts: &[usize]) -> Result<(), SigCheckError> {
    match counts.iter().max() {
        Some(&max) if max > Signature::MAX_COUNT => Err(too_many(max)),
        _ => Ok(()),
    }
}

fn wrong_arg_count(prim: Primitive, n: usize) -> SigCheckError {
    SigCheckError::from(format!(
        "{} expects {} function argument(s), but got {n}",
        prim.name(),
        prim.modifier_args().unwrap_or(0)
    ))
}

fn under_sum(ops: &[SigNode]) -> (usize, usize) {
    ops.iter().fold((0, 0), |(a, o), sn| {
        (a + sn.sig.under_args(), o + sn.sig.under_outputs())
    })
}

/// Get the signature of a modifier applied to some functions
pub(crate) fn modifier_sig(prim: Primitive, ops: &[SigNode]) -> Result<Signature, SigCheckError> {
    use Primitive::*;
    let (ua, uo) = under_sum(ops);
    let (args, outputs) = match (prim, ops) {
        (Dip, [f]) => (f.sig.args() + 1, f.sig.outputs() + 1),
        (On | By, [f]) => (f.sig.args().max(1), f.sig.outputs() + 1),
        (Both, [f]) => {
            let counts = [f.sig.args() * 2, f.sig.outputs() * 2, ua * 2, uo * 2];
            check_counts(&counts)?;
            return Ok(Signature::new(counts[0], counts[1]).with_under(counts[2], counts[3]));
        }
        (Fork, [f, g]) => (
            f.sig.args().max(g.sig.args()),
            f.sig.outputs() + g.sig.outputs(),
        ),
        (Bracket, [f, g]) => (
            f.sig.args() + g.sig.args(),
            f.sig.outputs() + g.sig.outputs(),
        ),
        (Rows | Each, [f]) => (f.sig.args(), f.sig.outputs()),
        (Reduce | Scan, [f]) => {
            if f.sig != (2, 1) {
                return Err(SigCheckError::from(format!(
                    "{}'s function must have signature |2.1, but it has signature {}",
                    prim.name(),
                    f.sig
                )));
            }
            (1, 1)
        }
        (Repeat, [f]) if f.sig.args() == f.sig.outputs() => (f.sig.args() + 1, f.sig.outputs()),
        (Repeat, [_]) => {
            return Err(SigCheckError::from(format!(
                "{} with an unbalanced function needs a constant repetition count",
                Repeat.name()
            ))
            .ambiguous())
        }
        (prim, ops) if prim.is_modifier() => return Err(wrong_arg_count(prim, ops.len())),
        (prim, _) => {
            return Err(SigCheckError::from(format!(
                "{} is not a modifier",
                prim.name()
            )))
        }
    };
    check_counts(&[args, outputs, ua, uo])?;
    Ok(Signature::new(args, outputs).with_under(ua, uo))
}

/// Get the signature of an implementation modifier applied to some functions
pub(crate) fn impl_modifier_sig(
    prim: ImplPrimitive,
    ops: &[SigNode],
) -> Result<Signature, SigCheckError> {
    match (prim, ops) {
        (ImplPrimitive::RepeatWithInverse, [f, _]) => {
            modifier_sig(Primitive::Repeat, std::slice::from_ref(f))
        }
        (ImplPrimitive::UnScan, [f]) if f.sig == (2, 1) => Ok(Signature::new(1, 1)),
        (ImplPrimitive::UnScan, [f]) => Err(SigCheckError::from(format!(
            "{prim}'s function must have signature |2.1, but it has signature {}",
            f.sig
        ))),
        (prim, ops) => Err(SigCheckError::from(format!(
            "{prim} cannot be used with {} function(s)",
            ops.len()
        ))),
    }
}

#[cfg(test)]
mod test {
    use ecow::eco_vec;

    use super::*;
    use Primitive::*;

    fn prim(p: Primitive) -> Node {
        Node::Prim(p, 0)
    }

    fn sn(nodes: impl IntoIterator<Item = Node>) -> SigNode {
        Node::from_iter(nodes).sig_node().unwrap()
    }

    #[test]
    fn sequences() {
        assert_eq!(nodes_sig(&[prim(Dup), prim(Add)]).unwrap(), (1, 1));
        assert_eq!(nodes_sig(&[Node::new_push(1), prim(Add)]).unwrap(), (1, 1));
        assert_eq!(nodes_sig(&[prim(Flip), prim(Pop)]).unwrap(), (2, 1));
        assert_eq!(nodes_sig(&[]).unwrap(), (0, 0));
    }

    #[test]
    fn modifiers() {
        let dip = Node::Mod(Dip, eco_vec![sn([prim(Add)])], 0);
        assert_eq!(dip.sig().unwrap(), (3, 2));
        let on = Node::Mod(On, eco_vec![sn([prim(Add)])], 0);
        assert_eq!(on.sig().unwrap(), (2, 2));
        let fork = Node::Mod(Fork, eco_vec![sn([prim(Neg)]), sn([prim(Add)])], 0);
        assert_eq!(fork.sig().unwrap(), (2, 2));
        let bad = Node::Mod(Reduce, eco_vec![sn([prim(Neg)])], 0);
        assert!(bad.sig().is_err());
    }

    #[test]
    fn repeat_needs_constant_for_unbalanced() {
        let rep = Node::Mod(Repeat, eco_vec![sn([prim(Dup)])], 0);
        let err = rep.sig().unwrap_err();
        assert!(err.ambiguous);
        let counted = Node::from([Node::new_push(3), rep]);
        assert_eq!(counted.sig().unwrap(), (1, 4));
        let balanced = Node::Mod(Repeat, eco_vec![sn([prim(Neg)])], 0);
        assert_eq!(balanced.sig().unwrap(), (2, 1));
    }

    #[test]
    fn repeat_counts_are_computed_directly() {
        let dup = Node::Mod(Repeat, eco_vec![sn([prim(Dup)])], 0);
        let many = Node::from([Node::new_push(65534), dup.clone()]);
        assert_eq!(many.sig().unwrap(), (1, 65535));
        let too_many = Node::from([Node::new_push(65536), dup]);
        let err = too_many.sig().unwrap_err();
        assert!(!err.ambiguous);
        let pop = Node::Mod(Repeat, eco_vec![sn([prim(Pop)])], 0);
        let huge = Node::from([Node::new_push(1e15), pop]);
        assert!(huge.sig().is_err());
        let add = Node::Mod(Repeat, eco_vec![sn([prim(Add)])], 0);
        let three = Node::from([Node::new_push(3), add]);
        assert_eq!(three.sig().unwrap(), (4, 1));
    }

    #[test]
    fn nested_counts_are_bounded() {
        let dup = Node::Mod(Repeat, eco_vec![sn([prim(Dup)])], 0);
        let wide = Node::from([Node::new_push(65534), dup]).sig_node().unwrap();
        let both = Node::Mod(Both, eco_vec![wide.clone()], 0);
        assert!(both.sig().is_err());
        let dip = Node::Mod(Dip, eco_vec![wide], 0);
        assert!(dip.sig().is_err());
    }

    #[test]
    fn negative_counts_repeat_the_inverse() {
        let with_inv = |count: f64| {
            let rep = Node::ImplMod(
                ImplPrimitive::RepeatWithInverse,
                eco_vec![sn([prim(Dup)]), sn([prim(Pop)])],
                0,
            );
            Node::from([Node::new_push(count), rep]).sig()
        };
        assert_eq!(with_inv(2.0).unwrap(), (1, 3));
        assert_eq!(with_inv(-2.0).unwrap(), (2, 0));
        assert!(with_inv(0.5).unwrap_err().ambiguous);
        let plain = Node::Mod(Repeat, eco_vec![sn([prim(Dup)])], 0);
        assert!(Node::from([Node::new_push(-2), plain]).sig().unwrap_err().ambiguous);
    }

    #[test]
    fn prefixes() {
        let nodes = [Node::new_push(1), Node::new_push(2), prim(Add), prim(Neg), prim(Add)];
        let sigs: Vec<_> = prefix_sigs(&nodes).map(|sig| (sig.args(), sig.outputs())).collect();
        assert_eq!(sigs, [(0, 1), (0, 2), (0, 1), (0, 1), (1, 1)]);
        let bad = [prim(Neg), prim(Dip), prim(Neg)];
        assert_eq!(prefix_sigs(&bad).count(), 1);
    }

    #[test]
    fn under_stack() {
        let sig = nodes_sig(&[Node::CopyToUnder(1, 0), prim(Abs)]).unwrap();
        assert_eq!(sig, (1, 1));
        assert_eq!(sig.under(), (0, 1));
        assert_eq!(nodes_clean_sig(&[Node::CopyToUnder(1, 0), prim(Abs)]), None);
        let sig = nodes_sig(&[Node::PushUnder(1, 0), Node::PopUnder(1, 0)]).unwrap();
        assert_eq!(sig, (1, 1));
        assert!(sig.is_under_balanced());
        assert_eq!(sig.under(), (0, 0));
    }
}
