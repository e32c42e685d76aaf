//! The static catalogue of inverse, anti, contra and under rules
//!
//! Every rule is a pattern over a fixed run of nodes plus templates for what to
//! emit in its place. A lookup picks the rule that consumes the most nodes.
//! Rules that consume the same number of nodes are tried in the order they are
//! declared here, so reordering them changes which inverse is derived.

use indexmap::IndexMap;
use once_cell::sync::Lazy;

use crate::{
    check::prefix_sigs,
    ImplPrimitive::{self, *},
    Node::{self, *},
    Primitive::{self, *},
    Purity,
};

use super::{dbgln, Inverter};

/// An element of a rule's pattern
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Pat {
    /// A specific primitive
    Prim(Primitive),
    /// A specific implementation primitive
    Impl(ImplPrimitive),
    /// A pure run of nodes that pushes exactly one value
    Val,
}

/// An element of a rule's template
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Tmpl {
    Prim(Primitive),
    Impl(ImplPrimitive),
    /// The nth value captured by the pattern
    Val(usize),
    Num(f64),
    PushUnd(usize),
    CopyUnd(usize),
    PopUnd(usize),
}

/// A rule that replaces a pattern with its inverse
#[derive(Debug)]
pub(crate) struct InverseRule {
    pub name: &'static str,
    pub pattern: Vec<Pat>,
    pub inverse: Vec<Tmpl>,
}

/// A rule that replaces a pattern with the two halves of an under
#[derive(Debug)]
pub(crate) struct UnderRule {
    pub name: &'static str,
    pub pattern: Vec<Pat>,
    pub before: Vec<Tmpl>,
    pub after: Vec<Tmpl>,
}

trait RuleElem: Copy {
    fn pat(self) -> Pat;
    fn tmpl(self) -> Tmpl;
}

impl RuleElem for Primitive {
    fn pat(self) -> Pat {
        Pat::Prim(self)
    }
    fn tmpl(self) -> Tmpl {
        Tmpl::Prim(self)
    }
}

impl RuleElem for ImplPrimitive {
    fn pat(self) -> Pat {
        Pat::Impl(self)
    }
    fn tmpl(self) -> Tmpl {
        Tmpl::Impl(self)
    }
}

macro_rules! pat {
    (Val) => {
        Pat::Val
    };
    ($p:ident) => {
        RuleElem::pat($p)
    };
}

macro_rules! tmpl {
    ((Val $i:literal)) => {
        Tmpl::Val($i)
    };
    ((Num $n:literal)) => {
        Tmpl::Num($n)
    };
    ((PushUnd $n:literal)) => {
        Tmpl::PushUnd($n)
    };
    ((CopyUnd $n:literal)) => {
        Tmpl::CopyUnd($n)
    };
    ((PopUnd $n:literal)) => {
        Tmpl::PopUnd($n)
    };
    ($p:ident) => {
        RuleElem::tmpl($p)
    };
}

macro_rules! inverse_rules {
    ($($name:literal: [$($pat:tt),*] => [$($tmpl:tt),*]),* $(,)?) => {
        vec![$(InverseRule {
            name: $name,
            pattern: vec![$(pat!($pat)),*],
            inverse: vec![$(tmpl!($tmpl)),*],
        }),*]
    };
}

macro_rules! under_rules {
    ($($name:literal: [$($pat:tt),*] => [$($before:tt),*] / [$($after:tt),*]),* $(,)?) => {
        vec![$(UnderRule {
            name: $name,
            pattern: vec![$(pat!($pat)),*],
            before: vec![$(tmpl!($before)),*],
            after: vec![$(tmpl!($after)),*],
        }),*]
    };
}

fn inverse_table() -> Vec<InverseRule> {
    inverse_rules![
        // Self-inverse
        "identity": [Identity] => [Identity],
        "flip": [Flip] => [Flip],
        "negate": [Neg] => [Neg],
        "not": [Not] => [Not],
        "reverse": [Reverse] => [Reverse],
        // Monadic pairs
        "sine": [Sin] => [Asin],
        "arcsine": [Asin] => [Sin],
        "ln": [Ln] => [Exp],
        "exp": [Exp] => [Ln],
        "sqrt": [Sqrt] => [Dup, Mul],
        "range": [Range] => [UnRange],
        "un range": [UnRange] => [Range],
        // Splitting
        "add": [Add] => [UnAdd],
        "un add": [UnAdd] => [Add],
        "multiply": [Mul] => [UnMul],
        "un multiply": [UnMul] => [Mul],
        "couple": [Couple] => [UnCouple],
        "un couple": [UnCouple] => [Couple],
        "join": [Join] => [UnJoin],
        "un join": [UnJoin] => [Join],
        "duplicate": [Dup] => [Over, MatchPattern],
        // With a constant
        "add constant": [Val, Add] => [(Val 0), Sub],
        "flipped add constant": [Val, Flip, Add] => [(Val 0), Sub],
        "subtract constant": [Val, Sub] => [(Val 0), Add],
        "subtract from constant": [Val, Flip, Sub] => [(Val 0), Flip, Sub],
        "multiply constant": [Val, Mul] => [(Val 0), Div],
        "flipped multiply constant": [Val, Flip, Mul] => [(Val 0), Div],
        "divide constant": [Val, Div] => [(Val 0), Mul],
        "divide constant by": [Val, Flip, Div] => [(Val 0), Flip, Div],
        "power constant": [Val, Pow] => [(Val 0), Root],
        "root constant": [Val, Root] => [(Val 0), Pow],
        "constant to the power": [Val, Flip, Pow] => [(Val 0), Log],
        "log constant": [Val, Log] => [(Val 0), Flip, Pow],
        "rotate constant": [Val, Rotate] => [(Val 0), Neg, Rotate],
        // Idioms
        "double": [Dup, Add] => [(Num 2.0), Div],
        "square": [Dup, Mul] => [Sqrt],
        "reverse reverse": [Reverse, Reverse] => [Identity],
        "reverse rotate": [Reverse, Val, Rotate] => [Reverse, (Val 0), Rotate],
    ]
}

fn anti_table() -> Vec<InverseRule> {
    inverse_rules![
        "add": [Add] => [Sub],
        "flipped add": [Flip, Add] => [Sub],
        "subtract": [Sub] => [Add],
        "flipped subtract": [Flip, Sub] => [Flip, Sub],
        "multiply": [Mul] => [Div],
        "flipped multiply": [Flip, Mul] => [Div],
        "divide": [Div] => [Mul],
        "flipped divide": [Flip, Div] => [Flip, Div],
        "power": [Pow] => [Root],
        "root": [Root] => [Pow],
        "flipped power": [Flip, Pow] => [Log],
        "log": [Log] => [Flip, Pow],
        "rotate": [Rotate] => [Neg, Rotate],
    ]
}

fn contra_table() -> Vec<InverseRule> {
    inverse_rules![
        "add": [Add] => [Flip, Sub],
        "flipped add": [Flip, Add] => [Flip, Sub],
        "subtract": [Sub] => [Sub],
        "flipped subtract": [Flip, Sub] => [Add],
        "multiply": [Mul] => [Flip, Div],
        "flipped multiply": [Flip, Mul] => [Flip, Div],
        "divide": [Div] => [Div],
        "flipped divide": [Flip, Div] => [Mul],
        "power": [Pow] => [Flip, Log],
        "log": [Log] => [Root],
    ]
}

fn under_table() -> Vec<UnderRule> {
    under_rules![
        // Sign ops
        "absolute value": [Abs] => [(CopyUnd 1), Abs] / [(PopUnd 1), Sign, Mul],
        "sign": [Sign] => [(CopyUnd 1), Sign] / [(PopUnd 1), Flip, SetSign],
        // Rounding
        "floor": [Floor] => [Dup, Floor, Flip, Over, Sub, (PushUnd 1)] / [(PopUnd 1), Add],
        "ceiling": [Ceil] => [Dup, Ceil, Flip, Over, Sub, (PushUnd 1)] / [(PopUnd 1), Add],
        "round": [Round] => [Dup, Round, Flip, Over, Sub, (PushUnd 1)] / [(PopUnd 1), Add],
        "modulo constant": [Val, Modulo]
            => [(Val 0), Over, Over, Flip, Over, Div, Floor, Mul, (PushUnd 1), Modulo]
            / [(PopUnd 1), Add],
        "modulo": [Modulo]
            => [Over, Over, Flip, Over, Div, Floor, Mul, (PushUnd 1), Modulo]
            / [(PopUnd 1), Add],
        // Value retrieval
        "first": [First] => [(CopyUnd 1), First] / [(PopUnd 1), UndoFirst],
        "last": [Last] => [(CopyUnd 1), Last] / [(PopUnd 1), UndoLast],
        "pick constant": [Val, Pick] => [(Val 0), (CopyUnd 2), Pick] / [(PopUnd 2), UndoPick],
        "pick": [Pick] => [(CopyUnd 2), Pick] / [(PopUnd 2), UndoPick],
        "select constant": [Val, Select]
            => [(Val 0), (CopyUnd 2), Select] / [(PopUnd 2), UndoSelect],
        "select": [Select] => [(CopyUnd 2), Select] / [(PopUnd 2), UndoSelect],
        // Array restructuring
        "take constant": [Val, Take] => [(Val 0), (CopyUnd 2), Take] / [(PopUnd 2), UndoTake],
        "take": [Take] => [(CopyUnd 2), Take] / [(PopUnd 2), UndoTake],
        "drop constant": [Val, Drop] => [(Val 0), (CopyUnd 2), Drop] / [(PopUnd 2), UndoDrop],
        "drop": [Drop] => [(CopyUnd 2), Drop] / [(PopUnd 2), UndoDrop],
        "rotate constant": [Val, Rotate]
            => [(Val 0), (CopyUnd 1), Rotate] / [(PopUnd 1), Neg, Rotate],
        "rotate": [Rotate] => [(CopyUnd 1), Rotate] / [(PopUnd 1), Neg, Rotate],
        "reverse": [Reverse] => [Reverse] / [Reverse],
        "sort": [Sort] => [Dup, Rise, (CopyUnd 1), Select] / [(PopUnd 1), Rise, Select],
        // Stack
        "pop": [Pop] => [(PushUnd 1)] / [(PopUnd 1)],
        // Time
        "now": [Now] => [Now, (PushUnd 1)] / [Now, (PopUnd 1), Sub],
    ]
}

/// The first element of a pattern, used to narrow down which rules to try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Head {
    Prim(Primitive),
    Impl(ImplPrimitive),
    Val,
}

impl Head {
    fn of_pattern(pattern: &[Pat]) -> Option<Self> {
        Some(match pattern.first()? {
            Pat::Prim(prim) => Head::Prim(*prim),
            Pat::Impl(prim) => Head::Impl(*prim),
            Pat::Val => Head::Val,
        })
    }
    fn of_node(node: &Node) -> Option<Self> {
        match node {
            Prim(prim, _) => Some(Head::Prim(*prim)),
            ImplPrim(prim, _) => Some(Head::Impl(*prim)),
            _ => None,
        }
    }
}

/// Indices of rules in declaration order, grouped by their head
#[derive(Debug, Default)]
struct HeadIndex(IndexMap<Head, Vec<usize>>);

impl HeadIndex {
    fn new<'a>(patterns: impl IntoIterator<Item = &'a [Pat]>) -> Self {
        let mut index = IndexMap::<Head, Vec<usize>>::new();
        for (i, pattern) in patterns.into_iter().enumerate() {
            if let Some(head) = Head::of_pattern(pattern) {
                index.entry(head).or_default().push(i);
            }
        }
        HeadIndex(index)
    }
    /// Get the rules that might match a node sequence, in declaration order
    fn candidates(&self, input: &[Node]) -> Vec<usize> {
        let Some(first) = input.first() else {
            return Vec::new();
        };
        let mut indices: Vec<usize> = (Head::of_node(first).and_then(|h| self.0.get(&h)))
            .into_iter()
            .chain(self.0.get(&Head::Val))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices
    }
}

/// The complete catalogue of rules
#[derive(Debug)]
pub(crate) struct RuleTable {
    pub(crate) inverse: Vec<InverseRule>,
    pub(crate) anti: Vec<InverseRule>,
    pub(crate) contra: Vec<InverseRule>,
    pub(crate) under: Vec<UnderRule>,
    inverse_index: HeadIndex,
    anti_index: HeadIndex,
    contra_index: HeadIndex,
    under_index: HeadIndex,
}

/// The process-wide rule table
pub(crate) static RULES: Lazy<RuleTable> = Lazy::new(RuleTable::new);

/// A successful match of a pattern
#[derive(Debug, Default)]
struct Match {
    len: usize,
    vals: Vec<Node>,
    span: Option<usize>,
}

/// The lengths of the runs at the start of some nodes that push a single
/// value that can be computed ahead of time, longest first
pub(super) fn val_lens(input: &[Node], cx: &Inverter) -> Vec<usize> {
    let mut lens: Vec<usize> = (prefix_sigs(input).zip(input).enumerate())
        .take_while(|(_, (sig, node))| {
            sig.args() == 0
                && sig.under_args() == 0
                && node.is_pure(Purity::Pure, cx.asm)
                && !cx.custom.overrides(node)
        })
        .filter(|(_, (sig, _))| *sig == (0, 1) && sig.under_outputs() == 0)
        .map(|(i, _)| i + 1)
        .collect();
    lens.reverse();
    lens
}

/// Match a pattern against the start of some nodes
///
/// Values match the longest run they can, backtracking to shorter runs
/// if the rest of the pattern does not match.
fn match_pattern(pattern: &[Pat], input: &[Node], cx: &Inverter) -> Option<Match> {
    let Some((first, rest)) = pattern.split_first() else {
        return Some(Match::default());
    };
    match (first, input) {
        (Pat::Prim(p), [Prim(q, span), input @ ..]) if p == q => {
            let mut m = match_pattern(rest, input, cx)?;
            m.len += 1;
            m.span = Some(*span);
            Some(m)
        }
        (Pat::Impl(p), [ImplPrim(q, span), input @ ..]) if p == q => {
            let mut m = match_pattern(rest, input, cx)?;
            m.len += 1;
            m.span = Some(*span);
            Some(m)
        }
        (Pat::Val, _) => val_lens(input, cx).into_iter().find_map(|end| {
            let chunk = &input[..end];
            let mut m = match_pattern(rest, &input[end..], cx)?;
            m.len += end;
            m.vals.insert(0, Node::from(chunk));
            Some(m)
        }),
        _ => None,
    }
}

fn instantiate(template: &[Tmpl], vals: &[Node], span: usize) -> Node {
    Node::from_iter(template.iter().map(|elem| match *elem {
        Tmpl::Prim(prim) => Prim(prim, span),
        Tmpl::Impl(prim) => ImplPrim(prim, span),
        Tmpl::Val(i) => vals.get(i).cloned().unwrap_or_default(),
        Tmpl::Num(n) => Node::new_push(n),
        Tmpl::PushUnd(n) => PushUnder(n, span),
        Tmpl::CopyUnd(n) => CopyToUnder(n, span),
        Tmpl::PopUnd(n) => PopUnder(n, span),
    }))
}

impl RuleTable {
    fn new() -> Self {
        let inverse = inverse_table();
        let anti = anti_table();
        let contra = contra_table();
        let under = under_table();
        let index = |rules: &[InverseRule]| HeadIndex::new(rules.iter().map(|r| &*r.pattern));
        RuleTable {
            inverse_index: index(&inverse),
            anti_index: index(&anti),
            contra_index: index(&contra),
            under_index: HeadIndex::new(under.iter().map(|r| &*r.pattern)),
            inverse,
            anti,
            contra,
            under,
        }
    }
    /// Find the longest rule matching the start of the nodes
    fn longest<'r, R>(
        &self,
        rules: &'r [R],
        index: &HeadIndex,
        pattern: impl Fn(&R) -> &[Pat],
        input: &[Node],
        for_under: bool,
        cx: &Inverter,
    ) -> Option<(&'r R, Match)> {
        let overridden = |node: &Node| {
            if for_under {
                cx.custom.overrides(node)
            } else {
                cx.custom.overrides_un(node)
            }
        };
        let mut best: Option<(&R, Match)> = None;
        for i in index.candidates(input) {
            let rule = &rules[i];
            let Some(m) = match_pattern(pattern(rule), input, cx) else {
                continue;
            };
            if best.as_ref().is_some_and(|(_, b)| b.len >= m.len) {
                continue;
            }
            // Custom inverses take precedence over any rule
            if input[..m.len].iter().any(overridden) {
                continue;
            }
            best = Some((rule, m));
        }
        best
    }
    fn lookup(
        &self,
        rules: &[InverseRule],
        index: &HeadIndex,
        input: &[Node],
        cx: &Inverter,
    ) -> Option<(usize, Node)> {
        let (rule, m) = self.longest(rules, index, |r| &r.pattern, input, false, cx)?;
        let span = m.span.unwrap_or_default();
        let inv = instantiate(&rule.inverse, &m.vals, span);
        dbgln!("matched rule {:?} on {:?} to {inv:?}", rule.name, &input[..m.len]);
        Some((m.len, inv))
    }
    /// Look up the inverse of the start of some nodes
    pub(crate) fn lookup_inverse(&self, input: &[Node], cx: &Inverter) -> Option<(usize, Node)> {
        self.lookup(&self.inverse, &self.inverse_index, input, cx)
    }
    /// Look up the anti inverse of the start of some nodes
    ///
    /// Given the kept argument on top, it recovers the consumed one.
    pub(crate) fn lookup_anti(&self, input: &[Node], cx: &Inverter) -> Option<(usize, Node)> {
        self.lookup(&self.anti, &self.anti_index, input, cx)
    }
    /// Look up the contra inverse of the start of some nodes
    ///
    /// Given the result on top of the kept argument, it recovers the consumed one.
    pub(crate) fn lookup_contra(&self, input: &[Node], cx: &Inverter) -> Option<(usize, Node)> {
        self.lookup(&self.contra, &self.contra_index, input, cx)
    }
    /// Look up the under inverse of the start of some nodes
    pub(crate) fn lookup_under(&self, input: &[Node], cx: &Inverter) -> Option<(usize, Node, Node)> {
        let (rule, m) =
            self.longest(&self.under, &self.under_index, |r| &r.pattern, input, true, cx)?;
        let span = m.span.unwrap_or_default();
        let before = instantiate(&rule.before, &m.vals, span);
        let after = instantiate(&rule.after, &m.vals, span);
        dbgln!(
            "matched under rule {:?} on {:?} to {before:?} and {after:?}",
            rule.name,
            &input[..m.len]
        );
        Some((m.len, before, after))
    }
}
