use std::fmt;

use ecow::eco_vec;

use crate::{
    check::prefix_sigs,
    FunctionId,
    ImplPrimitive::*,
    Node::{self, *},
    Primitive::*,
    SigNode, Signature,
};

use super::{
    dbgln, generic,
    un::{InvertPattern, Val},
    un_inverse, un_step, Generic, InversionError, InversionResult, Inverter, RULES,
};

impl Node {
    /// Get both parts of this node's under inverse one level of nesting deeper
    pub(crate) fn under_inverse(
        &self,
        g_sig: Signature,
        cx: &Inverter,
    ) -> InversionResult<(Node, Node)> {
        dbgln!("under-inverting {self:?}");
        cx.nested(|| under_inverse(self.as_slice(), g_sig, cx))
    }
}

impl SigNode {
    /// Get both parts of this node's under inverse
    pub(crate) fn under_inverse(
        &self,
        g_sig: Signature,
        cx: &Inverter,
    ) -> InversionResult<(SigNode, SigNode)> {
        let (before, after) = self.node.under_inverse(g_sig, cx)?;
        let (before, after) = (before.sig_node()?, after.sig_node()?);
        Ok((before, after))
    }
}

/// Derive the functions to run before and after some inner function
///
/// `g_sig` is the signature of the inner function.
pub(crate) fn under_inverse(
    input: &[Node],
    g_sig: Signature,
    cx: &Inverter,
) -> InversionResult<(Node, Node)> {
    if input.is_empty() {
        return Ok((Node::empty(), Node::empty()));
    }
    cx.cached_under(input, g_sig, || {
        let mut steps = Vec::new();
        let mut curr = input;
        while let [head, ..] = curr {
            let (rest, step) = under_step(curr, g_sig, cx).map_err(|e| match e {
                Generic => InversionError::NotGettable(
                    head.function_id().unwrap_or(FunctionId::Unnamed),
                    head.span().unwrap_or_default(),
                ),
                e => e,
            })?;
            steps.push(step);
            curr = rest;
        }
        // Build from the end so wrappers can see everything after them
        let mut before = Node::empty();
        let mut after = Node::empty();
        let mut rest_sigs = Some((Signature::default(), Signature::default()));
        for step in steps.into_iter().rev() {
            let (bef, aft) = match step {
                Step::Pair(bef, aft) => (bef, aft),
                Step::Wrap(wrap) => {
                    let sigs = match rest_sigs {
                        Some(sigs) => sigs,
                        None => (before.sig()?, after.sig()?),
                    };
                    rest_sigs = Some(sigs);
                    wrap.resolve(g_sig, sigs)
                }
            };
            rest_sigs = rest_sigs
                .zip(bef.sig().ok().zip(aft.sig().ok()))
                .map(|((b, a), (bef_sig, aft_sig))| (b.compose(bef_sig), aft_sig.compose(a)));
            before.prepend(bef);
            after.push(aft);
        }
        dbgln!("under-inverted\n  {input:?}\n  to  {before:?}\n  and {after:?}");
        Ok((before, after))
    })
}

/// What one step of an under derivation produced
enum Step {
    /// The functions to run before and after
    Pair(Node, Node),
    /// A node whose functions depend on everything after it
    Wrap(Wrap),
}

/// A node whose under depends on the signatures of the functions derived for
/// the nodes after it
#[derive(Debug)]
enum Wrap {
    Flip(usize),
    Dip {
        before: SigNode,
        after: SigNode,
        span: usize,
    },
}

impl Wrap {
    /// Get the functions to run before and after,
    /// given the signatures of the rest's before and after
    fn resolve(
        self,
        g_sig: Signature,
        (rest_before, rest_after): (Signature, Signature),
    ) -> (Node, Node) {
        match self {
            Wrap::Flip(span) => {
                let total_args = g_sig.args() + rest_before.args() + rest_after.args();
                let total_outputs =
                    g_sig.outputs() + rest_before.outputs() + rest_after.outputs();
                let after = if total_outputs < total_args {
                    Node::empty()
                } else {
                    Prim(Flip, span)
                };
                (Prim(Flip, span), after)
            }
            Wrap::Dip {
                before,
                after,
                span,
            } => {
                let bal_symmetric =
                    g_sig.args() + rest_before.args() <= g_sig.outputs() + rest_after.outputs();
                let bal_assymetic = rest_before.args() > 1 && rest_before == rest_after.inverse();
                let after = if bal_symmetric || bal_assymetic {
                    Mod(Dip, eco_vec![after], span)
                } else {
                    after.node
                };
                (Mod(Dip, eco_vec![before], span), after)
            }
        }
    }
}

fn under_step<'a>(
    input: &'a [Node],
    g_sig: Signature,
    cx: &Inverter,
) -> InversionResult<(&'a [Node], Step)> {
    let mut error = Generic;
    for pattern in UNDER_PATTERNS {
        match pattern.under_extract(input, g_sig, cx) {
            Ok((rest, before, after)) => {
                dbgln!(
                    "matched pattern {pattern:?}\n  on {input:?}\n  to  {before:?}\n  and {after:?}"
                );
                return Ok((rest, Step::Pair(before, after)));
            }
            Err(e) => error = error.max(e),
        }
    }
    match wrap_extract(input, g_sig, cx) {
        Ok((rest, wrap)) => {
            dbgln!("matched wrapper {wrap:?}\n  on {input:?}");
            return Ok((rest, Step::Wrap(wrap)));
        }
        Err(e) => error = error.max(e),
    }
    for pattern in LAST_PATTERNS {
        match pattern.under_extract(input, g_sig, cx) {
            Ok((rest, before, after)) => {
                dbgln!(
                    "matched pattern {pattern:?}\n  on {input:?}\n  to  {before:?}\n  and {after:?}"
                );
                return Ok((rest, Step::Pair(before, after)));
            }
            Err(e) => error = error.max(e),
        }
    }
    Err(error)
}

static UNDER_PATTERNS: &[&dyn UnderPattern] = &[
    &CustomPat,
    &RulePat,
    &EachPat,
    &RowsPat,
    &RepeatPat,
    &Trivial,
    &StashAntiPat,
];

// Tried after flip and dip
static LAST_PATTERNS: &[&dyn UnderPattern] = &[&FromUnPat, &ConstPat];

trait UnderPattern: fmt::Debug + Sync {
    fn under_extract<'a>(
        &self,
        input: &'a [Node],
        g_sig: Signature,
        cx: &Inverter,
    ) -> InversionResult<(&'a [Node], Node, Node)>;
}

macro_rules! under {
    // Optional parens
    ($($doc:literal,)? ($($tt:tt)*), $body:expr) => {
        under!($($doc,)? $($tt)*, $body);
    };
    // Main impl
    ($($doc:literal,)? $name:ident, $input:ident, $g_sig:tt, $cx:tt, $body:expr) => {
        #[derive(Debug)]
        $(#[doc = $doc])?
        struct $name;
        impl UnderPattern for $name {
            fn under_extract<'a>(
                &self,
                $input: &'a [Node],
                $g_sig: Signature,
                $cx: &Inverter,
            ) -> InversionResult<(&'a [Node], Node, Node)> {
                $body
            }
        }
    };
    // Mod pattern
    ($($doc:literal,)? $name:ident, $input:ident, $g_sig:tt, $cx:tt, $prim:ident, $span:ident, $args:pat, $body:expr) => {
        under!($($doc,)? $name, $input, $g_sig, $cx, {
            let [Mod($prim, args, $span), $input @ ..] = $input else {
                return generic();
            };
            #[allow(irrefutable_let_patterns)]
            let $args = args.as_slice() else {
                return generic();
            };
            let $span = *$span;
            $body
        });
    };
}

under!(
    "Use an under pair or inverse the author registered",
    (CustomPat, input, _, cx),
    {
        let [node, input @ ..] = input else {
            return generic();
        };
        let id = node.function_id().ok_or(Generic)?;
        if let Some((before, after)) = cx.custom.resolve_under(&id) {
            dbgln!("using custom under for {id}");
            return Ok((input, before.node.clone(), after.node.clone()));
        }
        let inv = cx.custom.resolve_inverse(&id).ok_or(Generic)?;
        dbgln!("using custom inverse for under {id}");
        Ok((input, node.clone(), inv.node.clone()))
    }
);

under!(
    "Use the longest matching under rule",
    (RulePat, input, _, cx),
    {
        let (len, before, after) = RULES.lookup_under(input, cx).ok_or(Generic)?;
        Ok((&input[len..], before, after))
    }
);

/// Match a flip, or a dip of a function that takes arguments
fn wrap_extract<'a>(
    input: &'a [Node],
    g_sig: Signature,
    cx: &Inverter,
) -> InversionResult<(&'a [Node], Wrap)> {
    match input {
        [Prim(Flip, span), input @ ..] => Ok((input, Wrap::Flip(*span))),
        [Mod(Dip, args, span), input @ ..] => {
            let [f] = args.as_slice() else {
                return generic();
            };
            if f.sig.args() == 0 {
                return generic();
            }
            let inner_g_sig = Signature::new(
                g_sig.args().saturating_sub(1),
                if g_sig.args() > g_sig.outputs() {
                    g_sig.outputs()
                } else {
                    g_sig.outputs().saturating_sub(1)
                },
            );
            let (before, after) = f.under_inverse(inner_g_sig, cx)?;
            let span = *span;
            Ok((input, Wrap::Dip { before, after, span }))
        }
        _ => generic(),
    }
}

under!(EachPat, input, g_sig, cx, Each, span, [f], {
    let (f_before, f_after) = f.under_inverse(g_sig, cx)?;
    if f_before.sig.under() != (0, 0) || f_after.sig.under() != (0, 0) {
        return generic();
    }
    let befores = Mod(Each, eco_vec![f_before], span);
    let afters = Mod(Each, eco_vec![f_after], span);
    Ok((input, befores, afters))
});

under!(RowsPat, input, g_sig, cx, Rows, span, [f], {
    let (f_before, f_after) = f.under_inverse(g_sig, cx)?;
    if f_before.sig.under() != (0, 0) || f_after.sig.under() != (0, 0) {
        return generic();
    }
    let befores = Mod(Rows, eco_vec![f_before], span);
    let afters = Mod(Rows, eco_vec![f_after], span);
    Ok((input, befores, afters))
});

under!(RepeatPat, input, g_sig, cx, {
    let (input, val) = if let Ok((input, val)) = Val.invert_extract(input, cx) {
        (input, Some(val))
    } else {
        (input, None)
    };
    let (f, span, input) = match input {
        [Mod(Repeat, args, span), input @ ..] => {
            let [f] = args.as_slice() else {
                return generic();
            };
            (f, *span, input)
        }
        [ImplMod(RepeatWithInverse, args, span), input @ ..] => {
            let [f, _] = args.as_slice() else {
                return generic();
            };
            (f, *span, input)
        }
        _ => return generic(),
    };
    let (f_before, f_after) = f.under_inverse(g_sig, cx)?;
    let mut befores = val.clone().unwrap_or(CopyToUnder(1, span));
    befores.push(Mod(Repeat, eco_vec![f_before], span));
    let mut afters = val.unwrap_or(PopUnder(1, span));
    afters.push(Mod(Repeat, eco_vec![f_after], span));
    Ok((input, befores, afters))
});

#[derive(Debug)]
struct Trivial;
impl UnderPattern for Trivial {
    fn under_extract<'a>(
        &self,
        input: &'a [Node],
        g_sig: Signature,
        cx: &Inverter,
    ) -> InversionResult<(&'a [Node], Node, Node)> {
        match input {
            [Call(f, _), input @ ..] => {
                let body = cx.asm.get(f).ok_or(Generic)?;
                let (before, after) = body.under_inverse(g_sig, cx).map_err(|e| e.func(f))?;
                Ok((input, before, after))
            }
            _ => generic(),
        }
    }
}

under!(
    "Derives under inverses from un inverses",
    (FromUnPat, input, _, cx),
    {
        let (inp, inv) = un_step(input, cx, true)?;
        let node = Node::from(&input[..input.len() - inp.len()]);
        dbgln!("matched un pattern for under\n  on {input:?}\n  to {node:?}\n  and {inv:?}");
        Ok((inp, node, inv))
    }
);

under!(
    "Derives under inverses from anti inverses",
    (StashAntiPat, input, _, cx),
    {
        let (len, inv) = RULES.lookup_anti(input, cx).ok_or(Generic)?;
        let (nodes, new) = input.split_at(len);
        let span = nodes
            .iter()
            .find_map(Node::span)
            .or_else(|| inv.span())
            .unwrap_or(0);
        let before = Node::from_iter([CopyToUnder(1, span), Node::from(nodes)]);
        let after = Node::from_iter([PopUnder(1, span), inv]);
        dbgln!("matched anti pattern for under\n  on {input:?}\n  to {before:?}\n  and {after:?}");
        Ok((new, before, after))
    }
);

under!(
    "A constant that is an argument to a later function",
    (ConstPat, input, _, cx),
    {
        let (input, val) = Val.invert_extract(input, cx)?;
        for (i, sig) in prefix_sigs(input).enumerate() {
            let frag = &input[..=i];
            if sig.under() == (0, 0) {
                match sig.args() {
                    0 => {}
                    1 => return generic(),
                    _ => {
                        if let Some(sig) = un_inverse(frag, cx).ok().and_then(|inv| inv.clean_sig()) {
                            if sig.args() < sig.outputs() {
                                return generic();
                            }
                        }
                        return Ok((input, val, Node::empty()));
                    }
                }
            }
        }
        generic()
    }
);

#[cfg(test)]
mod test {
    use super::*;
    use crate::{compile::invert::CustomInverses, Assembly, ImplPrimitive::*};

    fn under(input: &[Node], g_sig: Signature) -> InversionResult<(Node, Node)> {
        let asm = Assembly::default();
        let custom = CustomInverses::default();
        let cx = Inverter::new(&asm, &custom, None, 16);
        under_inverse(input, g_sig, &cx)
    }

    #[test]
    fn stash_rules() {
        let (before, after) = under(&[Prim(First, 0)], Signature::new(1, 1)).unwrap();
        assert_eq!(before, Node::from([CopyToUnder(1, 0), Prim(First, 0)]));
        assert_eq!(after, Node::from([PopUnder(1, 0), ImplPrim(UndoFirst, 0)]));
    }

    #[test]
    fn anti_stash() {
        let (before, after) = under(&[Prim(Add, 3)], Signature::new(1, 1)).unwrap();
        assert_eq!(before, Node::from([CopyToUnder(1, 3), Prim(Add, 3)]));
        assert_eq!(after, Node::from([PopUnder(1, 3), Prim(Sub, 3)]));
    }

    #[test]
    fn from_un() {
        let input = [Node::new_push(2), Prim(Mul, 1), Prim(Neg, 2)];
        let (before, after) = under(&input, Signature::new(1, 1)).unwrap();
        assert_eq!(before, Node::from(&input[..]));
        assert_eq!(
            after,
            Node::from([Prim(Neg, 2), Node::new_push(2), Prim(Div, 1)])
        );
    }

    #[test]
    fn afters_are_prepended() {
        let input = [Prim(First, 0), Prim(Floor, 1)];
        let (before, after) = under(&input, Signature::new(1, 1)).unwrap();
        let sig = before.sig().unwrap();
        assert_eq!(sig.under_outputs(), 2);
        assert!(matches!(after[0], PopUnder(1, 1)));
        assert!(matches!(after[after.len() - 1], ImplPrim(UndoFirst, 0)));
    }

    #[test]
    fn flips_wrap_the_rest() {
        let input = [Prim(Flip, 0), Prim(First, 1)];
        let (before, after) = under(&input, Signature::new(1, 1)).unwrap();
        assert_eq!(
            before,
            Node::from([Prim(Flip, 0), CopyToUnder(1, 1), Prim(First, 1)])
        );
        assert_eq!(
            after,
            Node::from([PopUnder(1, 1), ImplPrim(UndoFirst, 1), Prim(Flip, 0)])
        );
    }

    #[test]
    fn not_gettable() {
        let e = under(&[Prim(Neg, 0), Prim(Len, 5)], Signature::new(1, 1)).unwrap_err();
        assert_eq!(e, InversionError::NotGettable(Len.into(), 5));
    }
}
