use std::fmt;

use ecow::eco_vec;

use crate::{
    FunctionId,
    ImplPrimitive::*,
    Node::{self, *},
    Primitive::*,
    SigNode,
};

use super::{dbgln, generic, rules::val_lens, InversionError, InversionResult, Inverter, Generic, RULES};

impl Node {
    /// Get the un inverse of this node one level of nesting deeper
    pub(crate) fn un_inverse(&self, cx: &Inverter) -> InversionResult<Node> {
        dbgln!("un-inverting {self:?}");
        cx.nested(|| un_inverse(self.as_slice(), cx))
    }
    /// Get the anti inverse of this node one level of nesting deeper
    pub(crate) fn anti_inverse(&self, cx: &Inverter) -> InversionResult<Node> {
        dbgln!("anti-inverting {self:?}");
        cx.nested(|| dyadic_inverse(self.as_slice(), cx, Side::Anti))
    }
    /// Get the contra inverse of this node one level of nesting deeper
    pub(crate) fn contra_inverse(&self, cx: &Inverter) -> InversionResult<Node> {
        dbgln!("contra-inverting {self:?}");
        cx.nested(|| dyadic_inverse(self.as_slice(), cx, Side::Contra))
    }
}

impl SigNode {
    /// Get the un inverse of this node
    pub(crate) fn un_inverse(&self, cx: &Inverter) -> InversionResult<SigNode> {
        let inv = self.node.un_inverse(cx)?;
        Ok(SigNode::new(self.sig.inverse(), inv))
    }
    /// Get the anti inverse of this node
    pub(crate) fn anti_inverse(&self, cx: &Inverter) -> InversionResult<SigNode> {
        let inv = self.node.anti_inverse(cx)?;
        let sig = self.sig.anti().ok_or(Generic)?;
        Ok(SigNode::new(sig, inv))
    }
    /// Get the contra inverse of this node
    pub(crate) fn contra_inverse(&self, cx: &Inverter) -> InversionResult<SigNode> {
        let inv = self.node.contra_inverse(cx)?;
        let sig = self.sig.anti().ok_or(Generic)?;
        Ok(SigNode::new(sig, inv))
    }
}

/// Derive the inverse of a sequence of nodes
///
/// Each step inverts a prefix of the remaining nodes. Its inverse is prepended
/// to the result, so the inverse of `f g` is the inverse of `g` followed by the
/// inverse of `f`.
pub(crate) fn un_inverse(input: &[Node], cx: &Inverter) -> InversionResult<Node> {
    if input.is_empty() {
        return Ok(Node::empty());
    }
    cx.cached_un(input, || {
        let mut node = Node::empty();
        let mut curr = input;
        while let [head, ..] = curr {
            let (rest, inv) = un_step(curr, cx, false).map_err(|e| match e {
                Generic => InversionError::NoInverseForPrimitive(
                    head.function_id().unwrap_or(FunctionId::Unnamed),
                    head.span().unwrap_or_default(),
                ),
                e => e,
            })?;
            node.prepend(inv);
            curr = rest;
        }
        dbgln!("un-inverted\n  {input:?}\n  to {node:?}");
        Ok(node)
    })
}

/// Invert a prefix of some nodes, returning the nodes that remain
///
/// Patterns that only make sense for un are skipped if `for_under` is set.
/// If nothing more specific went wrong, the error is [`Generic`].
pub(crate) fn un_step<'a>(
    input: &'a [Node],
    cx: &Inverter,
    for_under: bool,
) -> InversionResult<(&'a [Node], Node)> {
    let mut error = Generic;
    for pattern in UN_PATTERNS
        .iter()
        .filter(|pat| !for_under || pat.allowed_in_under())
    {
        match pattern.invert_extract(input, cx) {
            Ok((rest, inv)) => {
                dbgln!("matched pattern {pattern:?}\n  on {input:?}\n  to {inv:?}");
                return Ok((rest, inv));
            }
            Err(e) => error = error.max(e),
        }
    }
    Err(error)
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Anti,
    Contra,
}

/// Derive the anti or contra inverse of a whole dyadic function
fn dyadic_inverse(input: &[Node], cx: &Inverter, side: Side) -> InversionResult<Node> {
    if let [Call(f, _)] = input {
        let body = cx.asm.get(f).ok_or(Generic)?;
        return cx
            .nested(|| dyadic_inverse(body.as_slice(), cx, side))
            .map_err(|e| e.func(f));
    }
    let found = match side {
        Side::Anti => RULES.lookup_anti(input, cx),
        Side::Contra => RULES.lookup_contra(input, cx),
    };
    match found {
        Some((len, inv)) if len == input.len() => Ok(inv),
        _ => generic(),
    }
}

static UN_PATTERNS: &[&dyn InvertPattern] = &[
    &CustomPat,
    &RulePat,
    &DipPat,
    &BothPat,
    &BracketPat,
    &ForkPat,
    &OnPat,
    &ByPat,
    &RowsPat,
    &EachPat,
    &ScanPat,
    &RepeatPat,
    &Trivial,
    &NoUnder(MatchConst),
];

pub(crate) trait InvertPattern: fmt::Debug + Sync {
    fn invert_extract<'a>(
        &self,
        input: &'a [Node],
        cx: &Inverter,
    ) -> InversionResult<(&'a [Node], Node)>;
    fn allowed_in_under(&self) -> bool {
        true
    }
}

macro_rules! inverse {
    // Optional parens
    ($($doc:literal,)? ($($tt:tt)*), $body:expr) => {
        inverse!($($doc,)? $($tt)*, $body);
    };
    ($($doc:literal,)? ($($tt:tt)*), ref, $pat:pat, $body:expr) => {
        inverse!($($doc,)? $($tt)*, ref, $pat, $body);
    };
    // Main impl
    ($($doc:literal,)? $name:ident, $input:ident, $cx:tt, $body:expr) => {
        $(#[doc = $doc])?
        #[derive(Debug)]
        pub(crate) struct $name;
        impl InvertPattern for $name {
            fn invert_extract<'a>(
                &self,
                $input: &'a [Node],
                $cx: &Inverter,
            ) -> InversionResult<(&'a [Node], Node)> {
                $body
            }
        }
    };
    ($($doc:literal,)? $name:ident, $input:ident, $cx:tt, ref, $pat:pat, $body:expr) => {
        inverse!($($doc,)? $name, $input, $cx, {
            let [$pat, ref $input @ ..] = $input else {
                return generic();
            };
            $body
        });
    };
    ($($doc:literal,)? $name:ident, $input:ident, $cx:tt, $prim:ident, $span:ident, $args:pat, $body:expr) => {
        inverse!($($doc,)? $name, $input, $cx, ref, Mod($prim, args, $span), {
            let $args = args.as_slice() else {
                return generic();
            };
            let $span = *$span;
            $body
        });
    };
}

inverse!("Use an inverse the author registered", (CustomPat, input, cx), {
    let [node, input @ ..] = input else {
        return generic();
    };
    let id = node.function_id().ok_or(Generic)?;
    let inv = cx.custom.resolve_inverse(&id).ok_or(Generic)?;
    dbgln!("using custom inverse for {id}");
    Ok((input, inv.node.clone()))
});

inverse!("Use the longest matching inverse rule", (RulePat, input, cx), {
    let (len, inv) = RULES.lookup_inverse(input, cx).ok_or(Generic)?;
    Ok((&input[len..], inv))
});

inverse!(DipPat, input, cx, Dip, span, [f], {
    let inv = f.un_inverse(cx)?;
    Ok((input, Mod(Dip, eco_vec![inv], span)))
});

inverse!(BothPat, input, cx, Both, span, [f], {
    let inv = f.un_inverse(cx)?;
    Ok((input, Mod(Both, eco_vec![inv], span)))
});

inverse!(BracketPat, input, cx, Bracket, span, [f, g], {
    let f_inv = f.un_inverse(cx)?;
    let g_inv = g.un_inverse(cx)?;
    Ok((input, Mod(Bracket, eco_vec![f_inv, g_inv], span)))
});

inverse!(ForkPat, input, cx, Fork, span, [f, g], {
    if f.sig != (1, 1) || g.sig != (1, 1) {
        return generic();
    }
    // Invert the first branch and check the second against the result
    let inv = Node::from_iter([
        f.node.un_inverse(cx)?,
        Prim(Dup, span),
        g.node.clone(),
        Prim(Flip, span),
        Mod(Dip, eco_vec![ImplPrim(MatchPattern, span).sig_node()?], span),
    ]);
    Ok((input, inv))
});

inverse!(OnPat, input, cx, On, span, [f], {
    let inv = if f.sig == (1, 1) {
        Node::from_iter([
            Prim(Dup, span),
            f.node.clone(),
            Prim(Flip, span),
            Mod(Dip, eco_vec![ImplPrim(MatchPattern, span).sig_node()?], span),
        ])
    } else {
        Mod(On, eco_vec![f.anti_inverse(cx)?], span)
    };
    Ok((input, inv))
});

inverse!(ByPat, input, cx, By, span, [f], {
    let inv = if f.sig == (1, 1) {
        Node::from_iter([
            Prim(Over, span),
            f.node.clone(),
            ImplPrim(MatchPattern, span),
        ])
    } else {
        Mod(By, eco_vec![f.contra_inverse(cx)?], span)
    };
    Ok((input, inv))
});

inverse!(RowsPat, input, cx, Rows, span, [f], {
    Ok((input, Mod(Rows, eco_vec![f.un_inverse(cx)?], span)))
});

inverse!(EachPat, input, cx, Each, span, [f], {
    Ok((input, Mod(Each, eco_vec![f.un_inverse(cx)?], span)))
});

inverse!(ScanPat, input, _, {
    let (un, args, span, input) = match input {
        [Mod(Scan, args, span), input @ ..] => (false, args, *span, input),
        [ImplMod(UnScan, args, span), input @ ..] => (true, args, *span, input),
        _ => return generic(),
    };
    let [f] = args.as_slice() else {
        return generic();
    };
    let inverse = match (f.node.as_primitive(), un) {
        (Some(Add), false) => Prim(Sub, span),
        (Some(Mul), false) => Prim(Div, span),
        (Some(Sub), true) => Prim(Add, span),
        (Some(Div), true) => Prim(Mul, span),
        _ => return generic(),
    }
    .sig_node()?;
    let inverse = if un {
        Mod(Scan, eco_vec![inverse], span)
    } else {
        ImplMod(UnScan, eco_vec![inverse], span)
    };
    Ok((input, inverse))
});

inverse!("Invert the body of a repetition with a constant count", (RepeatPat, input, cx), {
    let (input, val) = match Val.invert_extract(input, cx) {
        Ok((input, val)) => (input, Some(val)),
        Err(_) => (input, None),
    };
    let (f, inv, span, input) = match input {
        [Mod(Repeat, args, span), input @ ..] => {
            let [f] = args.as_slice() else {
                return generic();
            };
            (f, None, *span, input)
        }
        [ImplMod(RepeatWithInverse, args, span), input @ ..] => {
            let [f, inv] = args.as_slice() else {
                return generic();
            };
            (f, Some(inv), *span, input)
        }
        _ => return generic(),
    };
    let Some(mut node) = val else {
        return if f.sig.args() == f.sig.outputs() {
            generic()
        } else {
            Err(InversionError::AmbiguousArity(span))
        };
    };
    node.push(match inv {
        // Swapping the function and its inverse also flips negative counts
        Some(inv) => ImplMod(RepeatWithInverse, eco_vec![inv.clone(), f.clone()], span),
        None => Mod(Repeat, eco_vec![f.un_inverse(cx)?], span),
    });
    Ok((input, node))
});

#[derive(Debug)]
struct Trivial;
impl InvertPattern for Trivial {
    fn invert_extract<'a>(
        &self,
        input: &'a [Node],
        cx: &Inverter,
    ) -> InversionResult<(&'a [Node], Node)> {
        match input {
            [Call(f, _), input @ ..] => {
                let body = cx.asm.get(f).ok_or(Generic)?;
                let inv = body.un_inverse(cx).map_err(|e| e.func(f))?;
                Ok((input, inv))
            }
            _ => generic(),
        }
    }
}

inverse!("Match a constant exactly", (MatchConst, input, cx), {
    let (input, mut val) = Val.invert_extract(input, cx)?;
    let span = val.span().unwrap_or_default();
    val.push(ImplPrim(MatchPattern, span));
    Ok((input, val))
});

inverse!("The longest run of nodes that pushes a single constant", (Val, input, cx), {
    let end = *val_lens(input, cx).first().ok_or(Generic)?;
    Ok((&input[end..], Node::from(&input[..end])))
});

#[derive(Debug)]
struct NoUnder<P>(P);
impl<P: InvertPattern> InvertPattern for NoUnder<P> {
    fn invert_extract<'a>(
        &self,
        input: &'a [Node],
        cx: &Inverter,
    ) -> InversionResult<(&'a [Node], Node)> {
        self.0.invert_extract(input, cx)
    }
    fn allowed_in_under(&self) -> bool {
        false
    }
}
