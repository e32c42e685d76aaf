mod custom;
mod rules;
mod un;
mod under;

use std::{
    boxed,
    cell::{Cell, RefCell},
    collections::HashMap,
    error::Error,
    fmt,
    hash::{Hash, Hasher},
};

use ecow::EcoVec;
use serde::*;

use crate::{
    assembly::{Assembly, Function},
    check::SigCheckError,
    FunctionId, Node, SigNode, Signature, Value,
};

pub use custom::*;
pub(crate) use rules::RULES;
pub(crate) use un::{un_inverse, un_step};
pub(crate) use under::under_inverse;

macro_rules! dbgln {
    ($($arg:tt)*) => {
        tracing::trace!(target: "uiua_invert::invert", $($arg)*)
    }
}
use dbgln;

/// An error produced when an inverse cannot be derived
///
/// Errors are ordered so that when several patterns fail,
/// the most specific one can be reported with [`Ord::max`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum InversionError {
    /// No more specific reason is known
    #[default]
    Generic,
    /// Nothing can invert the node at the given span
    NoInverseForPrimitive(FunctionId, usize),
    /// Nothing can get the value the node at the given span addresses
    NotGettable(FunctionId, usize),
    /// A pattern matched, but a constant differed from the one expected
    ConstantMismatch(usize),
    /// A derived inverse does not have the expected signature
    InverseSignature {
        /// The signature the inverse should have been compatible with
        expected: Signature,
        /// The signature the inverse actually had
        found: Signature,
    },
    /// A derived under pair leaves values on the under stack
    UnbalancedUnder(Signature),
    /// A pipeline has an invalid signature
    Signature(SigCheckError),
    /// A signature depends on a value that is not statically known
    AmbiguousArity(usize),
    /// A custom inverse would reference its own function
    CyclicCustomInverse(FunctionId),
    /// Sub-pipelines or calls are nested too deeply
    ExcessiveNesting(usize),
    /// Inverting a called function failed
    InnerFunc(Vec<FunctionId>, boxed::Box<Self>),
}

/// The result of an inversion
pub type InversionResult<T = ()> = Result<T, InversionError>;

impl fmt::Display for InversionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InversionError::Generic => write!(f, "No inverse found"),
            InversionError::NoInverseForPrimitive(id, _) => write!(f, "No inverse found for {id}"),
            InversionError::NotGettable(id, _) => {
                write!(f, "{id} cannot be used to get a value under a function")
            }
            InversionError::ConstantMismatch(_) => {
                write!(f, "Value did not match the expected constant")
            }
            InversionError::InverseSignature { expected, found } => write!(
                f,
                "Derived inverse has signature {found}, \
                which is not compatible with {expected}"
            ),
            InversionError::UnbalancedUnder(sig) => write!(
                f,
                "Derived under leaves the under stack unbalanced with signature {sig}"
            ),
            InversionError::Signature(e) => write!(f, "Cannot invert invalid signature: {e}"),
            InversionError::AmbiguousArity(_) => write!(
                f,
                "Cannot invert a function whose signature is not statically known"
            ),
            InversionError::CyclicCustomInverse(id) => {
                write!(f, "Custom inverse for {id} refers back to {id}")
            }
            InversionError::ExcessiveNesting(depth) => {
                write!(f, "Function is nested too deeply to invert (depth {depth})")
            }
            InversionError::InnerFunc(ids, inner) => {
                write!(f, "Inversion failed:")?;
                for id in ids {
                    write!(f, " cannot invert {id} because")?;
                }
                let inner = inner.to_string().to_lowercase();
                write!(f, " {inner}")
            }
        }
    }
}

impl InversionError {
    fn func(self, f: &Function) -> Self {
        match self {
            InversionError::InnerFunc(mut ids, inner) => {
                ids.push(f.id.clone());
                InversionError::InnerFunc(ids, inner)
            }
            e => InversionError::InnerFunc(vec![f.id.clone()], e.into()),
        }
    }
    /// Convert a signature error, treating ambiguity as its own kind
    pub(crate) fn from_sig(e: SigCheckError, span: usize) -> Self {
        if e.ambiguous {
            InversionError::AmbiguousArity(span)
        } else {
            InversionError::Signature(e)
        }
    }
    /// Get the error underneath any called functions that failed to invert
    pub fn root(&self) -> &Self {
        match self {
            InversionError::InnerFunc(_, inner) => inner.root(),
            e => e,
        }
    }
    /// Get the span index of the node that caused the error, if there is one
    pub fn span(&self) -> Option<usize> {
        match self {
            InversionError::NoInverseForPrimitive(_, span)
            | InversionError::NotGettable(_, span)
            | InversionError::ConstantMismatch(span)
            | InversionError::AmbiguousArity(span) => Some(*span),
            InversionError::InnerFunc(_, inner) => inner.span(),
            _ => None,
        }
    }
}

impl From<SigCheckError> for InversionError {
    fn from(e: SigCheckError) -> Self {
        InversionError::Signature(e)
    }
}

impl From<()> for InversionError {
    fn from(_: ()) -> Self {
        InversionError::Generic
    }
}

impl Error for InversionError {}

use InversionError::Generic;

/// A generic inversion error
fn generic<T>() -> InversionResult<T> {
    Err(InversionError::Generic)
}

/// Check the value a pattern-matching inverse got against the one it expects
///
/// An executor runs this for [`ImplPrimitive::MatchPattern`](crate::ImplPrimitive::MatchPattern).
/// Inverses of constants are only valid when the values match, so a mismatch
/// is a runtime error rather than a derivation failure.
pub fn match_pattern(expected: &Value, actual: &Value, span: usize) -> InversionResult {
    if expected == actual {
        Ok(())
    } else {
        Err(InversionError::ConstantMismatch(span))
    }
}

/// Derivation results that can be reused until the registry changes
///
/// Each entry remembers how many levels of nesting its derivation used.
#[derive(Default)]
pub(crate) struct InvertCaches {
    un: RefCell<HashMap<SpannedNodes, (Node, usize)>>,
    under: RefCell<HashMap<(SpannedNodes, Signature), ((Node, Node), usize)>>,
}

impl InvertCaches {
    pub(crate) fn clear(&self) {
        self.un.borrow_mut().clear();
        self.under.borrow_mut().clear();
    }
}

/// A cache key that only matches nodes with the same spans
struct SpannedNodes(EcoVec<Node>);

impl From<&[Node]> for SpannedNodes {
    fn from(nodes: &[Node]) -> Self {
        SpannedNodes(nodes.iter().cloned().collect())
    }
}

impl PartialEq for SpannedNodes {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && (self.0.iter().zip(&other.0)).all(|(a, b)| a.same_with_spans(b))
    }
}

impl Eq for SpannedNodes {}

impl Hash for SpannedNodes {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for node in &self.0 {
            node.hash_with_span(state);
        }
    }
}

/// Everything a derivation needs to look at
pub(crate) struct Inverter<'a> {
    pub(crate) asm: &'a Assembly,
    pub(crate) custom: &'a CustomInverses,
    caches: Option<&'a InvertCaches>,
    max_depth: usize,
    depth: Cell<usize>,
    /// The deepest nesting reached so far
    peak: Cell<usize>,
    /// Whether the nesting limit cut off some derivation
    limited: Cell<bool>,
}

impl<'a> Inverter<'a> {
    pub(crate) fn new(
        asm: &'a Assembly,
        custom: &'a CustomInverses,
        caches: Option<&'a InvertCaches>,
        max_depth: usize,
    ) -> Self {
        Self {
            asm,
            custom,
            caches,
            max_depth,
            depth: Cell::new(0),
            peak: Cell::new(0),
            limited: Cell::new(false),
        }
    }
    /// Run a derivation one level of nesting deeper
    fn nested<T>(&self, f: impl FnOnce() -> InversionResult<T>) -> InversionResult<T> {
        let depth = self.depth.get() + 1;
        if depth > self.max_depth {
            dbgln!("exceeded maximum nesting depth {}", self.max_depth);
            self.limited.set(true);
            return Err(InversionError::ExcessiveNesting(depth));
        }
        self.depth.set(depth);
        self.peak.set(self.peak.get().max(depth));
        let res = f();
        self.depth.set(depth - 1);
        res
    }
    /// Reuse or store the result of a derivation
    ///
    /// A stored result is only reused if its derivation would fit under the
    /// nesting limit at the current depth. Results of derivations the limit
    /// cut off are never stored.
    fn cached<K: Hash + Eq, T: Clone>(
        &self,
        cache: &RefCell<HashMap<K, (T, usize)>>,
        key: K,
        f: impl FnOnce() -> InversionResult<T>,
    ) -> InversionResult<T> {
        let depth = self.depth.get();
        if let Some((val, used)) = cache.borrow().get(&key) {
            if depth + used <= self.max_depth {
                self.peak.set(self.peak.get().max(depth + used));
                return Ok(val.clone());
            }
        }
        let outer_peak = self.peak.replace(depth);
        let outer_limited = self.limited.replace(false);
        let res = f();
        let used = self.peak.get() - depth;
        let limited = self.limited.get();
        self.peak.set(outer_peak.max(depth + used));
        self.limited.set(outer_limited || limited);
        let val = res?;
        if !limited {
            cache.borrow_mut().insert(key, (val.clone(), used));
        }
        Ok(val)
    }
    fn cached_un(
        &self,
        input: &[Node],
        f: impl FnOnce() -> InversionResult<Node>,
    ) -> InversionResult<Node> {
        match self.caches {
            Some(caches) => self.cached(&caches.un, input.into(), f),
            None => f(),
        }
    }
    fn cached_under(
        &self,
        input: &[Node],
        g_sig: Signature,
        f: impl FnOnce() -> InversionResult<(Node, Node)>,
    ) -> InversionResult<(Node, Node)> {
        match self.caches {
            Some(caches) => self.cached(&caches.under, (input.into(), g_sig), f),
            None => f(),
        }
    }
}

/// What a synthesized pipeline was derived for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Synthesis {
    /// The inverse of a function
    Un,
    /// The part of an under that runs before the inner function
    UnderBefore,
    /// The part of an under that runs after the inner function
    UnderAfter,
}

/// A pipeline produced by inversion, tagged with what it was derived for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Synthesized {
    /// What the pipeline was derived for
    pub kind: Synthesis,
    /// The pipeline and its signature
    pub node: SigNode,
}

impl Synthesized {
    pub(crate) fn new(kind: Synthesis, node: SigNode) -> Self {
        Self { kind, node }
    }
}
