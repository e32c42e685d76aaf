//! The compilation session that owns functions, custom inverses and derived inverses

pub(crate) mod invert;

use ecow::{eco_vec, EcoString};
use serde::*;

use crate::{Assembly, Function, FunctionId, ImplPrimitive, Node, Primitive, SigNode, Signature};

use invert::{
    un_inverse, under_inverse, CustomInverses, InversionError, InversionResult, InvertCaches,
    Inverter, Synthesis, Synthesized,
};

/// Options for deriving inverses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvertConfig {
    /// The maximum depth of nested functions to descend into
    pub max_depth: usize,
    /// Whether to reuse derived inverses until a custom inverse is registered
    pub cache: bool,
}

impl Default for InvertConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            cache: true,
        }
    }
}

/// A message to be displayed to the user that is not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The message itself
    pub message: String,
    /// What kind of diagnostic this is
    pub kind: DiagnosticKind,
    /// The span index the message refers to
    pub span: Option<usize>,
}

/// Kinds of non-error diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Informational message
    Info,
    /// Something that could be written more clearly
    Style,
    /// Something that really needs to be fixed
    Warning,
}

/// One compilation unit's functions, custom inverses, and derivation state
///
/// Inverses registered in one compiler never affect another.
#[derive(Default)]
pub struct Compiler {
    asm: Assembly,
    custom: CustomInverses,
    config: InvertConfig,
    caches: InvertCaches,
    /// Accumulated diagnostics
    diagnostics: Vec<Diagnostic>,
}

impl Compiler {
    /// Create a new compiler
    pub fn new() -> Self {
        Self::default()
    }
    /// Create a new compiler with the given configuration
    pub fn with_config(config: InvertConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }
    /// Get the configuration
    pub fn config(&self) -> &InvertConfig {
        &self.config
    }
    /// Get the compiled functions
    pub fn assembly(&self) -> &Assembly {
        &self.asm
    }
    /// Get the registered custom inverses
    pub fn custom_inverses(&self) -> &CustomInverses {
        &self.custom
    }
    /// Get the accumulated diagnostics
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
    /// Take the accumulated diagnostics
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
    /// Add a named function
    pub fn add_function(
        &mut self,
        name: impl Into<EcoString>,
        sig: Signature,
        body: impl Into<Node>,
    ) -> Function {
        let f = self.asm.add_function(FunctionId::Named(name.into()), sig, body.into());
        tracing::debug!(id = %f.id, %sig, "added function");
        f
    }
    /// Register the inverse of a function
    ///
    /// Fails if the inverse refers back to the function.
    pub fn setinv(&mut self, id: impl Into<FunctionId>, inverse: SigNode) -> InversionResult {
        let id = id.into();
        let span = inverse.node.span();
        let replaced = self.custom.resolve_inverse(&id).is_some();
        let inv_sig = inverse.sig;
        self.custom.register_inverse(id.clone(), inverse, &self.asm)?;
        self.caches.clear();
        if let Some(sig) = self.function_sig(&id) {
            if !inv_sig.is_compatible_with(sig.inverse()) {
                self.emit_diagnostic(
                    format!(
                        "A function and its inverse must have opposite signatures, \
                        but the signatures of {id} and its inverse are {sig} and {inv_sig}"
                    ),
                    DiagnosticKind::Warning,
                    span,
                );
            }
        }
        if replaced {
            self.emit_diagnostic(
                format!("This inverse of {id} replaces an earlier one"),
                DiagnosticKind::Info,
                span,
            );
        }
        Ok(())
    }
    /// Register the functions to run before and after the inner function when a function is used with under
    ///
    /// Fails if either function refers back to the function.
    pub fn setund(
        &mut self,
        id: impl Into<FunctionId>,
        before: SigNode,
        after: SigNode,
    ) -> InversionResult {
        let id = id.into();
        let span = before.node.span().or_else(|| after.node.span());
        let replaced = self.custom.resolve_under(&id).is_some();
        let sig = after.sig.compose(before.sig);
        self.custom.register_under(id.clone(), before, after, &self.asm)?;
        self.caches.clear();
        if sig.under() != (0, 0) {
            self.emit_diagnostic(
                format!(
                    "The functions to run under {id} must leave the under stack \
                    as they found it, but together they have under signature {}",
                    sig.under()
                ),
                DiagnosticKind::Warning,
                span,
            );
        }
        if replaced {
            self.emit_diagnostic(
                format!("This under of {id} replaces an earlier one"),
                DiagnosticKind::Info,
                span,
            );
        }
        Ok(())
    }
    /// Derive the inverse of a function
    ///
    /// The inverse's signature is checked against the function's.
    pub fn un(&self, f: &Node) -> InversionResult<Synthesized> {
        let span = f.span().unwrap_or_default();
        let sig = f.sig().map_err(|e| InversionError::from_sig(e, span))?;
        let cx = self.inverter();
        let inv = un_inverse(f.as_slice(), &cx)?;
        let inv_sig = inv.sig().map_err(|e| InversionError::from_sig(e, span))?;
        let expected = sig.inverse();
        if !inv_sig.is_compatible_with(expected) {
            return Err(InversionError::InverseSignature {
                expected,
                found: inv_sig,
            });
        }
        Ok(Synthesized::new(Synthesis::Un, SigNode::new(inv_sig, inv)))
    }
    /// Derive the functions to run before and after `g` to run `g` under `f`
    ///
    /// Everything the first function puts on the under stack is taken off by the second.
    pub fn under(&self, f: &Node, g: &Node) -> InversionResult<(Synthesized, Synthesized)> {
        let span = f.span().unwrap_or_default();
        f.sig().map_err(|e| InversionError::from_sig(e, span))?;
        let g_sig = g.sig().map_err(|e| InversionError::from_sig(e, span))?;
        let cx = self.inverter();
        let (before, after) = under_inverse(f.as_slice(), g_sig, &cx)?;
        let before = before
            .sig_node()
            .map_err(|e| InversionError::from_sig(e, span))?;
        let after = after
            .sig_node()
            .map_err(|e| InversionError::from_sig(e, span))?;
        let total = after.sig.compose(g_sig.compose(before.sig));
        if total.under() != (0, 0) {
            return Err(InversionError::UnbalancedUnder(total));
        }
        Ok((
            Synthesized::new(Synthesis::UnderBefore, before),
            Synthesized::new(Synthesis::UnderAfter, after),
        ))
    }
    /// Build the complete function that runs `g` under `f`
    pub fn under_composed(&self, f: &Node, g: &Node) -> InversionResult<SigNode> {
        let (before, after) = self.under(f, g)?;
        let node = Node::from_iter([before.node.node, g.clone(), after.node.node]);
        let span = f.span().unwrap_or_default();
        node.sig_node().map_err(|e| InversionError::from_sig(e, span))
    }
    /// Build the complete function that runs `g` under `f`, noting anything
    /// that could be written more clearly
    pub fn compile_under(&mut self, f: &Node, g: &Node) -> InversionResult<SigNode> {
        if let [Node::Prim(Primitive::Pop, span)] = f.as_slice() {
            self.emit_diagnostic(
                format!(
                    "Prefer {} over `⍜{}` for clarity",
                    Primitive::Dip,
                    Primitive::Pop
                ),
                DiagnosticKind::Style,
                Some(*span),
            );
        }
        self.under_composed(f, g)
    }
    /// Build a node that repeats a function
    ///
    /// If the function has an inverse, a negative repetition count runs the inverse.
    pub fn compile_repeat(&mut self, f: SigNode, span: usize) -> Node {
        let found = {
            let cx = self.inverter();
            un_inverse(f.node.as_slice(), &cx)
                .ok()
                .and_then(|inv| inv.sig().ok().map(|sig| (inv, sig)))
                .filter(|(_, inv_sig)| f.sig.is_compatible_with(*inv_sig))
        };
        let Some((inv, inv_sig)) = found else {
            return Node::Mod(Primitive::Repeat, eco_vec![f], span);
        };
        if f.sig.inverse() != inv_sig {
            self.emit_diagnostic(
                format!(
                    "Repeated function's inverse must have the inverse signature, \
                    but their signatures are {} and {inv_sig}",
                    f.sig
                ),
                DiagnosticKind::Warning,
                Some(span),
            );
        }
        Node::ImplMod(
            ImplPrimitive::RepeatWithInverse,
            eco_vec![f, SigNode::new(inv_sig, inv)],
            span,
        )
    }
    fn inverter(&self) -> Inverter<'_> {
        let caches = self.config.cache.then_some(&self.caches);
        Inverter::new(&self.asm, &self.custom, caches, self.config.max_depth)
    }
    fn function_sig(&self, id: &FunctionId) -> Option<Signature> {
        match id {
            FunctionId::Primitive(prim) => prim.sig(),
            FunctionId::Impl(prim) => prim.sig(),
            FunctionId::Named(name) => self.asm.function(name).map(|f| f.sig),
            FunctionId::Unnamed => None,
        }
    }
    fn emit_diagnostic(&mut self, message: String, kind: DiagnosticKind, span: Option<usize>) {
        match kind {
            DiagnosticKind::Info | DiagnosticKind::Style => tracing::info!(?span, "{message}"),
            DiagnosticKind::Warning => tracing::warn!(?span, "{message}"),
        }
        self.diagnostics.push(Diagnostic {
            message,
            kind,
            span,
        });
    }
}
