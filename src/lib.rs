//! Derivation of inverses for [Uiua](https://www.uiua.org) function pipelines
//!
//! Given a pipeline of [`Node`]s, a [`Compiler`] can derive
//! - its un inverse with [`Compiler::un`], a pipeline that undoes it
//! - the functions to run around another function to run it under this one, with [`Compiler::under`]
//!
//! Authors can supply inverses for functions that cannot be inverted automatically
//! with [`Compiler::setinv`] and [`Compiler::setund`].
//!
//! # Example
//! ```
//! use uiua_invert::{Compiler, Node, Primitive};
//!
//! let comp = Compiler::new();
//! let f = Node::from([Node::new_push(3), Node::Prim(Primitive::Add, 0)]);
//! let inv = comp.un(&f).unwrap();
//! assert_eq!(
//!     inv.node.node,
//!     Node::from([Node::new_push(3), Node::Prim(Primitive::Sub, 0)])
//! );
//! ```
//!
//! Derivation never executes anything. The pipelines it produces are checked
//! with the same static signature rules as hand-written ones.

#![warn(missing_docs)]

mod assembly;
mod check;
mod compile;
mod primitive;
mod signature;
mod tree;
mod value;

pub use self::{
    assembly::{Assembly, Function},
    check::{nodes_clean_sig, nodes_sig, SigCheckError},
    compile::{
        invert::{
            match_pattern, CustomEntry, CustomInverses, InversionError, InversionResult,
            Synthesis, Synthesized,
        },
        Compiler, Diagnostic, DiagnosticKind, InvertConfig,
    },
    primitive::{ImplPrimitive, Primitive},
    signature::{FunctionId, Signature},
    tree::{Node, Ops, Purity, SigNode},
    value::Value,
};
