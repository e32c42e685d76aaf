use std::fmt;

use ecow::EcoString;
use serde::*;

use crate::{ImplPrimitive, Primitive};

/// A function stack signature
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "(usize, usize)", into = "(usize, usize)")]
pub struct Signature {
    /// The number of arguments the function pops off the stack
    args: u16,
    /// The number of values the function pushes onto the stack
    outputs: u16,
    /// The number of arguments the function pops off the under stack
    under_args: u16,
    /// The number of values the function pushes onto the under stack
    under_outputs: u16,
}

impl From<(usize, usize)> for Signature {
    fn from((args, outputs): (usize, usize)) -> Self {
        Self::new(args, outputs)
    }
}

impl From<Signature> for (usize, usize) {
    fn from(sig: Signature) -> Self {
        (sig.args(), sig.outputs())
    }
}

impl Signature {
    /// The largest number of arguments or outputs a signature can have
    pub const MAX_COUNT: usize = u16::MAX as usize;
    /// Create a new signature with the given number of arguments and outputs
    pub const fn new(args: usize, outputs: usize) -> Self {
        Self {
            args: args as u16,
            outputs: outputs as u16,
            under_args: 0,
            under_outputs: 0,
        }
    }
    /// Set the number of arguments and outputs of the under stack
    pub const fn with_under(self, under_args: usize, under_outputs: usize) -> Self {
        Self {
            args: self.args,
            outputs: self.outputs,
            under_args: under_args as u16,
            under_outputs: under_outputs as u16,
        }
    }
    /// Get the number of arguments
    #[inline(always)]
    pub const fn args(&self) -> usize {
        self.args as usize
    }
    /// Get the number of outputs
    #[inline(always)]
    pub const fn outputs(&self) -> usize {
        self.outputs as usize
    }
    /// Get the number of under arguments
    pub const fn under_args(&self) -> usize {
        self.under_args as usize
    }
    /// Get the number of under outputs
    pub const fn under_outputs(&self) -> usize {
        self.under_outputs as usize
    }
    /// Check if this signature changes the stack size by the same amount as another signature
    pub fn is_compatible_with(self, other: Self) -> bool {
        self.args as isize - self.outputs as isize == other.args as isize - other.outputs as isize
    }
    /// Compose signatures as if a function with signature `other` was called before a function with signature `self`
    pub fn compose(self, other: Self) -> Self {
        let args = other.args() + self.args().saturating_sub(other.outputs());
        let outputs = self.outputs() + other.outputs().saturating_sub(self.args());
        let under_args =
            other.under_args() + self.under_args().saturating_sub(other.under_outputs());
        let under_outputs =
            self.under_outputs() + other.under_outputs().saturating_sub(self.under_args());
        Self::new(args, outputs).with_under(under_args, under_outputs)
    }
    /// Get the un-inverse of this signature
    pub fn inverse(self) -> Self {
        Self::new(self.outputs(), self.args())
    }
    /// Get the anti-inverse of this signature
    ///
    /// An anti inverse gets the kept argument back alongside the outputs
    pub fn anti(self) -> Option<Self> {
        if self.args == 0 {
            return None;
        }
        Some(Signature::new(self.outputs() + 1, self.args() - 1))
    }
    /// The signature on the under stack
    pub fn under(self) -> Signature {
        Signature::new(self.under_args(), self.under_outputs())
    }
    /// Whether the function leaves the under stack as it found it
    pub fn is_under_balanced(self) -> bool {
        self.under_args == self.under_outputs
    }
}

impl PartialEq<(usize, usize)> for Signature {
    fn eq(&self, other: &(usize, usize)) -> bool {
        self.args() == other.0 && self.outputs() == other.1
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}.{}", self.args, self.outputs)?;
        if self.under_args > 0 || self.under_outputs > 0 {
            write!(f, "(u{}.{})", self.under_args, self.under_outputs)?;
        }
        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "|{}.{}", self.args, self.outputs)
    }
}

/// The identity of something that can have an inverse
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FunctionId {
    /// Just a primitive
    Primitive(Primitive),
    /// An implementation primitive
    Impl(ImplPrimitive),
    /// A named function
    Named(EcoString),
    #[doc(hidden)]
    /// Implementation detail
    Unnamed,
}

impl PartialEq<&str> for FunctionId {
    fn eq(&self, other: &&str) -> bool {
        match self {
            FunctionId::Named(name) => &&**name == other,
            _ => false,
        }
    }
}

impl From<EcoString> for FunctionId {
    fn from(name: EcoString) -> Self {
        Self::Named(name)
    }
}

impl From<&str> for FunctionId {
    fn from(name: &str) -> Self {
        Self::Named(name.into())
    }
}

impl From<Primitive> for FunctionId {
    fn from(op: Primitive) -> Self {
        Self::Primitive(op)
    }
}

impl From<ImplPrimitive> for FunctionId {
    fn from(op: ImplPrimitive) -> Self {
        Self::Impl(op)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionId::Named(name) => write!(f, "{name}"),
            FunctionId::Primitive(prim) => write!(f, "{prim}"),
            FunctionId::Impl(prim) => write!(f, "{prim}"),
            FunctionId::Unnamed => write!(f, "unnamed"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn compose() {
        let dup = Signature::new(1, 2);
        let add = Signature::new(2, 1);
        assert_eq!(add.compose(dup), (1, 1));
        assert_eq!(dup.compose(add), (2, 2));
        let push_under = Signature::new(1, 0).with_under(0, 1);
        let pop_under = Signature::new(0, 1).with_under(1, 0);
        let both = pop_under.compose(push_under);
        assert_eq!(both, (1, 1));
        assert!(both.is_under_balanced());
        assert!(!push_under.is_under_balanced());
    }

    #[test]
    fn inverse_and_anti() {
        let sig = Signature::new(2, 1);
        assert_eq!(sig.inverse(), (1, 2));
        assert_eq!(sig.anti(), Some(Signature::new(2, 1)));
        assert_eq!(Signature::new(0, 1).anti(), None);
        assert!(Signature::new(3, 2).is_compatible_with(Signature::new(2, 1)));
        assert!(!Signature::new(1, 2).is_compatible_with(Signature::new(2, 1)));
    }
}
