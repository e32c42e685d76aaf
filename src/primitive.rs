//! All primitive definitions

use std::fmt;

use enum_iterator::{all, Sequence};
use serde::*;

use crate::{Purity, Signature};

macro_rules! primitive {
    ($(
        #[doc = $doc:literal]
        (
            $(
                $($args:literal)?
                $(($outputs:expr))?
                $([$mod_args:expr])?
            ,)?
            $variant:ident, ($name:literal $(, $glyph:literal)?) $(, $purity:ident)?
        )
    ),* $(,)?) => {
        /// A built-in function
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum Primitive {
            $(
                #[doc = $doc]
                $variant,
            )*
        }

        impl Primitive {
            /// Get the primitive's name
            pub fn name(&self) -> &'static str {
                match self {
                    $(Primitive::$variant => $name,)*
                }
            }
            /// Get the primitive's glyph
            pub fn glyph(&self) -> Option<char> {
                match self {
                    $($(Primitive::$variant => Some($glyph),)?)*
                    _ => None
                }
            }
            /// Get the number of function arguments the primitive takes
            pub fn modifier_args(&self) -> Option<usize> {
                match self {
                    $($($(Primitive::$variant => Some($mod_args),)?)?)*
                    _ => None
                }
            }
            /// Get the number of arguments the primitive takes
            pub fn args(&self) -> Option<usize> {
                match self {
                    $($($(Primitive::$variant => Some($args),)?)?)*
                    _ => None
                }
            }
            /// Get the number of outputs the primitive produces
            pub fn outputs(&self) -> Option<usize> {
                match self {
                    $($($(Primitive::$variant => Some($outputs),)?)?)*
                    _ => None
                }
            }
            /// Whether the primitive is pure
            pub fn purity(&self) -> Purity {
                match self {
                    $($(Primitive::$variant => Purity::$purity,)?)*
                    _ => Purity::Pure
                }
            }
            /// Get the primitive's documentation string
            pub fn doc(&self) -> &'static str {
                match self {
                    $(Primitive::$variant => $doc.trim(),)*
                }
            }
        }
    };
}

primitive!(
    /// Do nothing with one value
    (1(1), Identity, ("identity", '∘')),
    /// Discard the top value on the stack
    (1(0), Pop, ("pop", '◌')),
    /// Duplicate the top value on the stack
    (1(2), Dup, ("duplicate", '.')),
    /// Swap the top two values on the stack
    (2(2), Flip, ("flip", ':')),
    /// Duplicate the second-to-top value to the top of the stack
    (2(3), Over, ("over", ',')),
    /// Logical not
    (1(1), Not, ("not", '¬')),
    /// Numerical sign (1, ¯1, or 0)
    (1(1), Sign, ("sign", '±')),
    /// Negate a number
    (1(1), Neg, ("negate", '¯')),
    /// Get the absolute value of a number
    (1(1), Abs, ("absolute value", '⌵')),
    /// Take the square root of a number
    (1(1), Sqrt, ("sqrt", '√')),
    /// Get the sine of a number
    (1(1), Sin, ("sine", '∿')),
    /// Get the natural logarithm of a number
    (1(1), Ln, ("ln")),
    /// Round to the nearest integer towards `¯∞`
    (1(1), Floor, ("floor", '⌊')),
    /// Round to the nearest integer towards `∞`
    (1(1), Ceil, ("ceiling", '⌈')),
    /// Round to the nearest integer
    (1(1), Round, ("round", '⁅')),
    /// Add values
    (2(1), Add, ("add", '+')),
    /// Subtract the top value from the second
    (2(1), Sub, ("subtract", '-')),
    /// Multiply values
    (2(1), Mul, ("multiply", '×')),
    /// Divide the second value by the top value
    (2(1), Div, ("divide", '÷')),
    /// Modulo the second value by the top value
    (2(1), Modulo, ("modulo", '◿')),
    /// Raise the second value to the power of the top value
    (2(1), Pow, ("power", 'ⁿ')),
    /// Get the logarithm of the second value with the top value as the base
    (2(1), Log, ("logarithm", 'ₙ')),
    /// Take the minimum of two values
    (2(1), Min, ("minimum", '↧')),
    /// Take the maximum of two values
    (2(1), Max, ("maximum", '↥')),
    /// Get the number of rows in a list
    (1(1), Len, ("length", '⧻')),
    /// Make a list of all natural numbers less than a number
    (1(1), Range, ("range", '⇡')),
    /// Get the first row of a list
    (1(1), First, ("first", '⊢')),
    /// Get the last row of a list
    (1(1), Last, ("last")),
    /// Reverse the rows of a list
    (1(1), Reverse, ("reverse", '⇌')),
    /// Sort the rows of a list
    (1(1), Sort, ("sort", '⍆')),
    /// Get the indices that would sort a list ascending
    (1(1), Rise, ("rise", '⍏')),
    /// Append the second value to the top value
    (2(1), Join, ("join", '⊂')),
    /// Combine two values into a list of two rows
    (2(1), Couple, ("couple", '⊟')),
    /// Rotate the second value left by the top value
    (2(1), Rotate, ("rotate", '↻')),
    /// Take the first n rows of a list
    (2(1), Take, ("take", '↙')),
    /// Drop the first n rows of a list
    (2(1), Drop, ("drop", '↘')),
    /// Index a single row of a list
    (2(1), Pick, ("pick", '⊡')),
    /// Select multiple rows from a list
    (2(1), Select, ("select", '⊏')),
    /// Get the current time in seconds
    (0(1), Now, ("now"), Impure),
    /// Temporarily pop the top value off the stack and call a function
    ([1], Dip, ("dip", '⊙')),
    /// Call a function but keep its first argument on the top of the stack
    ([1], On, ("on", '⟜')),
    /// Call a function but keep its last argument on the stack
    ([1], By, ("by", '⊸')),
    /// Call a function on two sets of values
    ([1], Both, ("both", '∩')),
    /// Call two functions on the same values
    ([2], Fork, ("fork", '⊃')),
    /// Call two functions on two distinct sets of values
    ([2], Bracket, ("bracket", '⊓')),
    /// Apply a function to each row of a list
    ([1], Rows, ("rows", '≡')),
    /// Apply a function to each element of a list
    ([1], Each, ("each", '∵')),
    /// Apply a reducing function to a list
    ([1], Reduce, ("reduce", '/')),
    /// Reduce, but keep intermediate values
    ([1], Scan, ("scan", '\\')),
    /// Repeat a function a number of times
    ([1], Repeat, ("repeat", '⍥')),
);

impl Primitive {
    /// Get an iterator over all primitives
    pub fn all() -> impl Iterator<Item = Self> + Clone {
        all()
    }
    /// Find a primitive by its name or glyph
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().find(|prim| {
            prim.name() == name || prim.glyph().is_some_and(|c| name.chars().eq([c]))
        })
    }
    /// Get the signature of a non-modifier primitive
    pub fn sig(&self) -> Option<Signature> {
        Some(Signature::new(self.args()?, self.outputs()?))
    }
    /// Check if this primitive is a modifier
    pub fn is_modifier(&self) -> bool {
        self.modifier_args().is_some()
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.glyph() {
            write!(f, "{c}")
        } else {
            write!(f, "{}", self.name())
        }
    }
}

macro_rules! impl_primitive {
    ($(
        $(#[$attr:meta])*
        (
            $($args:literal)?
            $(($outputs:expr))?
            $([$margs:expr])?,
            $variant:ident
            $(, $purity:ident)?
        )
    ),* $(,)?) => {
        /// Primitives that exist as an implementation detail
        ///
        /// These are only ever produced by inversion
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum ImplPrimitive {
            $(
                $(#[$attr])*
                $variant,
            )*
        }

        impl ImplPrimitive {
            /// Get the number of arguments the primitive takes
            pub fn args(&self) -> Option<usize> {
                match self {
                    $($(ImplPrimitive::$variant => Some($args),)?)*
                    _ => None
                }
            }
            /// Get the number of outputs the primitive produces
            pub fn outputs(&self) -> Option<usize> {
                match self {
                    $($(ImplPrimitive::$variant => Some($outputs),)?)*
                    _ => None
                }
            }
            /// Get the number of function arguments the primitive takes
            pub fn modifier_args(&self) -> Option<usize> {
                match self {
                    $($(ImplPrimitive::$variant => Some($margs),)?)*
                    _ => None
                }
            }
            /// Whether the primitive is pure
            pub fn purity(&self) -> Purity {
                match self {
                    $($(ImplPrimitive::$variant => Purity::$purity,)?)*
                    _ => Purity::Pure
                }
            }
        }
    };
}

impl_primitive!(
    /// Take the nth root of the second value
    (2(1), Root),
    (1(1), Asin),
    (1(1), Exp),
    /// Split a number into its floor and its fractional part
    (1(2), UnAdd),
    /// Split a number into its absolute value and its sign
    (1(2), UnMul),
    (1(2), UnCouple),
    /// Split a list into its first row and the rest
    (1(2), UnJoin),
    (1(1), UnRange),
    /// Fail unless the top two values are equal
    (2(0), MatchPattern),
    (2(1), UndoFirst),
    (2(1), UndoLast),
    (3(1), UndoPick),
    (3(1), UndoSelect),
    (3(1), UndoTake),
    (3(1), UndoDrop),
    /// Give a number the sign of another
    (2(1), SetSign),
    /// Undo a scan
    ([1], UnScan),
    /// Repeat a function, running its inverse for negative counts
    ([2], RepeatWithInverse),
);

impl ImplPrimitive {
    /// Get an iterator over all implementation primitives
    pub fn all() -> impl Iterator<Item = Self> + Clone {
        all()
    }
    /// Get the signature of a non-modifier implementation primitive
    pub fn sig(&self) -> Option<Signature> {
        Some(Signature::new(self.args()?, self.outputs()?))
    }
}

impl fmt::Display for ImplPrimitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ImplPrimitive::*;
        use Primitive::*;
        let un = '°';
        match self {
            Root => write!(f, "{un}{Pow}"),
            Asin => write!(f, "{un}{Sin}"),
            Exp => write!(f, "{un}{Ln}"),
            UnAdd => write!(f, "{un}{Add}"),
            UnMul => write!(f, "{un}{Mul}"),
            UnCouple => write!(f, "{un}{Couple}"),
            UnJoin => write!(f, "{un}{Join}"),
            UnRange => write!(f, "{un}{Range}"),
            UnScan => write!(f, "{un}{Scan}"),
            RepeatWithInverse => write!(f, "{Repeat}"),
            MatchPattern => write!(f, "pattern match"),
            UndoFirst => write!(f, "⍜{First}"),
            UndoLast => write!(f, "⍜{Last}"),
            UndoPick => write!(f, "⍜{Pick}"),
            UndoSelect => write!(f, "⍜{Select}"),
            UndoTake => write!(f, "⍜{Take}"),
            UndoDrop => write!(f, "⍜{Drop}"),
            SetSign => write!(f, "⍜{Sign}"),
        }
    }
}
