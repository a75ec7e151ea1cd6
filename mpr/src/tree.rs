//! Context-free math trees
//!
//! A [`Tree`] is the input to the tape compiler.  Trees are cheap to clone
//! (they're reference-counted) and may share subtrees; shared subtrees are
//! only compiled once.
use crate::Error;
use std::{
    collections::HashMap,
    io::{BufRead, BufReader, Read},
    sync::Arc,
};

/// Spatial input axis
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// Returns the register slot which holds this axis during evaluation
    pub fn slot(&self) -> u8 {
        *self as u8
    }
}

/// Single-argument operations
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum UnaryOpcode {
    Neg,
    Abs,
    Square,
    Sqrt,
    Sin,
    Cos,
    Asin,
    Acos,
    Atan,
    Exp,
    Ln,
}

impl UnaryOpcode {
    /// Applies the operation to a constant
    pub fn apply(&self, v: f64) -> f64 {
        match self {
            UnaryOpcode::Neg => -v,
            UnaryOpcode::Abs => v.abs(),
            UnaryOpcode::Square => v * v,
            UnaryOpcode::Sqrt => v.sqrt(),
            UnaryOpcode::Sin => v.sin(),
            UnaryOpcode::Cos => v.cos(),
            UnaryOpcode::Asin => v.asin(),
            UnaryOpcode::Acos => v.acos(),
            UnaryOpcode::Atan => v.atan(),
            UnaryOpcode::Exp => v.exp(),
            UnaryOpcode::Ln => v.ln(),
        }
    }
}

/// Two-argument operations
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[allow(missing_docs)]
pub enum BinaryOpcode {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

impl BinaryOpcode {
    /// Applies the operation to a pair of constants
    pub fn apply(&self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOpcode::Add => a + b,
            BinaryOpcode::Sub => a - b,
            BinaryOpcode::Mul => a * b,
            BinaryOpcode::Div => a / b,
            BinaryOpcode::Min => a.min(b),
            BinaryOpcode::Max => a.max(b),
        }
    }

    /// Checks whether `a op b == b op a`
    pub fn is_commutative(&self) -> bool {
        !matches!(self, BinaryOpcode::Sub | BinaryOpcode::Div)
    }
}

/// Opcode type for trees
#[derive(Debug)]
#[allow(missing_docs)]
pub enum TreeOp {
    Axis(Axis),
    Const(f64),
    Unary(UnaryOpcode, Arc<TreeOp>),
    Binary(BinaryOpcode, Arc<TreeOp>, Arc<TreeOp>),
}

/// Owned handle for a standalone math tree
#[derive(Clone, Debug)]
pub struct Tree(Arc<TreeOp>);

impl std::ops::Deref for Tree {
    type Target = TreeOp;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<f64> for Tree {
    fn from(v: f64) -> Tree {
        Tree::constant(v)
    }
}

impl From<f32> for Tree {
    fn from(v: f32) -> Tree {
        Tree::constant(v as f64)
    }
}

impl From<i32> for Tree {
    fn from(v: i32) -> Tree {
        Tree::constant(v as f64)
    }
}

impl From<Axis> for Tree {
    fn from(a: Axis) -> Tree {
        Tree(Arc::new(TreeOp::Axis(a)))
    }
}

impl Tree {
    /// Returns an `(x, y, z)` tuple
    pub fn axes() -> (Self, Self, Self) {
        (Self::x(), Self::y(), Self::z())
    }

    /// Returns a pointer to the inner [`TreeOp`]
    ///
    /// This can be used as a strong (but not unique) identity.
    pub fn as_ptr(&self) -> *const TreeOp {
        Arc::as_ptr(&self.0)
    }

    /// Shallow (pointer) equality check
    pub fn ptr_eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.as_ptr(), other.as_ptr())
    }

    /// Borrow the inner `Arc<TreeOp>`
    pub(crate) fn arc(&self) -> &Arc<TreeOp> {
        &self.0
    }

    /// Parses a tree from a `.vm` text file
    ///
    /// Each line is a single clause `id opcode args...`, where arguments are
    /// the ids of earlier clauses (or a literal value for `const`).  The last
    /// clause is the root of the tree.  Blank lines and lines beginning with
    /// `#` are ignored.
    ///
    /// ```
    /// # use mpr::tree::Tree;
    /// let txt = "
    /// ## unit sphere
    /// _0 var-x
    /// _1 square _0
    /// _2 var-y
    /// _3 square _2
    /// _4 var-z
    /// _5 square _4
    /// _6 add _1 _3
    /// _7 add _6 _5
    /// _8 const 1
    /// _9 sub _7 _8
    /// ";
    /// let tree = Tree::from_text(txt.as_bytes()).unwrap();
    /// ```
    pub fn from_text<R: Read>(r: R) -> Result<Tree, Error> {
        let reader = BufReader::new(r);
        let mut seen: HashMap<String, Tree> = HashMap::new();
        let mut last = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let lineno = i + 1;
            let bad = || Error::MalformedLine(lineno);

            let mut iter = line.split_whitespace();
            let id = iter.next().ok_or_else(bad)?.to_owned();
            let opcode = iter.next().ok_or_else(bad)?;

            let tree = if opcode == "const" {
                let v = iter
                    .next()
                    .and_then(|v| v.parse::<f64>().ok())
                    .ok_or_else(bad)?;
                Tree::constant(v)
            } else {
                let mut arg = || {
                    iter.next()
                        .and_then(|a| seen.get(a))
                        .cloned()
                        .ok_or_else(bad)
                };
                match opcode {
                    "var-x" => Tree::x(),
                    "var-y" => Tree::y(),
                    "var-z" => Tree::z(),
                    "abs" => arg()?.abs(),
                    "neg" => arg()?.neg(),
                    "sqrt" => arg()?.sqrt(),
                    "square" => arg()?.square(),
                    "sin" => arg()?.sin(),
                    "cos" => arg()?.cos(),
                    "asin" => arg()?.asin(),
                    "acos" => arg()?.acos(),
                    "atan" => arg()?.atan(),
                    "exp" => arg()?.exp(),
                    "ln" => arg()?.ln(),
                    "add" => {
                        let (a, b) = (arg()?, arg()?);
                        a + b
                    }
                    "sub" => {
                        let (a, b) = (arg()?, arg()?);
                        a - b
                    }
                    "mul" => {
                        let (a, b) = (arg()?, arg()?);
                        a * b
                    }
                    "div" => {
                        let (a, b) = (arg()?, arg()?);
                        a / b
                    }
                    "min" => {
                        let (a, b) = (arg()?, arg()?);
                        a.min(b)
                    }
                    "max" => {
                        let (a, b) = (arg()?, arg()?);
                        a.max(b)
                    }
                    op => return Err(Error::UnknownOpcode(op.to_owned())),
                }
            };
            last = Some(tree.clone());
            seen.insert(id, tree);
        }
        last.ok_or(Error::EmptyFile)
    }
}

/// Constructors for leaf and operation nodes
#[allow(missing_docs)]
impl Tree {
    pub fn x() -> Self {
        Axis::X.into()
    }
    pub fn y() -> Self {
        Axis::Y.into()
    }
    pub fn z() -> Self {
        Axis::Z.into()
    }
    pub fn constant(f: f64) -> Self {
        Tree(Arc::new(TreeOp::Const(f)))
    }
    fn op_unary(a: Tree, op: UnaryOpcode) -> Self {
        Tree(Arc::new(TreeOp::Unary(op, a.0)))
    }
    fn op_binary(a: Tree, b: Tree, op: BinaryOpcode) -> Self {
        Tree(Arc::new(TreeOp::Binary(op, a.0, b.0)))
    }
    pub fn square(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Square)
    }
    pub fn sqrt(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Sqrt)
    }
    pub fn max<T: Into<Tree>>(&self, other: T) -> Self {
        Self::op_binary(self.clone(), other.into(), BinaryOpcode::Max)
    }
    pub fn min<T: Into<Tree>>(&self, other: T) -> Self {
        Self::op_binary(self.clone(), other.into(), BinaryOpcode::Min)
    }
    pub fn neg(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Neg)
    }
    pub fn abs(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Abs)
    }
    pub fn sin(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Sin)
    }
    pub fn cos(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Cos)
    }
    pub fn asin(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Asin)
    }
    pub fn acos(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Acos)
    }
    pub fn atan(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Atan)
    }
    pub fn exp(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Exp)
    }
    pub fn ln(&self) -> Self {
        Self::op_unary(self.clone(), UnaryOpcode::Ln)
    }
}

macro_rules! impl_binary {
    ($op:ident, $op_assign:ident, $base_fn:ident, $assign_fn:ident) => {
        impl<A: Into<Tree>> std::ops::$op<A> for Tree {
            type Output = Self;

            fn $base_fn(self, other: A) -> Self {
                Self::op_binary(self, other.into(), BinaryOpcode::$op)
            }
        }
        impl<A: Into<Tree>> std::ops::$op_assign<A> for Tree {
            fn $assign_fn(&mut self, other: A) {
                use std::ops::$op;
                let mut next = self.clone().$base_fn(other.into());
                std::mem::swap(self, &mut next);
            }
        }
        impl std::ops::$op<Tree> for f32 {
            type Output = Tree;
            fn $base_fn(self, other: Tree) -> Tree {
                Tree::op_binary(self.into(), other, BinaryOpcode::$op)
            }
        }
        impl std::ops::$op<Tree> for f64 {
            type Output = Tree;
            fn $base_fn(self, other: Tree) -> Tree {
                Tree::op_binary(self.into(), other, BinaryOpcode::$op)
            }
        }
    };
}

impl_binary!(Add, AddAssign, add, add_assign);
impl_binary!(Sub, SubAssign, sub, sub_assign);
impl_binary!(Mul, MulAssign, mul, mul_assign);
impl_binary!(Div, DivAssign, div, div_assign);

impl std::ops::Neg for Tree {
    type Output = Tree;
    fn neg(self) -> Self::Output {
        Tree::op_unary(self, UnaryOpcode::Neg)
    }
}
