//! Compiler from [`Tree`] to a flat list of [`Op`]
use crate::{
    Error,
    tape::op::{AXIS_COUNT, Op, SLOT_COUNT},
    tree::{BinaryOpcode, Tree, TreeOp, UnaryOpcode},
};
use std::collections::{BTreeSet, HashMap};

/// Value produced by a tree node after constant folding
#[derive(Copy, Clone, Debug)]
enum Value {
    Const(f64),
    Axis(u8),
    /// Index into the flattened node list
    Node(usize),
}

/// A flattened operation which must be emitted into the tape
#[derive(Copy, Clone, Debug)]
enum Node {
    Unary(UnaryOpcode, Value),
    Binary(BinaryOpcode, Value, Value),
}

impl Node {
    fn args(&self) -> [Option<Value>; 2] {
        match *self {
            Node::Unary(_, a) => [Some(a), None],
            Node::Binary(_, a, b) => [Some(a), Some(b)],
        }
    }
}

/// Flattens the tree in postorder, folding constants
///
/// Shared subtrees (by pointer) are only visited once.  The explicit stack
/// keeps deep trees from overflowing the call stack.
fn flatten(tree: &Tree) -> (Vec<Node>, Value) {
    let mut seen: HashMap<*const TreeOp, Value> = HashMap::new();
    let mut nodes = vec![];
    let mut todo: Vec<(&TreeOp, bool)> = vec![(&**tree.arc(), false)];

    while let Some((t, ready)) = todo.pop() {
        let key = t as *const TreeOp;
        if seen.contains_key(&key) {
            continue;
        }
        if !ready {
            todo.push((t, true));
            match t {
                TreeOp::Unary(_, a) => todo.push((&**a, false)),
                TreeOp::Binary(_, a, b) => {
                    todo.push((&**b, false));
                    todo.push((&**a, false));
                }
                TreeOp::Axis(..) | TreeOp::Const(..) => (),
            }
            continue;
        }

        let get = |a: &TreeOp| seen[&(a as *const TreeOp)];
        let v = match t {
            TreeOp::Axis(a) => Value::Axis(a.slot()),
            TreeOp::Const(c) => Value::Const(*c),
            TreeOp::Unary(op, a) => match get(&**a) {
                Value::Const(c) => Value::Const(op.apply(c)),
                a => {
                    nodes.push(Node::Unary(*op, a));
                    Value::Node(nodes.len() - 1)
                }
            },
            TreeOp::Binary(op, a, b) => match (get(&**a), get(&**b)) {
                (Value::Const(a), Value::Const(b)) => {
                    Value::Const(op.apply(a, b))
                }
                (a, b) => {
                    nodes.push(Node::Binary(*op, a, b));
                    Value::Node(nodes.len() - 1)
                }
            },
        };
        seen.insert(key, v);
    }
    let root = seen[&tree.as_ptr()];
    (nodes, root)
}

/// Slot allocator which reuses slots after their last use
struct Allocator {
    free: BTreeSet<u8>,
    next: usize,
}

impl Allocator {
    fn new() -> Self {
        Self {
            free: BTreeSet::new(),
            next: AXIS_COUNT,
        }
    }

    fn alloc(&mut self) -> Result<u8, Error> {
        if let Some(s) = self.free.pop_first() {
            Ok(s)
        } else if self.next < SLOT_COUNT {
            self.next += 1;
            Ok((self.next - 1) as u8)
        } else {
            Err(Error::SlotOverflow(self.next, SLOT_COUNT))
        }
    }

    fn release(&mut self, slot: u8) {
        self.free.insert(slot);
    }
}

fn unary_op(op: UnaryOpcode, out: u8, arg: u8) -> Op {
    match op {
        UnaryOpcode::Neg => Op::NegReg(out, arg),
        UnaryOpcode::Abs => Op::AbsReg(out, arg),
        UnaryOpcode::Square => Op::SquareReg(out, arg),
        UnaryOpcode::Sqrt => Op::SqrtReg(out, arg),
        UnaryOpcode::Sin => Op::SinReg(out, arg),
        UnaryOpcode::Cos => Op::CosReg(out, arg),
        UnaryOpcode::Asin => Op::AsinReg(out, arg),
        UnaryOpcode::Acos => Op::AcosReg(out, arg),
        UnaryOpcode::Atan => Op::AtanReg(out, arg),
        UnaryOpcode::Exp => Op::ExpReg(out, arg),
        UnaryOpcode::Ln => Op::LnReg(out, arg),
    }
}

/// Location of an operand once slots are assigned
enum Arg {
    Reg(u8),
    Imm(f32),
}

fn binary_op(op: BinaryOpcode, out: u8, lhs: Arg, rhs: Arg) -> Op {
    use BinaryOpcode as B;
    match (lhs, rhs) {
        (Arg::Reg(a), Arg::Reg(b)) => match op {
            B::Add => Op::AddRegReg(out, a, b),
            B::Sub => Op::SubRegReg(out, a, b),
            B::Mul => Op::MulRegReg(out, a, b),
            B::Div => Op::DivRegReg(out, a, b),
            B::Min => Op::MinRegReg(out, a, b),
            B::Max => Op::MaxRegReg(out, a, b),
        },
        (Arg::Reg(a), Arg::Imm(imm)) => match op {
            B::Add => Op::AddRegImm(out, a, imm),
            B::Sub => Op::SubRegImm(out, a, imm),
            B::Mul => Op::MulRegImm(out, a, imm),
            B::Div => Op::DivRegImm(out, a, imm),
            B::Min => Op::MinRegImm(out, a, imm),
            B::Max => Op::MaxRegImm(out, a, imm),
        },
        (Arg::Imm(imm), Arg::Reg(b)) => match op {
            B::Sub => Op::SubImmReg(out, b, imm),
            B::Div => Op::DivImmReg(out, b, imm),
            op => {
                debug_assert!(op.is_commutative());
                binary_op(op, out, Arg::Reg(b), Arg::Imm(imm))
            }
        },
        (Arg::Imm(..), Arg::Imm(..)) => {
            unreachable!("constant operations are folded")
        }
    }
}

/// Compiles a tree into a list of instructions ending in [`Op::End`]
pub(super) fn build(tree: &Tree) -> Result<Vec<Op>, Error> {
    let (nodes, root) = flatten(tree);

    // Find the last node which reads each node's value; the root is never
    // released, since `End` reads it.
    let mut last_use = vec![0; nodes.len()];
    for (i, n) in nodes.iter().enumerate() {
        for a in n.args().into_iter().flatten() {
            if let Value::Node(j) = a {
                last_use[j] = i;
            }
        }
    }
    if let Value::Node(r) = root {
        last_use[r] = usize::MAX;
    }

    let mut alloc = Allocator::new();
    let mut slots: Vec<u8> = Vec::with_capacity(nodes.len());
    let mut out = Vec::with_capacity(nodes.len() + 2);
    for (i, n) in nodes.iter().enumerate() {
        let arg = |v: Value| match v {
            Value::Const(c) => Arg::Imm(c as f32),
            Value::Axis(a) => Arg::Reg(a),
            Value::Node(j) => Arg::Reg(slots[j]),
        };
        // Inputs are released before the output is allocated, so the output
        // may reuse an input slot; instructions read before they write.
        for a in n.args().into_iter().flatten() {
            if let Value::Node(j) = a {
                if last_use[j] == i {
                    alloc.release(slots[j]);
                }
            }
        }
        let slot = alloc.alloc()?;
        let op = match *n {
            Node::Unary(op, a) => {
                let Arg::Reg(a) = arg(a) else {
                    unreachable!("constant operations are folded")
                };
                unary_op(op, slot, a)
            }
            Node::Binary(op, a, b) => binary_op(op, slot, arg(a), arg(b)),
        };
        out.push(op);
        slots.push(slot);
    }

    let root = match root {
        Value::Node(r) => slots[r],
        Value::Axis(a) => {
            let slot = alloc.alloc()?;
            out.push(Op::CopyReg(slot, a));
            slot
        }
        Value::Const(c) => {
            let slot = alloc.alloc()?;
            out.push(Op::CopyImm(slot, c as f32));
            slot
        }
    };
    out.push(Op::End(root));
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tape::Tape;

    #[test]
    fn sphere_tape() {
        let (x, y, z) = Tree::axes();
        let t = x.square() + y.square() + z.square() - 1.0;
        let ops = build(&t).unwrap();
        assert_eq!(
            ops,
            vec![
                Op::SquareReg(3, 0),
                Op::SquareReg(4, 1),
                Op::AddRegReg(3, 3, 4),
                Op::SquareReg(4, 2),
                Op::AddRegReg(3, 3, 4),
                Op::SubRegImm(3, 3, 1.0),
                Op::End(3),
            ]
        );
    }

    #[test]
    fn constant_folding() {
        let x = Tree::x();
        let t = x + Tree::constant(2.0) * 3.0;
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::AddRegImm(3, 0, 6.0), Op::End(3)]
        );

        let t = Tree::constant(4.0).sqrt() - 1.0;
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::CopyImm(3, 1.0), Op::End(3)]
        );
    }

    #[test]
    fn immediate_on_left() {
        let y = Tree::y();
        let t = 1.0 - y.clone();
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::SubImmReg(3, 1, 1.0), Op::End(3)]
        );
        let t = 2.0 / y.clone();
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::DivImmReg(3, 1, 2.0), Op::End(3)]
        );
        let t = Tree::constant(0.5).min(y);
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::MinRegImm(3, 1, 0.5), Op::End(3)]
        );
    }

    #[test]
    fn shared_subtree() {
        let s = Tree::x().sin();
        let t = s.clone() * s;
        assert_eq!(
            build(&t).unwrap(),
            vec![Op::SinReg(3, 0), Op::MulRegReg(3, 3, 3), Op::End(3)]
        );
    }

    #[test]
    fn bare_axis_root() {
        let t = Tree::z();
        assert_eq!(build(&t).unwrap(), vec![Op::CopyReg(3, 2), Op::End(3)]);
    }

    #[test]
    fn slot_reuse() {
        // A long left-leaning chain only needs a couple of slots
        let x = Tree::x();
        let mut t = x.clone();
        for i in 0..1000 {
            t = (t + i).sin();
        }
        let tape = Tape::new(&t).unwrap();
        assert_eq!(tape.slot_count(), 4);
    }

    #[test]
    fn slot_overflow() {
        // A right-leaning sum keeps every term alive until the end
        let x = Tree::x();
        let terms: Vec<Tree> =
            (0..SLOT_COUNT).map(|i| (x.clone() + i as i32).sin()).collect();
        let mut t = terms[SLOT_COUNT - 1].clone();
        for s in terms.iter().rev().skip(1) {
            t = s.clone() + t;
        }
        assert!(matches!(Tape::new(&t), Err(Error::SlotOverflow(..))));
    }
}
