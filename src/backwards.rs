use log::trace;
use num_traits::{One, Pow, Zero};
use std::{
    cell::RefCell,
    collections::HashSet,
    fmt,
    iter::Sum,
    ops::{Add, Div, Mul, Neg, Sub},
    rc::Rc,
};

use crate::error::{Error, Result};

/// The operation that produced a node. Forward values are computed eagerly, so this is
/// only read by the backward pass and by introspection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Op {
    None,
    Add,
    Mul,
    Pow(f64),
    Tanh,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::None => write!(f, ""),
            Op::Add => write!(f, "+"),
            Op::Mul => write!(f, "*"),
            Op::Pow(k) => write!(f, "**{k}"),
            Op::Tanh => write!(f, "tanh"),
        }
    }
}

struct VarData {
    value: f64,
    grad: f64,
    op: Op,
    operands: Vec<Var>,
    label: Option<String>,
}

// Unlinks operands iteratively; the derived drop would recurse once per node in a chain.
impl Drop for VarData {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.operands);
        while let Some(Var(node)) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(node) {
                pending.append(&mut cell.into_inner().operands);
            }
        }
    }
}

type NodeId = *const RefCell<VarData>;

/// A scalar node in a computation graph.
///
/// Cloning a `Var` clones the handle, not the node: every clone refers to the same value
/// and gradient. A node lives as long as some handle or downstream node refers to it.
#[derive(Clone)]
pub struct Var(Rc<RefCell<VarData>>);

impl Var {
    /// Creates a leaf with zero gradient.
    pub fn new(value: f64) -> Var {
        Var(Rc::new(RefCell::new(VarData {
            value,
            grad: 0.0,
            op: Op::None,
            operands: Vec::new(),
            label: None,
        })))
    }

    pub fn with_label(value: f64, label: impl Into<String>) -> Var {
        let var = Var::new(value);
        var.0.borrow_mut().label = Some(label.into());
        var
    }

    fn from_op(value: f64, op: Op, operands: Vec<Var>) -> Var {
        Var(Rc::new(RefCell::new(VarData {
            value,
            grad: 0.0,
            op,
            operands,
            label: None,
        })))
    }

    pub fn data(&self) -> f64 {
        self.0.borrow().value
    }

    pub fn grad(&self) -> f64 {
        self.0.borrow().grad
    }

    pub fn op(&self) -> Op {
        self.0.borrow().op
    }

    /// Handles to the nodes this one was derived from, in operand order.
    pub fn operands(&self) -> Vec<Var> {
        self.0.borrow().operands.clone()
    }

    pub fn label(&self) -> Option<String> {
        self.0.borrow().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.0.borrow_mut().label = Some(label.into());
    }

    pub fn is_leaf(&self) -> bool {
        self.0.borrow().op == Op::None
    }

    /// True when both handles refer to the same node. Equal values do not make equal nodes.
    pub fn ptr_eq(&self, other: &Var) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Overwrites the value of a leaf, e.g. for an optimizer step between passes.
    ///
    /// Derived nodes keep the value computed at construction.
    pub fn set_data(&self, value: f64) -> Result<()> {
        let mut data = self.0.borrow_mut();
        if data.op != Op::None {
            return Err(Error::NotALeaf {
                op: data.op.to_string(),
            });
        }
        data.value = value;
        Ok(())
    }

    fn id(&self) -> NodeId {
        Rc::as_ptr(&self.0)
    }

    fn add_grad(&self, grad: f64) {
        self.0.borrow_mut().grad += grad;
    }

    pub fn powf(&self, k: f64) -> Var {
        Var::from_op(self.data().powf(k), Op::Pow(k), vec![self.clone()])
    }

    /// Hyperbolic tangent through `(e^2x - 1) / (e^2x + 1)`; overflows to NaN for very
    /// large inputs.
    pub fn tanh(&self) -> Var {
        let e2x = (2.0 * self.data()).exp();
        let t = (e2x - 1.0) / (e2x + 1.0);
        Var::from_op(t, Op::Tanh, vec![self.clone()])
    }

    /// Adds this node's contribution to the gradients of its operands.
    fn backward_step(&self) {
        let (op, out_grad, operands) = {
            let data = self.0.borrow();
            (data.op, data.grad, data.operands.clone())
        };
        match (op, operands.as_slice()) {
            (Op::None, []) => {}
            (Op::Add, [a, b]) => {
                a.add_grad(out_grad);
                b.add_grad(out_grad);
            }
            (Op::Mul, [a, b]) => {
                let (a_value, b_value) = (a.data(), b.data());
                a.add_grad(b_value * out_grad);
                b.add_grad(a_value * out_grad);
            }
            (Op::Pow(k), [a]) => {
                a.add_grad(k * a.data().powf(k - 1.0) * out_grad);
            }
            (Op::Tanh, [a]) => {
                let t = self.data();
                a.add_grad((1.0 - t * t) * out_grad);
            }
            (op, operands) => unreachable!("`{op:?}` node with {} operands", operands.len()),
        }
    }

    /// All nodes reachable from this one, each after its operands. `self` comes last.
    pub fn topological_order(&self) -> Vec<Var> {
        let mut order = Vec::new();
        post_order(self, &mut HashSet::new(), &mut order);
        order
    }

    /// Performs the backward pass from this variable.
    ///
    /// Seeds this node's gradient with 1 and accumulates into every reachable node.
    /// Gradients are not reset first; see [`zero_grad`].
    pub fn backward(&self) {
        let order = self.topological_order();
        trace!("backward pass over {} nodes", order.len());

        self.0.borrow_mut().grad = 1.0;
        for node in order.iter().rev() {
            node.backward_step();
        }
    }

    /// Zeroes the gradient of this node and everything it was derived from.
    pub fn zero_grad(&self) {
        zero_grad([self]);
    }
}

// Post-order DFS with an explicit stack, so deep chains don't exhaust the call stack.
fn post_order(root: &Var, visited: &mut HashSet<NodeId>, order: &mut Vec<Var>) {
    let mut stack = vec![(root.clone(), false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !visited.insert(node.id()) {
            continue;
        }
        let operands = node.operands();
        stack.push((node, true));
        for operand in operands.into_iter().rev() {
            if !visited.contains(&operand.id()) {
                stack.push((operand, false));
            }
        }
    }
}

/// Performs the backward pass from `root`.
pub fn backward(root: &Var) {
    root.backward();
}

/// Zeroes the gradient of every node reachable from any of `roots`.
pub fn zero_grad<'a, I>(roots: I)
where
    I: IntoIterator<Item = &'a Var>,
{
    let mut visited = HashSet::new();
    let mut nodes = Vec::new();
    for root in roots {
        post_order(root, &mut visited, &mut nodes);
    }
    for node in &nodes {
        node.0.borrow_mut().grad = 0.0;
    }
}

impl From<f64> for Var {
    fn from(value: f64) -> Var {
        Var::new(value)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        f.debug_struct("Var")
            .field("data", &data.value)
            .field("grad", &data.grad)
            .field("op", &data.op)
            .field("label", &data.label)
            .finish()
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var(data={}, grad={})", self.data(), self.grad())
    }
}

impl Add for &Var {
    type Output = Var;

    fn add(self, rhs: &Var) -> Var {
        Var::from_op(
            self.data() + rhs.data(),
            Op::Add,
            vec![self.clone(), rhs.clone()],
        )
    }
}

impl Mul for &Var {
    type Output = Var;

    fn mul(self, rhs: &Var) -> Var {
        Var::from_op(
            self.data() * rhs.data(),
            Op::Mul,
            vec![self.clone(), rhs.clone()],
        )
    }
}

// Negation, subtraction and division are compositions of the primitives above, so their
// gradients come out of the same local rules.
impl Neg for &Var {
    type Output = Var;

    fn neg(self) -> Var {
        self * -1.0
    }
}

impl Neg for Var {
    type Output = Var;

    fn neg(self) -> Var {
        -&self
    }
}

impl Sub for &Var {
    type Output = Var;

    fn sub(self, rhs: &Var) -> Var {
        self + &(-rhs)
    }
}

impl Div for &Var {
    type Output = Var;

    fn div(self, rhs: &Var) -> Var {
        self * &rhs.powf(-1.0)
    }
}

macro_rules! forward_binop {
    ($imp:ident, $method:ident) => {
        impl $imp<Var> for Var {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                (&self).$method(&rhs)
            }
        }

        impl $imp<&Var> for Var {
            type Output = Var;

            fn $method(self, rhs: &Var) -> Var {
                (&self).$method(rhs)
            }
        }

        impl $imp<Var> for &Var {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                self.$method(&rhs)
            }
        }

        impl $imp<f64> for &Var {
            type Output = Var;

            fn $method(self, rhs: f64) -> Var {
                self.$method(&Var::new(rhs))
            }
        }

        impl $imp<f64> for Var {
            type Output = Var;

            fn $method(self, rhs: f64) -> Var {
                (&self).$method(&Var::new(rhs))
            }
        }

        impl $imp<&Var> for f64 {
            type Output = Var;

            fn $method(self, rhs: &Var) -> Var {
                (&Var::new(self)).$method(rhs)
            }
        }

        impl $imp<Var> for f64 {
            type Output = Var;

            fn $method(self, rhs: Var) -> Var {
                (&Var::new(self)).$method(&rhs)
            }
        }
    };
}

forward_binop!(Add, add);
forward_binop!(Sub, sub);
forward_binop!(Mul, mul);
forward_binop!(Div, div);

impl Pow<f64> for &Var {
    type Output = Var;

    fn pow(self, k: f64) -> Var {
        self.powf(k)
    }
}

impl Pow<f64> for Var {
    type Output = Var;

    fn pow(self, k: f64) -> Var {
        self.powf(k)
    }
}

impl Pow<i32> for &Var {
    type Output = Var;

    fn pow(self, k: i32) -> Var {
        self.powf(f64::from(k))
    }
}

impl Pow<i32> for Var {
    type Output = Var;

    fn pow(self, k: i32) -> Var {
        self.powf(f64::from(k))
    }
}

impl Zero for Var {
    fn zero() -> Self {
        Var::new(0.0)
    }

    fn is_zero(&self) -> bool {
        self.data() == 0.0
    }
}

impl One for Var {
    fn one() -> Self {
        Var::new(1.0)
    }
}

impl Sum for Var {
    fn sum<I: Iterator<Item = Var>>(iter: I) -> Var {
        iter.fold(Var::zero(), |acc, v| acc + v)
    }
}

impl<'a> Sum<&'a Var> for Var {
    fn sum<I: Iterator<Item = &'a Var>>(iter: I) -> Var {
        iter.fold(Var::zero(), |acc, v| acc + v)
    }
}
