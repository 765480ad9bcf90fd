//! Scalar reverse-mode automatic differentiation and a small neural network on top of it.
//!
//! Every arithmetic operation on [`Var`] creates a new node that remembers its operands.
//! [`Var::backward`] walks that graph once in reverse topological order and accumulates
//! `∂root/∂node` into every node it reaches.
//!
//! ```
//! use microdiff::Var;
//!
//! let a = Var::new(2.0);
//! let b = Var::new(-3.0);
//! let loss = (&a * &b + 10.0) * -2.0;
//! loss.backward();
//! assert_eq!(a.grad(), 6.0);
//! assert_eq!(b.grad(), -4.0);
//! ```
//!
//! Gradients are never reset implicitly. Call [`zero_grad`] between passes.
//!
//! The graph must stay acyclic, which the operators guarantee by always creating fresh
//! nodes. Nodes are `!Send`; build independent graphs for independent threads.

pub mod backwards;
pub mod config;
pub mod error;
pub mod grad_check;
pub mod nn;

pub use backwards::{backward, zero_grad, Op, Var};
pub use config::Config;
pub use error::{Error, Result};
pub use grad_check::{check_gradients, GradCheckOptions};
pub use nn::{Layer, Mlp, Module, Neuron};
