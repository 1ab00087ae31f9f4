use crate::arena::Graph;
use crate::engine::types::{get_prim, Head};
use super::reduce::hnf_reduce;

use num_bigint::BigInt;
use num_traits::One;
use std::any::Any;
use std::rc::Rc;

/// An opaque host value embedded in the term graph.
///
/// A primitive participates in reduction through `apply`: when the head
/// position of an application is a primitive, the engine wraps the
/// argument graph in a temporary [`Head`] and asks the primitive for a
/// result. The callee may drive that head to HNF (`hnf_reduce`) and
/// inspect it (`get_prim`), but must not retain the head past the call
/// or reach nodes outside the argument graph.
pub trait PrimValue {
    /// `None` means no rule fires; the redex is left in place.
    fn apply(&self, g: &mut Graph, arg: &Head) -> Option<Rc<dyn PrimValue>>;

    /// Human-readable label for debug dumps.
    fn repr(&self) -> String;

    fn as_any(&self) -> &dyn Any;
}

/// Inert arbitrary-precision numeral.
pub struct Num(pub BigInt);

impl Num {
    pub fn new<T: Into<BigInt>>(n: T) -> Rc<dyn PrimValue> {
        Rc::new(Num(n.into()))
    }
}

impl PrimValue for Num {
    fn apply(&self, _g: &mut Graph, _arg: &Head) -> Option<Rc<dyn PrimValue>> {
        None
    }

    fn repr(&self) -> String {
        self.0.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Successor on numerals. The argument is forced to HNF first, since
/// the driver never reduces argument positions on its own.
pub struct Succ;

impl PrimValue for Succ {
    fn apply(&self, g: &mut Graph, arg: &Head) -> Option<Rc<dyn PrimValue>> {
        hnf_reduce(g, arg);
        let p = get_prim(g, arg)?;
        let n = p.as_any().downcast_ref::<Num>()?;
        Some(Rc::new(Num(&n.0 + BigInt::one())))
    }

    fn repr(&self) -> String {
        "succ".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Curried addition: the first application captures the left operand
/// and returns another applicable primitive, the second returns the sum.
pub struct Add(pub Option<BigInt>);

impl PrimValue for Add {
    fn apply(&self, g: &mut Graph, arg: &Head) -> Option<Rc<dyn PrimValue>> {
        hnf_reduce(g, arg);
        let p = get_prim(g, arg)?;
        let n = p.as_any().downcast_ref::<Num>()?;
        match &self.0 {
            None => Some(Rc::new(Add(Some(n.0.clone())))),
            Some(lhs) => Some(Rc::new(Num(lhs + &n.0))),
        }
    }

    fn repr(&self) -> String {
        match &self.0 {
            None => "add".to_string(),
            Some(lhs) => format!("add[{}]", lhs),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The numeral inside `p`, if it is a [`Num`].
pub fn num_value(p: &Rc<dyn PrimValue>) -> Option<BigInt> {
    p.as_any().downcast_ref::<Num>().map(|n| n.0.clone())
}
