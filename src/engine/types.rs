use crate::arena::{Graph, Node, NodeId};
use crate::engine::primitives::PrimValue;
use super::reduce::cleanup;

use std::rc::Rc;
use std::sync::atomic::AtomicU64;

pub static REDUCE_DEBUG_LEVEL_OVERRIDE: AtomicU64 = AtomicU64::new(u64::MAX);

/// Externally owned anchor for a top-level expression.
///
/// The sentinel is a vacuous lambda wrapping the user's term, so the
/// user-level root always has a parent with an ordinary uplink and a
/// top-level redex can be rewired by `upreplace` like any other child.
#[derive(Debug)]
pub struct Head {
    pub dummy: NodeId,
}

impl Head {
    /// The user-level term under the sentinel.
    pub fn body(&self, g: &Graph) -> NodeId {
        match g.get(self.dummy) {
            Node::Lam { body, .. } => *body,
            _ => panic!("head sentinel {} is not a lambda", self.dummy.0),
        }
    }
}

pub fn make_head(g: &mut Graph, body: NodeId) -> Head {
    let var = g.var();
    Head { dummy: g.fun(var, body) }
}

/// A second anchor over `other`'s sentinel. The copy keeps the graph
/// alive after `other` is freed; the uplink accounting treats the extra
/// sentinel like any other parent.
pub fn copy_head(g: &mut Graph, other: &Head) -> Head {
    let var = g.var();
    Head { dummy: g.fun(var, other.dummy) }
}

pub fn free_head(g: &mut Graph, head: Head) {
    cleanup(g, head.dummy);
}

/// The wrapped primitive, iff the head is a sentinel over a single
/// primitive node. Used to extract results after reduction.
pub fn get_prim(g: &Graph, head: &Head) -> Option<Rc<dyn PrimValue>> {
    match g.get(head.dummy) {
        Node::Lam { body, .. } => match g.get(*body) {
            Node::Prim(p) => Some(p.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Step accounting for one `hnf_reduce` run. A non-terminating term is
/// the caller's problem to bound; `step_limit` is the bound.
pub struct EvalContext {
    pub step_limit: usize,
    pub steps: usize,
    pub step_limit_hit: bool,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self {
            step_limit: usize::MAX,
            steps: 0,
            step_limit_hit: false,
        }
    }
}
