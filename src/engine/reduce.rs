use crate::arena::{Cache, Graph, Node, NodeId, UplinkKind};
use crate::engine::types::{
    free_head, make_head, EvalContext, Head, REDUCE_DEBUG_LEVEL_OVERRIDE,
};
use crate::engine::unparse::debug_unparse;

use smallvec::SmallVec;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;

fn reduce_debug_level() -> u64 {
    static LEVEL: OnceLock<u64> = OnceLock::new();
    let override_level = REDUCE_DEBUG_LEVEL_OVERRIDE.load(Ordering::Relaxed);
    if override_level != u64::MAX {
        return override_level;
    }
    *LEVEL.get_or_init(|| {
        std::env::var("BUBS_REDUCE_DEBUG")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
    })
}

pub fn set_reduce_debug_level_override(level: Option<u64>) {
    let val = level.unwrap_or(u64::MAX);
    REDUCE_DEBUG_LEVEL_OVERRIDE.store(val, Ordering::Relaxed);
}

fn reduce_debug(level: u64) -> bool {
    reduce_debug_level() >= level
}

/// Walk upward from a changed child, cloning the spine.
///
/// `into` is a parent of the position being rewritten; `kind` names the
/// edge that now carries `newchild` in the copy. Subgraphs that do not
/// contain the substituted variable are shared, not copied.
pub fn upcopy(g: &mut Graph, newchild: NodeId, into: NodeId, kind: UplinkKind) {
    let new_node = match g.get(into).clone() {
        Node::App { left, right } => match g.cache(into) {
            Cache::Empty => {
                // no uplinks on the clone yet; the clear pass installs them
                let clone = match kind {
                    UplinkKind::AppFun => g.add(Node::App { left: newchild, right }),
                    UplinkKind::AppArg => g.add(Node::App { left, right: newchild }),
                    UplinkKind::LamBody => {
                        panic!("upcopy: body edge into application {}", into.0)
                    }
                };
                g.set_cache(into, Cache::Copied(clone));
                clone
            }
            Cache::Copied(clone) => {
                // second visit, arriving from the other child: patch the
                // remaining slot and halt, the walk above this node
                // already happened on the first visit
                match (g.get_mut(clone), kind) {
                    (Node::App { left, .. }, UplinkKind::AppFun) => *left = newchild,
                    (Node::App { right, .. }, UplinkKind::AppArg) => *right = newchild,
                    _ => panic!("upcopy: malformed clone of application {}", into.0),
                }
                return;
            }
            Cache::Stop => panic!("upcopy: stop marker on application {}", into.0),
        },
        Node::Lam { var, .. } => {
            if g.cache(into) == Cache::Stop {
                // reached the redex's function node; the caller reads the
                // result out of the body's cache
                return;
            }
            let new_var = g.add(Node::Var);
            let clone = g.add(Node::Lam { var: new_var, body: newchild });
            g.set_cache(into, Cache::Copied(clone));
            // push the fresh binder through every occurrence of the old
            // one, cloning parents on the way (lazy alpha-renaming)
            upcopy(g, new_var, var, UplinkKind::LamBody);
            clone
        }
        // leaves are their own clones, shared between old and new graphs
        Node::Var | Node::Prim(_) => {
            g.set_cache(into, Cache::Copied(newchild));
            newchild
        }
    };

    // upcopy never touches uplink cells, so live iteration is safe
    let mut cur = g.first_uplink(into);
    while let Some(l) = cur {
        let (parent, pkind) = g.uplink(l);
        upcopy(g, new_node, parent, pkind);
        cur = g.next_uplink(l);
    }
}

/// Second pass over the copied region: install the uplinks `upcopy`
/// deferred and reset every cache back to empty.
pub fn clear(g: &mut Graph, node: NodeId) {
    // the seed itself may hold a cache entry (a substituted variable or
    // a cloned binder); reset it along with the path above
    g.set_cache(node, Cache::Empty);
    let mut cur = g.first_uplink(node);
    while let Some(l) = cur {
        let (parent, _) = g.uplink(l);
        match g.cache(parent) {
            // not visited by the copy pass, or already finalized
            Cache::Empty => {}
            Cache::Stop => panic!("clear: stop marker left on node {}", parent.0),
            Cache::Copied(clone) => {
                match g.get(parent).clone() {
                    Node::App { .. } => {
                        let (cl, cr) = match g.get(clone) {
                            Node::App { left, right } => (*left, *right),
                            _ => panic!("clear: malformed clone of application {}", parent.0),
                        };
                        g.add_uplink(cl, clone, UplinkKind::AppFun);
                        g.add_uplink(cr, clone, UplinkKind::AppArg);
                        g.set_cache(parent, Cache::Empty);
                    }
                    Node::Lam { var, .. } => {
                        let clone_body = match g.get(clone) {
                            Node::Lam { body, .. } => *body,
                            _ => panic!("clear: malformed clone of lambda {}", parent.0),
                        };
                        g.add_uplink(clone_body, clone, UplinkKind::LamBody);
                        g.set_cache(parent, Cache::Empty);
                        // finalize the clones spawned by the nested binder walk
                        clear(g, var);
                    }
                    _ => panic!("clear: leaf node {} has a clone", parent.0),
                }
                clear(g, parent);
            }
        }
        // installation only appends cells, so the chain stays valid; a
        // cell appended at the tail is picked up by this read
        cur = g.next_uplink(l);
    }
}

/// Reference-liveness reclamation: once the last uplink on `node` is
/// gone, detach its outgoing edges and release the slot, recursively.
pub fn cleanup(g: &mut Graph, node: NodeId) {
    if g.has_uplinks(node) {
        return;
    }
    match g.get(node).clone() {
        Node::Lam { var, body } => {
            // a binder with no occurrences is released here; one with
            // occurrences is released by the teardown of its last use
            let vacuous = !g.has_uplinks(var);
            g.unlink(body, node, UplinkKind::LamBody);
            cleanup(g, body);
            if vacuous {
                g.free_node(var);
            }
            g.free_node(node);
        }
        Node::App { left, right } => {
            g.unlink(left, node, UplinkKind::AppFun);
            cleanup(g, left);
            g.unlink(right, node, UplinkKind::AppArg);
            cleanup(g, right);
            g.free_node(node);
        }
        // dropping a Prim slot releases the host payload
        Node::Var | Node::Prim(_) => g.free_node(node),
    }
}

/// Rewire one parent edge in place: `into`'s `kind` slot stops pointing
/// at its old child and points at `newchild`, with uplink accounting on
/// both and reclamation of the old child if this was its last use.
pub fn upreplace(g: &mut Graph, newchild: NodeId, into: NodeId, kind: UplinkKind) {
    let old = match (g.get_mut(into), kind) {
        (Node::App { left, .. }, UplinkKind::AppFun) => std::mem::replace(left, newchild),
        (Node::App { right, .. }, UplinkKind::AppArg) => std::mem::replace(right, newchild),
        (Node::Lam { body, .. }, UplinkKind::LamBody) => std::mem::replace(body, newchild),
        _ => panic!("upreplace: no {:?} edge on node {}", kind, into.0),
    };
    g.unlink(old, into, kind);
    g.add_uplink(newchild, into, kind);
    cleanup(g, old);
}

fn parent_snapshot(g: &Graph, node: NodeId) -> SmallVec<[(NodeId, UplinkKind); 4]> {
    let mut out = SmallVec::new();
    let mut cur = g.first_uplink(node);
    while let Some(l) = cur {
        out.push(g.uplink(l));
        cur = g.next_uplink(l);
    }
    out
}

/// One beta step on the redex `app = (fun @ arg)` where `fun` is a
/// lambda. Copies only the spine from the bound variable up to `fun`;
/// everything else is shared between the old and new terms.
pub fn beta_reduce(g: &mut Graph, app: NodeId) {
    let (fun, arg) = match g.get(app) {
        Node::App { left, right } => (*left, *right),
        _ => panic!("beta_reduce: node {} is not an application", app.0),
    };
    let (var, body) = match g.get(fun) {
        Node::Lam { var, body } => (*var, *body),
        _ => panic!("beta_reduce: function {} is not a lambda", fun.0),
    };
    if reduce_debug(2) {
        eprintln!("BETA redex={} fun={} arg={}", app.0, fun.0, arg.0);
    }

    let result = if !g.has_uplinks(var) {
        // unused binder: the body is the result, shared as-is
        body
    } else {
        // bound the upward walk at the function node
        g.set_cache(fun, Cache::Stop);
        upcopy(g, arg, var, UplinkKind::LamBody);
        let result = match g.cache(body) {
            Cache::Copied(id) => id,
            c => panic!("beta_reduce: body {} has no copy after upcopy ({:?})", body.0, c),
        };
        g.set_cache(fun, Cache::Empty);
        clear(g, var);
        result
    };

    // snapshot: upreplace removes cells from this list as it walks, and
    // a freed cell may be reused by the uplink it installs
    for (parent, kind) in parent_snapshot(g, app) {
        upreplace(g, result, parent, kind);
    }
}

/// Apply the primitive in head position of `app` to its argument. False
/// means no rule fired and the term is stuck at this site.
pub fn prim_reduce(g: &mut Graph, app: NodeId) -> bool {
    let (fun, arg) = match g.get(app) {
        Node::App { left, right } => (*left, *right),
        _ => panic!("prim_reduce: node {} is not an application", app.0),
    };
    let p = match g.get(fun) {
        Node::Prim(p) => p.clone(),
        _ => panic!("prim_reduce: function {} is not a primitive", fun.0),
    };

    let arghead = make_head(g, arg);
    let res = p.apply(g, &arghead);
    free_head(g, arghead);

    match res {
        None => false,
        Some(out) => {
            let result = g.prim(out);
            for (parent, kind) in parent_snapshot(g, app) {
                upreplace(g, result, parent, kind);
            }
            true
        }
    }
}

fn hnf_step(g: &mut Graph, node: NodeId) -> bool {
    match g.get(node).clone() {
        Node::Lam { body, .. } => hnf_step(g, body),
        Node::App { left, .. } => {
            if hnf_step(g, left) {
                return true;
            }
            match g.get(left) {
                Node::Lam { .. } => {
                    beta_reduce(g, node);
                    true
                }
                Node::Prim(_) => prim_reduce(g, node),
                _ => false,
            }
        }
        Node::Var | Node::Prim(_) => false,
    }
}

/// One reduction at the leftmost head position under `top`, if any.
pub fn hnf_reduce_1(g: &mut Graph, top: &Head) -> bool {
    hnf_step(g, top.dummy)
}

/// Drive `top` to head normal form, bounded by `ctx.step_limit`.
pub fn hnf_reduce_with_ctx(g: &mut Graph, top: &Head, ctx: &mut EvalContext) {
    ctx.step_limit_hit = false;
    if reduce_debug(1) {
        eprintln!(
            "REDUCE_BEGIN root={} form={}",
            top.dummy.0,
            debug_unparse(g, top.body(g))
        );
    }
    while ctx.steps < ctx.step_limit {
        if !hnf_reduce_1(g, top) {
            if reduce_debug(1) {
                eprintln!(
                    "REDUCE_NORMAL_FORM steps={} live_nodes={} form={}",
                    ctx.steps,
                    g.live_nodes(),
                    debug_unparse(g, top.body(g))
                );
            }
            return;
        }
        ctx.steps += 1;
        if reduce_debug(2) {
            eprintln!(
                "REDUCE_STEP step={} live_nodes={} form={}",
                ctx.steps,
                g.live_nodes(),
                debug_unparse(g, top.body(g))
            );
        }
    }
    ctx.step_limit_hit = true;
    if reduce_debug(1) {
        eprintln!(
            "REDUCE_LIMIT steps={} step_limit={} root={}",
            ctx.steps, ctx.step_limit, top.dummy.0
        );
    }
}

/// Drive `top` to head normal form.
pub fn hnf_reduce(g: &mut Graph, top: &Head) {
    let mut ctx = EvalContext::default();
    hnf_reduce_with_ctx(g, top, &mut ctx);
}
