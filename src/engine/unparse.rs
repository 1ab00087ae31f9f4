use crate::arena::{Graph, Node, NodeId};
use crate::engine::types::Head;

use rustc_hash::FxHashSet;
use std::io::{self, Write};

const DEBUG_UNPARSE_MAX_DEPTH: usize = 8;
const DEBUG_UNPARSE_MAX_NODES: usize = 200;

pub fn node_kind(g: &Graph, id: NodeId) -> &'static str {
    match g.get(id) {
        Node::App { .. } => "App",
        Node::Lam { .. } => "Lam",
        Node::Var => "Var",
        Node::Prim(_) => "Prim",
    }
}

/// Budgeted textual rendering for log lines. Variables print as their
/// slot index; shared subterms print once per occurrence, so the node
/// budget is what keeps wide DAGs short.
pub fn debug_unparse(g: &Graph, id: NodeId) -> String {
    let mut out = String::new();
    let mut budget = DEBUG_UNPARSE_MAX_NODES;
    unparse_rec(g, id, 0, &mut budget, &mut out);
    out
}

fn unparse_rec(g: &Graph, id: NodeId, depth: usize, budget: &mut usize, out: &mut String) {
    if *budget == 0 || depth > DEBUG_UNPARSE_MAX_DEPTH {
        out.push_str("...");
        return;
    }
    *budget -= 1;
    match g.get(id) {
        Node::Var => out.push_str(&format!("x{}", id.0)),
        Node::Prim(p) => out.push_str(&p.repr()),
        Node::Lam { var, body } => {
            out.push_str(&format!("(\\x{}. ", var.0));
            unparse_rec(g, *body, depth + 1, budget, out);
            out.push(')');
        }
        Node::App { left, right } => {
            out.push('(');
            unparse_rec(g, *left, depth + 1, budget, out);
            out.push(' ');
            unparse_rec(g, *right, depth + 1, budget, out);
            out.push(')');
        }
    }
}

/// Dump the graph under `top` in DOT format: lambdas labeled `\`,
/// applications `*`, variables `x`, primitives their repr; application
/// edges labeled fv/av, binding edges blue when the variable is used,
/// uplinks red. Node names come from the stable slot indices, so
/// identical graphs render identically.
pub fn dotify(g: &Graph, top: &Head, w: &mut impl Write) -> io::Result<()> {
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    writeln!(w, "digraph Lambda {{")?;
    writeln!(w, "p{} [label=\"HEAD\"];", top.dummy.0)?;
    let body = top.body(g);
    writeln!(w, "p{} -> p{};", top.dummy.0, body.0)?;
    seen.insert(top.dummy);
    dotify_rec(g, body, w, &mut seen)?;
    writeln!(w, "}}")
}

fn dotify_rec(
    g: &Graph,
    top: NodeId,
    w: &mut impl Write,
    seen: &mut FxHashSet<NodeId>,
) -> io::Result<()> {
    if !seen.insert(top) {
        return Ok(());
    }
    match g.get(top) {
        Node::Lam { var, body } => {
            writeln!(w, "p{} [label=\"\\\\\"];", top.0)?;
            writeln!(w, "p{} -> p{};", top.0, body.0)?;
            if g.has_uplinks(*var) {
                writeln!(w, "p{} -> p{} [color=blue];", top.0, var.0)?;
            }
            dotify_rec(g, *body, w, seen)?;
        }
        Node::App { left, right } => {
            writeln!(w, "p{} [label=\"*\"];", top.0)?;
            writeln!(w, "p{} -> p{} [color=\"#007f00\",label=\"fv\"];", top.0, left.0)?;
            writeln!(w, "p{} -> p{} [label=\"av\"];", top.0, right.0)?;
            dotify_rec(g, *left, w, seen)?;
            dotify_rec(g, *right, w, seen)?;
        }
        Node::Var => {
            writeln!(w, "p{} [label=\"x\"];", top.0)?;
        }
        Node::Prim(p) => {
            writeln!(w, "p{} [label=\"{}\"];", top.0, p.repr())?;
        }
    }
    let mut cur = g.first_uplink(top);
    while let Some(l) = cur {
        let (parent, _) = g.uplink(l);
        writeln!(w, "p{} -> p{} [color=red];", top.0, parent.0)?;
        cur = g.next_uplink(l);
    }
    Ok(())
}
