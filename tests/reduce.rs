use bubs::arena::{Graph, Node, NodeId};
use bubs::engine::{
    copy_head, dotify, free_head, get_prim, hnf_reduce, make_head, num_value, Num, Succ,
};

use std::rc::Rc;

/// Church numeral n = \f. \x. f (f (... x))
fn church(g: &mut Graph, n: usize) -> NodeId {
    let f = g.var();
    let x = g.var();
    let mut body = x;
    for _ in 0..n {
        body = g.app(f, body);
    }
    let inner = g.fun(x, body);
    g.fun(f, inner)
}

fn app_children(g: &Graph, id: NodeId) -> (NodeId, NodeId) {
    match g.get(id) {
        Node::App { left, right } => (*left, *right),
        _ => panic!("expected an application"),
    }
}

#[test]
fn church_two_counts_to_two() {
    let mut g = Graph::new();
    let two = church(&mut g, 2);
    let succ = g.prim(Rc::new(Succ));
    let zero = g.prim(Num::new(0));
    let t1 = g.app(two, succ);
    let t = g.app(t1, zero);

    let h = make_head(&mut g, t);
    hnf_reduce(&mut g, &h);

    let p = get_prim(&g, &h).expect("result is a numeral");
    assert_eq!(num_value(&p), Some(2.into()));
    assert!(g.caches_clear());

    free_head(&mut g, h);
    assert_eq!(g.live_nodes(), 0);
}

#[test]
fn church_two_applied_to_inert_head_shares_the_function() {
    // 2 F Z with an inert F reduces to F (F Z); both F positions are
    // the same node because the source shared it
    let mut g = Graph::new();
    let two = church(&mut g, 2);
    let f = g.prim(Num::new(7));
    let z = g.prim(Num::new(0));
    let t1 = g.app(two, f);
    let t = g.app(t1, z);

    let h = make_head(&mut g, t);
    hnf_reduce(&mut g, &h);

    let (outer_f, inner) = app_children(&g, h.body(&g));
    let (inner_f, inner_z) = app_children(&g, inner);
    assert_eq!(outer_f, f);
    assert_eq!(inner_f, f, "F is shared across both applications");
    assert_eq!(inner_z, z);
    assert!(g.caches_clear());
}

#[test]
fn head_normal_form_with_free_variable_head() {
    // (\x. y x) k -> y k, stuck on the free variable y
    let mut g = Graph::new();
    let x = g.var();
    let y = g.var();
    let yx = g.app(y, x);
    let f = g.fun(x, yx);
    let k = g.prim(Num::new(1));
    let t = g.app(f, k);

    let h = make_head(&mut g, t);
    hnf_reduce(&mut g, &h);

    let (hd, arg) = app_children(&g, h.body(&g));
    assert_eq!(hd, y);
    assert_eq!(arg, k);
    assert!(matches!(g.get(hd), Node::Var));
}

#[test]
fn church_exponentiation_stays_polynomial() {
    // ((2 2) 2) succ 0 = 2^4 = 16. Only the spine from the substituted
    // variable to the redex is ever copied, so the slot count stays far
    // below the exponential blowup a naive substituter produces.
    let mut g = Graph::new();
    let two = church(&mut g, 2);
    let e1 = g.app(two, two);
    let e2 = g.app(e1, two);
    let succ = g.prim(Rc::new(Succ));
    let zero = g.prim(Num::new(0));
    let t1 = g.app(e2, succ);
    let t = g.app(t1, zero);

    let h = make_head(&mut g, t);
    hnf_reduce(&mut g, &h);

    let p = get_prim(&g, &h).expect("result is a numeral");
    assert_eq!(num_value(&p), Some(16.into()));

    let stats = g.stats();
    assert!(
        stats.live_nodes <= 10,
        "only the result and the sentinel stay live: {:?}",
        stats
    );
    assert!(
        stats.node_slots < 20_000,
        "total allocations stay polynomial: {:?}",
        stats
    );
    assert!(g.caches_clear());

    free_head(&mut g, h);
    assert_eq!(g.live_nodes(), 0);
}

#[test]
fn copy_head_keeps_the_graph_anchored() {
    let mut g = Graph::new();
    let x = g.var();
    let xx = g.app(x, x);
    let f = g.fun(x, xx);

    let h1 = make_head(&mut g, f);
    let h2 = copy_head(&mut g, &h1);

    free_head(&mut g, h1);
    assert!(g.live_nodes() > 0, "the copy keeps the term alive");

    free_head(&mut g, h2);
    assert_eq!(g.live_nodes(), 0);
}

#[test]
fn node_shared_between_two_heads_survives_either() {
    let mut g = Graph::new();
    let k = g.prim(Num::new(42));
    let h1 = make_head(&mut g, k);
    let h2 = make_head(&mut g, k);

    free_head(&mut g, h1);
    let p = get_prim(&g, &h2).expect("still reachable from the second head");
    assert_eq!(num_value(&p), Some(42.into()));

    free_head(&mut g, h2);
    assert_eq!(g.live_nodes(), 0);
}

#[test]
fn dotify_is_deterministic() {
    fn build(g: &mut Graph) -> bubs::engine::Head {
        let two = church(g, 2);
        let k = g.prim(Num::new(5));
        let t = g.app(two, k);
        make_head(g, t)
    }

    let mut g1 = Graph::new();
    let h1 = build(&mut g1);
    let mut out1 = Vec::new();
    dotify(&g1, &h1, &mut out1).unwrap();

    let mut g2 = Graph::new();
    let h2 = build(&mut g2);
    let mut out2 = Vec::new();
    dotify(&g2, &h2, &mut out2).unwrap();

    assert_eq!(out1, out2);
    assert!(String::from_utf8(out1).unwrap().contains("label=\"HEAD\""));
}
