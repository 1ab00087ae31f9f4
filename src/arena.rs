//! Arena - Uplinked Term Graph Storage
use std::fmt;
use std::rc::Rc;

use crate::engine::primitives::PrimValue;

/// Lightweight NodeId
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub u32);

/// Handle to one uplink cell.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct LinkId(pub u32);

/// Core Node Enum
///
/// The downward half of the graph. Every node additionally carries an
/// uplink list (its parents) and a cache slot, stored in the arena slot
/// rather than in the enum so that the shape stays a plain value.
#[derive(Clone)]
pub enum Node {
    App { left: NodeId, right: NodeId },
    Lam { var: NodeId, body: NodeId },
    Var,
    Prim(Rc<dyn PrimValue>),
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::App { left, right } => {
                f.debug_struct("App").field("left", left).field("right", right).finish()
            }
            Node::Lam { var, body } => {
                f.debug_struct("Lam").field("var", var).field("body", body).finish()
            }
            Node::Var => write!(f, "Var"),
            Node::Prim(p) => write!(f, "Prim({})", p.repr()),
        }
    }
}

/// Which edge of the parent points at the child.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UplinkKind {
    /// Left (function) child of an application.
    AppFun,
    /// Right (argument) child of an application.
    AppArg,
    /// A lambda's unique body edge.
    LamBody,
}

/// Per-node scratch slot used during one reduction step.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Cache {
    Empty,
    /// Terminal marker: the upward copy stops at this node.
    Stop,
    /// The clone produced for this node in the current pass.
    Copied(NodeId),
}

struct Link {
    parent: NodeId,
    kind: UplinkKind,
    prev: Option<LinkId>,
    next: Option<LinkId>,
}

#[derive(Clone, Copy, Default)]
struct UplinkList {
    head: Option<LinkId>,
    tail: Option<LinkId>,
}

struct Slot {
    node: Node,
    cache: Cache,
    ups: UplinkList,
}

enum NodeEntry {
    Occupied(Slot),
    Free { next: Option<u32> },
}

enum LinkEntry {
    Occupied(Link),
    Free { next: Option<u32> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphStats {
    pub node_slots: usize,
    pub live_nodes: usize,
    pub free_nodes: usize,
    pub link_slots: usize,
    pub live_links: usize,
    pub free_links: usize,
}

/// The term graph: one slab of node slots, one slab of uplink cells,
/// each with an intrusive free list.
pub struct Graph {
    nodes: Vec<NodeEntry>,
    links: Vec<LinkEntry>,
    node_free: Option<u32>,
    link_free: Option<u32>,
    live_nodes: usize,
    live_links: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(1024),
            links: Vec::with_capacity(1024),
            node_free: None,
            link_free: None,
            live_nodes: 0,
            live_links: 0,
        }
    }

    /// Allocate a slot for `node` with an empty uplink list and a clear
    /// cache. Does NOT install uplinks on the children; the constructors
    /// below do, and the copy pass defers them to `clear`.
    pub fn add(&mut self, node: Node) -> NodeId {
        let slot = Slot { node, cache: Cache::Empty, ups: UplinkList::default() };
        self.live_nodes += 1;
        match self.node_free {
            Some(idx) => {
                let next = match self.nodes[idx as usize] {
                    NodeEntry::Free { next } => next,
                    _ => panic!("corrupt node free list at slot {}", idx),
                };
                self.node_free = next;
                self.nodes[idx as usize] = NodeEntry::Occupied(slot);
                NodeId(idx)
            }
            None => {
                let idx = self.nodes.len() as u32;
                self.nodes.push(NodeEntry::Occupied(slot));
                NodeId(idx)
            }
        }
    }

    /// Release a node slot back to the free list. The caller has already
    /// detached every edge; a non-empty uplink list here is a bug.
    pub(crate) fn free_node(&mut self, id: NodeId) {
        debug_assert!(!self.has_uplinks(id), "freeing node {} with live uplinks", id.0);
        let idx = id.0 as usize;
        match self.nodes[idx] {
            NodeEntry::Occupied(_) => {
                self.nodes[idx] = NodeEntry::Free { next: self.node_free };
                self.node_free = Some(id.0);
                self.live_nodes -= 1;
            }
            _ => panic!("double free of node {}", id.0),
        }
    }

    fn slot(&self, id: NodeId) -> &Slot {
        match self.nodes.get(id.0 as usize) {
            Some(NodeEntry::Occupied(slot)) => slot,
            _ => panic!("stale node id {}", id.0),
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot {
        match self.nodes.get_mut(id.0 as usize) {
            Some(NodeEntry::Occupied(slot)) => slot,
            _ => panic!("stale node id {}", id.0),
        }
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.slot(id).node
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.slot_mut(id).node
    }

    pub fn cache(&self, id: NodeId) -> Cache {
        self.slot(id).cache
    }

    pub fn set_cache(&mut self, id: NodeId, cache: Cache) {
        self.slot_mut(id).cache = cache;
    }

    // ---- constructors ------------------------------------------------

    /// Fresh variable; identity is the node itself.
    pub fn var(&mut self) -> NodeId {
        self.add(Node::Var)
    }

    /// Lambda over `var` with `body`. The binding edge to `var` is
    /// implicit; only the body gets an uplink.
    pub fn fun(&mut self, var: NodeId, body: NodeId) -> NodeId {
        debug_assert!(matches!(self.get(var), Node::Var), "fun: binder must be a Var node");
        let id = self.add(Node::Lam { var, body });
        self.add_uplink(body, id, UplinkKind::LamBody);
        id
    }

    pub fn app(&mut self, left: NodeId, right: NodeId) -> NodeId {
        let id = self.add(Node::App { left, right });
        self.add_uplink(left, id, UplinkKind::AppFun);
        self.add_uplink(right, id, UplinkKind::AppArg);
        id
    }

    pub fn prim(&mut self, p: Rc<dyn PrimValue>) -> NodeId {
        self.add(Node::Prim(p))
    }

    // ---- uplink list -------------------------------------------------

    /// Append an uplink `(parent, kind)` to `child`'s list.
    pub fn add_uplink(&mut self, child: NodeId, parent: NodeId, kind: UplinkKind) -> LinkId {
        let tail = self.slot(child).ups.tail;
        let cell = Link { parent, kind, prev: tail, next: None };
        self.live_links += 1;
        let id = match self.link_free {
            Some(idx) => {
                let next = match self.links[idx as usize] {
                    LinkEntry::Free { next } => next,
                    _ => panic!("corrupt link free list at slot {}", idx),
                };
                self.link_free = next;
                self.links[idx as usize] = LinkEntry::Occupied(cell);
                LinkId(idx)
            }
            None => {
                let idx = self.links.len() as u32;
                self.links.push(LinkEntry::Occupied(cell));
                LinkId(idx)
            }
        };
        match tail {
            Some(t) => self.link_mut(t).next = Some(id),
            None => self.slot_mut(child).ups.head = Some(id),
        }
        self.slot_mut(child).ups.tail = Some(id);
        id
    }

    /// Splice one cell out of `child`'s list and free it.
    pub fn remove_uplink(&mut self, child: NodeId, link: LinkId) {
        let (prev, next) = {
            let cell = self.link(link);
            (cell.prev, cell.next)
        };
        match prev {
            Some(p) => self.link_mut(p).next = next,
            None => self.slot_mut(child).ups.head = next,
        }
        match next {
            Some(n) => self.link_mut(n).prev = prev,
            None => self.slot_mut(child).ups.tail = prev,
        }
        let idx = link.0 as usize;
        match self.links[idx] {
            LinkEntry::Occupied(_) => {
                self.links[idx] = LinkEntry::Free { next: self.link_free };
                self.link_free = Some(link.0);
                self.live_links -= 1;
            }
            _ => panic!("double free of uplink {}", link.0),
        }
    }

    /// Remove the first uplink on `child` matching `(parent, kind)`.
    /// A miss means the graph invariants are broken.
    pub fn unlink(&mut self, child: NodeId, parent: NodeId, kind: UplinkKind) {
        let mut cur = self.first_uplink(child);
        while let Some(l) = cur {
            let (p, k, next) = {
                let cell = self.link(l);
                (cell.parent, cell.kind, cell.next)
            };
            if p == parent && k == kind {
                self.remove_uplink(child, l);
                return;
            }
            cur = next;
        }
        panic!("unlink: no ({}, {:?}) uplink on node {}", parent.0, kind, child.0);
    }

    pub fn has_uplinks(&self, id: NodeId) -> bool {
        self.slot(id).ups.head.is_some()
    }

    pub fn first_uplink(&self, id: NodeId) -> Option<LinkId> {
        self.slot(id).ups.head
    }

    pub fn next_uplink(&self, link: LinkId) -> Option<LinkId> {
        self.link(link).next
    }

    pub fn uplink(&self, link: LinkId) -> (NodeId, UplinkKind) {
        let cell = self.link(link);
        (cell.parent, cell.kind)
    }

    fn link(&self, id: LinkId) -> &Link {
        match self.links.get(id.0 as usize) {
            Some(LinkEntry::Occupied(cell)) => cell,
            _ => panic!("stale uplink id {}", id.0),
        }
    }

    fn link_mut(&mut self, id: LinkId) -> &mut Link {
        match self.links.get_mut(id.0 as usize) {
            Some(LinkEntry::Occupied(cell)) => cell,
            _ => panic!("stale uplink id {}", id.0),
        }
    }

    // ---- diagnostics -------------------------------------------------

    pub fn live_nodes(&self) -> usize {
        self.live_nodes
    }

    /// True when no node carries reduction scratch state.
    pub fn caches_clear(&self) -> bool {
        self.nodes.iter().all(|e| match e {
            NodeEntry::Occupied(slot) => slot.cache == Cache::Empty,
            NodeEntry::Free { .. } => true,
        })
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            node_slots: self.nodes.len(),
            live_nodes: self.live_nodes,
            free_nodes: self.nodes.len() - self.live_nodes,
            link_slots: self.links.len(),
            live_links: self.live_links,
            free_links: self.links.len() - self.live_links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_install_uplinks() {
        let mut g = Graph::new();
        let v = g.var();
        let body = g.var();
        let lam = g.fun(v, body);
        assert_eq!(g.uplink(g.first_uplink(body).unwrap()), (lam, UplinkKind::LamBody));
        assert!(!g.has_uplinks(v), "binding edge must not be an uplink");

        let a = g.app(lam, v);
        assert_eq!(g.uplink(g.first_uplink(lam).unwrap()), (a, UplinkKind::AppFun));
        assert_eq!(g.uplink(g.first_uplink(v).unwrap()), (a, UplinkKind::AppArg));
    }

    #[test]
    fn test_uplink_order_and_unlink() {
        let mut g = Graph::new();
        let child = g.var();
        let p1 = g.var();
        let p2 = g.var();
        g.add_uplink(child, p1, UplinkKind::AppFun);
        g.add_uplink(child, p2, UplinkKind::AppArg);
        g.add_uplink(child, p1, UplinkKind::AppArg);

        let mut order = Vec::new();
        let mut cur = g.first_uplink(child);
        while let Some(l) = cur {
            order.push(g.uplink(l));
            cur = g.next_uplink(l);
        }
        assert_eq!(
            order,
            vec![
                (p1, UplinkKind::AppFun),
                (p2, UplinkKind::AppArg),
                (p1, UplinkKind::AppArg)
            ]
        );

        g.unlink(child, p2, UplinkKind::AppArg);
        assert_eq!(g.uplink(g.first_uplink(child).unwrap()), (p1, UplinkKind::AppFun));
        g.unlink(child, p1, UplinkKind::AppFun);
        g.unlink(child, p1, UplinkKind::AppArg);
        assert!(!g.has_uplinks(child));
    }

    #[test]
    #[should_panic(expected = "unlink")]
    fn test_unlink_missing_is_fatal() {
        let mut g = Graph::new();
        let child = g.var();
        let parent = g.var();
        g.unlink(child, parent, UplinkKind::AppFun);
    }

    #[test]
    fn test_slot_reuse() {
        let mut g = Graph::new();
        let a = g.var();
        let b = g.var();
        assert_eq!(g.live_nodes(), 2);
        g.free_node(a);
        assert_eq!(g.live_nodes(), 1);
        let c = g.var();
        assert_eq!(c, a, "freed slot is reused first");
        assert_eq!(g.stats().node_slots, 2);
        let _ = b;
    }
}
