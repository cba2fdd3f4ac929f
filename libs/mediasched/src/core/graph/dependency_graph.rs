// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Arena-backed dependency graph.
//!
//! Every node has `N` slots naming what it waits on, and a doubly-linked list
//! of the links that wait on it. Links live in one arena with a free list, so
//! linking and unlinking are O(1) and no node holds a pointer to another.

/// Index of a link in the arena.
pub type LinkId = usize;

#[derive(Debug, Clone, Copy)]
struct Link {
    producer: usize,
    dependent: usize,
    level: usize,
    prev: Option<LinkId>,
    next: Option<LinkId>,
}

#[derive(Debug, Clone)]
struct Node<const N: usize> {
    /// Links this node waits on, by slot.
    slots: [Option<LinkId>; N],
    /// First link waiting on this node.
    head: Option<LinkId>,
    resolved: bool,
}

impl<const N: usize> Default for Node<N> {
    fn default() -> Self {
        Self {
            slots: [None; N],
            head: None,
            resolved: false,
        }
    }
}

/// Notification emitted while resolving a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyEvent {
    /// One slot of `node` cleared after its producer succeeded.
    Cleared { node: usize, fully_resolved: bool },
    /// `node` was aborted by a failed producer upstream. It has been detached
    /// from every remaining slot and its own dependents are aborted next.
    Aborted { node: usize },
}

#[derive(Debug, Clone)]
pub struct DependencyGraph<const N: usize> {
    nodes: Vec<Node<N>>,
    links: Vec<Link>,
    free_links: Vec<LinkId>,
}

impl<const N: usize> DependencyGraph<N> {
    pub fn new(node_count: usize) -> Self {
        Self {
            nodes: vec![Node::default(); node_count],
            links: Vec::with_capacity(node_count),
            free_links: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Detach `node` from everything and make it unresolved.
    pub fn reset(&mut self, node: usize) {
        self.detach_slots(node);
        while let Some(link) = self.nodes[node].head {
            self.unlink(link);
        }
        self.nodes[node].resolved = false;
    }

    /// Make `dependent` wait on `producer` in slot `level`.
    ///
    /// Returns `None` without linking when `level >= N`, the slot is taken,
    /// `producer` already resolved, or the two nodes are the same.
    pub fn set_dependent(&mut self, producer: usize, dependent: usize, level: usize) -> Option<LinkId> {
        if level >= N
            || producer == dependent
            || self.nodes[producer].resolved
            || self.nodes[dependent].slots[level].is_some()
        {
            return None;
        }

        let head = self.nodes[producer].head;
        let link = Link {
            producer,
            dependent,
            level,
            prev: None,
            next: head,
        };
        let id = match self.free_links.pop() {
            Some(id) => {
                self.links[id] = link;
                id
            }
            None => {
                self.links.push(link);
                self.links.len() - 1
            }
        };
        if let Some(head) = head {
            self.links[head].prev = Some(id);
        }
        self.nodes[producer].head = Some(id);
        self.nodes[dependent].slots[level] = Some(id);
        Some(id)
    }

    /// True when none of the node's slots is still linked.
    pub fn is_resolved(&self, node: usize) -> bool {
        self.nodes[node].slots.iter().all(Option::is_none)
    }

    pub fn pending_count(&self, node: usize) -> usize {
        self.nodes[node].slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn dependent_count(&self, node: usize) -> usize {
        let mut count = 0;
        let mut cursor = self.nodes[node].head;
        while let Some(id) = cursor {
            count += 1;
            cursor = self.links[id].next;
        }
        count
    }

    /// Links currently allocated in the arena.
    pub fn live_links(&self) -> usize {
        self.links.len() - self.free_links.len()
    }

    /// Resolve `node` and notify everything waiting on it.
    ///
    /// Each link is unlinked before `on_event` sees it. On failure the abort
    /// cascades through the whole downstream subgraph before this returns. A
    /// second call on a node that already resolved does nothing.
    pub fn resolve_dependencies(
        &mut self,
        node: usize,
        failed: bool,
        mut on_event: impl FnMut(DependencyEvent),
    ) {
        let mut work = vec![node];
        while let Some(current) = work.pop() {
            if self.nodes[current].resolved {
                continue;
            }
            self.nodes[current].resolved = true;

            while let Some(id) = self.nodes[current].head {
                let link = self.unlink(id);
                let dependent = link.dependent;
                if failed {
                    self.detach_slots(dependent);
                    on_event(DependencyEvent::Aborted { node: dependent });
                    work.push(dependent);
                } else {
                    on_event(DependencyEvent::Cleared {
                        node: dependent,
                        fully_resolved: self.is_resolved(dependent),
                    });
                }
            }
        }
    }

    fn detach_slots(&mut self, node: usize) {
        for level in 0..N {
            if let Some(id) = self.nodes[node].slots[level] {
                self.unlink(id);
            }
        }
    }

    fn unlink(&mut self, id: LinkId) -> Link {
        let link = self.links[id];
        match link.prev {
            Some(prev) => self.links[prev].next = link.next,
            None => self.nodes[link.producer].head = link.next,
        }
        if let Some(next) = link.next {
            self.links[next].prev = link.prev;
        }
        self.nodes[link.dependent].slots[link.level] = None;
        self.free_links.push(id);
        link
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Graph = DependencyGraph<4>;

    #[test]
    fn test_link_and_resolve_success() {
        let mut graph = Graph::new(3);
        assert!(graph.set_dependent(0, 2, 0).is_some());
        assert!(graph.set_dependent(1, 2, 1).is_some());
        assert_eq!(graph.pending_count(2), 2);
        assert!(!graph.is_resolved(2));

        let mut events = Vec::new();
        graph.resolve_dependencies(0, false, |e| events.push(e));
        assert_eq!(
            events,
            vec![DependencyEvent::Cleared {
                node: 2,
                fully_resolved: false
            }]
        );

        events.clear();
        graph.resolve_dependencies(1, false, |e| events.push(e));
        assert_eq!(
            events,
            vec![DependencyEvent::Cleared {
                node: 2,
                fully_resolved: true
            }]
        );
        assert!(graph.is_resolved(2));
        assert_eq!(graph.live_links(), 0);
    }

    #[test]
    fn test_level_out_of_range_is_not_linked() {
        let mut graph = Graph::new(2);
        assert!(graph.set_dependent(0, 1, 4).is_none());
        assert!(graph.is_resolved(1));
        assert_eq!(graph.live_links(), 0);
    }

    #[test]
    fn test_occupied_slot_and_self_link_rejected() {
        let mut graph = Graph::new(3);
        assert!(graph.set_dependent(0, 1, 0).is_some());
        assert!(graph.set_dependent(2, 1, 0).is_none());
        assert!(graph.set_dependent(1, 1, 1).is_none());
    }

    #[test]
    fn test_failure_cascades_transitively() {
        // 0 -> 1 -> 2, and 1 also waits on 3.
        let mut graph = Graph::new(4);
        graph.set_dependent(0, 1, 0);
        graph.set_dependent(3, 1, 1);
        graph.set_dependent(1, 2, 0);

        let mut aborted = Vec::new();
        graph.resolve_dependencies(0, true, |e| {
            if let DependencyEvent::Aborted { node } = e {
                aborted.push(node);
            }
        });
        assert_eq!(aborted, vec![1, 2]);
        // Node 1 no longer hangs off node 3.
        assert_eq!(graph.dependent_count(3), 0);
        assert_eq!(graph.live_links(), 0);
    }

    #[test]
    fn test_resolve_twice_is_noop() {
        let mut graph = Graph::new(2);
        graph.set_dependent(0, 1, 0);
        let mut count = 0;
        graph.resolve_dependencies(0, false, |_| count += 1);
        graph.resolve_dependencies(0, false, |_| count += 1);
        assert_eq!(count, 1);
        assert!(graph.set_dependent(0, 1, 0).is_none());
    }

    #[test]
    fn test_reset_unlinks_both_directions() {
        let mut graph = Graph::new(3);
        graph.set_dependent(0, 1, 0);
        graph.set_dependent(1, 2, 0);
        graph.reset(1);
        assert_eq!(graph.dependent_count(0), 0);
        assert!(graph.is_resolved(2));
        assert_eq!(graph.live_links(), 0);
    }

    #[test]
    fn test_unlink_from_middle_of_list() {
        let mut graph = Graph::new(4);
        graph.set_dependent(0, 1, 0);
        graph.set_dependent(0, 2, 0);
        graph.set_dependent(0, 3, 0);
        graph.reset(2);
        assert_eq!(graph.dependent_count(0), 2);

        let mut cleared = Vec::new();
        graph.resolve_dependencies(0, false, |e| {
            if let DependencyEvent::Cleared { node, .. } = e {
                cleared.push(node);
            }
        });
        cleared.sort();
        assert_eq!(cleared, vec![1, 3]);
    }

    #[test]
    fn test_links_are_recycled() {
        let mut graph = Graph::new(2);
        for _ in 0..10 {
            graph.reset(0);
            graph.reset(1);
            graph.set_dependent(0, 1, 0);
            graph.resolve_dependencies(0, false, |_| {});
        }
        assert!(graph.links.len() <= 1);
    }
}
