//! Mutable precedence graph with paired forward and reverse adjacency.
//!
//! Every forward entry `forward[s][i]` stores the slot of its mirror in
//! `reverse[target]`, and that mirror stores `i` back. Both lists are
//! compacted with swap-with-last on deletion, so the entry moved into a
//! vacated slot has its partner's back-reference rewritten in the same step.
//! [`EdgeRef`] handles carry the graph generation at the time they were
//! taken and are checked against it in debug builds.

use std::fmt::Write;
use thiserror::Error;

use crate::problem::{JobId, Problem, Time};

/// Outgoing edge stored in the forward adjacency of its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub target: JobId,
    /// Slot of the mirror entry in `reverse[target]`.
    pub reverse_index: usize,
    pub lag: Time,
    /// Instance precedence; never deleted.
    pub permanent: bool,
    /// Tentatively deleted by the running deletion search.
    pub(crate) marked: bool,
    /// Already expanded by the running deletion search.
    pub(crate) seen: bool,
}

/// Incoming edge stored in the reverse adjacency of its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseEdge {
    pub source: JobId,
    /// Slot of the edge in `forward[source]`.
    pub forward_index: usize,
}

/// Handle to a forward edge, valid until the next structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeRef {
    pub source: JobId,
    pub index: usize,
    generation: u64,
}

/// Structural inconsistencies found by [`PrecedenceGraph::check`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("edge {job}[{index}] points to reverse slot that does not point back")]
    BrokenReverseLink { job: JobId, index: usize },

    #[error("reverse entry {target}[{index}] points to forward slot that does not point back")]
    BrokenForwardLink { target: JobId, index: usize },

    #[error("edge count {counted} does not match bookkeeping {recorded}")]
    EdgeCount { counted: usize, recorded: usize },

    #[error("graph contains a cycle")]
    Cycle,
}

#[derive(Debug, Clone, Default)]
pub struct PrecedenceGraph {
    forward: Vec<Vec<Edge>>,
    reverse: Vec<Vec<ReverseEdge>>,
    num_edges: usize,
    generation: u64,
}

impl PrecedenceGraph {
    pub fn new(num_jobs: usize) -> Self {
        Self {
            forward: vec![Vec::new(); num_jobs],
            reverse: vec![Vec::new(); num_jobs],
            num_edges: 0,
            generation: 0,
        }
    }

    /// Graph holding only the permanent precedences of `problem`.
    pub fn from_problem(problem: &Problem) -> Self {
        let mut graph = Self::new(problem.num_jobs());
        for p in problem.precedences() {
            graph.insert_edge(p.source, p.target, p.lag, true);
        }
        graph
    }

    pub fn num_jobs(&self) -> usize {
        self.forward.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn successors(&self, job: JobId) -> &[Edge] {
        &self.forward[job]
    }

    pub fn predecessors(&self, job: JobId) -> &[ReverseEdge] {
        &self.reverse[job]
    }

    /// Handle to `forward[source][index]`.
    pub fn edge_ref(&self, source: JobId, index: usize) -> EdgeRef {
        debug_assert!(index < self.forward[source].len());
        EdgeRef {
            source,
            index,
            generation: self.generation,
        }
    }

    /// Handle to the edge mirrored by `reverse[target][index]`.
    pub fn incoming_ref(&self, target: JobId, index: usize) -> EdgeRef {
        let rev = self.reverse[target][index];
        self.edge_ref(rev.source, rev.forward_index)
    }

    pub fn edge(&self, edge: EdgeRef) -> &Edge {
        debug_assert_eq!(edge.generation, self.generation, "stale edge handle");
        &self.forward[edge.source][edge.index]
    }

    pub(crate) fn edge_mut(&mut self, edge: EdgeRef) -> &mut Edge {
        debug_assert_eq!(edge.generation, self.generation, "stale edge handle");
        &mut self.forward[edge.source][edge.index]
    }

    /// Add `source -> target` with the given start-to-start lag.
    pub fn insert_edge(&mut self, source: JobId, target: JobId, lag: Time, permanent: bool) {
        let forward_index = self.forward[source].len();
        self.reverse[target].push(ReverseEdge {
            source,
            forward_index,
        });
        self.forward[source].push(Edge {
            target,
            reverse_index: self.reverse[target].len() - 1,
            lag,
            permanent,
            marked: false,
            seen: false,
        });
        self.num_edges += 1;
        self.generation += 1;
    }

    /// Delete a set of edges in one compaction pass.
    ///
    /// Duplicate handles are ignored. Deletions run from the highest slot
    /// down so the entry swapped into a vacated slot is never itself due
    /// for deletion.
    pub fn bulk_delete(&mut self, edges: &[EdgeRef]) {
        if edges.is_empty() {
            return;
        }

        let mut forward_slots: Vec<(JobId, usize)> = Vec::with_capacity(edges.len());
        let mut reverse_slots: Vec<(JobId, usize)> = Vec::with_capacity(edges.len());
        for &e in edges {
            debug_assert_eq!(e.generation, self.generation, "stale edge handle");
            debug_assert!(!self.forward[e.source][e.index].permanent);
            let edge = &self.forward[e.source][e.index];
            forward_slots.push((e.source, e.index));
            reverse_slots.push((edge.target, edge.reverse_index));
        }
        let by_slot_desc = |a: &(JobId, usize), b: &(JobId, usize)| a.0.cmp(&b.0).then(b.1.cmp(&a.1));
        forward_slots.sort_unstable_by(by_slot_desc);
        forward_slots.dedup();
        reverse_slots.sort_unstable_by(by_slot_desc);
        reverse_slots.dedup();

        for &(source, index) in &forward_slots {
            let list = &mut self.forward[source];
            list.swap_remove(index);
            if let Some(moved) = list.get(index) {
                self.reverse[moved.target][moved.reverse_index].forward_index = index;
            }
        }

        for &(target, index) in &reverse_slots {
            let list = &mut self.reverse[target];
            list.swap_remove(index);
            if let Some(moved) = list.get(index) {
                self.forward[moved.source][moved.forward_index].reverse_index = index;
            }
        }

        self.num_edges -= forward_slots.len();
        self.generation += 1;
    }

    /// Overwrite this graph with `base`, reusing allocations.
    pub fn restore(&mut self, base: &PrecedenceGraph) {
        for (dst, src) in self.forward.iter_mut().zip(&base.forward) {
            dst.clone_from(src);
        }
        for (dst, src) in self.reverse.iter_mut().zip(&base.reverse) {
            dst.clone_from(src);
        }
        self.num_edges = base.num_edges;
        self.generation += 1;
    }

    /// All edges as `(source, edge)`.
    pub fn edges(&self) -> impl Iterator<Item = (JobId, &Edge)> + '_ {
        self.forward
            .iter()
            .enumerate()
            .flat_map(|(s, list)| list.iter().map(move |e| (s, e)))
    }

    /// Whether `to` is reachable from `from` along forward edges.
    pub fn reaches(&self, from: JobId, to: JobId) -> bool {
        let mut visited = vec![false; self.num_jobs()];
        let mut stack = vec![from];
        visited[from] = true;
        while let Some(v) = stack.pop() {
            if v == to {
                return true;
            }
            for e in &self.forward[v] {
                if !visited[e.target] {
                    visited[e.target] = true;
                    stack.push(e.target);
                }
            }
        }
        false
    }

    /// Kahn's algorithm; `None` if the graph has a cycle.
    pub fn topological_order(&self) -> Option<Vec<JobId>> {
        let n = self.num_jobs();
        let mut in_degree: Vec<usize> = self.reverse.iter().map(Vec::len).collect();
        let mut queue: Vec<JobId> = (0..n).filter(|&v| in_degree[v] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(v) = queue.pop() {
            order.push(v);
            for e in &self.forward[v] {
                in_degree[e.target] -= 1;
                if in_degree[e.target] == 0 {
                    queue.push(e.target);
                }
            }
        }
        (order.len() == n).then_some(order)
    }

    /// Verify back-references, edge count and acyclicity.
    pub fn check(&self) -> Result<(), GraphError> {
        let mut counted = 0;
        for (source, list) in self.forward.iter().enumerate() {
            for (index, e) in list.iter().enumerate() {
                counted += 1;
                let mirror = self.reverse[e.target].get(e.reverse_index);
                if mirror != Some(&ReverseEdge {
                    source,
                    forward_index: index,
                }) {
                    return Err(GraphError::BrokenReverseLink { job: source, index });
                }
            }
        }
        for (target, list) in self.reverse.iter().enumerate() {
            for (index, r) in list.iter().enumerate() {
                let ok = self.forward[r.source]
                    .get(r.forward_index)
                    .is_some_and(|e| e.target == target && e.reverse_index == index);
                if !ok {
                    return Err(GraphError::BrokenForwardLink { target, index });
                }
            }
        }
        if counted != self.num_edges {
            return Err(GraphError::EdgeCount {
                counted,
                recorded: self.num_edges,
            });
        }
        if self.topological_order().is_none() {
            return Err(GraphError::Cycle);
        }
        Ok(())
    }

    /// Graphviz rendering; permanent edges are drawn bold.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph precedence {\n");
        for v in 0..self.num_jobs() {
            let _ = writeln!(out, "  {v};");
        }
        for (s, e) in self.edges() {
            let style = if e.permanent { "bold" } else { "dashed" };
            let _ = writeln!(
                out,
                "  {s} -> {} [label=\"{}\", style={style}];",
                e.target, e.lag
            );
        }
        out.push_str("}\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn edge_set(graph: &PrecedenceGraph) -> Vec<(JobId, JobId, Time, bool)> {
        let mut edges: Vec<_> = graph
            .edges()
            .map(|(s, e)| (s, e.target, e.lag, e.permanent))
            .collect();
        edges.sort_unstable();
        edges
    }

    #[test]
    fn test_insert_links_both_directions() {
        let mut g = PrecedenceGraph::new(3);
        g.insert_edge(0, 2, 4, true);
        g.insert_edge(1, 2, 1, false);
        assert_eq!(g.num_edges(), 2);
        assert_eq!(g.predecessors(2).len(), 2);
        let r = g.incoming_ref(2, 1);
        assert_eq!(r.source, 1);
        assert_eq!(g.edge(r).lag, 1);
        assert!(g.check().is_ok());
    }

    #[test]
    fn test_bulk_delete_fixes_moved_entries() {
        let mut g = PrecedenceGraph::new(4);
        g.insert_edge(0, 1, 1, false);
        g.insert_edge(0, 2, 1, false);
        g.insert_edge(0, 3, 1, false);
        g.insert_edge(1, 3, 1, false);
        g.insert_edge(2, 3, 1, true);

        let first = g.edge_ref(0, 0);
        let into_three = g.incoming_ref(3, 1);
        g.bulk_delete(&[first, into_three, first]);

        assert!(g.check().is_ok());
        assert_eq!(edge_set(&g), vec![(0, 2, 1, false), (0, 3, 1, false), (2, 3, 1, true)]);
    }

    #[test]
    fn test_restore_returns_to_base() {
        let mut g = PrecedenceGraph::new(3);
        g.insert_edge(0, 1, 2, true);
        let base = g.clone();
        g.insert_edge(1, 2, 2, false);
        g.insert_edge(0, 2, 2, false);
        g.restore(&base);
        assert_eq!(edge_set(&g), edge_set(&base));
        assert!(g.check().is_ok());
    }

    #[test]
    fn test_reaches_and_topological_order() {
        let mut g = PrecedenceGraph::new(4);
        g.insert_edge(0, 1, 1, true);
        g.insert_edge(1, 2, 1, true);
        assert!(g.reaches(0, 2));
        assert!(!g.reaches(2, 0));
        assert!(!g.reaches(3, 0));

        let order = g.topological_order().unwrap();
        let pos = |v: JobId| order.iter().position(|&x| x == v).unwrap();
        assert!(pos(0) < pos(1) && pos(1) < pos(2));

        g.insert_edge(2, 0, 1, false);
        assert!(g.topological_order().is_none());
        assert_eq!(g.check(), Err(GraphError::Cycle));
    }

    #[test]
    fn test_random_insert_delete_keeps_graph_consistent() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 12;
        let mut g = PrecedenceGraph::new(n);
        let mut model: Vec<(JobId, JobId, Time, bool)> = Vec::new();

        for round in 0..200 {
            for _ in 0..rng.random_range(1..6) {
                let s = rng.random_range(0..n);
                let t = rng.random_range(0..n);
                if s == t || g.reaches(t, s) {
                    continue;
                }
                g.insert_edge(s, t, round, false);
                model.push((s, t, round, false));
            }

            let mut victims = Vec::new();
            for s in 0..n {
                for i in 0..g.successors(s).len() {
                    if rng.random_bool(0.3) {
                        victims.push(g.edge_ref(s, i));
                    }
                }
            }
            for v in &victims {
                let e = g.edge(*v);
                let key = (v.source, e.target, e.lag, e.permanent);
                let pos = model.iter().position(|m| *m == key).unwrap();
                model.swap_remove(pos);
            }
            g.bulk_delete(&victims);

            assert!(g.check().is_ok(), "round {round}");
            let mut expected = model.clone();
            expected.sort_unstable();
            assert_eq!(edge_set(&g), expected);
        }
    }

    #[test]
    fn test_dot_output() {
        let mut g = PrecedenceGraph::new(2);
        g.insert_edge(0, 1, 3, true);
        let dot = g.to_dot();
        assert!(dot.starts_with("digraph precedence {"));
        assert!(dot.contains("0 -> 1 [label=\"3\", style=bold];"));
    }
}
