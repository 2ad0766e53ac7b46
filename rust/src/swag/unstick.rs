//! Bounded edge-deletion search.
//!
//! When no candidate edge fits, the solver picks an overlapping pair
//! `s`, `t` and looks for non-permanent edges whose removal lets `s` start
//! earlier ([`DeletionSearch::backward`]) and `t` finish later
//! ([`DeletionSearch::forward`]) by enough to serialize them.
//!
//! Both directions run the same breadth-first search over edges. The first
//! layer tentatively deletes every non-permanent edge at the root. Popping a
//! tentatively deleted edge keeps it and deletes the edges one level further
//! out instead; permanent edges are popped first so the search routes around
//! them early. After each step the root's bound is recomputed over the
//! visited vertices with marked edges ignored. Edges still marked when the
//! depth bound is hit stay marked.
//!
//! The two directions accept sets differently. Backward sets are scored by
//! `#edges + penalty * shortfall` and the best-scoring one wins. Forward sets
//! must reach the requested amount; among those, the fewest edges win.
//!
//! Marks and seen flags live on the graph's edges and are always cleared
//! before a search returns.

use std::collections::VecDeque;

use crate::graph::{EdgeRef, PrecedenceGraph};
use crate::problem::{JobId, Time};
use crate::propagation::TimeBounds;

/// Edges to delete and how far the root bound moves once they are gone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionPlan {
    pub edges: Vec<EdgeRef>,
    pub achieved: Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// Walk predecessors, lowering earliest starts.
    Backward,
    /// Walk successors, raising latest finishes.
    Forward,
}

#[derive(Debug)]
pub struct DeletionSearch {
    max_depth: usize,
    penalty: u64,
    /// Search-local bound per visited vertex.
    current: Vec<Time>,
    visited: Vec<bool>,
    expanded: Vec<bool>,
    touched: Vec<JobId>,
    queue: VecDeque<(EdgeRef, usize)>,
    pruned: Vec<EdgeRef>,
    seen_edges: Vec<EdgeRef>,
    scratch: Vec<EdgeRef>,
    updates: VecDeque<JobId>,
    removed: usize,
}

impl DeletionSearch {
    pub fn new(num_jobs: usize, max_depth: usize, penalty: u32) -> Self {
        Self {
            max_depth,
            penalty: u64::from(penalty),
            current: vec![0; num_jobs],
            visited: vec![false; num_jobs],
            expanded: vec![false; num_jobs],
            touched: Vec::new(),
            queue: VecDeque::new(),
            pruned: Vec::new(),
            seen_edges: Vec::new(),
            scratch: Vec::new(),
            updates: VecDeque::new(),
            removed: 0,
        }
    }

    /// Edges whose removal lets `job` start up to `amount` earlier.
    pub fn backward(
        &mut self,
        graph: &mut PrecedenceGraph,
        bounds: &TimeBounds,
        job: JobId,
        amount: Time,
    ) -> DeletionPlan {
        if amount <= 0 || bounds.es(job) == bounds.base_earliest_start()[job] {
            return DeletionPlan::default();
        }
        let dir = Direction::Backward;
        self.begin(job, bounds.base_earliest_start()[job]);
        self.expanded[job] = true;
        self.expand(graph, bounds, dir, job, 0);
        self.update(graph, bounds, dir, job);

        let mut achieved = self.moved(bounds, dir, job);
        let mut best_score = self.score(amount, achieved);
        let mut best = DeletionPlan {
            edges: self.marked_edges(graph),
            achieved,
        };

        while self.step(graph, bounds, dir) {
            achieved = self.moved(bounds, dir, job);
            let score = self.score(amount, achieved);
            if score < best_score {
                best_score = score;
                best = DeletionPlan {
                    edges: self.marked_edges(graph),
                    achieved,
                };
            }
        }

        self.finish(graph);
        best
    }

    /// Edges whose removal lets `job` finish at least `amount` later, or
    /// `None` if no set within the depth bound does.
    pub fn forward(
        &mut self,
        graph: &mut PrecedenceGraph,
        bounds: &TimeBounds,
        job: JobId,
        amount: Time,
    ) -> Option<DeletionPlan> {
        if amount <= 0 {
            return Some(DeletionPlan::default());
        }
        if bounds.lf(job) == bounds.base_latest_finish()[job] {
            return None;
        }
        let dir = Direction::Forward;
        self.begin(job, bounds.base_latest_finish()[job]);
        self.expanded[job] = true;
        self.expand(graph, bounds, dir, job, 0);
        self.update(graph, bounds, dir, job);

        let mut best: Option<(usize, DeletionPlan)> = None;
        let mut consider = |search: &Self, graph: &PrecedenceGraph| {
            let achieved = search.moved(bounds, dir, job);
            let fewer = best
                .as_ref()
                .map_or(true, |(removed, _)| search.removed < *removed);
            if achieved >= amount && fewer {
                let plan = DeletionPlan {
                    edges: search.marked_edges(graph),
                    achieved,
                };
                best = Some((search.removed, plan));
            }
        };

        consider(self, graph);
        while self.step(graph, bounds, dir) {
            consider(self, graph);
        }

        self.finish(graph);
        best.map(|(_, plan)| plan)
    }

    fn begin(&mut self, root: JobId, value: Time) {
        for &v in &self.touched {
            self.visited[v] = false;
            self.expanded[v] = false;
        }
        self.touched.clear();
        self.queue.clear();
        self.pruned.clear();
        self.seen_edges.clear();
        self.removed = 0;
        self.visit(root, value);
    }

    fn visit(&mut self, job: JobId, value: Time) {
        if !self.visited[job] {
            self.visited[job] = true;
            self.current[job] = value;
            self.touched.push(job);
        }
    }

    fn moved(&self, bounds: &TimeBounds, dir: Direction, root: JobId) -> Time {
        let moved = match dir {
            Direction::Backward => bounds.es(root) - self.current[root],
            Direction::Forward => self.current[root] - bounds.lf(root),
        };
        moved.max(0)
    }

    fn score(&self, amount: Time, achieved: Time) -> u64 {
        let shortfall = (amount - achieved).max(0) as u64;
        self.removed as u64 + self.penalty * shortfall
    }

    /// Push the edges one level further out from `vertex`, marking the
    /// deletable ones.
    fn expand(
        &mut self,
        graph: &mut PrecedenceGraph,
        bounds: &TimeBounds,
        dir: Direction,
        vertex: JobId,
        depth: usize,
    ) {
        self.scratch.clear();
        match dir {
            Direction::Backward => {
                for idx in 0..graph.predecessors(vertex).len() {
                    self.scratch.push(graph.incoming_ref(vertex, idx));
                }
            }
            Direction::Forward => {
                for idx in 0..graph.successors(vertex).len() {
                    self.scratch.push(graph.edge_ref(vertex, idx));
                }
            }
        }

        for i in 0..self.scratch.len() {
            let e = self.scratch[i];
            let (far, permanent) = {
                let edge = graph.edge(e);
                let far = match dir {
                    Direction::Backward => e.source,
                    Direction::Forward => edge.target,
                };
                (far, edge.permanent)
            };
            let initial = match dir {
                Direction::Backward => bounds.es(far),
                Direction::Forward => bounds.lf(far),
            };
            self.visit(far, initial);

            if permanent {
                self.queue.push_front((e, depth));
            } else {
                graph.edge_mut(e).marked = true;
                self.removed += 1;
                self.queue.push_back((e, depth));
            }
        }
    }

    /// One breadth-first step; `false` once the queue is empty.
    fn step(&mut self, graph: &mut PrecedenceGraph, bounds: &TimeBounds, dir: Direction) -> bool {
        loop {
            let Some((e, depth)) = self.queue.pop_front() else {
                return false;
            };
            let (seen, marked, target) = {
                let edge = graph.edge(e);
                (edge.seen, edge.marked, edge.target)
            };
            if depth >= self.max_depth || seen {
                if marked {
                    self.pruned.push(e);
                }
                continue;
            }

            graph.edge_mut(e).seen = true;
            self.seen_edges.push(e);

            let (near, far) = match dir {
                Direction::Backward => (target, e.source),
                Direction::Forward => (e.source, target),
            };
            if marked {
                graph.edge_mut(e).marked = false;
                self.removed -= 1;
                self.update(graph, bounds, dir, near);
            }
            if !self.expanded[far] {
                self.expanded[far] = true;
                self.expand(graph, bounds, dir, far, depth + 1);
            }
            self.update(graph, bounds, dir, far);
            return true;
        }
    }

    /// Recompute the search-local bound of `start` and of every visited
    /// vertex downstream of it.
    fn update(&mut self, graph: &PrecedenceGraph, bounds: &TimeBounds, dir: Direction, start: JobId) {
        self.updates.clear();
        self.updates.push_back(start);
        while let Some(v) = self.updates.pop_front() {
            let value = match dir {
                Direction::Backward => graph
                    .predecessors(v)
                    .iter()
                    .filter_map(|rev| {
                        let edge = &graph.successors(rev.source)[rev.forward_index];
                        (!edge.marked).then(|| self.value_of(bounds, dir, rev.source) + edge.lag)
                    })
                    .fold(bounds.base_earliest_start()[v], Time::max),
                Direction::Forward => graph
                    .successors(v)
                    .iter()
                    .filter(|edge| !edge.marked)
                    .map(|edge| {
                        let t = edge.target;
                        self.value_of(bounds, dir, t) - bounds.duration(t) - edge.lag
                            + bounds.duration(v)
                    })
                    .fold(bounds.base_latest_finish()[v], Time::min),
            };
            if value == self.current[v] {
                continue;
            }
            self.current[v] = value;
            match dir {
                Direction::Backward => {
                    for edge in graph.successors(v) {
                        if self.visited[edge.target] {
                            self.updates.push_back(edge.target);
                        }
                    }
                }
                Direction::Forward => {
                    for rev in graph.predecessors(v) {
                        if self.visited[rev.source] {
                            self.updates.push_back(rev.source);
                        }
                    }
                }
            }
        }
    }

    fn value_of(&self, bounds: &TimeBounds, dir: Direction, job: JobId) -> Time {
        match (self.visited[job], dir) {
            (true, _) => self.current[job],
            (false, Direction::Backward) => bounds.es(job),
            (false, Direction::Forward) => bounds.lf(job),
        }
    }

    /// Marked edges among the pruned and still queued ones.
    fn marked_edges(&self, graph: &PrecedenceGraph) -> Vec<EdgeRef> {
        self.pruned
            .iter()
            .copied()
            .chain(self.queue.iter().map(|&(e, _)| e))
            .filter(|&e| graph.edge(e).marked)
            .collect()
    }

    fn finish(&mut self, graph: &mut PrecedenceGraph) {
        for &e in &self.pruned {
            graph.edge_mut(e).marked = false;
        }
        for &(e, _) in &self.queue {
            graph.edge_mut(e).marked = false;
        }
        for &e in &self.seen_edges {
            graph.edge_mut(e).seen = false;
        }
        self.queue.clear();
        self.pruned.clear();
        self.seen_edges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::tests::single_resource_problem;
    use crate::problem::Problem;

    /// Insert `edges` as search edges and fully propagate.
    fn setup(problem: &Problem, edges: &[(JobId, JobId)]) -> (PrecedenceGraph, TimeBounds) {
        let mut graph = PrecedenceGraph::from_problem(problem);
        let mut bounds = TimeBounds::new(problem);
        let all = crate::skyline::TimeRange::new(Time::MIN, Time::MAX);
        for &(s, t) in edges {
            graph.insert_edge(s, t, bounds.duration(s), false);
            let mut changed = Vec::new();
            bounds.push_earliest_forward(&graph, &[s], true, false, all, &mut changed);
            bounds.push_latest_backward(&graph, &[t], true, false, all);
        }
        (graph, bounds)
    }

    fn assert_clean(graph: &PrecedenceGraph) {
        assert!(graph.edges().all(|(_, e)| !e.marked && !e.seen));
    }

    fn edge_pairs(graph: &PrecedenceGraph, plan: &DeletionPlan) -> Vec<(JobId, JobId)> {
        let mut v: Vec<_> = plan
            .edges
            .iter()
            .map(|&e| (e.source, graph.edge(e).target))
            .collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_backward_deletes_direct_edge() {
        let p = single_resource_problem(&[(3, 0, 30, 1.0), (2, 0, 30, 1.0)], &[]);
        let (mut g, b) = setup(&p, &[(0, 1)]);
        let mut search = DeletionSearch::new(2, 6, 3);
        let plan = search.backward(&mut g, &b, 1, 3);
        assert_eq!(edge_pairs(&g, &plan), vec![(0, 1)]);
        assert_eq!(plan.achieved, 3);
        assert_clean(&g);
    }

    #[test]
    fn test_backward_noop_at_base() {
        let p = single_resource_problem(&[(3, 0, 30, 1.0), (2, 0, 30, 1.0)], &[]);
        let (mut g, b) = setup(&p, &[]);
        let mut search = DeletionSearch::new(2, 6, 3);
        assert_eq!(search.backward(&mut g, &b, 1, 2), DeletionPlan::default());
        let (mut g, b) = setup(&p, &[(0, 1)]);
        assert_eq!(search.backward(&mut g, &b, 1, 0), DeletionPlan::default());
    }

    #[test]
    fn test_backward_routes_around_permanent_edge() {
        // 0 -> 1 is search-made, 1 -> 2 is permanent
        let p = single_resource_problem(&[(2, 0, 30, 1.0), (2, 0, 30, 1.0), (2, 0, 30, 1.0)], &[(
            1, 2,
        )]);
        let (mut g, b) = setup(&p, &[(0, 1)]);
        assert_eq!(b.es(2), 4);
        let mut search = DeletionSearch::new(3, 6, 3);
        let plan = search.backward(&mut g, &b, 2, 2);
        assert_eq!(edge_pairs(&g, &plan), vec![(0, 1)]);
        assert_eq!(plan.achieved, 2);
        assert_clean(&g);
    }

    #[test]
    fn test_backward_prefers_deeper_single_edge() {
        // diamond 0 -> {1, 2} -> 3 delayed through the single edge 4 -> 0
        let p = single_resource_problem(
            &[
                (2, 0, 40, 1.0),
                (1, 0, 40, 1.0),
                (1, 0, 40, 1.0),
                (1, 0, 40, 1.0),
                (5, 0, 40, 1.0),
            ],
            &[],
        );
        let (mut g, b) = setup(&p, &[(4, 0), (0, 1), (0, 2), (1, 3), (2, 3)]);
        assert_eq!(b.es(3), 8);
        let mut search = DeletionSearch::new(5, 6, 3);
        // Shortfall-free options: cut both 1 -> 3 and 2 -> 3 (two edges), or
        // cut 4 -> 0 alone, which moves job 3 back by exactly 5.
        let plan = search.backward(&mut g, &b, 3, 5);
        assert_eq!(edge_pairs(&g, &plan), vec![(4, 0)]);
        assert_eq!(plan.achieved, 5);
        assert_clean(&g);
    }

    #[test]
    fn test_forward_requires_full_amount() {
        let p = single_resource_problem(&[(3, 0, 20, 1.0), (3, 0, 20, 1.0), (3, 0, 20, 1.0)], &[(
            1, 2,
        )]);
        let (mut g, b) = setup(&p, &[(0, 1)]);
        assert_eq!(b.lf(0), 14);
        let mut search = DeletionSearch::new(3, 6, 3);

        let plan = search.forward(&mut g, &b, 0, 6).unwrap();
        assert_eq!(edge_pairs(&g, &plan), vec![(0, 1)]);
        assert_eq!(plan.achieved, 6);
        assert_clean(&g);

        assert!(search.forward(&mut g, &b, 0, 7).is_none());
        assert_clean(&g);
        assert_eq!(search.forward(&mut g, &b, 0, 0), Some(DeletionPlan::default()));
    }

    #[test]
    fn test_forward_none_at_base() {
        let p = single_resource_problem(&[(3, 0, 20, 1.0), (3, 0, 20, 1.0)], &[]);
        let (mut g, b) = setup(&p, &[]);
        let mut search = DeletionSearch::new(2, 6, 3);
        assert!(search.forward(&mut g, &b, 0, 1).is_none());
    }

    #[test]
    fn test_depth_bound_keeps_marks() {
        let p = single_resource_problem(&[(1, 0, 40, 1.0); 5], &[]);
        let chain = [(0, 1), (1, 2), (2, 3), (3, 4)];
        let (mut g, b) = setup(&p, &chain);
        let mut search = DeletionSearch::new(5, 0, 3);
        let plan = search.backward(&mut g, &b, 4, 4);
        // depth 0 cannot expand, only the edge at the root is cut
        assert_eq!(edge_pairs(&g, &plan), vec![(3, 4)]);
        assert_eq!(plan.achieved, 4);
        assert_clean(&g);
    }
}
