// traversal.rs — Data-flow cycles and tensor/operation coloring
//
// Two derived graphs over the Tensor and Operation nodes of a `LoomGraph`:
//
//   - the data-flow digraph (Tensor → Operation for inputs, Operation →
//     Tensor for outputs), searched for simple cycles with Tarjan's
//     backtracking enumeration;
//   - the undirected coloring graph (operation–tensor edges, operation–
//     neighbour-operation edges, and a clique over each operation's tensors),
//     colored greedily.
//
// Vertices are indexed operations first, then tensors, each in id order, so
// results are deterministic and every reported cycle starts at an operation.
//
// Preconditions: none. Selections naming missing or non-tensor nodes are
//                ignored; reference checks report them.
// Postconditions: adjacent coloring-graph vertices never share a color.
// Failure modes: none.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::graph::LoomGraph;
use crate::node::{LoomNode, OperationBody, TensorNode};

// ── Indexed vertex set ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct VertexIndex {
    ids: Vec<Uuid>,
    pos: HashMap<Uuid, usize>,
}

impl VertexIndex {
    fn insert(&mut self, id: Uuid) -> usize {
        if let Some(&i) = self.pos.get(&id) {
            return i;
        }
        let i = self.ids.len();
        self.ids.push(id);
        self.pos.insert(id, i);
        i
    }

    fn get(&self, id: Uuid) -> Option<usize> {
        self.pos.get(&id).copied()
    }
}

/// Operations with parsed bodies, in id order.
fn parsed_operations(graph: &LoomGraph) -> Vec<(Uuid, OperationBody)> {
    graph
        .operations()
        .filter_map(|op| op.body().ok().map(|b| (op.id(), b)))
        .collect()
}

/// Tensor ids referenced by `ids`, dropping anything that is not a tensor.
fn tensor_refs<'a>(
    graph: &'a LoomGraph,
    selections: impl Iterator<Item = Uuid> + 'a,
) -> impl Iterator<Item = Uuid> + 'a {
    selections.filter(move |id| graph.node(*id).is_some_and(|n| TensorNode::wrap(n).is_ok()))
}

// ── Data-flow graph ────────────────────────────────────────────────────────

/// Directed tensor/operation data-flow graph.
#[derive(Debug, Default)]
pub struct DataFlowGraph {
    vertices: VertexIndex,
    successors: Vec<BTreeSet<usize>>,
}

impl DataFlowGraph {
    pub fn build(graph: &LoomGraph) -> Self {
        let ops = parsed_operations(graph);
        let mut g = DataFlowGraph::default();
        for (id, _) in &ops {
            g.add_vertex(*id);
        }
        for tensor in graph.tensors() {
            g.add_vertex(tensor.id());
        }
        for (op_id, body) in &ops {
            let op = g.add_vertex(*op_id);
            let inputs = body.inputs.values().flatten().map(|s| s.tensor_id);
            for t in tensor_refs(graph, inputs) {
                let t = g.add_vertex(t);
                g.successors[t].insert(op);
            }
            let outputs = body.outputs.values().flatten().map(|s| s.tensor_id);
            for t in tensor_refs(graph, outputs) {
                let t = g.add_vertex(t);
                g.successors[op].insert(t);
            }
        }
        g
    }

    fn add_vertex(&mut self, id: Uuid) -> usize {
        let i = self.vertices.insert(id);
        if i == self.successors.len() {
            self.successors.push(BTreeSet::new());
        }
        i
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.ids.len()
    }

    pub fn edge_count(&self) -> usize {
        self.successors.iter().map(BTreeSet::len).sum()
    }

    pub fn has_edge(&self, from: Uuid, to: Uuid) -> bool {
        match (self.vertices.get(from), self.vertices.get(to)) {
            (Some(a), Some(b)) => self.successors[a].contains(&b),
            _ => false,
        }
    }

    /// Every elementary cycle, each listed from its lowest-indexed vertex.
    pub fn simple_cycles(&self) -> Vec<Vec<Uuid>> {
        let mut search = CycleSearch {
            graph: self,
            point_stack: Vec::new(),
            marked: vec![false; self.vertex_count()],
            marked_stack: Vec::new(),
            cycles: Vec::new(),
        };
        for start in 0..self.vertex_count() {
            search.backtrack(start, start);
            while let Some(v) = search.marked_stack.pop() {
                search.marked[v] = false;
            }
        }
        search
            .cycles
            .into_iter()
            .map(|cycle| cycle.into_iter().map(|i| self.vertices.ids[i]).collect())
            .collect()
    }
}

/// Tarjan's simple-cycle enumeration state.
struct CycleSearch<'a> {
    graph: &'a DataFlowGraph,
    point_stack: Vec<usize>,
    marked: Vec<bool>,
    marked_stack: Vec<usize>,
    cycles: Vec<Vec<usize>>,
}

impl CycleSearch<'_> {
    fn backtrack(&mut self, start: usize, v: usize) -> bool {
        let mut found = false;
        self.point_stack.push(v);
        self.marked[v] = true;
        self.marked_stack.push(v);

        let graph = self.graph;
        for &w in &graph.successors[v] {
            if w < start {
                continue;
            }
            if w == start {
                found = true;
                self.cycles.push(self.point_stack.clone());
            } else if !self.marked[w] {
                found |= self.backtrack(start, w);
            }
        }

        if found {
            while let Some(u) = self.marked_stack.pop() {
                self.marked[u] = false;
                if u == v {
                    break;
                }
            }
        }
        self.point_stack.pop();
        found
    }
}

/// Cycles of more than one node in the tensor/operation data flow.
pub fn find_operation_simple_cycles(graph: &LoomGraph) -> Vec<Vec<&LoomNode>> {
    DataFlowGraph::build(graph)
        .simple_cycles()
        .into_iter()
        .filter(|cycle| cycle.len() > 1)
        .map(|cycle| cycle.into_iter().filter_map(|id| graph.node(id)).collect())
        .collect()
}

// ── Coloring ───────────────────────────────────────────────────────────────

/// Undirected adjacency of operations and the tensors they touch.
#[derive(Debug, Default)]
pub struct ColoringGraph {
    vertices: VertexIndex,
    neighbours: Vec<BTreeSet<usize>>,
}

impl ColoringGraph {
    pub fn build(graph: &LoomGraph) -> Self {
        let ops = parsed_operations(graph);
        let mut sources: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut consumers: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (op_id, body) in &ops {
            for s in body.inputs.values().flatten() {
                consumers.entry(s.tensor_id).or_default().push(*op_id);
            }
            for s in body.outputs.values().flatten() {
                sources.entry(s.tensor_id).or_default().push(*op_id);
            }
        }

        let mut g = ColoringGraph::default();
        for (op_id, body) in &ops {
            g.add_vertex(*op_id);
            let mut tensors = Vec::new();

            let inputs = body.inputs.values().flatten().map(|s| s.tensor_id);
            for t in tensor_refs(graph, inputs) {
                tensors.push(t);
                g.add_edge(*op_id, t);
                for &src in sources.get(&t).into_iter().flatten() {
                    g.add_edge(*op_id, src);
                }
            }
            let outputs = body.outputs.values().flatten().map(|s| s.tensor_id);
            for t in tensor_refs(graph, outputs) {
                tensors.push(t);
                g.add_edge(*op_id, t);
                for &dst in consumers.get(&t).into_iter().flatten() {
                    g.add_edge(*op_id, dst);
                }
            }

            for (i, &a) in tensors.iter().enumerate() {
                for &b in &tensors[..i] {
                    g.add_edge(a, b);
                }
            }
        }
        g
    }

    fn add_vertex(&mut self, id: Uuid) -> usize {
        let i = self.vertices.insert(id);
        if i == self.neighbours.len() {
            self.neighbours.push(BTreeSet::new());
        }
        i
    }

    /// Self loops are dropped.
    fn add_edge(&mut self, a: Uuid, b: Uuid) {
        let a = self.add_vertex(a);
        let b = self.add_vertex(b);
        if a != b {
            self.neighbours[a].insert(b);
            self.neighbours[b].insert(a);
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.ids.len()
    }

    pub fn are_adjacent(&self, a: Uuid, b: Uuid) -> bool {
        match (self.vertices.get(a), self.vertices.get(b)) {
            (Some(a), Some(b)) => self.neighbours[a].contains(&b),
            _ => false,
        }
    }

    /// Greedy coloring in vertex insertion order: each vertex takes the
    /// smallest color unused by its already-colored neighbours.
    pub fn greedy_coloring(&self) -> Coloring {
        let mut assigned: Vec<Option<usize>> = vec![None; self.vertex_count()];
        let mut number_of_colors = 0;
        for v in 0..self.vertex_count() {
            let used: BTreeSet<usize> = self.neighbours[v]
                .iter()
                .filter_map(|&n| assigned[n])
                .collect();
            let color = (0..).find(|c| !used.contains(c)).unwrap_or_default();
            assigned[v] = Some(color);
            number_of_colors = number_of_colors.max(color + 1);
        }
        let colors = self
            .vertices
            .ids
            .iter()
            .zip(assigned)
            .filter_map(|(id, c)| c.map(|c| (*id, c)))
            .collect();
        Coloring {
            colors,
            number_of_colors,
        }
    }
}

/// A vertex coloring: node id → color index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Coloring {
    pub colors: BTreeMap<Uuid, usize>,
    pub number_of_colors: usize,
}

impl Coloring {
    pub fn color(&self, id: Uuid) -> Option<usize> {
        self.colors.get(&id).copied()
    }

    /// Node ids grouped by color.
    pub fn color_classes(&self) -> Vec<Vec<Uuid>> {
        let mut classes = vec![Vec::new(); self.number_of_colors];
        for (id, &c) in &self.colors {
            classes[c].push(*id);
        }
        classes
    }
}

pub fn tensor_operation_coloring(graph: &LoomGraph) -> Coloring {
    ColoringGraph::build(graph).greedy_coloring()
}

// ── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{OPERATION_TYPE, TENSOR_TYPE};
    use serde_json::{json, Value};

    fn tensor(g: &mut LoomGraph, label: &str) -> Uuid {
        g.create_node(
            TENSOR_TYPE,
            Some(label),
            json!({"dtype": "int32", "range": {"start": [0], "end": [4]}}),
        )
        .unwrap()
    }

    fn sel(t: Uuid) -> Value {
        json!({"tensorId": t, "range": {"start": [0], "end": [4]}})
    }

    fn op(g: &mut LoomGraph, label: &str, inputs: &[Uuid], outputs: &[Uuid]) -> Uuid {
        let inputs: Vec<Value> = inputs.iter().map(|&t| sel(t)).collect();
        let outputs: Vec<Value> = outputs.iter().map(|&t| sel(t)).collect();
        g.create_node(
            OPERATION_TYPE,
            Some(label),
            json!({"kernel": label, "inputs": {"x": inputs}, "outputs": {"y": outputs}}),
        )
        .unwrap()
    }

    #[test]
    fn chain_has_no_cycles() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let b = tensor(&mut g, "B");
        let c = tensor(&mut g, "C");
        let f = op(&mut g, "f", &[a], &[b]);
        op(&mut g, "g", &[b], &[c]);

        let flow = DataFlowGraph::build(&g);
        assert_eq!(flow.vertex_count(), 5);
        assert_eq!(flow.edge_count(), 4);
        assert!(flow.has_edge(a, f));
        assert!(flow.has_edge(f, b));
        assert!(!flow.has_edge(b, f));
        assert!(find_operation_simple_cycles(&g).is_empty());
    }

    #[test]
    fn read_write_cycle_starts_at_operation() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let add = op(&mut g, "Add", &[a], &[a]);
        let cycles = find_operation_simple_cycles(&g);
        assert_eq!(cycles.len(), 1);
        let ids: Vec<Uuid> = cycles[0].iter().map(|n| n.id()).collect();
        assert_eq!(ids, [add, a]);
    }

    #[test]
    fn two_operation_loop_and_shared_tensor() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let b = tensor(&mut g, "B");
        op(&mut g, "f", &[a], &[b]);
        op(&mut g, "g", &[b], &[a]);
        let cycles = find_operation_simple_cycles(&g);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].len(), 4);
        assert_eq!(cycles[0][0].node_type(), OPERATION_TYPE);
    }

    #[test]
    fn overlapping_cycles_are_enumerated() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let b = tensor(&mut g, "B");
        // f: A -> A, B ; g: B -> A
        op(&mut g, "f", &[a], &[a, b]);
        op(&mut g, "g", &[b], &[a]);
        let mut lengths: Vec<usize> = find_operation_simple_cycles(&g).iter().map(Vec::len).collect();
        lengths.sort_unstable();
        assert_eq!(lengths, [2, 4]);
    }

    #[test]
    fn dangling_references_are_ignored() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        op(&mut g, "f", &[a], &[Uuid::new_v4()]);
        let flow = DataFlowGraph::build(&g);
        assert_eq!(flow.vertex_count(), 2);
        assert!(find_operation_simple_cycles(&g).is_empty());
    }

    #[test]
    fn coloring_separates_neighbours() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let b = tensor(&mut g, "B");
        let c = tensor(&mut g, "C");
        let f = op(&mut g, "f", &[a], &[b]);
        let h = op(&mut g, "h", &[b], &[c]);

        let cg = ColoringGraph::build(&g);
        assert!(cg.are_adjacent(f, h));
        assert!(cg.are_adjacent(a, b));
        assert!(!cg.are_adjacent(a, c));

        let coloring = cg.greedy_coloring();
        assert_eq!(coloring.colors.len(), 5);
        for (x, y) in [(f, a), (f, b), (a, b), (h, b), (h, c), (b, c), (f, h)] {
            assert_ne!(coloring.color(x), coloring.color(y));
        }
        let classes = coloring.color_classes();
        assert_eq!(classes.len(), coloring.number_of_colors);
        assert_eq!(classes.iter().map(Vec::len).sum::<usize>(), 5);
    }

    #[test]
    fn self_consuming_operation_has_no_self_loop() {
        let mut g = LoomGraph::new();
        let a = tensor(&mut g, "A");
        let f = op(&mut g, "f", &[a], &[a]);
        let coloring = tensor_operation_coloring(&g);
        assert_eq!(coloring.number_of_colors, 2);
        assert_ne!(coloring.color(f), coloring.color(a));
    }
}
