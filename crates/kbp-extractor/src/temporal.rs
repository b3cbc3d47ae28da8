//! Temporal Alignment
//!
//! When a sentence holds several temporal expressions, binds each labeled
//! instance to the expression with the shortest valid dependency path to
//! the slot candidate. Falls back to the leftmost expression when the
//! sentence has no parse or no path qualifies.

use std::collections::VecDeque;

use kbp_core::{DependencyEdge, DependencyGraph, Sentence, Span, TemporalConfig, TemporalExpression, Token};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::LabeledInstance;

// ============================================================================
// Distance Matrix
// ============================================================================

/// All-pairs dependency distances for one sentence
///
/// A distance is the node count of the shortest undirected path; `None`
/// means no path, or a path rejected by the filter.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    n: usize,
    dist: Vec<Option<usize>>,
}

impl DistanceMatrix {
    pub fn compute(
        sentence: &Sentence,
        graph: &DependencyGraph,
        filter_paths: bool,
        attach_to_governor_verb: bool,
    ) -> Self {
        let n = sentence.len();
        let mut dist = vec![None; n * n];
        for i in 0..n {
            dist[i * n + i] = Some(0);
        }

        let mut ug: UnGraph<usize, usize> = UnGraph::with_capacity(n, graph.edges.len());
        let nodes: Vec<NodeIndex> = (0..n).map(|i| ug.add_node(i)).collect();
        for (idx, edge) in graph.edges.iter().enumerate() {
            if edge.governor >= n || edge.dependent >= n || edge.governor == edge.dependent {
                tracing::debug!(?edge, tokens = n, "Ignoring dependency edge outside the sentence");
                continue;
            }
            ug.add_edge(nodes[edge.governor], nodes[edge.dependent], idx);
        }

        for src in 0..n {
            if ug.edges(nodes[src]).next().is_none() {
                continue;
            }
            let predecessors = bfs(&ug, nodes[src], n);
            for dst in (src + 1)..n {
                let Some(path) = edge_path(&predecessors, src, dst, &graph.edges) else {
                    continue;
                };
                let accepted = !filter_paths
                    || valid_path(&path, src, dst, &sentence.tokens, attach_to_governor_verb)
                    || {
                        let reversed: Vec<&DependencyEdge> = path.iter().rev().copied().collect();
                        valid_path(&reversed, dst, src, &sentence.tokens, attach_to_governor_verb)
                    };
                if accepted {
                    let nodes_on_path = path.len() + 1;
                    dist[src * n + dst] = Some(nodes_on_path);
                    dist[dst * n + src] = Some(nodes_on_path);
                }
            }
        }

        Self { n, dist }
    }

    pub fn get(&self, a: usize, b: usize) -> Option<usize> {
        if a >= self.n || b >= self.n {
            return None;
        }
        self.dist[a * self.n + b]
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// Predecessor (node, edge weight) per node on a BFS tree rooted at `src`
fn bfs(graph: &UnGraph<usize, usize>, src: NodeIndex, n: usize) -> Vec<Option<(usize, usize)>> {
    let mut pred: Vec<Option<(usize, usize)>> = vec![None; n];
    let mut seen = vec![false; n];
    let mut queue = VecDeque::new();
    seen[src.index()] = true;
    queue.push_back(src);

    while let Some(node) = queue.pop_front() {
        for e in graph.edges(node) {
            let next = if e.source() == node { e.target() } else { e.source() };
            if !seen[next.index()] {
                seen[next.index()] = true;
                pred[next.index()] = Some((node.index(), *e.weight()));
                queue.push_back(next);
            }
        }
    }
    pred
}

/// Edges along the BFS path from `src` to `dst`, in walking order
fn edge_path<'e>(
    pred: &[Option<(usize, usize)>],
    src: usize,
    dst: usize,
    edges: &'e [DependencyEdge],
) -> Option<Vec<&'e DependencyEdge>> {
    let mut path = Vec::new();
    let mut node = dst;
    while node != src {
        let (prev, edge) = pred[node]?;
        path.push(&edges[edge]);
        node = prev;
    }
    path.reverse();
    Some(path)
}

fn valid_path(
    path: &[&DependencyEdge],
    src: usize,
    dst: usize,
    tokens: &[Token],
    attach_to_governor_verb: bool,
) -> bool {
    if path.is_empty() {
        return false;
    }
    is_governor(path, src, dst)
        || (attach_to_governor_verb && is_attached_to_governor_verb(path, src, dst, tokens))
}

/// True if walking governor -> dependent from `src` reaches `dst`
fn is_governor(path: &[&DependencyEdge], mut src: usize, dst: usize) -> bool {
    for edge in path {
        if edge.governor != src {
            return false;
        }
        if edge.dependent == dst {
            return true;
        }
        src = edge.dependent;
    }
    false
}

/// `src` hangs off a verb that governs `dst` with no other verb in between
fn is_attached_to_governor_verb(path: &[&DependencyEdge], src: usize, dst: usize, tokens: &[Token]) -> bool {
    if path.len() < 2 || path[0].dependent != src {
        return false;
    }
    let top = path[0].governor;
    let rest = &path[1..];
    tokens[top].pos.starts_with("VB")
        && is_governor(rest, top, dst)
        && !dependents_have_tag("VB", rest, dst, tokens)
}

fn dependents_have_tag(tag: &str, path: &[&DependencyEdge], dst: usize, tokens: &[Token]) -> bool {
    for edge in path {
        if edge.dependent == dst {
            break;
        }
        if tokens[edge.dependent].pos.starts_with(tag) {
            return true;
        }
    }
    false
}

// ============================================================================
// Aligner
// ============================================================================

/// Picks the temporal expression for each instance of a sentence
#[derive(Debug, Clone)]
pub struct TemporalAligner {
    filter_paths: bool,
    attach_to_governor_verb: bool,
}

impl Default for TemporalAligner {
    fn default() -> Self {
        Self::from_config(&TemporalConfig::default())
    }
}

impl TemporalAligner {
    pub fn from_config(config: &TemporalConfig) -> Self {
        Self {
            filter_paths: config.filter_dependency_paths,
            attach_to_governor_verb: config.attach_to_governor_verb,
        }
    }

    /// Non-empty expressions in textual order
    pub fn candidates(sentence: &Sentence) -> Vec<&TemporalExpression> {
        let mut temporals: Vec<&TemporalExpression> = sentence
            .temporals
            .iter()
            .filter(|t| {
                if t.is_empty() {
                    tracing::debug!(spans = ?t.spans, "Dropping empty temporal expression");
                }
                !t.is_empty()
            })
            .collect();
        temporals.sort_by_key(|t| (t.leftmost(), t.rightmost()));
        temporals
    }

    /// Expression closest to the slot span, leftmost on fallback
    pub fn choose<'s>(
        &self,
        temporals: &[&'s TemporalExpression],
        slot_span: Span,
        matrix: Option<&DistanceMatrix>,
    ) -> Option<&'s TemporalExpression> {
        let first = *temporals.first()?;
        let Some(matrix) = matrix else {
            return Some(first);
        };

        let mut best: Option<(&'s TemporalExpression, usize)> = None;
        for &t in temporals {
            if let Some(d) = dependency_distance(slot_span, t, matrix) {
                if best.map_or(true, |(_, b)| d < b) {
                    best = Some((t, d));
                }
            }
        }

        match best {
            Some((t, _)) => {
                if !std::ptr::eq(t, first) {
                    tracing::debug!(chosen = %t.fields, leftmost = %first.fields, "Dependency picked a non-leftmost temporal");
                }
                Some(t)
            }
            None => Some(first),
        }
    }

    /// Bind temporal sub-fields onto every instance of one sentence
    pub fn align(&self, sentence: &Sentence, instances: &mut [LabeledInstance]) {
        if instances.is_empty() {
            return;
        }
        let temporals = Self::candidates(sentence);
        if temporals.is_empty() {
            return;
        }
        if temporals.len() > 1 {
            tracing::debug!(count = temporals.len(), "Temporal ambiguity");
        }

        let matrix = match &sentence.dependencies {
            Some(graph) => Some(DistanceMatrix::compute(
                sentence,
                graph,
                self.filter_paths,
                self.attach_to_governor_verb,
            )),
            None => {
                tracing::warn!("Sentence without dependency graph, using leftmost temporal");
                None
            }
        };

        for instance in instances.iter_mut() {
            if let Some(chosen) = self.choose(&temporals, instance.candidate.span, matrix.as_ref()) {
                instance.temporal = Some(chosen.fields.clone());
            }
        }
    }
}

/// Shortest distance from any expression token outside the slot to any slot token
fn dependency_distance(slot: Span, temporal: &TemporalExpression, matrix: &DistanceMatrix) -> Option<usize> {
    temporal
        .spans
        .iter()
        .flat_map(|span| span.indices())
        .filter(|src| !slot.contains_index(*src))
        .flat_map(|src| slot.indices().filter_map(move |dst| matrix.get(src, dst)))
        .min()
}
