//! Reference graph over a captured object set.
//!
//! Nodes are the captured objects, edges the references between them. Cycle
//! membership comes from strongly connected components, computed without
//! recursion so deep object chains cannot overflow the stack.

use crate::GCResult;
use crate::object::ObjectId;
use crate::runtime::ObjectInspector;
use crate::table::{pp, truncate};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};

/// Longest representation kept per object.
pub const REPR_CLIP: usize = 128;
const LABEL_CLIP: usize = 32;
const UNVISITED: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub id: ObjectId,
    pub size: usize,
    pub type_name: String,
    pub repr: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub from: ObjectId,
    pub to: ObjectId,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct ObjectGraph {
    objects: Vec<ObjectId>,
    edges: Vec<Edge>,
    cycle_members: HashSet<ObjectId>,
    metadata: Vec<ObjectMetadata>,
    total_size: usize,
    reduced: bool,
}

impl ObjectGraph {
    /// Builds the graph over `objects`. With `reduce`, only objects that sit
    /// on a reference cycle are kept.
    pub fn build<I: ObjectInspector + ?Sized>(
        inspector: &I,
        objects: &[ObjectId],
        reduce: bool,
    ) -> Self {
        let mut seen = HashSet::new();
        let mut nodes: Vec<ObjectId> = objects
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        let mut edges: Vec<Edge> = nodes
            .iter()
            .flat_map(|from| {
                inspector
                    .referents(*from)
                    .into_iter()
                    .filter(|r| seen.contains(&r.target))
                    .map(|r| Edge {
                        from: *from,
                        to: r.target,
                        label: r.label,
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let cycle_members = cycle_members(&nodes, &edges);

        if reduce {
            let before = nodes.len();
            nodes.retain(|id| cycle_members.contains(id));
            edges.retain(|e| cycle_members.contains(&e.from) && cycle_members.contains(&e.to));
            debug!("reduced graph from {before} to {} objects", nodes.len());
        }

        let metadata = annotate(inspector, &nodes);
        let total_size = metadata.iter().map(|m| m.size).sum();

        Self {
            objects: nodes,
            edges,
            cycle_members,
            metadata,
            total_size,
            reduced: reduce,
        }
    }

    pub fn objects(&self) -> &[ObjectId] {
        &self.objects
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn metadata(&self) -> &[ObjectMetadata] {
        &self.metadata
    }

    pub fn count(&self) -> usize {
        self.metadata.len()
    }

    pub fn count_in_cycles(&self) -> usize {
        self.cycle_members.len()
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn is_reduced(&self) -> bool {
        self.reduced
    }

    pub fn in_cycle(&self, obj_id: ObjectId) -> bool {
        self.cycle_members.contains(&obj_id)
    }

    /// Each reference cycle in the graph, one strongly connected component
    /// per entry.
    pub fn find_cycles(&self) -> Vec<Vec<ObjectId>> {
        let index: HashMap<ObjectId, usize> = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i))
            .collect();
        let adjacency = adjacency(&index, &self.edges);

        strongly_connected(&adjacency)
            .into_iter()
            .filter(|component| is_cycle(component, &adjacency))
            .map(|component| {
                let mut ids: Vec<ObjectId> = component.iter().map(|&i| self.objects[i]).collect();
                ids.sort();
                ids
            })
            .collect()
    }

    pub fn write_dot<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "digraph G {{")?;
        writeln!(out, "    node [shape=box];")?;
        for md in &self.metadata {
            let label = format!(
                "{}\\n{}\\n{}",
                escape(&md.type_name),
                pp(md.size).trim(),
                escape(&truncate(&md.repr, LABEL_CLIP))
            );
            let highlight = if !self.reduced && self.in_cycle(md.id) {
                ", color=red"
            } else {
                ""
            };
            writeln!(out, "    X{} [label=\"{label}\"{highlight}];", md.id)?;
        }
        for edge in &self.edges {
            writeln!(
                out,
                "    X{} -> X{} [label=\"{}\"];",
                edge.from,
                edge.to,
                escape(&truncate(&edge.label, LABEL_CLIP))
            )?;
        }
        writeln!(out, "}}")
    }

    /// Writes the graph to `path`. A `.dot` path receives the DOT source;
    /// any other extension is handed to Graphviz's `dot` as the output
    /// format. Returns `Ok(false)` when `dot` is missing or fails.
    pub fn render(&self, path: &Path) -> GCResult<bool> {
        let format = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("ps")
            .to_ascii_lowercase();

        if format == "dot" || format == "gv" {
            let mut file = BufWriter::new(File::create(path)?);
            self.write_dot(&mut file)?;
            file.flush()?;
            return Ok(true);
        }

        let child = Command::new("dot")
            .arg(format!("-T{format}"))
            .arg("-o")
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match child {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!("graphviz 'dot' not found, cannot render {}", path.display());
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        };

        if let Some(mut stdin) = child.stdin.take() {
            self.write_dot(&mut stdin)?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            warn!(
                "dot failed to render {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.status.success())
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Sizes every node. A node is charged for itself plus whatever it reaches
/// that is neither another node nor already charged to an earlier node.
fn annotate<I: ObjectInspector + ?Sized>(inspector: &I, nodes: &[ObjectId]) -> Vec<ObjectMetadata> {
    let mut seen: HashSet<ObjectId> = nodes.iter().copied().collect();

    nodes
        .iter()
        .map(|&id| {
            let mut size = inspector.flat_size(id);
            let mut pending: Vec<ObjectId> = inspector.referents(id).into_iter().map(|r| r.target).collect();
            while let Some(current) = pending.pop() {
                if !seen.insert(current) {
                    continue;
                }
                size += inspector.flat_size(current);
                pending.extend(inspector.referents(current).into_iter().map(|r| r.target));
            }

            ObjectMetadata {
                id,
                size,
                type_name: inspector.type_name(id),
                repr: truncate(&inspector.repr(id), REPR_CLIP),
            }
        })
        .collect()
}

fn adjacency(index: &HashMap<ObjectId, usize>, edges: &[Edge]) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); index.len()];
    for edge in edges {
        if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
            adjacency[from].push(to);
        }
    }
    adjacency
}

fn is_cycle(component: &[usize], adjacency: &[Vec<usize>]) -> bool {
    match component {
        [single] => adjacency[*single].contains(single),
        _ => true,
    }
}

fn cycle_members(nodes: &[ObjectId], edges: &[Edge]) -> HashSet<ObjectId> {
    let index: HashMap<ObjectId, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let adjacency = adjacency(&index, edges);

    strongly_connected(&adjacency)
        .into_iter()
        .filter(|component| is_cycle(component, &adjacency))
        .flatten()
        .map(|i| nodes[i])
        .collect()
}

/// Tarjan's algorithm with an explicit call stack.
fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let n = adjacency.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = counter;
        lowlink[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut call_stack: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = call_stack.last_mut() {
            let (node, child) = *frame;
            if child < adjacency[node].len() {
                frame.1 += 1;
                let next = adjacency[node][child];
                if index[next] == UNVISITED {
                    index[next] = counter;
                    lowlink[next] = counter;
                    counter += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    call_stack.push((next, 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }

    components
}
