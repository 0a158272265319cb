//! Task-graph model: tasks with a FLOP budget, typed edges carrying a byte
//! payload, ready-set extraction, and the DOT subset reader.
//!
//! Edge names follow the `"src->dst"` convention; the distinguished sink name
//! [`SINK_NAME`] marks edges that feed the synthetic exit task and are never
//! materialized as reads or writes.
//!
//! Completion flags live on edges, not tasks: a worker publishes its record
//! maps first and then marks its outgoing edges completed, so any dependent
//! that observes a completed frontier also observes finalized predecessor
//! records.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};

/// Name of the synthetic exit task. Edges whose destination is this name are
/// skipped by every write path.
pub const SINK_NAME: &str = "end";

/// Delimiter inside edge names.
pub const EDGE_DELIMITER: &str = "->";

/// A compute vertex with a FLOP budget.
///
/// `assigned` flips exactly once, at mapper commit; the scheduler never
/// returns the same task twice.
#[derive(Debug)]
pub struct Task {
    pub name: String,
    pub flops: f64,
    assigned: AtomicBool,
}

impl Task {
    pub fn is_assigned(&self) -> bool {
        self.assigned.load(Ordering::SeqCst)
    }

    pub fn mark_assigned(&self) {
        self.assigned.store(true, Ordering::SeqCst);
    }
}

/// A producer→consumer data transfer with a byte payload.
#[derive(Debug)]
pub struct Edge {
    pub name: String,
    pub src: String,
    pub dst: String,
    pub payload_bytes: f64,
    completed: AtomicBool,
}

impl Edge {
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    /// Whether this edge feeds the synthetic exit task.
    pub fn feeds_sink(&self) -> bool {
        self.dst == SINK_NAME
    }
}

/// Split an edge name on the `"->"` delimiter.
///
/// A name without the delimiter yields two empty strings, matching the
/// filter semantics of the record maps.
pub fn split_edge_name(name: &str) -> (&str, &str) {
    match name.find(EDGE_DELIMITER) {
        Some(pos) => (&name[..pos], &name[pos + EDGE_DELIMITER.len()..]),
        None => ("", ""),
    }
}

/// Build the canonical `"src->dst"` edge name.
pub fn join_edge_name(src: &str, dst: &str) -> String {
    format!("{src}{EDGE_DELIMITER}{dst}")
}

/// An ordered set of tasks and typed directed edges.
///
/// Task order is the DOT declaration order; it is the tie-break order for the
/// FIFO policy and the iteration order of the ready set.
#[derive(Debug)]
pub struct Dag {
    tasks: Vec<Task>,
    edges: Vec<Edge>,
    task_index: HashMap<String, usize>,
    edge_index: HashMap<String, usize>,
    in_edges: HashMap<String, Vec<usize>>,
    out_edges: HashMap<String, Vec<usize>>,
}

impl Dag {
    /// Assemble a DAG from (name, flops) tasks and (src, dst, payload) edges.
    ///
    /// Task and edge names must be unique; both edge endpoints must name
    /// declared tasks; budgets and payloads must be non-negative.
    pub fn from_parts(
        task_defs: Vec<(String, f64)>,
        edge_defs: Vec<(String, String, f64)>,
    ) -> Result<Self> {
        let mut tasks = Vec::with_capacity(task_defs.len());
        let mut task_index = HashMap::new();

        for (name, flops) in task_defs {
            if flops < 0.0 {
                return Err(Error::Dag(format!("task '{name}' has negative flops")));
            }
            if task_index.insert(name.clone(), tasks.len()).is_some() {
                return Err(Error::Dag(format!("duplicate task name '{name}'")));
            }
            tasks.push(Task {
                name,
                flops,
                assigned: AtomicBool::new(false),
            });
        }

        let mut edges = Vec::with_capacity(edge_defs.len());
        let mut edge_index = HashMap::new();
        let mut in_edges: HashMap<String, Vec<usize>> = HashMap::new();
        let mut out_edges: HashMap<String, Vec<usize>> = HashMap::new();

        for (src, dst, payload_bytes) in edge_defs {
            if payload_bytes < 0.0 {
                return Err(Error::Dag(format!(
                    "edge '{src}{EDGE_DELIMITER}{dst}' has negative payload"
                )));
            }
            for endpoint in [&src, &dst] {
                if !task_index.contains_key(endpoint.as_str()) {
                    return Err(Error::Dag(format!(
                        "edge endpoint '{endpoint}' is not a declared task"
                    )));
                }
            }
            let name = join_edge_name(&src, &dst);
            if edge_index.insert(name.clone(), edges.len()).is_some() {
                return Err(Error::Dag(format!("duplicate edge '{name}'")));
            }
            in_edges.entry(dst.clone()).or_default().push(edges.len());
            out_edges.entry(src.clone()).or_default().push(edges.len());
            edges.push(Edge {
                name,
                src,
                dst,
                payload_bytes,
                completed: AtomicBool::new(false),
            });
        }

        Ok(Self {
            tasks,
            edges,
            task_index,
            edge_index,
            in_edges,
            out_edges,
        })
    }

    /// Remove the synthetic entry and exit tasks from the ordered set.
    ///
    /// The entry is the first declared task and the exit the last. The
    /// entry's outgoing edges are marked completed so that its dependents
    /// become ready; the exit's incoming edges stay in place and are skipped
    /// by every write path via [`Edge::feeds_sink`].
    pub fn strip_entry_exit(&mut self) -> Result<()> {
        if self.tasks.len() < 3 {
            return Err(Error::Dag(
                "a workflow needs an entry, an exit, and at least one task between them"
                    .to_string(),
            ));
        }

        let entry = self.tasks.remove(0);
        for &edge_idx in self.out_edges.get(&entry.name).into_iter().flatten() {
            self.edges[edge_idx].mark_completed();
        }
        self.task_index.remove(&entry.name);

        let exit = self.tasks.pop().expect("checked above");
        self.task_index.remove(&exit.name);

        // The ordered set shrank; rebuild positional indices.
        for (idx, task) in self.tasks.iter().enumerate() {
            self.task_index.insert(task.name.clone(), idx);
        }

        Ok(())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, index: usize) -> &Task {
        &self.tasks[index]
    }

    pub fn task_by_name(&self, name: &str) -> Option<&Task> {
        self.task_index.get(name).map(|&idx| &self.tasks[idx])
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge_by_name(&self, name: &str) -> Option<&Edge> {
        self.edge_index.get(name).map(|&idx| &self.edges[idx])
    }

    /// Incoming edges of a task, in declaration order.
    pub fn in_edges(&self, task_name: &str) -> impl Iterator<Item = &Edge> {
        self.in_edges
            .get(task_name)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Outgoing edges of a task, in declaration order.
    pub fn out_edges(&self, task_name: &str) -> impl Iterator<Item = &Edge> {
        self.out_edges
            .get(task_name)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// Indices of tasks whose incoming edges are all completed and that are
    /// not yet assigned, in DAG order.
    pub fn ready_tasks(&self) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| {
                !task.is_assigned()
                    && self
                        .in_edges(&task.name)
                        .all(|edge| edge.is_completed())
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// True while any task in the ordered set is unassigned.
    pub fn has_unassigned(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_assigned())
    }
}

/// Read a DAG from the DOT subset emitted by workflow generators.
///
/// Recognized lines inside the `digraph` body:
///
/// ```text
/// t1 [size="1000000000"];
/// t1 -> t2 [size="1000000"];
/// ```
///
/// `size` carries FLOPs on tasks and bytes on edges. The first and last
/// declared tasks are the synthetic entry and exit; [`Dag::strip_entry_exit`]
/// removes them before scheduling.
pub fn read_dot(path: impl AsRef<Path>) -> Result<Dag> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_dot(&text)
}

fn parse_dot(text: &str) -> Result<Dag> {
    let mut task_defs: Vec<(String, f64)> = Vec::new();
    let mut edge_defs: Vec<(String, String, f64)> = Vec::new();

    for raw_line in text.lines() {
        let line = raw_line.trim().trim_end_matches(';').trim();
        if line.is_empty()
            || line.starts_with("//")
            || line.starts_with('#')
            || line.starts_with("digraph")
            || line.starts_with("graph")
            || line == "{"
            || line == "}"
        {
            continue;
        }

        let size = parse_size_attr(line)?;

        if let Some(pos) = line.find(EDGE_DELIMITER) {
            let src = line[..pos].trim().trim_matches('"').to_string();
            let dst_part = &line[pos + EDGE_DELIMITER.len()..];
            let dst_end = dst_part.find('[').unwrap_or(dst_part.len());
            let dst = dst_part[..dst_end].trim().trim_matches('"').to_string();
            if src.is_empty() || dst.is_empty() {
                return Err(Error::Dag(format!("malformed edge line '{line}'")));
            }
            edge_defs.push((src, dst, size.unwrap_or(0.0)));
        } else {
            let name_end = line.find('[').unwrap_or(line.len());
            let name = line[..name_end].trim().trim_matches('"').to_string();
            if name.is_empty() {
                return Err(Error::Dag(format!("malformed node line '{line}'")));
            }
            task_defs.push((name, size.unwrap_or(0.0)));
        }
    }

    if task_defs.is_empty() {
        return Err(Error::Dag("no tasks found in DOT input".to_string()));
    }

    Dag::from_parts(task_defs, edge_defs)
}

/// Extract the numeric `size` attribute from a DOT line, if present.
fn parse_size_attr(line: &str) -> Result<Option<f64>> {
    let Some(attr_pos) = line.find("size") else {
        return Ok(None);
    };
    let rest = line[attr_pos + "size".len()..].trim_start();
    let Some(rest) = rest.strip_prefix('=') else {
        return Err(Error::Dag(format!("malformed size attribute in '{line}'")));
    };
    let value = rest.trim_start().trim_start_matches('"');
    let end = value.find(['"', ',', ']']).unwrap_or(value.len());
    value[..end]
        .trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|_| Error::Dag(format!("unparseable size attribute in '{line}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag {
        // root -> a -> {b, c} -> d -> end
        let tasks = ["root", "a", "b", "c", "d", "end"]
            .iter()
            .map(|n| (n.to_string(), 1e9))
            .collect();
        let edges = vec![
            ("root".to_string(), "a".to_string(), 0.0),
            ("a".to_string(), "b".to_string(), 2e6),
            ("a".to_string(), "c".to_string(), 1e6),
            ("b".to_string(), "d".to_string(), 1e6),
            ("c".to_string(), "d".to_string(), 1e6),
            ("d".to_string(), "end".to_string(), 0.0),
        ];
        let mut dag = Dag::from_parts(tasks, edges).unwrap();
        dag.strip_entry_exit().unwrap();
        dag
    }

    #[test]
    fn split_round_trips() {
        let (src, dst) = split_edge_name("A->B");
        assert_eq!((src, dst), ("A", "B"));
        assert_eq!(join_edge_name(src, dst), "A->B");
    }

    #[test]
    fn split_without_delimiter_yields_empty_parts() {
        assert_eq!(split_edge_name("standalone"), ("", ""));
    }

    #[test]
    fn strip_removes_entry_and_exit() {
        let dag = diamond();
        let names: Vec<_> = dag.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        // Entry's outgoing edge was completed, so 'a' is ready.
        assert_eq!(dag.ready_tasks(), vec![0]);
    }

    #[test]
    fn ready_requires_all_in_edges_completed() {
        let dag = diamond();
        dag.task_by_name("a").unwrap().mark_assigned();
        dag.edge_by_name("a->b").unwrap().mark_completed();
        // 'b' ready, 'c' still blocked on a->c, 'd' blocked on both.
        let ready: Vec<_> = dag
            .ready_tasks()
            .into_iter()
            .map(|i| dag.task(i).name.clone())
            .collect();
        assert_eq!(ready, ["b"]);
    }

    #[test]
    fn assigned_tasks_leave_ready_set_but_not_has_unassigned() {
        let dag = diamond();
        dag.task_by_name("a").unwrap().mark_assigned();
        assert!(dag.ready_tasks().is_empty());
        assert!(dag.has_unassigned());
    }

    #[test]
    fn duplicate_task_name_rejected() {
        let err = Dag::from_parts(
            vec![("x".to_string(), 0.0), ("x".to_string(), 0.0)],
            vec![],
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate task"));
    }

    #[test]
    fn duplicate_edge_rejected() {
        let tasks = vec![("x".to_string(), 0.0), ("y".to_string(), 0.0)];
        let edges = vec![
            ("x".to_string(), "y".to_string(), 1.0),
            ("x".to_string(), "y".to_string(), 2.0),
        ];
        assert!(Dag::from_parts(tasks, edges).is_err());
    }

    #[test]
    fn sink_edges_are_flagged() {
        let dag = diamond();
        assert!(dag.edge_by_name("d->end").unwrap().feeds_sink());
        assert!(!dag.edge_by_name("a->b").unwrap().feeds_sink());
    }

    #[test]
    fn dot_parse_extracts_sizes_and_order() {
        let text = r#"
            digraph workflow {
              root [size="0"];
              t1 [size="1e9"];
              t2 [size="2e9"];
              end [size="0"];
              root -> t1 [size="0"];
              t1 -> t2 [size="1048576"];
              t2 -> end [size="0"];
            }
        "#;
        let mut dag = parse_dot(text).unwrap();
        dag.strip_entry_exit().unwrap();

        let names: Vec<_> = dag.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["t1", "t2"]);
        assert_eq!(dag.task_by_name("t2").unwrap().flops, 2e9);
        assert_eq!(
            dag.edge_by_name("t1->t2").unwrap().payload_bytes,
            1048576.0
        );
        assert_eq!(dag.ready_tasks(), vec![0]);
    }

    #[test]
    fn dot_unquoted_size_accepted() {
        let text = "digraph g {\n a [size=5];\n b [size=7];\n c [size=0];\n a -> b [size=9];\n b -> c [size=0];\n}";
        let dag = parse_dot(text).unwrap();
        assert_eq!(dag.task_by_name("b").unwrap().flops, 7.0);
        assert_eq!(dag.edge_by_name("a->b").unwrap().payload_bytes, 9.0);
    }

    #[test]
    fn dot_garbage_size_rejected() {
        let text = "digraph g {\n a [size=\"lots\"];\n}";
        assert!(parse_dot(text).is_err());
    }
}
