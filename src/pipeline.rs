//! Task pipelines and their parallel executor.
//!
//! A pipeline is a tree of [`Step`]s composed in series and parallel,
//! lowered onto a dependency graph before execution. The executor
//! performs a parallel topological traversal: tasks whose dependencies
//! are all complete are spawned onto the rayon pool, results come back
//! over a channel, and each completion unlocks its dependents. A task
//! error aborts the pipeline; per-file problems are counted inside the
//! task's [`Summary`] and never abort anything.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::mpsc::channel;
use std::time::{Duration, Instant};

use indicatif::ProgressStyle;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::Level;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::config::Project;
use crate::error::{DandoriError, PipelineError};
use crate::task::clean::Clean;
use crate::task::copy::Copy;
use crate::task::data::Data;
use crate::task::images::Images;
use crate::task::markup::Markup;
use crate::task::pack::{Vendor, WriteManifest};
use crate::task::scripts::Scripts;
use crate::task::styles::Styles;
use crate::task::{Context, Summary, Task};

/// Closed set of task identifiers. Pipelines reference tasks through
/// this enum, so a misspelled task name cannot survive compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskId {
    Clean,
    Copy,
    CopyChange,
    Scripts,
    Styles,
    Markup,
    Data,
    Images,
    Vendor,
    Manifest,
}

impl TaskId {
    /// The public name of the task, shared by logs and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            TaskId::Clean => "clean",
            TaskId::Copy => "copy",
            TaskId::CopyChange => "copyChange",
            TaskId::Scripts => "compile-ts",
            TaskId::Styles => "compile-less",
            TaskId::Markup => "minify-wxml",
            TaskId::Data => "minify-json",
            TaskId::Images => "minify-image",
            TaskId::Vendor => "vendor",
            TaskId::Manifest => "manifest",
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every constructed task, keyed by identifier. Built once at startup so
/// glob compilation errors surface before anything runs.
pub struct Registry {
    tasks: BTreeMap<TaskId, Arc<dyn Task>>,
}

impl Registry {
    /// Constructs the standard task set for the given project.
    pub fn standard(project: &Project) -> Result<Self, DandoriError> {
        let mut tasks: BTreeMap<TaskId, Arc<dyn Task>> = BTreeMap::new();

        tasks.insert(TaskId::Clean, Arc::new(Clean));
        tasks.insert(TaskId::Copy, Arc::new(Copy::new(project)?));
        tasks.insert(TaskId::CopyChange, Arc::new(Copy::changed(project)?));
        tasks.insert(TaskId::Scripts, Arc::new(Scripts::new(project)?));
        tasks.insert(TaskId::Styles, Arc::new(Styles::new(project)?));
        tasks.insert(TaskId::Markup, Arc::new(Markup::new(project)?));
        tasks.insert(TaskId::Data, Arc::new(Data::new(project)?));
        tasks.insert(TaskId::Images, Arc::new(Images::new(project)?));
        tasks.insert(TaskId::Vendor, Arc::new(Vendor));
        tasks.insert(TaskId::Manifest, Arc::new(WriteManifest));

        Ok(Self { tasks })
    }

    /// Builds a registry from explicit task instances.
    pub fn from_tasks(tasks: impl IntoIterator<Item = (TaskId, Arc<dyn Task>)>) -> Self {
        Self {
            tasks: tasks.into_iter().collect(),
        }
    }

    pub fn get(&self, id: TaskId) -> Option<&Arc<dyn Task>> {
        self.tasks.get(&id)
    }
}

/// One composition step: a single task, a strictly ordered sequence or
/// an unordered group.
#[derive(Debug, Clone)]
pub enum Step {
    Task(TaskId),
    Series(Vec<Step>),
    Parallel(Vec<Step>),
}

impl Step {
    pub fn series(steps: impl IntoIterator<Item = Step>) -> Self {
        Step::Series(steps.into_iter().collect())
    }

    pub fn parallel(steps: impl IntoIterator<Item = Step>) -> Self {
        Step::Parallel(steps.into_iter().collect())
    }
}

impl From<TaskId> for Step {
    fn from(id: TaskId) -> Self {
        Step::Task(id)
    }
}

/// A named composition of tasks.
#[derive(Debug, Clone)]
pub struct Pipeline {
    name: &'static str,
    root: Step,
}

impl Pipeline {
    /// A single task with no ordering around it. Used by the per-task
    /// CLI commands, which deliberately skip the implicit clean so a
    /// rerun of one step can't wipe the output of the others.
    pub fn single(id: TaskId) -> Self {
        Self {
            name: id.as_str(),
            root: Step::Task(id),
        }
    }

    /// Full compilation: wipe the output tree, then compile and package
    /// everything concurrently.
    pub fn compile() -> Self {
        Self {
            name: "compile",
            root: Step::series([
                Step::Task(TaskId::Clean),
                Step::parallel([
                    Step::Task(TaskId::Vendor),
                    Step::Task(TaskId::Manifest),
                    Step::Task(TaskId::Scripts),
                    Step::Task(TaskId::Styles),
                    Step::Task(TaskId::Copy),
                ]),
            ]),
        }
    }

    /// Release build: compile, then minify markup, data and images.
    pub fn build() -> Self {
        Self {
            name: "build",
            root: Step::series([
                Pipeline::compile().root,
                Step::parallel([
                    Step::Task(TaskId::Markup),
                    Step::Task(TaskId::Data),
                    Step::Task(TaskId::Images),
                ]),
            ]),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Lowers the step tree onto a dependency graph. Edges point from a
    /// task to the tasks that have to wait for it.
    fn lower(&self) -> DiGraph<TaskId, ()> {
        let mut graph = DiGraph::new();
        lower_step(&self.root, &mut graph);
        graph
    }

    /// Checks the pipeline against the registry without running anything:
    /// every referenced task must be registered and the lowered graph
    /// must be acyclic.
    pub fn validate(&self, registry: &Registry) -> Result<(), PipelineError> {
        let graph = self.lower();

        for index in graph.node_indices() {
            let id = graph[index];
            if registry.get(id).is_none() {
                return Err(PipelineError::Unregistered(self.name, id.as_str()));
            }
        }

        if petgraph::algo::toposort(&graph, None).is_err() {
            return Err(PipelineError::Cycle(self.name));
        }

        Ok(())
    }

    /// Executes the pipeline over the rayon pool. Tasks are spawned as
    /// soon as their dependencies complete; the first task error aborts
    /// the run after in-flight siblings finish.
    pub fn run(&self, registry: &Registry, ctx: &Context) -> Result<RunReport, PipelineError> {
        self.validate(registry)?;
        let graph = self.lower();

        // Map from a task to the tasks that depend on it.
        let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for edge in graph.raw_edges() {
            dependents
                .entry(edge.source())
                .or_default()
                .push(edge.target());
        }

        let mut dependency_counts: HashMap<NodeIndex, usize> = graph
            .node_indices()
            .map(|i| {
                (
                    i,
                    graph
                        .neighbors_directed(i, petgraph::Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let total_tasks = graph.node_count() as u64;
        let mut completed_tasks = 0;

        let mut report = RunReport::default();

        if total_tasks == 0 {
            return Ok(report);
        }

        let root_span = tracing::span!(Level::INFO, "pipeline");
        root_span.pb_set_length(total_tasks);
        root_span.pb_set_style(
            &ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .expect("Error setting progress bar template")
                .progress_chars("=>-"),
        );
        root_span.pb_set_message(&format!("Running {}...", self.name));
        let _enter = root_span.enter();

        // The scheduler must stay off the pool itself: parked in `recv`
        // on a worker it would leave a single-threaded pool with nothing
        // to run the tasks.
        rayon::in_place_scope(|s| -> Result<(), PipelineError> {
            let (result_sender, result_receiver) =
                channel::<(NodeIndex, anyhow::Result<Summary>, Duration)>();

            // A helper closure to spawn one task on the pool.
            let spawn_task = |index: NodeIndex| {
                let id = graph[index];
                // Membership was checked by validate above.
                let Some(task) = registry.get(id) else { return };

                let task = Arc::clone(task);
                let sender = result_sender.clone();

                s.spawn(move |_| {
                    let span = tracing::span!(Level::INFO, "task", name = id.as_str());
                    span.pb_set_message(&format!("Running {id}"));
                    let _enter = span.enter();

                    let start = Instant::now();

                    // A panicking task is reported like a failing one and
                    // must not poison the rest of the run.
                    let result = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        task.run(ctx)
                    })) {
                        Ok(result) => result,
                        Err(panic) => {
                            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                                format!("Task panicked: {s}")
                            } else if let Some(s) = panic.downcast_ref::<String>() {
                                format!("Task panicked: {s}")
                            } else {
                                String::from("Task panicked with unknown payload")
                            };

                            Err(anyhow::anyhow!(msg))
                        }
                    };

                    // The receiver is gone when the run already aborted.
                    sender.send((index, result, start.elapsed())).ok();
                });
            };

            // Seed the tasks with no dependencies.
            for index in graph.node_indices() {
                if dependency_counts.get(&index).copied().unwrap_or(0) == 0 {
                    spawn_task(index);
                }
            }

            // Scheduler loop. The calling thread sits here while rayon
            // workers execute tasks.
            while completed_tasks < total_tasks {
                let (completed_index, result, duration) = result_receiver
                    .recv()
                    .map_err(|_| PipelineError::Disconnected(self.name))?;

                completed_tasks += 1;
                root_span.pb_inc(1);

                let id = graph[completed_index];
                let summary = result.map_err(|err| PipelineError::Task(id.as_str(), err))?;
                report.push(id, summary, duration);

                // Unlock dependents.
                if let Some(waiting) = dependents.get(&completed_index) {
                    for &index in waiting {
                        if let Some(count) = dependency_counts.get_mut(&index) {
                            *count -= 1;
                            if *count == 0 {
                                spawn_task(index);
                            }
                        }
                    }
                }
            }

            Ok(())
        })?;

        tracing::info!("Pipeline '{}' complete", self.name);
        Ok(report)
    }
}

/// Recursive worker for [`Pipeline::lower`]. Returns the entry and exit
/// nodes of the lowered subtree: a series wires the previous exits to the
/// next entries, a parallel group merges both sets.
fn lower_step(step: &Step, graph: &mut DiGraph<TaskId, ()>) -> (Vec<NodeIndex>, Vec<NodeIndex>) {
    match step {
        Step::Task(id) => {
            let node = graph.add_node(*id);
            (vec![node], vec![node])
        }
        Step::Series(steps) => {
            let mut entries: Vec<NodeIndex> = Vec::new();
            let mut exits: Vec<NodeIndex> = Vec::new();

            for step in steps {
                let (starts, ends) = lower_step(step, graph);
                if starts.is_empty() {
                    continue;
                }

                for &prev in &exits {
                    for &next in &starts {
                        graph.add_edge(prev, next, ());
                    }
                }

                if entries.is_empty() {
                    entries = starts;
                }
                exits = ends;
            }

            (entries, exits)
        }
        Step::Parallel(steps) => {
            let mut entries = Vec::new();
            let mut exits = Vec::new();

            for step in steps {
                let (starts, ends) = lower_step(step, graph);
                entries.extend(starts);
                exits.extend(ends);
            }

            (entries, exits)
        }
    }
}

/// Execution record of one pipeline run, in completion order.
#[derive(Debug, Default)]
pub struct RunReport {
    entries: Vec<(TaskId, Summary, Duration)>,
}

impl RunReport {
    fn push(&mut self, id: TaskId, summary: Summary, duration: Duration) {
        self.entries.push((id, summary, duration));
    }

    pub fn entries(&self) -> &[(TaskId, Summary, Duration)] {
        &self.entries
    }

    /// Total files that failed across all tasks.
    pub fn failed(&self) -> usize {
        self.entries.iter().map(|(_, summary, _)| summary.failed).sum()
    }

    /// Logs one line per completed task.
    pub fn log(&self) {
        for (id, summary, duration) in &self.entries {
            tracing::info!("{id}: {summary} in {duration:.2?}");
        }
    }
}
