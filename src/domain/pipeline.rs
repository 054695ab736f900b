//! Stage dependency graphs.
//!
//! A provider that runs a job as several ordered stages describes them as a
//! list of [`Stage`]s and calls [`assemble`] to get execution waves and the
//! success edges between stages. What a stage *does* is up to the provider,
//! carried in the stage payload.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("cyclic dependency between stages {0:?}")]
    CyclicDependency(Vec<String>),
    #[error("stage {stage} depends on unknown stage {predecessor}")]
    UnknownPredecessor { stage: String, predecessor: String },
    #[error("stage {0} declared more than once")]
    DuplicateStage(String),
}

/// Routing tag naming the worker pool or resource tier a stage runs on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComputeClass(pub String);

impl ComputeClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ComputeClass {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl std::fmt::Display for ComputeClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stage<T> {
    pub id: String,
    pub compute_class: ComputeClass,
    pub predecessors: Vec<String>,
    pub payload: T,
}

impl<T> Stage<T> {
    pub fn new(id: impl Into<String>, payload: T) -> Self {
        Self {
            id: id.into(),
            compute_class: ComputeClass::default(),
            predecessors: Vec::new(),
            payload,
        }
    }

    pub fn on(mut self, compute_class: ComputeClass) -> Self {
        self.compute_class = compute_class;
        self
    }

    pub fn after<I, S>(mut self, predecessors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predecessors
            .extend(predecessors.into_iter().map(Into::into));
        self
    }
}

/// `to` runs only once `from` succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessEdge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan<T> {
    pub waves: Vec<Vec<Stage<T>>>,
    pub edges: Vec<SuccessEdge>,
}

impl<T> Plan<T> {
    pub fn stage_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn wave_ids(&self) -> Vec<Vec<&str>> {
        self.waves
            .iter()
            .map(|wave| wave.iter().map(|s| s.id.as_str()).collect())
            .collect()
    }

    pub fn stages(&self) -> impl Iterator<Item = &Stage<T>> {
        self.waves.iter().flatten()
    }
}

/// Partition `stages` into waves.
///
/// Wave 0 holds stages without predecessors; wave `k` holds stages whose
/// predecessors all sit in earlier waves. Within a wave stages keep their
/// declaration order. Repeated predecessors are collapsed.
pub fn assemble<T>(stages: Vec<Stage<T>>) -> Result<Plan<T>, PipelineError> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(stages.len());
    for (i, stage) in stages.iter().enumerate() {
        if index.insert(stage.id.as_str(), i).is_some() {
            return Err(PipelineError::DuplicateStage(stage.id.clone()));
        }
    }

    let mut predecessors: Vec<Vec<usize>> = Vec::with_capacity(stages.len());
    for stage in &stages {
        let mut preds: Vec<usize> = Vec::new();
        for name in &stage.predecessors {
            let p = *index
                .get(name.as_str())
                .ok_or_else(|| PipelineError::UnknownPredecessor {
                    stage: stage.id.clone(),
                    predecessor: name.clone(),
                })?;
            if !preds.contains(&p) {
                preds.push(p);
            }
        }
        predecessors.push(preds);
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); stages.len()];
    let mut pending: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    for (i, preds) in predecessors.iter().enumerate() {
        for &p in preds {
            dependents[p].push(i);
        }
    }

    let mut layers: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = (0..stages.len()).filter(|&i| pending[i] == 0).collect();
    let mut placed = 0;
    while !current.is_empty() {
        let mut next = Vec::new();
        for &i in &current {
            for &d in &dependents[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    next.push(d);
                }
            }
        }
        next.sort_unstable();
        placed += current.len();
        layers.push(std::mem::replace(&mut current, next));
    }

    if placed < stages.len() {
        let stuck = stages
            .iter()
            .enumerate()
            .filter(|(i, _)| pending[*i] > 0)
            .map(|(_, s)| s.id.clone())
            .collect();
        return Err(PipelineError::CyclicDependency(stuck));
    }

    let mut edges = Vec::new();
    for layer in &layers {
        for &i in layer {
            for &p in &predecessors[i] {
                edges.push(SuccessEdge {
                    from: stages[p].id.clone(),
                    to: stages[i].id.clone(),
                });
            }
        }
    }

    let mut slots: Vec<Option<Stage<T>>> = stages.into_iter().map(Some).collect();
    let waves = layers
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .filter_map(|i| slots[i].take())
                .collect()
        })
        .collect();

    Ok(Plan { waves, edges })
}
