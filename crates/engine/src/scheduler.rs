//! Task scheduling — turn a task list into ordered batches.
//!
//! A batch holds every task whose dependencies were all placed in earlier
//! batches (Kahn's algorithm, one frontier at a time). Tasks in a batch keep
//! their definition order so runs and tests are deterministic.
//!
//! Registration does not call this; cycles are first reported when a
//! workflow is executed, or when a caller invokes [`build_batches`] directly.

use std::collections::HashSet;

use crate::{models::WorkflowTask, EngineError};

/// Tasks that may run concurrently.
pub type Batch<'a> = Vec<&'a WorkflowTask>;

/// Split `tasks` into dependency-ordered batches.
///
/// # Errors
/// - [`EngineError::Validation`] if a task depends on an id outside `tasks`.
/// - [`EngineError::CircularDependency`] if some tasks can never become ready.
pub fn build_batches(tasks: &[WorkflowTask]) -> Result<Vec<Batch<'_>>, EngineError> {
    let known: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    for task in tasks {
        if let Some(missing) = task.dependencies.iter().find(|d| !known.contains(d.as_str())) {
            return Err(EngineError::Validation(format!(
                "task '{}' depends on unknown task '{}'",
                task.id, missing
            )));
        }
    }

    let mut completed: HashSet<&str> = HashSet::with_capacity(tasks.len());
    let mut batches: Vec<Batch<'_>> = Vec::new();

    while completed.len() < known.len() {
        let ready: Batch<'_> = tasks
            .iter()
            .filter(|t| !completed.contains(t.id.as_str()))
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d.as_str())))
            .collect();

        if ready.is_empty() {
            let remaining = tasks
                .iter()
                .filter(|t| !completed.contains(t.id.as_str()))
                .map(|t| t.id.clone())
                .collect();
            return Err(EngineError::CircularDependency { remaining });
        }

        completed.extend(ready.iter().map(|t| t.id.as_str()));
        batches.push(ready);
    }

    Ok(batches)
}
