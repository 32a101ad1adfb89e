//! Requisite graph traversal.

use super::execution::{PipelineExecution, StageExecution};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

/// Requisites of `ref_id` that name a known stage, in declaration order.
pub(crate) fn requisites_of<'a>(
    ref_id: &str,
    stages: &'a [StageExecution],
    index: &HashMap<String, usize>,
) -> Vec<&'a String> {
    let Some(&position) = index.get(ref_id) else {
        return Vec::new();
    };
    stages[position]
        .requisite_stage_ref_ids()
        .iter()
        .filter(|r| index.contains_key(r.as_str()))
        .collect()
}

impl PipelineExecution {
    /// Returns every transitive requisite of `stage`, farthest first.
    ///
    /// Ancestors are ordered by their shortest requisite distance from
    /// `stage`, descending, so applying outputs in this order lets nearer
    /// stages override farther ones. Stages at the same distance keep the
    /// breadth-first discovery order, which follows requisite declaration
    /// order, so the result is stable across calls.
    #[must_use]
    pub fn ancestors(&self, stage: &StageExecution) -> Vec<&StageExecution> {
        let mut found: Vec<(usize, &StageExecution)> = Vec::new();
        let mut visited = HashSet::new();
        visited.insert(stage.ref_id());
        let mut queue: VecDeque<(&str, usize)> = stage
            .requisite_stage_ref_ids()
            .iter()
            .map(|r| (r.as_str(), 1))
            .collect();

        while let Some((ref_id, distance)) = queue.pop_front() {
            if !visited.insert(ref_id) {
                continue;
            }
            let Some(ancestor) = self.stage_by_ref(ref_id) else {
                continue;
            };
            found.push((distance, ancestor));
            queue.extend(
                ancestor
                    .requisite_stage_ref_ids()
                    .iter()
                    .map(|r| (r.as_str(), distance + 1)),
            );
        }

        found.sort_by_key(|&(distance, _)| Reverse(distance));
        found.into_iter().map(|(_, ancestor)| ancestor).collect()
    }
}
