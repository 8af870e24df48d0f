use std::collections::BTreeMap;

/// How the tests of one stage may be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageMode {
    /// Tests may run concurrently.
    Concurrent,
    /// Tests run one at a time, in plan order.
    Serial,
}

/// Ordered stages, each with the mode its tests must run in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan<T> {
    stages: Vec<Vec<T>>,
    modes: Vec<StageMode>,
}

impl<T> ExecutionPlan<T> {
    pub fn stages(&self) -> &[Vec<T>] {
        &self.stages
    }

    pub fn modes(&self) -> &[StageMode] {
        &self.modes
    }

    pub fn into_stages(self) -> Vec<Vec<T>> {
        self.stages
    }

    /// Stages paired with their modes, in execution order.
    pub fn into_staged(self) -> Vec<(StageMode, Vec<T>)> {
        self.modes.into_iter().zip(self.stages).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn test_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }
}

/// Group tests into stages: one concurrent stage per non-null key in
/// ascending key order, then a final serial stage holding every unkeyed
/// test. Input order is kept within each stage.
pub fn schedule<T, K, I>(tests: I) -> ExecutionPlan<T>
where
    I: IntoIterator<Item = (T, Option<K>)>,
    K: Ord,
{
    let mut keyed: BTreeMap<K, Vec<T>> = BTreeMap::new();
    let mut unkeyed = Vec::new();

    for (test, key) in tests {
        match key {
            Some(key) => keyed.entry(key).or_default().push(test),
            None => unkeyed.push(test),
        }
    }

    let mut stages: Vec<Vec<T>> = keyed.into_values().collect();
    let mut modes = vec![StageMode::Concurrent; stages.len()];
    if !unkeyed.is_empty() {
        stages.push(unkeyed);
        modes.push(StageMode::Serial);
    }
    ExecutionPlan { stages, modes }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_stages_then_unkeyed() {
        let plan = schedule(vec![
            ("c", None),
            ("a", Some(2)),
            ("b", Some(1)),
            ("d", None),
        ]);
        assert_eq!(plan.stages(), &[vec!["b"], vec!["a"], vec!["c", "d"]]);
        assert_eq!(
            plan.modes(),
            &[StageMode::Concurrent, StageMode::Concurrent, StageMode::Serial]
        );
        assert_eq!(plan.test_count(), 4);
    }

    #[test]
    fn test_only_unkeyed_is_one_serial_stage() {
        let plan = schedule(vec![("s4s", None::<u32>), ("refresh-token", None)]);
        assert_eq!(
            plan.into_staged(),
            vec![(StageMode::Serial, vec!["s4s", "refresh-token"])]
        );
    }

    #[test]
    fn test_shared_key_single_stage() {
        let plan = schedule(vec![("x", Some(1)), ("y", Some(1)), ("z", Some(1))]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.stages()[0], vec!["x", "y", "z"]);
    }

    #[test]
    fn test_empty_input() {
        let plan = schedule(Vec::<(&str, Option<u32>)>::new());
        assert!(plan.is_empty());
    }
}
