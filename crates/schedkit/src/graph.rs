//! Dependency graph resolution.
//!
//! Turns a flat list of install units into sequential "waves": batches of
//! mutually independent units that may execute concurrently. Wave N+1 only
//! contains units whose dependencies all live in waves 1..=N.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::InstallUnit;

/// One batch of unit ids eligible for concurrent execution.
pub type Wave = Vec<String>;

/// Shape summary of a resolved plan, for dry-run output and the optimizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphShape {
    /// Total number of units in the plan
    pub unit_count: usize,
    /// Number of sequential waves
    pub wave_count: usize,
    /// Width of the widest wave (the parallelism ceiling)
    pub max_wave_width: usize,
}

impl GraphShape {
    /// Summarize a resolved wave sequence.
    pub fn of(waves: &[Wave]) -> Self {
        Self {
            unit_count: waves.iter().map(Vec::len).sum(),
            wave_count: waves.len(),
            max_wave_width: waves.iter().map(Vec::len).max().unwrap_or(0),
        }
    }
}

/// Resolve units into dependency-ordered waves.
///
/// Kahn-style in-degree peeling: each round collects every unit whose
/// remaining in-degree is zero into the next wave. Within a wave, units are
/// ordered by ascending id so repeated runs produce identical listings.
///
/// # Errors
/// - [`Error::DuplicateUnit`] when two units share an id
/// - [`Error::UnknownDependency`] when a unit references an id not in the plan
/// - [`Error::Cycle`] naming every unit left unplaced when no progress is
///   possible (the cycle's members and everything downstream of them)
pub fn resolve(units: &[InstallUnit]) -> Result<Vec<Wave>> {
    // Structural validation before any ordering work
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for unit in units {
        if !ids.insert(unit.id.as_str()) {
            return Err(Error::DuplicateUnit {
                id: unit.id.clone(),
            });
        }
    }

    for unit in units {
        for dep in &unit.depends_on {
            if !ids.contains(dep.as_str()) {
                return Err(Error::UnknownDependency {
                    unit: unit.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for unit in units {
        in_degree.entry(unit.id.as_str()).or_insert(0);
        for dep in &unit.depends_on {
            *in_degree.entry(unit.id.as_str()).or_insert(0) += 1;
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(unit.id.as_str());
        }
    }

    let mut waves = Vec::new();
    let mut placed = 0usize;

    while placed < units.len() {
        // BTreeMap iteration gives the ascending-id tie-break for free
        let wave: Vec<String> = in_degree
            .iter()
            .filter(|&(_, degree)| *degree == 0)
            .map(|(id, _)| (*id).to_string())
            .collect();

        if wave.is_empty() {
            // No progress possible: everything still in the map is part of
            // (or downstream of) a cycle
            let members: Vec<String> = in_degree.keys().map(|id| (*id).to_string()).collect();
            return Err(Error::Cycle { members });
        }

        for id in &wave {
            in_degree.remove(id.as_str());
            if let Some(deps) = dependents.get(id.as_str()) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                    }
                }
            }
        }

        placed += wave.len();
        waves.push(wave);
    }

    log::debug!(
        "resolved {} units into {} waves",
        placed,
        waves.len()
    );
    Ok(waves)
}

/// Rough duration estimate for a resolved plan.
///
/// Assumes `per_unit` per install and full pool utilization within each
/// wave; waves serialize, so each contributes its own rounds.
pub fn estimate_duration(waves: &[Wave], concurrency_limit: usize, per_unit: Duration) -> Duration {
    let limit = concurrency_limit.max(1);
    let rounds: u32 = waves
        .iter()
        .map(|wave| wave.len().div_ceil(limit) as u32)
        .sum();
    per_unit * rounds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::InstallAction;
    use crate::error::Result as SchedResult;
    use crate::types::{CommandOutput, UnitSpec};
    use std::sync::Arc;

    struct NoopAction;

    impl InstallAction for NoopAction {
        fn run(&self) -> SchedResult<CommandOutput> {
            Ok(CommandOutput::default())
        }

        fn describe(&self) -> String {
            "noop".to_string()
        }
    }

    fn unit(id: &str, deps: &[&str]) -> InstallUnit {
        InstallUnit::new(id, UnitSpec::new(id), Arc::new(NoopAction))
            .with_dependencies(deps.iter().copied())
    }

    #[test]
    fn test_no_deps_single_wave() {
        let units = vec![unit("b", &[]), unit("a", &[]), unit("c", &[])];
        let waves = resolve(&units).unwrap();
        assert_eq!(waves, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_diamond() {
        let units = vec![
            unit("base", &[]),
            unit("left", &["base"]),
            unit("right", &["base"]),
            unit("top", &["left", "right"]),
        ];
        let waves = resolve(&units).unwrap();
        assert_eq!(
            waves,
            vec![vec!["base"], vec!["left", "right"], vec!["top"]]
        );
    }

    #[test]
    fn test_every_dependency_in_earlier_wave() {
        let units = vec![
            unit("a", &[]),
            unit("b", &["a"]),
            unit("c", &["a", "b"]),
            unit("d", &[]),
            unit("e", &["d", "c"]),
        ];
        let waves = resolve(&units).unwrap();

        let wave_of = |id: &str| {
            waves
                .iter()
                .position(|w| w.iter().any(|u| u == id))
                .unwrap()
        };
        for u in &units {
            for dep in &u.depends_on {
                assert!(
                    wave_of(dep) < wave_of(&u.id),
                    "{dep} must be placed before {}",
                    u.id
                );
            }
        }
    }

    #[test]
    fn test_two_node_cycle_names_both() {
        let units = vec![unit("a", &["b"]), unit("b", &["a"])];
        let err = resolve(&units).unwrap_err();
        match err {
            Error::Cycle { members } => {
                assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_cycle_includes_downstream_units() {
        let units = vec![unit("a", &["b"]), unit("b", &["a"]), unit("c", &["a"])];
        let err = resolve(&units).unwrap_err();
        match err {
            Error::Cycle { members } => {
                assert!(members.contains(&"a".to_string()));
                assert!(members.contains(&"b".to_string()));
                assert!(members.contains(&"c".to_string()));
            }
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let units = vec![unit("a", &["a"])];
        assert!(matches!(resolve(&units), Err(Error::Cycle { .. })));
    }

    #[test]
    fn test_duplicate_id_is_not_a_cycle() {
        let units = vec![unit("git", &[]), unit("git", &[])];
        match resolve(&units).unwrap_err() {
            Error::DuplicateUnit { id } => assert_eq!(id, "git"),
            other => panic!("expected duplicate unit error, got {other}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let units = vec![unit("a", &["ghost"])];
        match resolve(&units).unwrap_err() {
            Error::UnknownDependency { unit, dependency } => {
                assert_eq!(unit, "a");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected unknown dependency error, got {other}"),
        }
    }

    #[test]
    fn test_deterministic_across_input_orders() {
        let forward = vec![unit("a", &[]), unit("b", &[]), unit("c", &["a"])];
        let backward = vec![unit("c", &["a"]), unit("b", &[]), unit("a", &[])];
        assert_eq!(resolve(&forward).unwrap(), resolve(&backward).unwrap());
    }

    #[test]
    fn test_graph_shape() {
        let units = vec![
            unit("a", &[]),
            unit("b", &[]),
            unit("c", &["a", "b"]),
        ];
        let waves = resolve(&units).unwrap();
        let shape = GraphShape::of(&waves);
        assert_eq!(shape.unit_count, 3);
        assert_eq!(shape.wave_count, 2);
        assert_eq!(shape.max_wave_width, 2);
    }

    #[test]
    fn test_estimate_duration() {
        let waves = vec![
            vec!["a".to_string(), "b".to_string(), "c".to_string()],
            vec!["d".to_string()],
        ];
        // Wave 1 needs two rounds at limit 2, wave 2 one round
        let estimate = estimate_duration(&waves, 2, Duration::from_secs(10));
        assert_eq!(estimate, Duration::from_secs(30));
    }
}
