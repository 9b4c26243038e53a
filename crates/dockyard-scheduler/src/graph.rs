//! Dependency graph between composition units.

use dockyard_core::{Error, Result, UnitKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Directed acyclic graph of units; an edge points from a unit to a
/// predecessor that must be provisioned first.
#[derive(Debug, Clone, Default)]
pub struct CompositionGraph {
    predecessors: BTreeMap<UnitKind, Vec<UnitKind>>,
}

impl CompositionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source, then Build, then Pipeline and Compute-Trigger side by side.
    pub fn standard() -> Self {
        let mut graph = Self::new();
        for kind in UnitKind::ALL {
            graph.add_unit(kind);
        }
        graph.add_dependency(UnitKind::Build, UnitKind::Source);
        graph.add_dependency(UnitKind::Pipeline, UnitKind::Build);
        graph.add_dependency(UnitKind::ComputeTrigger, UnitKind::Build);
        graph
    }

    pub fn add_unit(&mut self, kind: UnitKind) {
        self.predecessors.entry(kind).or_default();
    }

    /// Record that `unit` must not be provisioned before `predecessor`.
    pub fn add_dependency(&mut self, unit: UnitKind, predecessor: UnitKind) {
        let deps = self.predecessors.entry(unit).or_default();
        if !deps.contains(&predecessor) {
            deps.push(predecessor);
        }
    }

    pub fn units(&self) -> impl Iterator<Item = UnitKind> + '_ {
        self.predecessors.keys().copied()
    }

    pub fn contains(&self, kind: UnitKind) -> bool {
        self.predecessors.contains_key(&kind)
    }

    pub fn predecessors(&self, kind: UnitKind) -> &[UnitKind] {
        self.predecessors
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Units that directly depend on `kind`.
    pub fn dependents(&self, kind: UnitKind) -> Vec<UnitKind> {
        self.predecessors
            .iter()
            .filter(|(_, deps)| deps.contains(&kind))
            .map(|(unit, _)| *unit)
            .collect()
    }

    /// Every unit reachable through predecessor edges.
    pub fn transitive_predecessors(&self, kind: UnitKind) -> BTreeSet<UnitKind> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<UnitKind> = self.predecessors(kind).to_vec();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend_from_slice(self.predecessors(next));
            }
        }
        seen
    }

    /// Check the graph is provisionable.
    ///
    /// Every edge must point at a declared unit, the graph must be acyclic,
    /// and each unit's resolve-set must be covered by what its predecessors
    /// publish.
    pub fn validate(&self) -> Result<()> {
        for (unit, deps) in &self.predecessors {
            for dep in deps {
                if !self.contains(*dep) {
                    return Err(Error::InvalidInput(format!(
                        "unit '{}' depends on undeclared unit '{}'",
                        unit, dep
                    )));
                }
            }
        }

        self.detect_cycle().map_err(Error::CycleDetected)?;

        for unit in self.units() {
            let upstream = self.transitive_predecessors(unit);
            for name in unit.resolves() {
                let covered = upstream.iter().any(|p| p.publishes().contains(name));
                if !covered {
                    return Err(Error::InvalidInput(format!(
                        "unit '{}' resolves '{}' but none of its predecessors publishes it",
                        unit, name
                    )));
                }
            }
        }
        Ok(())
    }

    fn detect_cycle(&self) -> std::result::Result<(), String> {
        let mut visited = HashMap::new();
        let mut on_path = HashMap::new();
        for unit in self.units() {
            if !visited.contains_key(&unit) {
                if let Some(cycle) = self.dfs_detect_cycle(unit, &mut visited, &mut on_path) {
                    return Err(cycle);
                }
            }
        }
        Ok(())
    }

    fn dfs_detect_cycle(
        &self,
        node: UnitKind,
        visited: &mut HashMap<UnitKind, bool>,
        on_path: &mut HashMap<UnitKind, bool>,
    ) -> Option<String> {
        visited.insert(node, true);
        on_path.insert(node, true);

        for dep in self.predecessors(node) {
            if !visited.contains_key(dep) {
                if let Some(cycle) = self.dfs_detect_cycle(*dep, visited, on_path) {
                    return Some(cycle);
                }
            } else if on_path.get(dep).copied().unwrap_or(false) {
                return Some(format!("{} -> {}", node, dep));
            }
        }

        on_path.insert(node, false);
        None
    }

    /// Units with every predecessor ahead of them.
    pub fn topological_order(&self) -> Result<Vec<UnitKind>> {
        self.validate()?;
        let mut result = Vec::new();
        let mut visited = HashMap::new();
        for unit in self.units() {
            self.topo_visit(unit, &mut visited, &mut result);
        }
        Ok(result)
    }

    fn topo_visit(
        &self,
        node: UnitKind,
        visited: &mut HashMap<UnitKind, bool>,
        result: &mut Vec<UnitKind>,
    ) {
        if visited.get(&node).copied().unwrap_or(false) {
            return;
        }
        visited.insert(node, true);
        for dep in self.predecessors(node) {
            self.topo_visit(*dep, visited, result);
        }
        result.push(node);
    }

    /// Topological order grouped into waves.
    ///
    /// Units in the same wave have no path between them and may be
    /// provisioned concurrently; a wave starts only after the previous one
    /// has completed.
    pub fn waves(&self) -> Result<Vec<Vec<UnitKind>>> {
        let order = self.topological_order()?;
        let mut depth: HashMap<UnitKind, usize> = HashMap::new();
        let mut waves: Vec<Vec<UnitKind>> = Vec::new();
        for unit in order {
            let level = self
                .predecessors(unit)
                .iter()
                .filter_map(|p| depth.get(p))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(unit, level);
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(unit);
        }
        for wave in &mut waves {
            wave.sort();
        }
        Ok(waves)
    }

    /// Reverse of [`Self::topological_order`]: dependents go first.
    pub fn teardown_order(&self) -> Result<Vec<UnitKind>> {
        let mut order = self.topological_order()?;
        order.reverse();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_graph_is_valid() {
        assert!(CompositionGraph::standard().validate().is_ok());
    }

    #[test]
    fn test_standard_order() {
        let order = CompositionGraph::standard().topological_order().unwrap();
        let pos = |k| order.iter().position(|u| *u == k).unwrap();
        assert!(pos(UnitKind::Source) < pos(UnitKind::Build));
        assert!(pos(UnitKind::Build) < pos(UnitKind::Pipeline));
        assert!(pos(UnitKind::Build) < pos(UnitKind::ComputeTrigger));
    }

    #[test]
    fn test_standard_waves() {
        let waves = CompositionGraph::standard().waves().unwrap();
        assert_eq!(
            waves,
            vec![
                vec![UnitKind::Source],
                vec![UnitKind::Build],
                vec![UnitKind::Pipeline, UnitKind::ComputeTrigger],
            ]
        );
    }

    #[test]
    fn test_teardown_reverses() {
        let order = CompositionGraph::standard().teardown_order().unwrap();
        assert_eq!(order.last(), Some(&UnitKind::Source));
        let pos = |k| order.iter().position(|u| *u == k).unwrap();
        assert!(pos(UnitKind::Pipeline) < pos(UnitKind::Build));
        assert!(pos(UnitKind::ComputeTrigger) < pos(UnitKind::Build));
    }

    #[test]
    fn test_dependents() {
        let graph = CompositionGraph::standard();
        assert_eq!(
            graph.dependents(UnitKind::Build),
            vec![UnitKind::Pipeline, UnitKind::ComputeTrigger]
        );
        assert!(graph.dependents(UnitKind::Pipeline).is_empty());
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = CompositionGraph::standard();
        graph.add_dependency(UnitKind::Source, UnitKind::Pipeline);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, Error::CycleDetected(_)));
    }

    #[test]
    fn test_undeclared_predecessor() {
        let mut graph = CompositionGraph::new();
        graph.add_unit(UnitKind::Build);
        graph.predecessors.insert(UnitKind::Build, vec![UnitKind::Source]);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("undeclared")));
    }

    #[test]
    fn test_unsatisfied_resolve_set() {
        // Compute-Trigger hanging off Source cannot see the registry name.
        let mut graph = CompositionGraph::new();
        graph.add_unit(UnitKind::Source);
        graph.add_unit(UnitKind::ComputeTrigger);
        graph.add_dependency(UnitKind::ComputeTrigger, UnitKind::Source);
        let err = graph.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("ecrrepository")));
    }

    #[test]
    fn test_transitive_resolution_is_enough() {
        let graph = CompositionGraph::standard();
        let upstream = graph.transitive_predecessors(UnitKind::Pipeline);
        assert!(upstream.contains(&UnitKind::Source));
        assert!(upstream.contains(&UnitKind::Build));
    }
}
