//! Dependency graph analysis.
//!
//! Runs once, inside `RegistryBuilder::build()`, before any container
//! exists:
//! - **Validation** collects every missing provider, scope violation and
//!   bad alias instead of stopping at the first one.
//! - **Cycle annotation** finds strongly connected components (Tarjan) and
//!   marks each edge that lies on a cycle, so containers know ahead of
//!   time which deferred dependencies must be bound late.

use std::collections::{HashMap, HashSet};

use tracing::{debug, instrument, warn};

use crate::error::{
    ConfigurationProblem, CycleHop, NotRegisteredError, ScopeViolationError,
    UnbindableCycleError,
};
use crate::key::DependencyKey;
use crate::provider::{Dependency, Edge};
use crate::scope::Scope;

/// What validation needs to know about one registration.
#[derive(Debug, Clone)]
pub(crate) struct DependencyInfo {
    pub key: DependencyKey,
    pub scope: Scope,
    pub dependencies: Vec<Dependency>,
}

/// Result of cycle analysis over a valid graph.
#[derive(Debug, Default)]
pub(crate) struct GraphAnalysis {
    component: HashMap<DependencyKey, usize>,
}

impl GraphAnalysis {
    /// Whether the edge `consumer -> dependency` lies on a cycle.
    pub fn is_cyclic(&self, consumer: &DependencyKey, dependency: &DependencyKey) -> bool {
        match (self.component.get(consumer), self.component.get(dependency)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

pub(crate) struct GraphValidator<'a> {
    nodes: &'a HashMap<DependencyKey, DependencyInfo>,
    aliases: &'a HashMap<DependencyKey, DependencyKey>,
}

impl<'a> GraphValidator<'a> {
    pub fn new(
        nodes: &'a HashMap<DependencyKey, DependencyInfo>,
        aliases: &'a HashMap<DependencyKey, DependencyKey>,
    ) -> Self {
        Self { nodes, aliases }
    }

    /// The registered key that satisfies `key`, following one alias hop.
    pub fn canonical(&self, key: &DependencyKey) -> Option<DependencyKey> {
        if self.nodes.contains_key(key) {
            return Some(*key);
        }
        self.aliases
            .get(key)
            .filter(|target| self.nodes.contains_key(target))
            .copied()
    }

    /// Registration order is not kept, so sort for stable reports.
    fn sorted_nodes(&self) -> Vec<&'a DependencyInfo> {
        let mut nodes: Vec<&DependencyInfo> = self.nodes.values().collect();
        nodes.sort_by_key(|info| (info.key.type_name(), info.key.name()));
        nodes
    }

    fn successors(&self, key: &DependencyKey) -> impl Iterator<Item = (DependencyKey, Edge)> + '_ {
        self.nodes
            .get(key)
            .into_iter()
            .flat_map(|info| info.dependencies.iter())
            .filter_map(|dep| self.canonical(&dep.key).map(|target| (target, dep.edge)))
    }

    /// Collects every configuration problem in the graph.
    #[instrument(skip(self), name = "graph_validation")]
    pub fn validate(&self) -> Vec<ConfigurationProblem> {
        let mut problems = Vec::new();

        let mut aliases: Vec<(&DependencyKey, &DependencyKey)> = self.aliases.iter().collect();
        aliases.sort_by_key(|(alias, _)| (alias.type_name(), alias.name()));
        for (alias, target) in aliases {
            if self.nodes.contains_key(alias) {
                problems.push(ConfigurationProblem::DuplicateProvider { key: *alias });
            } else if !self.nodes.contains_key(target) {
                problems.push(ConfigurationProblem::MissingProvider(NotRegisteredError::new(
                    *target,
                    Some(*alias),
                    self.nodes.keys(),
                )));
            } else if !alias.same_type(target) {
                problems.push(ConfigurationProblem::AliasMismatch { alias: *alias, target: *target });
            }
        }

        for consumer in self.sorted_nodes() {
            for dep in &consumer.dependencies {
                let Some(target) = self.canonical(&dep.key) else {
                    problems.push(ConfigurationProblem::MissingProvider(NotRegisteredError::new(
                        dep.key,
                        Some(consumer.key),
                        self.nodes.keys(),
                    )));
                    continue;
                };

                let dependency = &self.nodes[&target];
                if dependency.scope > consumer.scope {
                    problems.push(ConfigurationProblem::ScopeViolation(ScopeViolationError {
                        consumer: consumer.key,
                        consumer_scope: consumer.scope,
                        dependency: dep.key,
                        dependency_scope: dependency.scope,
                    }));
                }
            }
        }

        debug!(problems = problems.len(), "Dependency graph validated");
        problems
    }

    /// Annotates cycles. Call on a graph that passed
    /// [`validate`](GraphValidator::validate).
    pub fn analyze(&self) -> GraphAnalysis {
        let mut tarjan = Tarjan::new(self);
        for info in self.sorted_nodes() {
            if !tarjan.index.contains_key(&info.key) {
                tarjan.visit(info.key);
            }
        }

        let cyclic = tarjan.cyclic_components.len();
        if cyclic > 0 {
            debug!(components = cyclic, "Dependency cycles found");
        }

        GraphAnalysis { component: tarjan.component }
    }

    /// Cycles made only of eager edges. No placeholder can break them.
    pub fn eager_cycles(&self, analysis: &GraphAnalysis) -> Vec<UnbindableCycleError> {
        let mut search = EagerCycleSearch {
            graph: self,
            analysis,
            visiting: HashSet::new(),
            done: HashSet::new(),
            path: Vec::new(),
            found: Vec::new(),
        };

        for info in self.sorted_nodes() {
            search.visit(info.key);
        }

        search.found
    }
}

/// Tarjan's strongly connected components.
struct Tarjan<'g, 'a> {
    graph: &'g GraphValidator<'a>,
    next_index: usize,
    index: HashMap<DependencyKey, usize>,
    lowlink: HashMap<DependencyKey, usize>,
    stack: Vec<DependencyKey>,
    on_stack: HashSet<DependencyKey>,
    /// Component id for every key that lies on a cycle.
    component: HashMap<DependencyKey, usize>,
    cyclic_components: Vec<Vec<DependencyKey>>,
}

impl<'g, 'a> Tarjan<'g, 'a> {
    fn new(graph: &'g GraphValidator<'a>) -> Self {
        Self {
            graph,
            next_index: 0,
            index: HashMap::new(),
            lowlink: HashMap::new(),
            stack: Vec::new(),
            on_stack: HashSet::new(),
            component: HashMap::new(),
            cyclic_components: Vec::new(),
        }
    }

    fn visit(&mut self, key: DependencyKey) {
        self.index.insert(key, self.next_index);
        self.lowlink.insert(key, self.next_index);
        self.next_index += 1;
        self.stack.push(key);
        self.on_stack.insert(key);

        let successors: Vec<DependencyKey> = self.graph.successors(&key).map(|(k, _)| k).collect();
        let mut self_loop = false;
        for next in successors {
            self_loop |= next == key;
            if !self.index.contains_key(&next) {
                self.visit(next);
                let low = self.lowlink[&key].min(self.lowlink[&next]);
                self.lowlink.insert(key, low);
            } else if self.on_stack.contains(&next) {
                let low = self.lowlink[&key].min(self.index[&next]);
                self.lowlink.insert(key, low);
            }
        }

        if self.lowlink[&key] != self.index[&key] {
            return;
        }

        let mut members = Vec::new();
        while let Some(member) = self.stack.pop() {
            self.on_stack.remove(&member);
            members.push(member);
            if member == key {
                break;
            }
        }

        if members.len() > 1 || self_loop {
            let id = self.cyclic_components.len();
            for member in &members {
                self.component.insert(*member, id);
            }
            self.cyclic_components.push(members);
        }
    }
}

/// Depth-first search over cyclic eager edges, recording the path to
/// report each cycle it closes.
struct EagerCycleSearch<'g, 'a> {
    graph: &'g GraphValidator<'a>,
    analysis: &'g GraphAnalysis,
    visiting: HashSet<DependencyKey>,
    done: HashSet<DependencyKey>,
    path: Vec<DependencyKey>,
    found: Vec<UnbindableCycleError>,
}

impl EagerCycleSearch<'_, '_> {
    fn visit(&mut self, key: DependencyKey) {
        if self.done.contains(&key) {
            return;
        }

        if self.visiting.contains(&key) {
            let start = self.path.iter().position(|k| *k == key).unwrap_or(0);
            let mut chain: Vec<DependencyKey> = self.path[start..].to_vec();
            chain.push(key);
            warn!(cycle = ?chain, "Eager dependency cycle");

            let path = chain
                .into_iter()
                .map(|k| CycleHop {
                    key: k,
                    scope: self.graph.nodes.get(&k).map_or(Scope::App, |info| info.scope),
                    deferred: false,
                })
                .collect();
            self.found.push(UnbindableCycleError { path });
            return;
        }

        self.visiting.insert(key);
        self.path.push(key);

        let eager: Vec<DependencyKey> = self
            .graph
            .successors(&key)
            .filter(|(next, edge)| *edge == Edge::Eager && self.analysis.is_cyclic(&key, next))
            .map(|(next, _)| next)
            .collect();
        for next in eager {
            self.visit(next);
        }

        self.path.pop();
        self.visiting.remove(&key);
        self.done.insert(key);
    }
}
