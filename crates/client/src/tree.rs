//! Context tree for navigation

use shotdiff_common::{ScenarioKey, ScenarioStatus};

use crate::registry::Scenario;

/// Minimum query length before filtering applies
pub const MIN_QUERY_LEN: usize = 2;

/// Navigation summary of one scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioEntry {
    pub key: ScenarioKey,
    pub has_diff: bool,
    pub status: ScenarioStatus,
}

impl From<&Scenario> for ScenarioEntry {
    fn from(scenario: &Scenario) -> Self {
        Self {
            key: scenario.key().clone(),
            has_diff: scenario.has_diff,
            status: scenario.status,
        }
    }
}

/// A context and the scenarios declared in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextNode {
    pub name: String,
    pub scenarios: Vec<ScenarioEntry>,
}

impl ContextNode {
    /// A context differs when any of its scenarios does
    pub fn has_diff(&self) -> bool {
        self.scenarios.iter().any(|s| s.has_diff)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Context(ContextNode),
    Scenario(ScenarioEntry),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Context(node) => &node.name,
            TreeNode::Scenario(entry) => &entry.key.name,
        }
    }

    pub fn has_diff(&self) -> bool {
        match self {
            TreeNode::Context(node) => node.has_diff(),
            TreeNode::Scenario(entry) => entry.has_diff,
        }
    }

    pub fn is_context(&self) -> bool {
        matches!(self, TreeNode::Context(_))
    }
}

/// Scenarios grouped by context; root scenarios are top-level leaves
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextTree {
    pub nodes: Vec<TreeNode>,
}

impl ContextTree {
    /// Group scenarios, keeping first-appearance order of contexts
    pub fn build<'a>(scenarios: impl IntoIterator<Item = &'a Scenario>) -> Self {
        let mut nodes: Vec<TreeNode> = Vec::new();
        for scenario in scenarios {
            let entry = ScenarioEntry::from(scenario);
            let Some(context) = scenario.context() else {
                nodes.push(TreeNode::Scenario(entry));
                continue;
            };
            let existing = nodes.iter_mut().find_map(|node| match node {
                TreeNode::Context(c) if c.name == context => Some(c),
                _ => None,
            });
            match existing {
                Some(node) => node.scenarios.push(entry),
                None => nodes.push(TreeNode::Context(ContextNode {
                    name: context.to_string(),
                    scenarios: vec![entry],
                })),
            }
        }
        Self { nodes }
    }

    /// Sort top-level nodes and each context's scenarios for display
    pub fn sorted(mut self) -> Self {
        sort_nodes(&mut self.nodes);
        for node in &mut self.nodes {
            if let TreeNode::Context(context) = node {
                context.scenarios.sort_by(|a, b| {
                    b.has_diff
                        .cmp(&a.has_diff)
                        .then_with(|| a.key.name.cmp(&b.key.name))
                });
            }
        }
        self
    }
}

/// Failing nodes first, then contexts before scenarios, then by name
pub fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| {
        b.has_diff()
            .cmp(&a.has_diff())
            .then_with(|| b.is_context().cmp(&a.is_context()))
            .then_with(|| a.name().cmp(b.name()))
    });
}

/// Order scenarios by context, then name; root scenarios first
pub fn sort_scenarios(scenarios: &mut [&Scenario]) {
    scenarios.sort_by(|a, b| (a.context(), a.name()).cmp(&(b.context(), b.name())));
}

/// Scenarios whose name contains `query`, ignoring case.
///
/// Queries shorter than [`MIN_QUERY_LEN`] characters match everything.
pub fn filter_scenarios<'a>(scenarios: &'a [Scenario], query: &str) -> Vec<&'a Scenario> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return scenarios.iter().collect();
    }
    let needle = query.to_lowercase();
    scenarios
        .iter()
        .filter(|s| s.name().to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use shotdiff_common::ScenarioOptions;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register("Logo", || "<img>".to_string(), ScenarioOptions::default()).unwrap();
        registry
            .context("Modal", |scope| {
                scope.register("Open", || "<dialog open>".to_string(), ScenarioOptions::default())?;
                scope.register("Closed", || "<dialog>".to_string(), ScenarioOptions::default())?;
                Ok(())
            })
            .unwrap();
        registry
            .context("Button", |scope| {
                scope.register("Primary", || "<button>".to_string(), ScenarioOptions::default())?;
                Ok(())
            })
            .unwrap();
        registry.register("Avatar", || "<img>".to_string(), ScenarioOptions::default()).unwrap();
        registry
    }

    fn names(tree: &ContextTree) -> Vec<&str> {
        tree.nodes.iter().map(TreeNode::name).collect()
    }

    #[test]
    fn test_build_groups_by_context() {
        let registry = registry();
        let tree = ContextTree::build(registry.scenarios());
        assert_eq!(names(&tree), vec!["Logo", "Modal", "Button", "Avatar"]);
        match &tree.nodes[1] {
            TreeNode::Context(node) => assert_eq!(node.scenarios.len(), 2),
            other => panic!("expected context, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_failing_then_contexts_then_name() {
        let mut registry = registry();
        registry.lookup_mut(&ScenarioKey::new("Closed", Some("Modal"))).unwrap().has_diff = true;
        registry.lookup_mut(&ScenarioKey::root("Logo")).unwrap().has_diff = true;

        let tree = ContextTree::build(registry.scenarios()).sorted();
        assert_eq!(names(&tree), vec!["Modal", "Logo", "Button", "Avatar"]);
        match &tree.nodes[0] {
            TreeNode::Context(node) => {
                assert!(node.has_diff());
                assert_eq!(node.scenarios[0].key.name, "Closed");
            }
            other => panic!("expected context, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_scenarios_by_context_and_name() {
        let registry = registry();
        let mut scenarios: Vec<&Scenario> = registry.scenarios().iter().collect();
        sort_scenarios(&mut scenarios);
        let keys: Vec<String> = scenarios.iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["Avatar", "Logo", "Button Primary", "Modal Closed", "Modal Open"]);
    }

    #[test]
    fn test_filter_needs_two_characters() {
        let registry = registry();
        assert_eq!(filter_scenarios(registry.scenarios(), "o").len(), 5);

        let found: Vec<&str> = filter_scenarios(registry.scenarios(), "OP")
            .into_iter()
            .map(Scenario::name)
            .collect();
        assert_eq!(found, vec!["Open"]);
        assert!(filter_scenarios(registry.scenarios(), "zz").is_empty());
    }
}
