use std::collections::{HashMap, VecDeque};

use super::{ChildRef, EvaluationResult, EvaluationResultFactory, HandleTable, NodeVariable};
use crate::types::Handle;

/// Starting point of a graph walk.
#[derive(Debug, Clone)]
pub struct ResolveRoot {
    pub handle: Handle,
    pub name: Option<String>,
    pub expression: Option<String>,
}

impl ResolveRoot {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            name: None,
            expression: None,
        }
    }

    pub fn named(handle: Handle, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            handle,
            expression: Some(name.clone()),
            name: Some(name),
        }
    }
}

/// Every node reached while resolving one reply, keyed by handle.
///
/// Children are referenced by handle only, so cyclic debuggee graphs are represented without
/// ownership cycles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedGraph {
    nodes: HashMap<Handle, EvaluationResult>,
}

impl ResolvedGraph {
    pub fn get(&self, handle: Handle) -> Option<&EvaluationResult> {
        self.nodes.get(&handle)
    }

    /// The result a child reference points at, if the reply described it.
    pub fn resolve(&self, child: &ChildRef) -> Option<&EvaluationResult> {
        if !child.is_resolved() {
            return None;
        }
        self.nodes.get(&child.handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.nodes.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Handle, &EvaluationResult)> {
        self.nodes.iter()
    }
}

/// Breadth-first walk of the handle graph reachable from `roots`.
///
/// Each distinct handle present in `table` is turned into exactly one [`EvaluationResult`];
/// handles already visited are skipped, so self-references and cycles terminate. Roots missing
/// from `table` are silently left out.
pub fn resolve_graph(
    roots: &[ResolveRoot],
    table: &HandleTable,
    factory: &dyn EvaluationResultFactory,
) -> ResolvedGraph {
    let mut nodes: HashMap<Handle, EvaluationResult> = HashMap::new();
    let mut queue: VecDeque<ResolveRoot> = roots.iter().cloned().collect();

    while let Some(next) = queue.pop_front() {
        if nodes.contains_key(&next.handle) {
            continue;
        }
        let Some(descriptor) = table.get(next.handle) else {
            continue;
        };

        let result = factory.create(&NodeVariable {
            handle: next.handle,
            name: next.name.as_deref(),
            expression: next.expression.as_deref(),
            descriptor,
            table,
        });

        for child in &result.children {
            if child.is_resolved() && !nodes.contains_key(&child.handle) {
                queue.push_back(ResolveRoot {
                    handle: child.handle,
                    name: Some(child.name.clone()),
                    expression: child.expression.clone(),
                });
            }
        }
        nodes.insert(next.handle, result);
    }

    ResolvedGraph { nodes }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::evaluation::DefaultEvaluationResultFactory;

    #[derive(Default)]
    struct Counting {
        inner: DefaultEvaluationResultFactory,
        calls: AtomicUsize,
    }

    impl EvaluationResultFactory for Counting {
        fn create(&self, variable: &NodeVariable<'_>) -> EvaluationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.create(variable)
        }
    }

    #[test]
    fn cycles_terminate_with_one_call_per_handle() {
        let table = HandleTable::from_refs(&[
            json!({"handle":1,"type":"object","className":"Object","properties":[
                {"name":"next","ref":2},{"name":"self","ref":1}]}),
            json!({"handle":2,"type":"object","className":"Object","properties":[
                {"name":"prev","ref":1}]}),
        ])
        .unwrap();
        let factory = Counting::default();

        let graph = resolve_graph(&[ResolveRoot::named(Handle::new(1), "a")], &table, &factory);

        assert_eq!(graph.len(), 2);
        assert_eq!(factory.calls.load(Ordering::SeqCst), 2);
        let a = graph.get(Handle::new(1)).unwrap();
        let b = graph.resolve(&a.children[0]).unwrap();
        assert_eq!(b.expression.as_deref(), Some("a.next"));
        assert_eq!(graph.resolve(&b.children[0]).unwrap().handle, Handle::new(1));
    }

    #[test]
    fn missing_roots_and_children_are_skipped() {
        let table = HandleTable::from_refs(&[json!({"handle":5,"type":"object","properties":[
            {"name":"gone","ref":6}]})])
        .unwrap();
        let factory = Counting::default();

        let graph = resolve_graph(
            &[ResolveRoot::new(Handle::new(5)), ResolveRoot::new(Handle::new(7))],
            &table,
            &factory,
        );

        assert_eq!(graph.len(), 1);
        assert!(!graph.contains(Handle::new(7)));
        let root = graph.get(Handle::new(5)).unwrap();
        assert!(graph.resolve(&root.children[0]).is_none());
        assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    }
}
