use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
};

use serde_json::{json, Value};

use super::Command;
use crate::error::{DebuggerError, Result};
use crate::evaluation::{
    parse_descriptor, resolve_graph, EvaluationResult, EvaluationResultFactory, HandleTable,
    ResolveRoot, ResolvedGraph,
};
use crate::types::Handle;
use crate::wire::Response;

/// `lookup`: resolve a set of handles to evaluation results.
pub struct LookupCommand {
    handles: Vec<Handle>,
    factory: Arc<dyn EvaluationResultFactory>,
}

impl LookupCommand {
    /// Duplicate handles are dropped, keeping the order of first occurrence.
    pub fn new(
        factory: Arc<dyn EvaluationResultFactory>,
        handles: impl IntoIterator<Item = Handle>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        let handles: Vec<Handle> = handles
            .into_iter()
            .filter(|handle| seen.insert(*handle))
            .collect();
        if handles.is_empty() {
            return Err(DebuggerError::InvalidArgument(
                "lookup requires at least one handle".to_owned(),
            ));
        }
        Ok(Self { handles, factory })
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }
}

impl fmt::Debug for LookupCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LookupCommand")
            .field("handles", &self.handles)
            .finish_non_exhaustive()
    }
}

impl Command for LookupCommand {
    type Output = LookupResults;

    fn name(&self) -> &'static str {
        "lookup"
    }

    fn arguments(&self) -> Option<Value> {
        Some(json!({
            "handles": self.handles,
            "includeSource": false,
        }))
    }

    fn process_response(&self, response: &Response) -> Result<LookupResults> {
        let Value::Object(entries) = response.body()? else {
            return Err(DebuggerError::protocol("lookup body is not an object"));
        };

        // Referenced descriptors first so directly requested ones win on conflicts.
        let mut table = HandleTable::from_refs(response.refs()?)?;
        let mut in_body = HashSet::with_capacity(entries.len());
        for (key, raw) in entries {
            let handle: Handle = key.parse().map_err(|_| {
                DebuggerError::protocol(format!("lookup body key `{key}` is not a handle"))
            })?;
            let descriptor = parse_descriptor(raw, "lookup body entry")?;
            table.insert_as(handle, descriptor);
            in_body.insert(handle);
        }

        let roots: Vec<ResolveRoot> = self
            .handles
            .iter()
            .filter(|handle| in_body.contains(*handle))
            .map(|handle| ResolveRoot::new(*handle))
            .collect();
        let graph = resolve_graph(&roots, &table, self.factory.as_ref());

        let results = roots
            .iter()
            .filter_map(|root| {
                graph
                    .get(root.handle)
                    .map(|result| (root.handle, result.clone()))
            })
            .collect();

        Ok(LookupResults { results, graph })
    }
}

/// Output of [`LookupCommand`].
///
/// Only requested handles that the debuggee described appear in the result mapping; every
/// node reached while resolving them (requested or not) is available through
/// [`LookupResults::graph`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LookupResults {
    results: BTreeMap<Handle, EvaluationResult>,
    graph: ResolvedGraph,
}

impl LookupResults {
    pub fn get(&self, handle: Handle) -> Option<&EvaluationResult> {
        self.results.get(&handle)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.results.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Handle, &EvaluationResult)> {
        self.results.iter()
    }

    pub fn graph(&self) -> &ResolvedGraph {
        &self.graph
    }

    pub fn into_results(self) -> BTreeMap<Handle, EvaluationResult> {
        self.results
    }
}
