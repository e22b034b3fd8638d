//! Turning debuggee handles into caller-facing evaluation results.
//!
//! Resolution of one reply goes through three steps:
//!
//! 1. Every descriptor in the reply (directly requested values and the `refs` collection) is
//!    merged into a [`HandleTable`]. The table lives only as long as the reply is processed:
//!    handle meanings change whenever the debuggee resumes.
//! 2. [`resolve_graph`] walks the handle graph from the requested roots, breadth first, visiting
//!    each handle at most once. Cyclic object graphs therefore terminate.
//! 3. For each visited node an [`EvaluationResultFactory`] builds an immutable
//!    [`EvaluationResult`]. Composite results refer to their children by handle
//!    ([`ChildRef`]) instead of owning them.

mod descriptor;
mod factory;
mod resolve;
mod result;
mod table;

pub use descriptor::{PropertyDescriptor, PropertyName, RawVariableDescriptor};
pub use factory::{DefaultEvaluationResultFactory, EvaluationResultFactory, NodeVariable};
pub use resolve::{resolve_graph, ResolveRoot, ResolvedGraph};
pub use result::{ChildRef, ChildResolution, EvaluationOutcome, EvaluationResult, ValueType};
pub use table::HandleTable;

pub(crate) use table::parse_descriptor;
