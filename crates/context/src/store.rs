//! The per-run context store.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::{NodeRef, RunId, TokenId};
use weft_workflow::{Mapping, MergeConfig, ValueSchema};

use crate::error::ContextError;
use crate::merge;
use crate::path::ContextPath;

/// One recorded write, for trace and debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecord {
    /// The written path.
    pub path: String,
    /// The written value.
    pub value: Value,
    /// The token whose result caused the write. [`TokenId::default`]
    /// (sequence 0) marks writes made by the coordinator itself.
    pub writer: TokenId,
    /// When the write happened.
    pub at: DateTime<Utc>,
}

/// One sibling's captured output at a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchCapture {
    /// The sibling that produced the output.
    pub token: TokenId,
    /// Its position in the fan-out.
    pub branch_index: u32,
    /// The full action output.
    pub output: Value,
}

/// Structured per-run storage, laid out from the workflow's schemas.
///
/// All mutation goes through the dispatcher, which serializes callbacks
/// per run, so the store is a plain owned structure with no locking.
#[derive(Debug)]
pub struct ContextStore {
    run_id: RunId,
    input_schema: ValueSchema,
    output_schema: ValueSchema,
    input: Value,
    state: Value,
    output: Value,
    branches: IndexMap<NodeRef, Vec<BranchCapture>>,
    trace: Vec<WriteRecord>,
    initialized: bool,
}

impl ContextStore {
    /// Create an uninitialized store for a run.
    #[must_use]
    pub fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            input_schema: ValueSchema::Any,
            output_schema: ValueSchema::Any,
            input: Value::Null,
            state: Value::Null,
            output: Value::Null,
            branches: IndexMap::new(),
            trace: Vec::new(),
            initialized: false,
        }
    }

    /// The owning run.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Materialize the storage layout from the workflow's schemas.
    ///
    /// The `state` region is pre-populated with the context schema's
    /// default shape (declared arrays start empty, declared objects exist
    /// with null leaves). Idempotent per run: a second call is a no-op.
    pub fn initialize(
        &mut self,
        input_schema: ValueSchema,
        context_schema: &ValueSchema,
        output_schema: ValueSchema,
    ) {
        if self.initialized {
            return;
        }
        self.input_schema = input_schema;
        self.output_schema = output_schema;
        self.state = context_schema.default_value();
        self.output = Value::Object(serde_json::Map::new());
        self.initialized = true;
    }

    /// Validate the run input against the input schema and populate the
    /// immutable `input.*` region.
    pub fn initialize_with_input(&mut self, input: Value) -> Result<(), ContextError> {
        self.input_schema.validate(&input)?;
        self.record("input", input.clone(), TokenId::default());
        self.input = input;
        Ok(())
    }

    /// Read the value at a dotted path. `Ok(None)` means the path is
    /// syntactically fine but resolves to nothing.
    pub fn read(&self, path: &str) -> Result<Option<Value>, ContextError> {
        let parsed = ContextPath::parse(path)?;
        let resolved = match parsed.region() {
            "input" => navigate(&self.input, parsed.rest()),
            "state" => navigate(&self.state, parsed.rest()),
            "output" => navigate(&self.output, parsed.rest()),
            "_branches" => self.read_branch(parsed.rest()),
            _ => {
                return Err(ContextError::UnknownRegion {
                    path: path.to_owned(),
                });
            }
        };
        Ok(resolved.cloned())
    }

    /// Write a value at a dotted path in the `state` or `output` region.
    ///
    /// Last write wins for scalars; objects and arrays are replaced
    /// wholesale. Missing intermediate objects are created along the way.
    pub fn write(&mut self, path: &str, value: Value, writer: TokenId) -> Result<(), ContextError> {
        let parsed = ContextPath::parse(path)?;
        let root = match parsed.region() {
            "state" => &mut self.state,
            "output" => &mut self.output,
            "input" => {
                return Err(ContextError::ImmutableRegion {
                    path: path.to_owned(),
                });
            }
            "_branches" => {
                return Err(ContextError::Traversal {
                    path: path.to_owned(),
                    reason: "branch captures are written via capture_branch_output",
                });
            }
            _ => {
                return Err(ContextError::UnknownRegion {
                    path: path.to_owned(),
                });
            }
        };

        if parsed.rest().is_empty() {
            *root = value.clone();
        } else {
            let slot = navigate_mut(root, parsed.rest(), path)?;
            *slot = value.clone();
        }
        self.record(path, value, writer);
        Ok(())
    }

    /// Capture one sibling's output under `_branches.<node>.<token>`.
    ///
    /// Re-capturing for the same token replaces the previous capture, so
    /// re-applied dispatch batches do not duplicate contributions.
    pub fn capture_branch_output(
        &mut self,
        node_ref: &NodeRef,
        token: TokenId,
        branch_index: u32,
        output: Value,
    ) {
        let path = format!("_branches.{node_ref}.{token}");
        self.record(&path, output.clone(), token);

        let captures = self.branches.entry(node_ref.clone()).or_default();
        if let Some(existing) = captures.iter_mut().find(|c| c.token == token) {
            existing.output = output;
            existing.branch_index = branch_index;
        } else {
            captures.push(BranchCapture {
                token,
                branch_index,
                output,
            });
        }
    }

    /// All captured branch outputs for a node, ordered by `branch_index`.
    #[must_use]
    pub fn collect_branch_outputs(&self, node_ref: &NodeRef) -> Vec<(TokenId, Value)> {
        let mut captures: Vec<&BranchCapture> = self
            .branches
            .get(node_ref)
            .map(|v| v.iter().collect())
            .unwrap_or_default();
        captures.sort_by_key(|c| c.branch_index);
        captures
            .iter()
            .map(|c| (c.token, c.output.clone()))
            .collect()
    }

    /// Combine the contributors' captured outputs into the merge target.
    ///
    /// Contributions are taken in `branch_index` order regardless of the
    /// order tokens actually completed in.
    pub fn merge(
        &mut self,
        node_ref: &NodeRef,
        config: &MergeConfig,
        contributors: &[TokenId],
        writer: TokenId,
    ) -> Result<(), ContextError> {
        let mut contributions = Vec::with_capacity(contributors.len());
        for (token, output) in self.collect_branch_outputs(node_ref) {
            if !contributors.contains(&token) {
                continue;
            }
            let source = resolve_in_value(&output, &config.source)?.ok_or_else(|| {
                ContextError::MissingValue {
                    path: format!("_branches.{node_ref}.{token}.{}", config.source),
                }
            })?;
            contributions.push((token, source));
        }

        let existing = self.read(&config.target)?;
        let merged = merge::apply(config.strategy, &config.target, existing, &contributions)?;
        self.write(&config.target, merged, writer)
    }

    /// Evaluate the workflow-level output mapping and validate the result
    /// against the output schema.
    ///
    /// The mapping's entries overlay whatever terminal-node output
    /// mappings already wrote into the `output` region.
    pub fn extract_output(&self, mapping: &Mapping) -> Result<Value, ContextError> {
        let mut out = match &self.output {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_owned(), other.clone());
                map
            }
        };

        for (target, source) in mapping.iter() {
            let value = self
                .read(source)?
                .ok_or_else(|| ContextError::MissingValue {
                    path: source.to_owned(),
                })?;
            out.insert(target.to_owned(), value);
        }

        let result = Value::Object(out);
        self.output_schema.validate(&result)?;
        Ok(result)
    }

    /// A point-in-time snapshot of the externally visible regions.
    #[must_use]
    pub fn snapshot(&self) -> Value {
        serde_json::json!({
            "input": self.input,
            "state": self.state,
            "output": self.output,
        })
    }

    /// The write trace, in write order.
    #[must_use]
    pub fn trace(&self) -> &[WriteRecord] {
        &self.trace
    }

    fn read_branch(&self, rest: &[String]) -> Option<&Value> {
        let node_ref = NodeRef::new(rest.first()?.clone());
        let token: u64 = rest.get(1)?.parse().ok()?;
        let capture = self
            .branches
            .get(&node_ref)?
            .iter()
            .find(|c| c.token == TokenId::new(token))?;
        navigate(&capture.output, &rest[2..])
    }

    fn record(&mut self, path: &str, value: Value, writer: TokenId) {
        self.trace.push(WriteRecord {
            path: path.to_owned(),
            value,
            writer,
            at: Utc::now(),
        });
    }
}

/// Walk `segments` down a value tree. Numeric segments index arrays.
fn navigate<'v>(mut value: &'v Value, segments: &[String]) -> Option<&'v Value> {
    for segment in segments {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// Walk `segments` down a value tree for writing, creating intermediate
/// objects where nothing exists yet.
fn navigate_mut<'v>(
    mut value: &'v mut Value,
    segments: &[String],
    full_path: &str,
) -> Result<&'v mut Value, ContextError> {
    for (depth, segment) in segments.iter().enumerate() {
        let last = depth + 1 == segments.len();
        // A null slot (materialized scalar default or unwritten leaf)
        // becomes an object the moment a write traverses it.
        if value.is_null() {
            *value = Value::Object(serde_json::Map::new());
        }
        value = match value {
            Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
            Value::Array(items) => {
                let index = segment.parse::<usize>().map_err(|_| ContextError::Traversal {
                    path: full_path.to_owned(),
                    reason: "non-numeric segment into an array",
                })?;
                items.get_mut(index).ok_or(ContextError::Traversal {
                    path: full_path.to_owned(),
                    reason: "array index out of bounds",
                })?
            }
            _ => {
                return Err(ContextError::Traversal {
                    path: full_path.to_owned(),
                    reason: "cannot traverse through a scalar",
                });
            }
        };
        if last {
            return Ok(value);
        }
    }
    Ok(value)
}

/// Resolve a dotted path *relative to a value* (merge sources, output
/// mapping sources). The empty path selects the whole value.
pub fn resolve_in_value(value: &Value, raw: &str) -> Result<Option<Value>, ContextError> {
    if raw.is_empty() {
        return Ok(Some(value.clone()));
    }
    let parsed = ContextPath::parse(raw)?;
    Ok(navigate(value, parsed.segments()).cloned())
}
