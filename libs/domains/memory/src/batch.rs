//! Best-effort execution of heterogeneous SofIA operations.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::error::{MemoryError, MemoryResult};
use crate::filter::MetadataFilter;
use crate::models::{ItemPatch, MessageResponse, Metadata, NewItem};
use crate::service::{MemoryService, Origin};

/// Default `n_results` for `query` operations.
pub const DEFAULT_N_RESULTS: usize = 5;

const UNKNOWN_TYPE: &str = "unknown";

/// Batch request body: either `{"operations": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BatchBody {
    Wrapped(BatchRequest),
    Bare(Vec<Value>),
}

impl BatchBody {
    pub fn into_operations(self) -> Vec<Value> {
        match self {
            BatchBody::Wrapped(request) => request.operations,
            BatchBody::Bare(operations) => operations,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BatchRequest {
    /// Operations are kept as raw JSON so a malformed entry fails alone.
    #[schema(value_type = Vec<Object>)]
    pub operations: Vec<Value>,
}

/// Wire shape of one operation.
#[derive(Debug, Default, Deserialize)]
struct OperationSpec {
    #[serde(rename = "type")]
    op_type: Option<String>,
    collection: Option<String>,
    id: Option<String>,
    text: Option<String>,
    query: Option<String>,
    metadata: Option<Metadata>,
    n_results: Option<usize>,
    filter: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationResult {
    pub operation_index: usize,
    pub success: bool,
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OperationError {
    pub operation_index: usize,
    #[serde(rename = "type")]
    pub op_type: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchReport {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub results: Vec<OperationResult>,
    pub errors: Vec<OperationError>,
}

/// Collects one result per operation. There is no early exit.
#[derive(Debug, Default)]
struct BatchAccumulator {
    results: Vec<OperationResult>,
}

impl BatchAccumulator {
    fn record(&mut self, op_type: String, outcome: MemoryResult<Value>) {
        let operation_index = self.results.len();
        let result = match outcome {
            Ok(data) => OperationResult {
                operation_index,
                success: true,
                op_type,
                data: Some(data),
                error: None,
            },
            Err(err) => OperationResult {
                operation_index,
                success: false,
                op_type,
                data: None,
                error: Some(err.to_string()),
            },
        };
        self.results.push(result);
    }

    fn finish(self) -> BatchReport {
        let errors: Vec<OperationError> = self
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| OperationError {
                operation_index: r.operation_index,
                op_type: r.op_type.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect();

        BatchReport {
            total_operations: self.results.len(),
            successful_operations: self.results.len() - errors.len(),
            failed_operations: errors.len(),
            results: self.results,
            errors,
        }
    }
}

fn type_of(raw: &Value) -> String {
    raw.get("type")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_TYPE)
        .to_string()
}

fn parse(raw: Value) -> (String, MemoryResult<(String, OperationSpec)>) {
    if !raw.is_object() {
        return (
            UNKNOWN_TYPE.to_string(),
            Err(MemoryError::validation("operation must be a JSON object")),
        );
    }

    let op_type = type_of(&raw);
    let spec = serde_json::from_value::<OperationSpec>(raw)
        .map_err(|e| MemoryError::validation(format!("invalid operation: {e}")))
        .and_then(|mut spec| match spec.op_type.take() {
            Some(t) => Ok((t, spec)),
            None => Err(MemoryError::validation("operation type is required")),
        });
    (op_type, spec)
}

fn required(value: Option<String>, op: &str, field: &str) -> MemoryResult<String> {
    value.ok_or_else(|| MemoryError::validation(format!("'{op}' requires '{field}'")))
}

impl MemoryService {
    /// Runs every operation in order; a failure is recorded and the next one runs.
    #[instrument(skip(self, operations), fields(total = operations.len()))]
    pub async fn run_batch(&self, operations: Vec<Value>) -> BatchReport {
        let mut accumulator = BatchAccumulator::default();

        for raw in operations {
            let (op_type, parsed) = parse(raw);
            let outcome = match parsed {
                Ok((op_type, spec)) => self.dispatch(&op_type, spec).await,
                Err(err) => Err(err),
            };
            accumulator.record(op_type, outcome);
        }

        let report = accumulator.finish();
        info!(
            total = report.total_operations,
            successful = report.successful_operations,
            failed = report.failed_operations,
            "batch processed"
        );
        report
    }

    async fn dispatch(&self, op_type: &str, spec: OperationSpec) -> MemoryResult<Value> {
        let default_collection = || self.registry().default_collection().to_string();

        match op_type {
            "store" => {
                let collection = spec.collection.unwrap_or_else(default_collection);
                let mut input = NewItem::new(required(spec.text, op_type, "text")?)
                    .with_metadata(spec.metadata.unwrap_or_default());
                input.id = spec.id;
                let item = self.store(&collection, input, Origin::SofiaBatch).await?;
                Ok(serde_json::to_value(item)?)
            }
            "query" => {
                let collection = spec.collection.unwrap_or_else(default_collection);
                let text = required(spec.query.or(spec.text), op_type, "query")?;
                let filter = MetadataFilter::equals_all(spec.filter.unwrap_or_default());
                let result = self
                    .query(
                        &collection,
                        &text,
                        spec.n_results.unwrap_or(DEFAULT_N_RESULTS),
                        &filter,
                    )
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            "update" => {
                let collection = required(spec.collection, op_type, "collection")?;
                let id = required(spec.id, op_type, "id")?;
                let patch = ItemPatch {
                    text: spec.text,
                    metadata: spec.metadata,
                };
                let item = self
                    .update(&collection, &id, patch, Origin::SofiaBatch)
                    .await?;
                Ok(serde_json::to_value(item)?)
            }
            "delete" => {
                let collection = required(spec.collection, op_type, "collection")?;
                let id = required(spec.id, op_type, "id")?;
                self.delete(&collection, &id).await?;
                Ok(serde_json::to_value(MessageResponse::deleted(&collection, &id))?)
            }
            other => Err(MemoryError::UnsupportedOperation(other.to_string())),
        }
    }
}
