//! Operation registry: routes task text to the first matching operation.
//!
//! Entries are evaluated in registration order. A task containing two
//! keywords always resolves to the earlier-registered operation.

use serde::Serialize;
use tracing::debug;

use super::Operation;

/// Public description of a registered operation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationDescriptor {
    pub name: String,
    pub keyword: String,
    pub description: String,
}

pub struct OperationRegistry {
    operations: Vec<Box<dyn Operation>>,
    case_insensitive: bool,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            case_insensitive: false,
        }
    }

    /// Matches keywords regardless of case when `enabled`.
    pub fn with_case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    /// Appends an operation. Later registrations lose ties to earlier ones.
    pub fn register(&mut self, operation: Box<dyn Operation>) {
        debug!(
            "Registered operation {} (keyword: {:?})",
            operation.name(),
            operation.keyword()
        );
        self.operations.push(operation);
    }

    /// Returns the first operation whose keyword occurs in `task`, or `None`.
    pub fn dispatch(&self, task: &str) -> Option<&dyn Operation> {
        let lowered;
        let haystack = if self.case_insensitive {
            lowered = task.to_lowercase();
            lowered.as_str()
        } else {
            task
        };

        self.operations
            .iter()
            .find(|op| {
                if self.case_insensitive {
                    haystack.contains(&op.keyword().to_lowercase())
                } else {
                    haystack.contains(op.keyword())
                }
            })
            .map(|op| op.as_ref())
    }

    /// Registered operations in routing order.
    pub fn descriptors(&self) -> Vec<OperationDescriptor> {
        self.operations
            .iter()
            .map(|op| OperationDescriptor {
                name: op.name().to_string(),
                keyword: op.keyword().to_string(),
                description: op.description().to_string(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
