//! Error types for blueprint operations

use thiserror::Error;

use crate::error::ErrorKind;
use crate::store::{Id, StoreError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlueprintError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Caller is neither owner, organization member nor admin
    #[error("Not authorized to access {entity} {id}")]
    Unauthorized { entity: &'static str, id: Id },

    /// Caller is not a member of the organization
    #[error("Not a member of organization {0}")]
    NotMember(Id),

    /// Input definition belongs to another blueprint
    #[error("Input definition {input_definition_id} does not belong to blueprint {blueprint_id}")]
    ForeignInputDefinition {
        blueprint_id: Id,
        input_definition_id: Id,
    },

    /// Blueprint has no output definition yet
    #[error("Blueprint {0} has no output definition")]
    MissingOutputDefinition(Id),

    /// Blueprint already has an output definition
    #[error("Blueprint {0} already has an output definition")]
    DuplicateOutputDefinition(Id),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Background evaluation task failed
    #[error("Batch task failed: {0}")]
    Task(String),
}

pub type BlueprintResult<T> = Result<T, BlueprintError>;

impl BlueprintError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BlueprintError::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            BlueprintError::Store(StoreError::Poisoned(_)) | BlueprintError::Task(_) => {
                ErrorKind::Internal
            }
            BlueprintError::Unauthorized { .. } | BlueprintError::NotMember(_) => {
                ErrorKind::Unauthorized
            }
            BlueprintError::ForeignInputDefinition { .. }
            | BlueprintError::MissingOutputDefinition(_)
            | BlueprintError::DuplicateOutputDefinition(_)
            | BlueprintError::InvalidInput(_) => ErrorKind::BadRequest,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            BlueprintError::MissingOutputDefinition(id) => format!(
                "Blueprint {id} has no output definition\n\nHint: Define the target schema before applying mappings."
            ),
            BlueprintError::DuplicateOutputDefinition(id) => format!(
                "Blueprint {id} already has an output definition\n\nHint: Update the existing output definition instead."
            ),
            BlueprintError::ForeignInputDefinition {
                blueprint_id,
                input_definition_id,
            } => format!(
                "Input definition {input_definition_id} is not part of blueprint {blueprint_id}\n\nHint: List the blueprint's input definitions to pick a valid one."
            ),
            BlueprintError::Unauthorized { entity, id } => {
                format!("You do not have access to {entity} {id}.")
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let missing: BlueprintError = StoreError::NotFound {
            entity: "blueprint",
            id: 2,
        }
        .into();
        assert_eq!(missing.kind(), ErrorKind::NotFound);
        assert_eq!(missing.to_string(), "blueprint 2 not found");
        assert_eq!(
            BlueprintError::MissingOutputDefinition(1).kind(),
            ErrorKind::BadRequest
        );
        assert!(
            BlueprintError::MissingOutputDefinition(1)
                .user_message()
                .contains("Hint:")
        );
    }
}
