use thiserror::Error;
use weft_model::{Requirement, Resource};

pub type Result<T> = std::result::Result<T, ResolutionError>;

/// Why a resolve failed. The resolver either returns a complete wire map or
/// exactly one of these; there are no partial results.
#[derive(Error, Debug, Clone)]
pub enum ResolutionError {
    #[error("Unable to resolve {resource}: missing requirement {requirement}")]
    MissingRequirement {
        resource: Resource,
        requirement: Requirement,
        #[source]
        cause: Option<Box<ResolutionError>>,
    },

    #[error("Cycle detected in fragment attachment involving {resource}")]
    FragmentCycle { resource: Resource },

    #[error("Fragment {resource} was not selected for attachment")]
    FragmentNotSelected { resource: Resource },

    #[error("{resource} was invalidated after an earlier failed attempt")]
    InvalidatedResource { resource: Resource },

    #[error("{message}")]
    UsesConflict {
        message: String,
        requirements: Vec<Requirement>,
    },

    #[error(
        "Resource {resource} cannot dynamically import package '{package}' since it already has access to it"
    )]
    DynamicImportShadowed { resource: Resource, package: String },

    #[error("Dynamic resolve requires package-namespace candidates")]
    InvalidDynamicRequirement,

    #[error("Resolve cancelled")]
    Cancelled,
}

impl ResolutionError {
    /// The requirements at the root of the failure, as cited by the
    /// diagnostic. Empty when the failure has no single culprit.
    pub fn root_requirements(&self) -> Vec<Requirement> {
        match self {
            ResolutionError::MissingRequirement { requirement, .. } => vec![requirement.clone()],
            ResolutionError::UsesConflict { requirements, .. } => requirements.clone(),
            _ => Vec::new(),
        }
    }
}
