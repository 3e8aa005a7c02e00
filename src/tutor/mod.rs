//! The tutoring core: session state, problems, concept material, the
//! dispatch policy and the console runtime that drives it.

pub mod concepts;
pub mod context;
pub mod memory;
pub mod policy;
pub mod problems;
pub mod prompts;
pub mod review;
pub mod rules;
pub mod runtime;

pub use memory::InMemoryStore;
pub use policy::Tutor;
pub use problems::Catalog;
pub use runtime::{ConsoleParser, LearnerEvent, TutorRuntime};

/// Failures of the text-generation collaborator. Both are recovered
/// inside the policy; they only surface in logs.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("malformed structured response: {0}")]
    MalformedResponse(String),
}
