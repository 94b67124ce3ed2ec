//! Production implementations of the pipeline's collaborator contracts.

pub mod analyzer;
pub mod copywriter;
pub mod llm;
pub mod publisher;
pub mod resolver;
pub mod reviewers;
pub mod reviser;
pub mod storage;
