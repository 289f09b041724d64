mod common;
mod extraction;

pub use common::JSON_ONLY_RULES;
pub use extraction::gap_extraction_prompt;
