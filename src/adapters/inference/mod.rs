//! Inference provider adapters.

pub mod mock;
pub mod openai;

pub use mock::{MockInferenceProvider, MockReply};
pub use openai::{OpenAiConfig, OpenAiInferenceProvider};
