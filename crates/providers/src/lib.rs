//! LLM backend implementations for sqlsentry.
//!
//! Every backend implements the `sqlsentry_core::Provider` trait. The only
//! backend shipped today is Ollama; the turn loop never sees anything but
//! the trait.

pub mod ollama;

pub use ollama::OllamaProvider;
