//! Stampline Gemini - cloud multimodal annotator
//!
//! Sends each image with a task prompt to the Generative Language
//! `generateContent` endpoint and returns the model's text.

pub mod annotator;
pub mod api;
pub mod config;

// Re-exports
pub use annotator::{GeminiAnnotator, mime_type};
pub use config::{API_KEY_ENV, GeminiConfig};
