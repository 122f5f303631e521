pub mod backend;
pub mod gateway;
pub mod gemini;
pub mod media;
pub mod sanitizer;

pub use backend::GenerativeBackend;
pub use gemini::GeminiClient;
