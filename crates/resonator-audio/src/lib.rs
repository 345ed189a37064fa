// ABOUTME: Audio collaborators used by the resonator server.
// ABOUTME: Music generation, the post-processing effects chain, and Hugging Face inference calls.

pub mod effects;
pub mod generator;
pub mod huggingface;
pub mod testing;

pub use effects::{EffectsError, EffectsProcessor, TicklerChain};
pub use generator::{GeneratorError, HfMusicGenerator, MusicGenerator};
pub use huggingface::{HfClient, HfError, HfTask, ModelState, ModelStatus};
