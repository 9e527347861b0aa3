pub mod vision_client;

pub use vision_client::{GenerationRequest, OpenAiVisionClient, PriorProduct, VisionEngine};
