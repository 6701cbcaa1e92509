pub mod insights;
pub mod mock;
pub mod openrouter;

pub use insights::InsightGenerator;
pub use mock::{MockProvider, MockResponse};
pub use openrouter::{OpenRouterConfig, OpenRouterProvider};
