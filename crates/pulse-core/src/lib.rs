pub mod errors;
pub mod ids;
pub mod provider;
pub mod review;
pub mod security;

pub use errors::GatewayError;
pub use ids::ReviewId;
pub use review::{FeedbackRecord, Insights, Rating, ReviewStatus, ReviewSubmission, ValidationError};
