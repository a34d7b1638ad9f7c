mod aggregate;
mod normalize;
mod stability;


pub use aggregate::{RepetitionPlan, aggregate_repetition};
pub use stability::summarize;
