//! Data synthesizer: the final long-form dataset.

pub mod record;
pub mod synthesizer;

pub use record::{SynthesizedDataset, SynthesizedRecord};
pub use synthesizer::{synthesize, JoinIntegrityError, SynthesisInput};
