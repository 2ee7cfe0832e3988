// Keyword-driven relevance: a mutable registry publishing immutable
// versioned snapshots, and a batch classifier that binds one snapshot per
// job so concurrent edits never produce mixed-rule batches.

pub mod classifier;
pub mod keyword;
pub mod registry;
pub mod snapshot;

pub use classifier::{ClassifyReport, KeywordClassifier};
pub use keyword::{Keyword, KeywordType};
pub use registry::KeywordRegistry;
pub use snapshot::{KeywordMatches, KeywordSnapshot};
