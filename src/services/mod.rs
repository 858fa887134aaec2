pub mod extractor;
pub mod fetcher;
pub mod jobs;
pub mod pipeline;
pub mod scorer;
pub mod searcher;

pub use extractor::*;
pub use fetcher::*;
pub use jobs::*;
pub use pipeline::*;
pub use scorer::*;
pub use searcher::*;
