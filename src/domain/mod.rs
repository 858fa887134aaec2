pub mod normalize;
pub mod report;
pub mod signals;

pub use normalize::*;
pub use report::*;
pub use signals::*;
