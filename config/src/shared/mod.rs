mod base;
mod coordination;
mod drain;
mod summarizer;

pub use base::*;
pub use coordination::*;
pub use drain::*;
pub use summarizer::*;
