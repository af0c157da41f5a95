pub mod fetcher;
pub mod parser;
pub mod production;
pub mod window;

pub use fetcher::*;
pub use parser::*;
pub use production::*;
pub use window::*;
