pub mod decision;
pub mod series;

pub use decision::*;
pub use series::*;
