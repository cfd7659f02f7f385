pub mod forecast;
pub mod observation;
pub mod report;
pub mod risk;

pub use forecast::*;
pub use observation::*;
pub use report::*;
pub use risk::*;
