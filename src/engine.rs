pub mod types;
pub mod primitives;
pub mod unparse;
pub mod reduce;


pub use types::*;
pub use primitives::*;
pub use unparse::*;
pub use reduce::*;
