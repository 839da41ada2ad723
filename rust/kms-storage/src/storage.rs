mod backend;
pub use backend::*;

mod provider;
pub use provider::*;
