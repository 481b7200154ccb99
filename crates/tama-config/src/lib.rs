pub mod loader;
pub mod model;

pub use loader::{ConfigLoader, EnvMap};
pub use model::{DbEngine, TamaConfig};
