pub mod error;
pub mod extract;
pub mod grid;
pub mod interp;
pub mod mesh;
pub mod plugin;
pub mod tables;
pub mod transport;
pub mod types;
pub mod utils;
pub mod worker;

pub use extract::extract_isosurface;
pub use plugin::IsosurfacePlugin;
