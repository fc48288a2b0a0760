pub mod projector;
pub mod vector;

pub use projector::{project, Projector};
pub use vector::XpVector;
