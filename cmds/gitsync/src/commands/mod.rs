pub mod crd;
pub mod sync;
