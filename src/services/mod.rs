pub mod store;
pub mod sync;

pub use store::Store;
