pub mod shutdown;
pub mod utils;
