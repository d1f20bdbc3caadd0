pub mod block;
pub mod proxy;
pub mod rank;
pub mod site;

pub use block::*;
pub use proxy::*;
pub use rank::*;
pub use site::*;
