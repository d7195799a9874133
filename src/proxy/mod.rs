pub mod handler;
pub mod transaction;

pub use handler::{handle_request, resolve_url, HandledRequest};
pub use transaction::ProxyTransaction;
