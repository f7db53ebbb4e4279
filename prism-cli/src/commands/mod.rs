pub mod check;
pub mod request;

pub use check::run_check;
pub use request::{run_info, run_ping, run_search};
