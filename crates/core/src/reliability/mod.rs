pub mod circuit;
pub mod rate_limit;
pub mod retry;
