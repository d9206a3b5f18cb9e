pub mod middleware;
pub mod problem;
