pub mod backward_euler;
pub mod builder;
pub mod config;
pub mod controller;
pub mod explicit_rk;
pub mod jacobian_update;
pub mod method;
pub mod problem;
pub mod radau5;
pub mod solver;
pub mod statistics;
pub mod tableau;
pub mod test_models;
pub mod tolerance;
pub mod trajectory;

pub use builder::OdeBuilder;
pub use config::SolverConfig;
pub use method::{Method, RejectReason, StepResult};
pub use problem::OdeProblem;
pub use solver::OdeSolver;
pub use statistics::SolverStatistics;
pub use tableau::Tableau;
pub use tolerance::{Tolerance, Tolerances};
pub use trajectory::Trajectory;
