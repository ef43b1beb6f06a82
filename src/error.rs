use faer::sparse::CreationError;
use thiserror::Error;

/// Error returned by user callbacks (right-hand side, Jacobian).
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Result type of user callbacks.
pub type CallbackResult = Result<(), CallbackError>;

/// Custom error type for radsol
///
/// This error type is used to wrap all possible errors that can occur when solving a problem.
/// Every variant is fatal to the current solve: recoverable events (rejected steps, bounded Newton
/// divergence) never surface as errors and are only visible through the solver statistics.
#[derive(Error, Debug)]
pub enum DiffsolError {
    #[error("Linear solver error: {0}")]
    LinearSolverError(#[from] LinearSolverError),
    #[error("Non-linear solver error: {0}")]
    NonLinearSolverError(#[from] NonLinearSolverError),
    #[error("ODE solver error: {0}")]
    OdeSolverError(#[from] OdeSolverError),
    #[error("Matrix error: {0}")]
    MatrixError(#[from] MatrixError),
    #[error("Distributed error: {0}")]
    DistributedError(#[from] DistributedError),
    #[error("{context} callback failed at x = {x}: {source}")]
    CallbackError {
        context: &'static str,
        x: f64,
        #[source]
        source: CallbackError,
    },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when solving a linear problem
#[derive(Error, Debug)]
pub enum LinearSolverError {
    #[error("LU not initialized")]
    LuNotInitialized,
    #[error("LU solve failed")]
    LuSolveFailed,
    #[error("LU factorisation failed: matrix is singular")]
    SingularMatrix,
    #[error("Linear solver matrix not square")]
    LinearSolverMatrixNotSquare,
    #[error("Linear solver matrix not compatible with vector: expected {expected}, got {found}")]
    LinearSolverMatrixVectorNotCompatible { expected: usize, found: usize },
    #[error("Singular iteration matrix at step {step}, x = {x}, h = {h}")]
    SingularIterationMatrix { step: usize, x: f64, h: f64 },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when solving a non-linear problem
#[derive(Error, Debug)]
pub enum NonLinearSolverError {
    #[error("Newton iterations did not converge")]
    NewtonDidNotConverge,
    #[error("Newton iterations diverged {failures} consecutive times at x = {x}, h = {h}")]
    NewtonDivergence { failures: usize, x: f64, h: f64 },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors that can occur when solving an ODE
#[derive(Debug, Error)]
pub enum OdeSolverError {
    #[error(
        "Stop time = {} is less than current state time = {}",
        stop_time,
        state_time
    )]
    StopTimeBeforeCurrentTime { stop_time: f64, state_time: f64 },
    #[error("Step size is too small at x = {x} (h = {h})")]
    StepSizeTooSmall { x: f64, h: f64 },
    #[error("State has wrong length: expected {expected}, got {found}")]
    WrongStateLength { expected: usize, found: usize },
    #[error("Step size must be positive and finite, got {h}")]
    InvalidStepSize { h: f64 },
    #[error("Exceeded maximum number of steps ({max_steps}) at x = {x}")]
    TooManySteps { max_steps: usize, x: f64 },
    #[error("Fixed step failed twice at x = {x} with h = {h}")]
    FixedStepFailed { x: f64, h: f64 },
    #[error("Method {method} has no error estimator and requires fixed-step mode")]
    AdaptiveStepNotSupported { method: String },
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Builder error: {0}")]
    BuilderError(String),
    #[error("Unknown method: {0}")]
    UnknownMethod(String),
    #[error("Invalid Tableau: {0}")]
    InvalidTableau(String),
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors for matrix operations
#[derive(Error, Debug)]
pub enum MatrixError {
    #[error("Failed to create matrix from triplets: {0}")]
    FailedToCreateMatrixFromTriplets(#[from] CreationError),
    #[error("Entry ({row}, {col}) is out of bounds for a {nrows}x{ncols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },
    #[error("Matrix shape mismatch: expected {expected:?}, got {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
    #[error("Non-finite value in entry ({row}, {col})")]
    NonFiniteEntry { row: usize, col: usize },
    #[error("Error: {0}")]
    Other(String),
}

/// Possible errors of the distributed evaluator and its communicators
#[derive(Error, Debug)]
pub enum DistributedError {
    #[error("Partition expects {expected} workers but the communicator has {found}")]
    WorkerCountMismatch { expected: usize, found: usize },
    #[error("Equation {index} is not assigned to any worker")]
    IncompletePartition { index: usize },
    #[error("Equation {index} is assigned to both worker {first} and worker {second}")]
    OverlappingPartition {
        index: usize,
        first: usize,
        second: usize,
    },
    #[error("Equation {index} is out of range for a problem with {nstates} states")]
    PartitionIndexOutOfRange { index: usize, nstates: usize },
    #[error("Reduction buffer length mismatch: local {local}, worker {rank} sent {remote}")]
    BufferLengthMismatch {
        local: usize,
        rank: usize,
        remote: usize,
    },
    #[error("Worker {rank} disconnected")]
    WorkerDisconnected { rank: usize },
    #[error("Error: {0}")]
    Other(String),
}

#[macro_export]
macro_rules! linear_solver_error {
    ($variant:ident) => {
        DiffsolError::from(LinearSolverError::$variant)
    };
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        DiffsolError::from(LinearSolverError::$variant { $($field $(: $value)?),* })
    };
    ($variant:ident, $($arg:tt)*) => {
        DiffsolError::from(LinearSolverError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! non_linear_solver_error {
    ($variant:ident) => {
        DiffsolError::from(NonLinearSolverError::$variant)
    };
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        DiffsolError::from(NonLinearSolverError::$variant { $($field $(: $value)?),* })
    };
    ($variant:ident, $($arg:tt)*) => {
        DiffsolError::from(NonLinearSolverError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! ode_solver_error {
    ($variant:ident) => {
        DiffsolError::from(OdeSolverError::$variant)
    };
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        DiffsolError::from(OdeSolverError::$variant { $($field $(: $value)?),* })
    };
    ($variant:ident, $($arg:tt)*) => {
        DiffsolError::from(OdeSolverError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! matrix_error {
    ($variant:ident) => {
        DiffsolError::from(MatrixError::$variant)
    };
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        DiffsolError::from(MatrixError::$variant { $($field $(: $value)?),* })
    };
    ($variant:ident, $($arg:tt)*) => {
        DiffsolError::from(MatrixError::$variant($($arg)*))
    };
}

#[macro_export]
macro_rules! distributed_error {
    ($variant:ident) => {
        DiffsolError::from(DistributedError::$variant)
    };
    ($variant:ident { $($field:ident $(: $value:expr)?),* $(,)? }) => {
        DiffsolError::from(DistributedError::$variant { $($field $(: $value)?),* })
    };
    ($variant:ident, $($arg:tt)*) => {
        DiffsolError::from(DistributedError::$variant($($arg)*.to_string()))
    };
}

#[macro_export]
macro_rules! other_error {
    ($msg:expr) => {
        DiffsolError::Other($msg.to_string())
    };
}

/// Wraps a user callback failure with the callback name and the independent variable.
pub(crate) fn callback_error(context: &'static str, x: f64, source: CallbackError) -> DiffsolError {
    DiffsolError::CallbackError { context, x, source }
}
