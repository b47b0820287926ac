//! Safe Rust bindings to a C-ABI tensor graph execution engine.
//!
//! The crate wraps an opaque native engine behind typed handles: build a
//! [`Graph`] of named operations, bind a [`Session`] to it, then assemble
//! each execution with a single-use [`Runner`] — feed input tensors,
//! pick fetches and side-effect targets, and submit atomically.
//!
//! Everything starts from a [`Platform`], the capability object that
//! owns the engine binding (discovered shared library or the in-process
//! reference engine), the audited memory-copy primitive and the
//! diagnostic sink. There is no global state: constructing the platform
//! *is* initialization.
//!
//! # Example
//!
//! ```
//! use tengra::{Graph, Platform, Session, SessionOptions, Tensor};
//!
//! # fn main() -> tengra::Result<()> {
//! let platform = Platform::reference();
//! let graph = Graph::new(&platform);
//!
//! let a = graph.const_scalar(2i32)?;
//! let b = graph.const_scalar(3i32)?;
//! let sum = graph.add(&a, &b)?;
//!
//! let session = Session::new(&graph, &SessionOptions::new())?;
//! let results = session.runner().fetch(&sum).run()?;
//! assert_eq!(results[0].scalar::<i32>()?, 5);
//!
//! // Feed a placeholder through a second, fresh runner.
//! let x = graph.placeholder(tengra::DataType::Int32)?;
//! let doubled = graph.mul(&x, &graph.const_scalar(2i32)?)?;
//! let fed = Tensor::from_scalar(&platform, 21i32)?;
//! let result = session.runner().add_input(&x, fed).run_output(&doubled)?;
//! assert_eq!(result.scalar::<i32>()?, 42);
//! # Ok(())
//! # }
//! ```

mod dtype;
mod error;
mod graph;
mod mem;
mod platform;
mod runner;
mod session;
mod status;
mod tensor;

pub use dtype::{DataType, TensorType};
pub use error::{Error, Result};
pub use graph::{Graph, OpDescription, Operation, Output, Variable, WhileSpec, WhileSubgraphs};
pub use platform::{DiagnosticSink, EngineConfig, Flavor, NullSink, Platform, TracingSink};
pub use runner::{OutputSpec, Runner, TargetSpec};
pub use session::{Session, SessionOptions};
pub use status::{Code, Status};
pub use tensor::{ArrayData, Ownership, Tensor};
