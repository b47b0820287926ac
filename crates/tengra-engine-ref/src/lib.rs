//! In-process reference implementation of the tengra engine ABI.
//!
//! This crate implements every entry point of [`tengra_abi::EngineApi`]
//! over a small interpreter, so the binding layer can be exercised
//! end-to-end without a native shared library on the machine. It is the
//! executable description of the ABI contract, not a tensor-math
//! library: arithmetic covers a handful of op types over the four
//! numeric dtypes, and anything else reports `Unimplemented` through
//! the regular status channel.
//!
//! The crate also exports the standard [`tengra_abi::ENTRY_SYMBOL`]
//! entry point, so building it as a `cdylib` yields a loadable engine.

mod capi;
mod error;
mod eval;
mod graph;
mod session;
mod value;

pub use capi::{engine_api, tengra_engine_api};
