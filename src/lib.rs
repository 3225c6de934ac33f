#![forbid(unsafe_code)]
#![no_std]

//! A decoder and stepwise interpreter for RAPTOR flowchart programs (`.rap` files).
//!
//! A `.rap` file is a sequence of .NET BinaryFormatter messages.
//! [`decoder`] turns the raw bytes into one object graph per message, [`program`] validates the
//! message sequence and lowers each subchart into a [`flowchart::Flowchart`], and [`process`]
//! walks those flowcharts one component at a time, suspending whenever the program wants to
//! print something or read input from the host.
//!
//! ```no_run
//! # use raptor_vm::program::*;
//! # let bytes: &[u8] = &[];
//! let mut program = Program::load(bytes).unwrap();
//! loop {
//!     match program.step().unwrap() {
//!         StepResult::Continue => (),
//!         StepResult::Output(text) => { /* print text */ program.resume().unwrap(); }
//!         StepResult::Input(_prompt) => { program.provide_input("42").unwrap(); program.resume().unwrap(); }
//!         StepResult::Done => break,
//!     }
//! }
//! ```

#[macro_use] extern crate alloc;
#[cfg(any(test, feature = "std"))] extern crate std;

#[cfg(test)]
mod test;

pub mod vecmap;
pub mod reader;
pub mod records;
pub mod registry;
pub mod graph;
pub mod decoder;
pub mod flowchart;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod runtime;
pub mod eval;
pub mod builtins;
pub mod process;
pub mod program;

#[cfg(feature = "cli")]
pub mod cli;
