//! An embeddable Forth environment: an incremental compiler and a
//! direct-threaded virtual machine with vocabularies, CREATE/DOES>,
//! structured exceptions (TRY), and image persistence.
//!
//! The host builds a [`ForthRuntime`], registers its own primitives through
//! [`ForthRuntime::primitive`] or [`ForthRuntime::library`], and feeds it
//! source text with [`ForthRuntime::interpret`]. Errors never abort the
//! process: the interpret/execute entry points return a success flag and
//! leave the message in [`ForthRuntime::geterror`].

pub mod errors;
pub mod kernel;
pub mod runtime;

mod internals;

pub use errors::{ForthError, ForthResult};
pub use internals::builtin::CORE_PRIM_FIRST;
pub use internals::image::ImageKind;
pub use kernel::{Cell, FALSE, TRUE, WORD_MAX};
pub use runtime::{AppPrimitives, ForthRuntime, NotFound, PrimitiveWord};
