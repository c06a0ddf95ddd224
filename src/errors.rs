// Error taxonomy for the interpreter and the embedding API.
//
// The Display strings double as the host-facing error messages, so the
// wording of the established ones ("stack overflow", "<word> ?", ...) is
// load-bearing: the REPL and any harness that matches on geterror() sees
// exactly these strings.

use crate::kernel::Cell;
use thiserror::Error;

pub type ForthResult<T> = Result<T, ForthError>;

#[derive(Debug, Error)]
pub enum ForthError {
    #[error("{0} ?")]
    Undefined(String),

    #[error("stack overflow")]
    StackOverflow,
    #[error("stack underflow")]
    StackUnderflow,
    #[error("return stack overflow")]
    ReturnStackOverflow,
    #[error("return stack underflow")]
    ReturnStackUnderflow,
    #[error("loop stack overflow")]
    LoopStackOverflow,
    #[error("loop stack underflow")]
    LoopStackUnderflow,
    #[error("control-flow stack overflow")]
    ControlFlowStackOverflow,

    #[error("code area overflow")]
    CodeOverflow,
    #[error("data area overflow")]
    DataOverflow,
    #[error("dictionary overflow")]
    DictionaryOverflow,
    #[error("names area overflow")]
    NamesOverflow,
    #[error("word too long")]
    WordTooLong,

    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid data area {addr} ({size} bytes)")]
    InvalidDataArea { addr: Cell, size: usize },
    #[error("invalid code address {0}")]
    InvalidCodeAddress(Cell),
    #[error("invalid opcode {0}")]
    InvalidOpcode(Cell),

    #[error("unbalanced control structure")]
    UnbalancedControl,
    #[error("unmatched (")]
    UnmatchedParen,
    #[error("unmatched \"")]
    UnmatchedQuote,
    #[error("missing word after {0}")]
    MissingWord(&'static str),
    #[error("leave outside of a loop")]
    LeaveOutsideLoop,

    #[error("{0} is not a value")]
    NotAValue(String),
    #[error("{0} has no data field")]
    NoDataField(String),
    #[error("does> without create")]
    DoesWithoutCreate,
    #[error("invalid primitive code {0}")]
    InvalidPrimitiveCode(Cell),

    #[error("{0}")]
    UserRaised(String),

    #[error("bad image signature")]
    BadImageSignature,
    #[error("image too large")]
    ImageTooLarge,
    #[error("{0}")]
    Io(#[from] std::io::Error),
}
