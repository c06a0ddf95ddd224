/// Core word table
///
/// One row per dictionary-visible primitive: name, opcode, immediacy.
/// cold_start registers these in order and captures the xts the compiler
/// needs to emit references (LIT, EXIT, the branch and loop runtimes,
/// CODE-comma, STORE, DOTRY). The purely structural opcodes (ENTER and the
/// DO* code fields) never appear here; they are written directly into code
/// fields by the defining words.
///
use crate::internals::inner::Op;
use crate::kernel::Cell;

/// First opcode belonging to the application; everything at or above this
/// is routed to the registered app-primitives callback.
pub const CORE_PRIM_FIRST: Cell = 1000;

pub(crate) const CORE_WORDS: &[(&str, Op, bool)] = &[
    // runtime words the compiler references by cached xt
    ("(lit)", Op::Lit, false),
    ("exit", Op::Exit, false),
    ("(branch)", Op::Branch, false),
    ("(?branch)", Op::QBranch, false),
    ("(do)", Op::DoDo, false),
    ("(?do)", Op::DoQDo, false),
    ("(loop)", Op::DoLoop, false),
    ("(+loop)", Op::DoAddLoop, false),
    ("(try)", Op::DoTry, false),
    // loop support
    ("i", Op::I, false),
    ("j", Op::J, false),
    ("leave", Op::Leave, false),
    ("execute", Op::Execute, false),
    (">data", Op::ToData, false),
    // arithmetic and logic
    ("+", Op::Add, false),
    ("-", Op::Sub, false),
    ("*", Op::Mul, false),
    ("/", Op::Div, false),
    ("mod", Op::Mod, false),
    ("/mod", Op::DivMod, false),
    ("abs", Op::Abs, false),
    ("negate", Op::Negate, false),
    ("min", Op::Min, false),
    ("max", Op::Max, false),
    ("1+", Op::OnePlus, false),
    ("1-", Op::OneMinus, false),
    ("2*", Op::TwoStar, false),
    ("2/", Op::TwoSlash, false),
    ("lshift", Op::LShift, false),
    ("rshift", Op::RShift, false),
    ("and", Op::And, false),
    ("or", Op::Or, false),
    ("xor", Op::Xor, false),
    ("invert", Op::Invert, false),
    // comparison
    ("=", Op::Equal, false),
    ("<>", Op::NotEqual, false),
    ("<", Op::Less, false),
    (">", Op::Greater, false),
    ("<=", Op::LessEq, false),
    (">=", Op::GreaterEq, false),
    ("0=", Op::ZeroEqual, false),
    ("0<", Op::ZeroLess, false),
    ("0>", Op::ZeroGreater, false),
    ("0<>", Op::ZeroNotEqual, false),
    ("true", Op::True, false),
    ("false", Op::False, false),
    // stack shuffling
    ("dup", Op::Dup, false),
    ("?dup", Op::QDup, false),
    ("drop", Op::Drop, false),
    ("swap", Op::Swap, false),
    ("over", Op::Over, false),
    ("rot", Op::Rot, false),
    ("nip", Op::Nip, false),
    ("tuck", Op::Tuck, false),
    ("pick", Op::Pick, false),
    ("depth", Op::Depth, false),
    // data space
    ("@", Op::Fetch, false),
    ("!", Op::Store, false),
    ("c@", Op::CFetch, false),
    ("c!", Op::CStore, false),
    ("+!", Op::AddStore, false),
    ("move", Op::Move, false),
    ("fill", Op::Fill, false),
    ("erase", Op::Erase, false),
    ("allot", Op::Allot, false),
    ("here", Op::Here, false),
    (",", Op::Comma, false),
    ("count", Op::Count, false),
    ("length", Op::Length, false),
    ("cell", Op::Cell, false),
    ("cells", Op::Cells, false),
    ("cell+", Op::CellPlus, false),
    // defining words
    (":", Op::Colon, false),
    (";", Op::Semicolon, true),
    ("create", Op::Create, false),
    ("does>", Op::Does, false),
    ("variable", Op::Variable, false),
    ("constant", Op::Constant, false),
    ("value", Op::Value, false),
    ("to", Op::To, true),
    ("vocabulary", Op::Vocabulary, false),
    ("definitions", Op::Definitions, false),
    ("immediate", Op::Immediate, false),
    // control flow
    ("if", Op::If, true),
    ("else", Op::Else, true),
    ("then", Op::Then, true),
    ("begin", Op::Begin, true),
    ("until", Op::Until, true),
    ("again", Op::Again, true),
    ("while", Op::While, true),
    ("repeat", Op::Repeat, true),
    ("do", Op::Do, true),
    ("?do", Op::QDo, true),
    ("loop", Op::Loop, true),
    ("+loop", Op::AddLoop, true),
    // quoting and deferral
    ("[", Op::LBracket, true),
    ("]", Op::RBracket, false),
    ("'", Op::Tick, false),
    ("[']", Op::BracketTick, true),
    ("compile", Op::Compile, true),
    ("[compile]", Op::BracketCompile, true),
    ("code,", Op::CodeComma, false),
    ("recurse", Op::Recurse, true),
    // anonymous blocks
    ("{", Op::LBrace, false),
    ("}", Op::RBrace, true),
    // comments, strings, exceptions
    ("(", Op::Paren, true),
    ("\\", Op::Backslash, true),
    ("\"", Op::Quote, true),
    ("try", Op::Try, true),
    ("error", Op::Error, false),
];
