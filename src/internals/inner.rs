/// Inner Interpreter
///
/// The VM is direct-threaded over a dense primitive-number table: the cell
/// at a word's xt is an opcode, and the cells after it form the body. Most
/// body cells are xts of other words; a few opcodes (LIT, BRANCH, QBRANCH,
/// the DO/LOOP family, DOTRY) consume inline operand cells through `ip`.
///
use crate::errors::{ForthError, ForthResult};
use crate::internals::builtin::CORE_PRIM_FIRST;
use crate::kernel::{Cell, LoopFrame, ReturnFrame, FALSE, TRUE};
use crate::runtime::{Checkpoint, ForthRuntime};
use num_enum::TryFromPrimitive;
use tracing::trace;

/// Core primitive numbers. The discriminant is the opcode stored in code
/// space; application primitives start at CORE_PRIM_FIRST and are routed to
/// the host callback instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i64)]
pub enum Op {
    // structural
    Lit = 0,
    Enter,
    Exit,
    Branch,
    QBranch,
    DoDo,
    DoQDo,
    DoLoop,
    DoAddLoop,
    DoVariable,
    DoConstant,
    DoValue,
    DoDoes,
    DoVocabulary,
    DoTry,
    I,
    J,
    Leave,
    Execute,
    ToData,
    // arithmetic and logic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    DivMod,
    Abs,
    Negate,
    Min,
    Max,
    OnePlus,
    OneMinus,
    TwoStar,
    TwoSlash,
    LShift,
    RShift,
    And,
    Or,
    Xor,
    Invert,
    // comparison
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEq,
    GreaterEq,
    ZeroEqual,
    ZeroLess,
    ZeroGreater,
    ZeroNotEqual,
    True,
    False,
    // stack shuffling
    Dup,
    QDup,
    Drop,
    Swap,
    Over,
    Rot,
    Nip,
    Tuck,
    Pick,
    Depth,
    // data space
    Fetch,
    Store,
    CFetch,
    CStore,
    AddStore,
    Move,
    Fill,
    Erase,
    Allot,
    Here,
    Comma,
    Count,
    Length,
    Cell,
    Cells,
    CellPlus,
    // defining and compiling words
    Colon,
    Semicolon,
    Create,
    Does,
    Variable,
    Constant,
    Value,
    To,
    Vocabulary,
    Definitions,
    Immediate,
    If,
    Else,
    Then,
    Begin,
    Until,
    Again,
    While,
    Repeat,
    Do,
    QDo,
    Loop,
    AddLoop,
    LBracket,
    RBracket,
    Tick,
    BracketTick,
    Compile,
    BracketCompile,
    CodeComma,
    Recurse,
    LBrace,
    RBrace,
    Paren,
    Backslash,
    Quote,
    Try,
    Error,
}

impl ForthRuntime {
    /// Run the word at `xt` to completion. This is the drive loop: dispatch
    /// the primitive at `code[xt]`, then keep fetching `xt := code[ip++]`
    /// while the return stack is deeper than it was on entry. The loop ends
    /// exactly when the EXIT matching the first ENTER has popped its frame.
    pub(crate) fn execute_xt(&mut self, xt: usize) -> ForthResult<()> {
        self.kernel.check_code_addr(xt as Cell)?;
        let entry_rsp = self.kernel.rsp();
        self.dispatch(xt)?;
        while self.kernel.rsp() > entry_rsp {
            let next = self.kernel.code_get(self.ip)?;
            self.ip += 1;
            let next = self.kernel.check_code_addr(next)?;
            self.dispatch(next)?;
        }
        Ok(())
    }

    /// Dispatch the primitive in the code field of `xt`. Opcodes past the
    /// core range belong to the application callback.
    pub(crate) fn dispatch(&mut self, xt: usize) -> ForthResult<()> {
        self.w = xt;
        let opcode = self.kernel.code_get(xt)?;
        match Op::try_from_primitive(opcode) {
            Ok(op) => self.run_op(op),
            Err(_) if opcode >= CORE_PRIM_FIRST => match self.app_prims {
                Some(callback) => callback(self, opcode),
                None => Err(ForthError::InvalidOpcode(opcode)),
            },
            Err(_) => Err(ForthError::InvalidOpcode(opcode)),
        }
    }

    fn run_op(&mut self, op: Op) -> ForthResult<()> {
        trace!(?op, w = self.w, ip = self.ip, "dispatch");
        match op {
            Op::Lit => self.i_lit(),
            Op::Enter => self.i_enter(),
            Op::Exit => self.i_exit(),
            Op::Branch => self.i_branch(),
            Op::QBranch => self.i_qbranch(),
            Op::DoDo => self.i_dodo(),
            Op::DoQDo => self.i_doqdo(),
            Op::DoLoop => self.i_doloop(),
            Op::DoAddLoop => self.i_doaddloop(),
            Op::DoVariable => self.i_dovariable(),
            Op::DoConstant => self.i_doconstant(),
            Op::DoValue => self.i_dovalue(),
            Op::DoDoes => self.i_dodoes(),
            Op::DoVocabulary => self.i_dovocabulary(),
            Op::DoTry => self.i_dotry(),
            Op::I => self.f_i(),
            Op::J => self.f_j(),
            Op::Leave => self.f_leave(),
            Op::Execute => self.f_execute(),
            Op::ToData => self.f_to_data(),

            Op::Add => self.f_plus(),
            Op::Sub => self.f_minus(),
            Op::Mul => self.f_times(),
            Op::Div => self.f_divide(),
            Op::Mod => self.f_mod(),
            Op::DivMod => self.f_divmod(),
            Op::Abs => self.f_abs(),
            Op::Negate => self.f_negate(),
            Op::Min => self.f_min(),
            Op::Max => self.f_max(),
            Op::OnePlus => self.f_one_plus(),
            Op::OneMinus => self.f_one_minus(),
            Op::TwoStar => self.f_two_star(),
            Op::TwoSlash => self.f_two_slash(),
            Op::LShift => self.f_lshift(),
            Op::RShift => self.f_rshift(),
            Op::And => self.f_and(),
            Op::Or => self.f_or(),
            Op::Xor => self.f_xor(),
            Op::Invert => self.f_invert(),

            Op::Equal => self.f_equal(),
            Op::NotEqual => self.f_not_equal(),
            Op::Less => self.f_less(),
            Op::Greater => self.f_greater(),
            Op::LessEq => self.f_less_eq(),
            Op::GreaterEq => self.f_greater_eq(),
            Op::ZeroEqual => self.f_0equal(),
            Op::ZeroLess => self.f_0less(),
            Op::ZeroGreater => self.f_0greater(),
            Op::ZeroNotEqual => self.f_0not_equal(),
            Op::True => self.f_true(),
            Op::False => self.f_false(),

            Op::Dup => self.f_dup(),
            Op::QDup => self.f_q_dup(),
            Op::Drop => self.f_drop(),
            Op::Swap => self.f_swap(),
            Op::Over => self.f_over(),
            Op::Rot => self.f_rot(),
            Op::Nip => self.f_nip(),
            Op::Tuck => self.f_tuck(),
            Op::Pick => self.f_pick(),
            Op::Depth => self.f_depth(),

            Op::Fetch => self.f_fetch(),
            Op::Store => self.f_store(),
            Op::CFetch => self.f_cfetch(),
            Op::CStore => self.f_cstore(),
            Op::AddStore => self.f_add_store(),
            Op::Move => self.f_move(),
            Op::Fill => self.f_fill(),
            Op::Erase => self.f_erase(),
            Op::Allot => self.f_allot(),
            Op::Here => self.f_here(),
            Op::Comma => self.f_comma(),
            Op::Count => self.f_count(),
            Op::Length => self.f_length(),
            Op::Cell => self.f_cell(),
            Op::Cells => self.f_cells(),
            Op::CellPlus => self.f_cell_plus(),

            Op::Colon => self.f_colon(),
            Op::Semicolon => self.f_semicolon(),
            Op::Create => self.f_create(),
            Op::Does => self.f_does(),
            Op::Variable => self.f_variable(),
            Op::Constant => self.f_constant(),
            Op::Value => self.f_value(),
            Op::To => self.f_to(),
            Op::Vocabulary => self.f_vocabulary(),
            Op::Definitions => self.f_definitions(),
            Op::Immediate => self.f_immediate(),
            Op::If => self.f_if(),
            Op::Else => self.f_else(),
            Op::Then => self.f_then(),
            Op::Begin => self.f_begin(),
            Op::Until => self.f_until(),
            Op::Again => self.f_again(),
            Op::While => self.f_while(),
            Op::Repeat => self.f_repeat(),
            Op::Do => self.f_do(),
            Op::QDo => self.f_qdo(),
            Op::Loop => self.f_loop(),
            Op::AddLoop => self.f_add_loop(),
            Op::LBracket => self.f_lbracket(),
            Op::RBracket => self.f_rbracket(),
            Op::Tick => self.f_tick(),
            Op::BracketTick => self.f_bracket_tick(),
            Op::Compile => self.f_compile(),
            Op::BracketCompile => self.f_bracket_compile(),
            Op::CodeComma => self.f_code_comma(),
            Op::Recurse => self.f_recurse(),
            Op::LBrace => self.f_lbrace(),
            Op::RBrace => self.f_rbrace(),
            Op::Paren => self.f_paren(),
            Op::Backslash => self.f_backslash(),
            Op::Quote => self.f_quote(),
            Op::Try => self.f_try(),
            Op::Error => self.f_error(),
        }
    }

    /// LIT ( -- n ) pushes the inline operand cell.
    fn i_lit(&mut self) -> ForthResult<()> {
        let val = self.kernel.code_get(self.ip)?;
        self.ip += 1;
        self.kernel.push(val)
    }

    /// ENTER: save the caller, thread into this word's body.
    fn i_enter(&mut self) -> ForthResult<()> {
        self.kernel.rpush(ReturnFrame {
            ip: self.ip,
            xt: self.running,
        })?;
        self.running = self.w;
        self.ip = self.w + 1;
        Ok(())
    }

    /// EXIT: drop loop frames opened by the word being left, then restore
    /// the caller.
    pub(crate) fn i_exit(&mut self) -> ForthResult<()> {
        while self.kernel.lsp() > 0 && self.kernel.loop_frame(0)?.xt == self.running {
            self.kernel.lpop()?;
        }
        let frame = self.kernel.rpop()?;
        self.ip = frame.ip;
        self.running = frame.xt;
        Ok(())
    }

    /// BRANCH: unconditional jump through the inline target cell.
    fn i_branch(&mut self) -> ForthResult<()> {
        let target = self.kernel.code_get(self.ip)?;
        self.ip = self.kernel.check_code_addr(target)?;
        Ok(())
    }

    /// QBRANCH ( f -- ): jump when the flag is zero, else skip the target.
    fn i_qbranch(&mut self) -> ForthResult<()> {
        let flag = self.kernel.pop()?;
        if flag != FALSE {
            self.ip += 1;
        } else {
            let target = self.kernel.code_get(self.ip)?;
            self.ip = self.kernel.check_code_addr(target)?;
        }
        Ok(())
    }

    /// DODO ( limit index -- ): open a loop frame. The inline operand is the
    /// LEAVE target.
    fn i_dodo(&mut self) -> ForthResult<()> {
        let leave = self.kernel.code_get(self.ip)? as usize;
        self.ip += 1;
        let index = self.kernel.pop()?;
        let limit = self.kernel.pop()?;
        self.kernel.lpush(LoopFrame {
            index,
            limit,
            leave,
            xt: self.running,
        })
    }

    /// DOQDO: like DODO, but an equal limit and index skips the loop body
    /// without opening a frame.
    fn i_doqdo(&mut self) -> ForthResult<()> {
        let leave = self.kernel.code_get(self.ip)? as usize;
        self.ip += 1;
        let index = self.kernel.pop()?;
        let limit = self.kernel.pop()?;
        if index == limit {
            self.ip = self.kernel.check_code_addr(leave as Cell)?;
            return Ok(());
        }
        self.kernel.lpush(LoopFrame {
            index,
            limit,
            leave,
            xt: self.running,
        })
    }

    /// DOLOOP: bump the index; loop back through the inline target until it
    /// reaches the limit.
    fn i_doloop(&mut self) -> ForthResult<()> {
        let frame = self.kernel.loop_top_mut()?;
        frame.index = frame.index.wrapping_add(1);
        if frame.index == frame.limit {
            self.ip += 1;
            self.kernel.lpop()?;
        } else {
            let target = self.kernel.code_get(self.ip)?;
            self.ip = self.kernel.check_code_addr(target)?;
        }
        Ok(())
    }

    /// DOADDLOOP ( step -- ): +LOOP termination uses crossing semantics:
    /// continue iff the index stays on the same side of the limit.
    fn i_doaddloop(&mut self) -> ForthResult<()> {
        let step = self.kernel.pop()?;
        let frame = self.kernel.loop_top_mut()?;
        let before = frame.index;
        let after = before.wrapping_add(step);
        frame.index = after;
        if (before < frame.limit) == (after < frame.limit) {
            let target = self.kernel.code_get(self.ip)?;
            self.ip = self.kernel.check_code_addr(target)?;
        } else {
            self.ip += 1;
            self.kernel.lpop()?;
        }
        Ok(())
    }

    /// I ( -- n ) innermost loop index.
    fn f_i(&mut self) -> ForthResult<()> {
        let index = self.kernel.loop_frame(0)?.index;
        self.kernel.push(index)
    }

    /// J ( -- n ) next-outer loop index.
    fn f_j(&mut self) -> ForthResult<()> {
        let index = self.kernel.loop_frame(1)?.index;
        self.kernel.push(index)
    }

    /// LEAVE: jump past the innermost loop of the current definition. A
    /// frame opened by a caller is out of reach.
    fn f_leave(&mut self) -> ForthResult<()> {
        if self.kernel.lsp() == 0 || self.kernel.loop_frame(0)?.xt != self.running {
            return Err(ForthError::LeaveOutsideLoop);
        }
        let frame = self.kernel.lpop()?;
        self.ip = self.kernel.check_code_addr(frame.leave as Cell)?;
        Ok(())
    }

    /// EXECUTE ( xt -- ) run the word at xt.
    pub(crate) fn f_execute(&mut self) -> ForthResult<()> {
        let xt = self.kernel.pop()?;
        let xt = self.kernel.check_code_addr(xt)?;
        self.dispatch(xt)
    }

    /// >DATA ( xt -- addr ) the data-field cell of a defined word.
    fn f_to_data(&mut self) -> ForthResult<()> {
        let xt = self.kernel.pop()?;
        let xt = self.kernel.check_code_addr(xt)?;
        let opcode = self.kernel.code_get(xt)?;
        match Op::try_from_primitive(opcode) {
            Ok(Op::DoVariable) | Ok(Op::DoValue) | Ok(Op::DoDoes) | Ok(Op::DoVocabulary) => {
                let addr = self.kernel.code_get(xt + 1)?;
                self.kernel.push(addr)
            }
            _ => Err(ForthError::NoDataField(self.name_of_xt(xt).to_string())),
        }
    }

    /// DOVARIABLE: push the stored data address.
    fn i_dovariable(&mut self) -> ForthResult<()> {
        let addr = self.kernel.code_get(self.w + 1)?;
        self.kernel.push(addr)
    }

    /// DOCONSTANT: push the body cell itself.
    fn i_doconstant(&mut self) -> ForthResult<()> {
        let val = self.kernel.code_get(self.w + 1)?;
        self.kernel.push(val)
    }

    /// DOVALUE: fetch through the stored data address.
    fn i_dovalue(&mut self) -> ForthResult<()> {
        let addr = self.kernel.code_get(self.w + 1)?;
        let val = self.kernel.fetch(addr)?;
        self.kernel.push(val)
    }

    /// DODOES: push the data address, then thread into the does-code with an
    /// implicit ENTER.
    fn i_dodoes(&mut self) -> ForthResult<()> {
        let addr = self.kernel.code_get(self.w + 1)?;
        self.kernel.push(addr)?;
        let does = self.kernel.code_get(self.w + 2)?;
        let does = self.kernel.check_code_addr(does)?;
        self.kernel.rpush(ReturnFrame {
            ip: self.ip,
            xt: self.running,
        })?;
        self.running = self.w;
        self.ip = does;
        Ok(())
    }

    /// DOVOCABULARY: make this vocabulary the search context.
    fn i_dovocabulary(&mut self) -> ForthResult<()> {
        self.context = self.w + 1;
        Ok(())
    }

    /// DOTRY: run the word named by the inline operand under protection,
    /// pushing a success flag.
    fn i_dotry(&mut self) -> ForthResult<()> {
        let target = self.kernel.code_get(self.ip)?;
        self.ip += 1;
        self.run_protected(target)
    }

    /// The rescue point shared by TRY and DOTRY: checkpoint the volatile
    /// registers, run the word, and on failure restore everything and push
    /// false instead of propagating.
    pub(crate) fn run_protected(&mut self, target: Cell) -> ForthResult<()> {
        let saved: Checkpoint = self.checkpoint();
        self.handlers += 1;
        let result = self
            .kernel
            .check_code_addr(target)
            .and_then(|xt| self.execute_xt(xt));
        self.handlers -= 1;
        match result {
            Ok(()) => self.kernel.push(TRUE),
            Err(e) => {
                self.errormsg = e.to_string();
                trace!(error = %self.errormsg, "try caught");
                self.restore(saved);
                self.kernel.push(FALSE)
            }
        }
    }
}
