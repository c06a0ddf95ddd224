// Compiler and outer interpreter
//
// The outer interpreter tokenizes the source, resolves each token against
// the dictionary (then the host's not-found callback, then the literal
// recognizer), and either executes it or appends its xt to code space. The
// defining and control-flow words here are ordinary primitives; the
// compile-time control-flow stack links every opening word to the closing
// word that resolves its jump target.

use crate::errors::{ForthError, ForthResult};
use crate::internals::inner::Op;
use crate::kernel::{Cell, CfFrame, CfKind, WordFlags, CELL_BYTES, FALSE, TRUE, WORD_MAX};
use crate::runtime::ForthRuntime;
use tracing::debug;

/// Literal recognition: decimal `-?[0-9]+` or hex `0x...`. A minus sign on
/// a hex literal is not accepted.
pub(crate) fn toliteral(word: &str) -> Option<Cell> {
    if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        if !hex.is_empty() && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return u64::from_str_radix(hex, 16).ok().map(|v| v as Cell);
        }
        return None;
    }
    let digits = word.strip_prefix('-').unwrap_or(word);
    if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        return word.parse::<Cell>().ok();
    }
    None
}

impl ForthRuntime {
    /// The main token loop. Runs until the source is exhausted or a word
    /// raises.
    pub(crate) fn do_interpret(&mut self) -> ForthResult<()> {
        loop {
            let word = self.getword(' ')?;
            if word.is_empty() {
                return Ok(());
            }
            if let Some(idx) = self.find(&word) {
                let rec = *self.kernel.word(idx)?;
                if self.state == FALSE || rec.flags.contains(WordFlags::IMMEDIATE) {
                    self.execute_xt(rec.xt)?;
                } else {
                    self.kernel.code_append(rec.xt as Cell)?;
                }
                continue;
            }
            if let Some(callback) = self.not_found {
                if callback(self, &word) {
                    continue;
                }
            }
            if let Some(n) = toliteral(&word) {
                if self.state == FALSE {
                    self.kernel.push(n)?;
                } else {
                    self.emit_lit(n)?;
                }
                continue;
            }
            return Err(ForthError::Undefined(word));
        }
    }

    // -------------------------------------------------------------- tokenizer

    /// Fetch the next `sep`-delimited token into the scratch buffer. A space
    /// separator also matches tab, CR and LF. Returns "" at end of source.
    pub(crate) fn getword(&mut self, sep: char) -> ForthResult<String> {
        let is_sep = |b: u8| {
            if sep == ' ' {
                matches!(b, b' ' | b'\t' | b'\r' | b'\n')
            } else {
                b == sep as u8
            }
        };
        let len = self.source.len();
        while self.intp < len && is_sep(self.source.as_bytes()[self.intp]) {
            self.intp += 1;
        }
        let start = self.intp;
        while self.intp < len && !is_sep(self.source.as_bytes()[self.intp]) {
            self.intp += 1;
        }
        let token = String::from_utf8_lossy(&self.source.as_bytes()[start..self.intp]).into_owned();
        if self.intp < len {
            self.intp += 1; // consume the terminating separator
        }
        if token.len() > WORD_MAX {
            return Err(ForthError::WordTooLong);
        }
        self.word.clear();
        self.word.push_str(&token);
        Ok(token)
    }

    /// Everything up to the next unescaped `"` with C-style unescaping.
    fn parse_quoted(&mut self) -> ForthResult<Vec<u8>> {
        let bytes = self.source.as_bytes().to_vec();
        let mut out = Vec::new();
        let mut i = self.intp;
        while i < bytes.len() {
            match bytes[i] {
                b'"' => {
                    self.intp = i + 1;
                    return Ok(out);
                }
                b'\\' if i + 1 < bytes.len() => {
                    out.push(match bytes[i + 1] {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        b'b' => 0x08,
                        other => other,
                    });
                    i += 2;
                }
                other => {
                    out.push(other);
                    i += 1;
                }
            }
        }
        Err(ForthError::UnmatchedQuote)
    }

    /// ( - skip the comment body to the closing paren.
    pub(crate) fn f_paren(&mut self) -> ForthResult<()> {
        match self.source.as_bytes()[self.intp..]
            .iter()
            .position(|&b| b == b')')
        {
            Some(n) => {
                self.intp += n + 1;
                Ok(())
            }
            None => Err(ForthError::UnmatchedParen),
        }
    }

    /// \ - skip to the end of the line.
    pub(crate) fn f_backslash(&mut self) -> ForthResult<()> {
        match self.source.as_bytes()[self.intp..]
            .iter()
            .position(|&b| b == b'\n')
        {
            Some(n) => self.intp += n + 1,
            None => self.intp = self.source.len(),
        }
        Ok(())
    }

    /// " - a string literal. The unescaped bytes go NUL-terminated into data
    /// space; interpreting pushes the address, compiling emits LIT addr.
    pub(crate) fn f_quote(&mut self) -> ForthResult<()> {
        let bytes = self.parse_quoted()?;
        let addr = self.kernel.dp() as Cell;
        self.kernel.allot(bytes.len() as Cell + 1)?;
        for (i, b) in bytes.iter().enumerate() {
            self.kernel.cstore(addr + i as Cell, *b)?;
        }
        self.kernel.cstore(addr + bytes.len() as Cell, 0)?;
        if self.state == FALSE {
            self.kernel.push(addr)
        } else {
            self.emit_lit(addr)
        }
    }

    // ----------------------------------------------------------- emit helpers

    pub(crate) fn emit_lit(&mut self, n: Cell) -> ForthResult<()> {
        self.kernel.code_append(self.lit_xt as Cell)?;
        self.kernel.code_append(n)?;
        Ok(())
    }

    fn require_compiling(&self) -> ForthResult<()> {
        if self.state == FALSE {
            return Err(ForthError::UnbalancedControl);
        }
        Ok(())
    }

    fn parsed_name(&mut self, after: &'static str) -> ForthResult<String> {
        let name = self.getword(' ')?;
        if name.is_empty() {
            return Err(ForthError::MissingWord(after));
        }
        Ok(name)
    }

    // ------------------------------------------------------------ definitions

    /// : <name> - open a smudged colon definition and enter compile state.
    pub(crate) fn f_colon(&mut self) -> ForthResult<()> {
        let name = self.parsed_name(":")?;
        self.add_word(&name, WordFlags::SMUDGED)?;
        self.kernel.code_append(Op::Enter as Cell)?;
        self.state = TRUE;
        Ok(())
    }

    /// ; - emit EXIT, reveal the word, leave compile state.
    pub(crate) fn f_semicolon(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        if self.kernel.cfsp() != 0 {
            return Err(ForthError::UnbalancedControl);
        }
        self.kernel.code_append(self.exit_xt as Cell)?;
        let rec = self.kernel.word_mut(self.last_word)?;
        rec.flags.remove(WordFlags::SMUDGED);
        let name_off = rec.name;
        self.state = FALSE;
        debug!(name = self.kernel.name_at(name_off), "definition complete");
        Ok(())
    }

    /// CREATE <name> - a word that pushes its data address; body is
    /// `[data-address, does-slot]` so DOES> can retrofit it later.
    pub(crate) fn f_create(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("create")?;
        self.add_word(&name, WordFlags::empty())?;
        self.kernel.code_append(Op::DoVariable as Cell)?;
        let dp = self.kernel.dp() as Cell;
        self.kernel.code_append(dp)?;
        self.kernel.code_append(0)?;
        Ok(())
    }

    /// VARIABLE <name> - CREATE plus one zeroed cell of data space.
    pub(crate) fn f_variable(&mut self) -> ForthResult<()> {
        self.f_create()?;
        let addr = self.kernel.dp() as Cell;
        self.kernel.allot(CELL_BYTES as Cell)?;
        self.kernel.store(addr, 0)
    }

    /// CONSTANT <name> ( n -- )
    pub(crate) fn f_constant(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("constant")?;
        let val = self.kernel.pop()?;
        self.add_word(&name, WordFlags::empty())?;
        self.kernel.code_append(Op::DoConstant as Cell)?;
        self.kernel.code_append(val)?;
        Ok(())
    }

    /// VALUE <name> ( n -- ) - like VARIABLE but executes to the stored
    /// value; written with TO.
    pub(crate) fn f_value(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("value")?;
        let val = self.kernel.pop()?;
        self.add_word(&name, WordFlags::empty())?;
        self.kernel.code_append(Op::DoValue as Cell)?;
        let addr = self.kernel.dp() as Cell;
        self.kernel.code_append(addr)?;
        self.kernel.allot(CELL_BYTES as Cell)?;
        self.kernel.store(addr, val)
    }

    /// TO <name> ( n -- ) - write a VALUE: compiles LIT addr ! when
    /// compiling, stores directly when interpreting.
    pub(crate) fn f_to(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("to")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name.clone()))?;
        let rec = *self.kernel.word(idx)?;
        if self.kernel.code_get(rec.xt)? != Op::DoValue as Cell {
            return Err(ForthError::NotAValue(name));
        }
        let addr = self.kernel.code_get(rec.xt + 1)?;
        if self.state == FALSE {
            let val = self.kernel.pop()?;
            self.kernel.store(addr, val)
        } else {
            self.emit_lit(addr)?;
            self.kernel.code_append(self.store_xt as Cell)?;
            Ok(())
        }
    }

    /// DOES> - promote the newest CREATEd word to DODOES. Inside a running
    /// definition the continuation becomes the does-code and the definition
    /// returns; at interpret time the does-code is compiled from here.
    pub(crate) fn f_does(&mut self) -> ForthResult<()> {
        if self.last_word == 0 {
            return Err(ForthError::DoesWithoutCreate);
        }
        let rec = *self.kernel.word(self.last_word)?;
        if self.kernel.code_get(rec.xt)? != Op::DoVariable as Cell {
            return Err(ForthError::DoesWithoutCreate);
        }
        self.kernel.code_set(rec.xt, Op::DoDoes as Cell)?;
        if self.running != 0 {
            self.kernel.code_set(rec.xt + 2, self.ip as Cell)?;
            self.i_exit()
        } else {
            let cp = self.kernel.cp() as Cell;
            self.kernel.code_set(rec.xt + 2, cp)?;
            self.state = TRUE;
            Ok(())
        }
    }

    // ----------------------------------------------------------- control flow

    /// IF - forward conditional branch, resolved by ELSE or THEN.
    pub(crate) fn f_if(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        self.kernel.code_append(self.qbranch_xt as Cell)?;
        let placeholder = self.kernel.code_append(0)?;
        self.kernel.cfpush(CfFrame {
            kind: CfKind::If,
            addr: placeholder,
        })
    }

    /// ELSE - resolve the IF to just past a fresh unconditional branch.
    pub(crate) fn f_else(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let opened = self.kernel.cfpop(&[CfKind::If])?;
        self.kernel.code_append(self.branch_xt as Cell)?;
        let placeholder = self.kernel.code_append(0)?;
        let here = self.kernel.cp() as Cell;
        self.kernel.code_set(opened.addr, here)?;
        self.kernel.cfpush(CfFrame {
            kind: CfKind::Else,
            addr: placeholder,
        })
    }

    /// THEN - resolve the pending IF or ELSE branch to here.
    pub(crate) fn f_then(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let opened = self.kernel.cfpop(&[CfKind::If, CfKind::Else])?;
        let here = self.kernel.cp() as Cell;
        self.kernel.code_set(opened.addr, here)
    }

    /// BEGIN - mark a backward branch target.
    pub(crate) fn f_begin(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let here = self.kernel.cp();
        self.kernel.cfpush(CfFrame {
            kind: CfKind::Begin,
            addr: here,
        })
    }

    /// UNTIL ( f -- ) - loop back to BEGIN while the flag is false.
    pub(crate) fn f_until(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let begin = self.kernel.cfpop(&[CfKind::Begin])?;
        self.kernel.code_append(self.qbranch_xt as Cell)?;
        self.kernel.code_append(begin.addr as Cell)?;
        Ok(())
    }

    /// AGAIN - loop back to BEGIN unconditionally.
    pub(crate) fn f_again(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let begin = self.kernel.cfpop(&[CfKind::Begin])?;
        self.kernel.code_append(self.branch_xt as Cell)?;
        self.kernel.code_append(begin.addr as Cell)?;
        Ok(())
    }

    /// WHILE ( f -- ) - conditional exit in the middle of a BEGIN loop; the
    /// BEGIN stays underneath for REPEAT.
    pub(crate) fn f_while(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        if self.kernel.cftop_kind() != Some(CfKind::Begin) {
            return Err(ForthError::UnbalancedControl);
        }
        self.kernel.code_append(self.qbranch_xt as Cell)?;
        let placeholder = self.kernel.code_append(0)?;
        self.kernel.cfpush(CfFrame {
            kind: CfKind::While,
            addr: placeholder,
        })
    }

    /// REPEAT - close a BEGIN..WHILE loop: branch back, and point the WHILE
    /// exit here.
    pub(crate) fn f_repeat(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let while_frame = self.kernel.cfpop(&[CfKind::While])?;
        let begin = self.kernel.cfpop(&[CfKind::Begin])?;
        self.kernel.code_append(self.branch_xt as Cell)?;
        self.kernel.code_append(begin.addr as Cell)?;
        let here = self.kernel.cp() as Cell;
        self.kernel.code_set(while_frame.addr, here)
    }

    /// DO ( limit index -- at runtime ) - open a counted loop.
    pub(crate) fn f_do(&mut self) -> ForthResult<()> {
        self.compile_do(self.dodo_xt)
    }

    /// ?DO - like DO but skips the body when the bounds are equal.
    pub(crate) fn f_qdo(&mut self) -> ForthResult<()> {
        self.compile_do(self.doqdo_xt)
    }

    fn compile_do(&mut self, runtime_xt: usize) -> ForthResult<()> {
        self.require_compiling()?;
        self.kernel.code_append(runtime_xt as Cell)?;
        let leave_placeholder = self.kernel.code_append(0)?;
        self.kernel.cfpush(CfFrame {
            kind: CfKind::Do,
            addr: leave_placeholder,
        })?;
        let body = self.kernel.cp();
        self.kernel.cfpush(CfFrame {
            kind: CfKind::Loop,
            addr: body,
        })
    }

    /// LOOP - close a DO loop and resolve its LEAVE target.
    pub(crate) fn f_loop(&mut self) -> ForthResult<()> {
        self.compile_loop(self.doloop_xt)
    }

    /// +LOOP ( step -- at runtime )
    pub(crate) fn f_add_loop(&mut self) -> ForthResult<()> {
        self.compile_loop(self.doaddloop_xt)
    }

    fn compile_loop(&mut self, runtime_xt: usize) -> ForthResult<()> {
        self.require_compiling()?;
        let body = self.kernel.cfpop(&[CfKind::Loop])?;
        let opened = self.kernel.cfpop(&[CfKind::Do])?;
        self.kernel.code_append(runtime_xt as Cell)?;
        self.kernel.code_append(body.addr as Cell)?;
        let here = self.kernel.cp() as Cell;
        self.kernel.code_set(opened.addr, here)
    }

    // --------------------------------------------------- quoting and deferral

    /// [ - drop to interpret state inside a definition.
    pub(crate) fn f_lbracket(&mut self) -> ForthResult<()> {
        self.state = FALSE;
        Ok(())
    }

    /// ] - back to compile state.
    pub(crate) fn f_rbracket(&mut self) -> ForthResult<()> {
        self.state = TRUE;
        Ok(())
    }

    /// ' <name> ( -- xt )
    pub(crate) fn f_tick(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("'")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name))?;
        let xt = self.kernel.word(idx)?.xt;
        self.kernel.push(xt as Cell)
    }

    /// ['] <name> - compile the xt as a literal.
    pub(crate) fn f_bracket_tick(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("[']")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name))?;
        let xt = self.kernel.word(idx)?.xt;
        if self.state == FALSE {
            self.kernel.push(xt as Cell)
        } else {
            self.emit_lit(xt as Cell)
        }
    }

    /// COMPILE <name> - emit code that will compile <name> when the word
    /// under construction later runs.
    pub(crate) fn f_compile(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        let name = self.parsed_name("compile")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name))?;
        let xt = self.kernel.word(idx)?.xt;
        self.emit_lit(xt as Cell)?;
        self.kernel.code_append(self.codecomma_xt as Cell)?;
        Ok(())
    }

    /// [COMPILE] <name> - compile even an immediate word.
    pub(crate) fn f_bracket_compile(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("[compile]")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name))?;
        let xt = self.kernel.word(idx)?.xt;
        if self.state == FALSE {
            self.execute_xt(xt)
        } else {
            self.kernel.code_append(xt as Cell)?;
            Ok(())
        }
    }

    /// CODE, ( x -- ) append a cell to code space.
    pub(crate) fn f_code_comma(&mut self) -> ForthResult<()> {
        let val = self.kernel.pop()?;
        self.kernel.code_append(val)?;
        Ok(())
    }

    /// RECURSE - compile a call to the (still smudged) word being defined.
    pub(crate) fn f_recurse(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        if self.last_word == 0 {
            return Err(ForthError::UnbalancedControl);
        }
        let xt = self.kernel.word(self.last_word)?.xt;
        self.kernel.code_append(xt as Cell)?;
        Ok(())
    }

    // ------------------------------------------------------- anonymous blocks

    /// { - open an executable block: emits ENTER, leaves the block xt on the
    /// stack, enters compile state.
    pub(crate) fn f_lbrace(&mut self) -> ForthResult<()> {
        let xt = self.kernel.cp() as Cell;
        self.kernel.code_append(Op::Enter as Cell)?;
        self.kernel.push(xt)?;
        self.state = TRUE;
        Ok(())
    }

    /// } - close the block and execute it immediately.
    pub(crate) fn f_rbrace(&mut self) -> ForthResult<()> {
        self.require_compiling()?;
        if self.kernel.cfsp() != 0 {
            return Err(ForthError::UnbalancedControl);
        }
        self.kernel.code_append(self.exit_xt as Cell)?;
        self.state = FALSE;
        let xt = self.kernel.pop()?;
        let xt = self.kernel.check_code_addr(xt)?;
        self.execute_xt(xt)
    }

    // -------------------------------------------------------------- exceptions

    /// TRY <name> - run a word under protection, leaving a success flag.
    /// Compiles to DOTRY with the xt inline.
    pub(crate) fn f_try(&mut self) -> ForthResult<()> {
        let name = self.parsed_name("try")?;
        let idx = self.find(&name).ok_or(ForthError::Undefined(name))?;
        let xt = self.kernel.word(idx)?.xt;
        if self.state == FALSE {
            self.run_protected(xt as Cell)
        } else {
            self.kernel.code_append(self.dotry_xt as Cell)?;
            self.kernel.code_append(xt as Cell)?;
            Ok(())
        }
    }

    /// ERROR ( addr -- ) - throw with the NUL-terminated string at addr as
    /// the message.
    pub(crate) fn f_error(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let msg = self.kernel.cstring_at(addr)?;
        Err(ForthError::UserRaised(msg))
    }
}
