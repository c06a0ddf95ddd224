//////////////////////////////////////////////////////////////////
/// runtime.rs
///
/// Forth Runtime Engine
///
/// ForthRuntime bundles the kernel storage with the VM registers (ip,
/// running word, compile state, source cursor) and the cached execution
/// tokens the compiler emits references to. It also carries the whole
/// host-facing embedding surface: interpret / execute, primitive
/// registration, stack and data-space access, error reporting, and the
/// image operations implemented in internals/image.rs.
///
use crate::errors::{ForthError, ForthResult};
use crate::internals::builtin::{CORE_PRIM_FIRST, CORE_WORDS};
use crate::internals::inner::Op;
use crate::kernel::{Cell, Kernel, FALSE};
use tracing::debug;

/// Host callback for application primitives: invoked with the opcode when
/// the VM dispatches a primitive number at or above CORE_PRIM_FIRST.
pub type AppPrimitives = fn(&mut ForthRuntime, Cell) -> ForthResult<()>;

/// Host callback consulted for tokens missing from the dictionary, before
/// literal recognition. Returns true when the token was handled.
pub type NotFound = fn(&mut ForthRuntime, &str) -> bool;

/// One row of a host word library, for bulk registration.
pub struct PrimitiveWord {
    pub name: &'static str,
    pub code: Cell,
    pub immediate: bool,
}

/// Everything TRY must save to make a protected call restartable.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    sp: usize,
    rsp: usize,
    lsp: usize,
    ip: usize,
    running: usize,
    intp: usize,
    state: Cell,
}

pub struct ForthRuntime {
    pub kernel: Kernel,

    // VM registers
    pub(crate) ip: usize,      // next code cell to fetch
    pub(crate) running: usize, // xt of the word currently executing
    pub(crate) w: usize,       // xt being dispatched
    pub(crate) state: Cell,    // FALSE = interpret, TRUE = compile

    // source being interpreted
    pub(crate) source: String,
    pub(crate) intp: usize,
    pub(crate) word: String, // scratch token buffer

    // vocabulary registers (code-space body addresses)
    pub(crate) context: usize,
    pub(crate) current: usize,
    pub(crate) forth_voc: usize,
    pub(crate) last_word: usize, // dictionary index of the newest definition

    // error reporting
    pub(crate) errormsg: String,
    pub(crate) err_source: String,
    pub(crate) err_intp: usize,
    pub(crate) handlers: usize,

    // host callbacks
    pub(crate) app_prims: Option<AppPrimitives>,
    pub(crate) not_found: Option<NotFound>,

    // cached execution tokens the compiler emits
    pub(crate) lit_xt: usize,
    pub(crate) exit_xt: usize,
    pub(crate) branch_xt: usize,
    pub(crate) qbranch_xt: usize,
    pub(crate) dodo_xt: usize,
    pub(crate) doqdo_xt: usize,
    pub(crate) doloop_xt: usize,
    pub(crate) doaddloop_xt: usize,
    pub(crate) codecomma_xt: usize,
    pub(crate) store_xt: usize,
    pub(crate) dotry_xt: usize,
}

impl ForthRuntime {
    pub fn new(app_primitives: Option<AppPrimitives>, not_found: Option<NotFound>) -> ForthRuntime {
        ForthRuntime {
            kernel: Kernel::new(),
            ip: 0,
            running: 0,
            w: 0,
            state: FALSE,
            source: String::new(),
            intp: 0,
            word: String::new(),
            context: 0,
            current: 0,
            forth_voc: 0,
            last_word: 0,
            errormsg: String::new(),
            err_source: String::new(),
            err_intp: 0,
            handlers: 0,
            app_prims: app_primitives,
            not_found,
            lit_xt: 0,
            exit_xt: 0,
            branch_xt: 0,
            qbranch_xt: 0,
            dodo_xt: 0,
            doqdo_xt: 0,
            doloop_xt: 0,
            doaddloop_xt: 0,
            codecomma_xt: 0,
            store_xt: 0,
            dotry_xt: 0,
        }
    }

    /// Build the FORTH vocabulary and the core words, and capture the xts
    /// the compiler needs. Must run once before interpreting.
    pub fn cold_start(&mut self) -> ForthResult<()> {
        self.bootstrap_forth_vocabulary()?;
        for &(name, op, immediate) in CORE_WORDS {
            let xt = self.add_primitive_word(name, op as Cell, immediate)?;
            match op {
                Op::Lit => self.lit_xt = xt,
                Op::Exit => self.exit_xt = xt,
                Op::Branch => self.branch_xt = xt,
                Op::QBranch => self.qbranch_xt = xt,
                Op::DoDo => self.dodo_xt = xt,
                Op::DoQDo => self.doqdo_xt = xt,
                Op::DoLoop => self.doloop_xt = xt,
                Op::DoAddLoop => self.doaddloop_xt = xt,
                Op::CodeComma => self.codecomma_xt = xt,
                Op::Store => self.store_xt = xt,
                Op::DoTry => self.dotry_xt = xt,
                _ => {}
            }
        }
        self.state = FALSE;
        debug!(words = CORE_WORDS.len(), "cold start complete");
        Ok(())
    }

    // ------------------------------------------------------------ interpreting

    /// Run the outer interpreter over `text`. Errors are caught here: the
    /// return value says whether the whole text was consumed cleanly, and
    /// geterror() carries the message when it was not. Reentrant: a host
    /// primitive may call interpret() mid-line.
    pub fn interpret(&mut self, text: &str) -> bool {
        let prev_source = std::mem::replace(&mut self.source, text.to_string());
        let prev_intp = std::mem::replace(&mut self.intp, 0);
        self.handlers += 1;
        let result = self.do_interpret();
        self.handlers -= 1;
        let ok = match result {
            Ok(()) => true,
            Err(e) => {
                self.record_error(e);
                false
            }
        };
        self.source = prev_source;
        self.intp = prev_intp;
        ok
    }

    /// Find and run a single word by name.
    pub fn execute(&mut self, name: &str) -> bool {
        let xt = match self.find(name).and_then(|idx| {
            self.kernel.word(idx).ok().map(|rec| rec.xt)
        }) {
            Some(xt) => xt,
            None => {
                self.record_error(ForthError::Undefined(name.to_string()));
                return false;
            }
        };
        self.handlers += 1;
        let result = self.execute_xt(xt);
        self.handlers -= 1;
        match result {
            Ok(()) => true,
            Err(e) => {
                self.record_error(e);
                false
            }
        }
    }

    // ------------------------------------------------------------ registration

    /// Register one host primitive. The code must lie in the application
    /// range, at or above CORE_PRIM_FIRST.
    pub fn primitive(&mut self, name: &str, code: Cell, immediate: bool) -> ForthResult<()> {
        if code < CORE_PRIM_FIRST {
            return Err(ForthError::InvalidPrimitiveCode(code));
        }
        self.add_primitive_word(name, code, immediate)?;
        Ok(())
    }

    /// Register a whole library of host primitives.
    pub fn library(&mut self, words: &[PrimitiveWord]) -> ForthResult<()> {
        for word in words {
            self.primitive(word.name, word.code, word.immediate)?;
        }
        Ok(())
    }

    // -------------------------------------------------------- stack and memory

    pub fn push(&mut self, val: Cell) -> ForthResult<()> {
        self.kernel.push(val)
    }

    pub fn pop(&mut self) -> ForthResult<Cell> {
        self.kernel.pop()
    }

    pub fn fetch(&self, addr: Cell) -> ForthResult<Cell> {
        self.kernel.fetch(addr)
    }

    pub fn store(&mut self, addr: Cell, val: Cell) -> ForthResult<()> {
        self.kernel.store(addr, val)
    }

    pub fn cfetch(&self, addr: Cell) -> ForthResult<u8> {
        self.kernel.cfetch(addr)
    }

    pub fn cstore(&mut self, addr: Cell, val: u8) -> ForthResult<()> {
        self.kernel.cstore(addr, val)
    }

    /// A checked byte window into data space.
    pub fn area(&self, addr: Cell, size: usize) -> ForthResult<&[u8]> {
        self.kernel.area(addr, size)
    }

    /// The NUL-terminated string at `addr`, for host primitives like PRINT.
    pub fn string_at(&self, addr: Cell) -> ForthResult<String> {
        self.kernel.cstring_at(addr)
    }

    // --------------------------------------------------------------- observers

    pub fn getdepth(&self) -> usize {
        self.kernel.depth()
    }

    /// Stack cell `idx`, counted from the bottom.
    pub fn getstack(&self, idx: usize) -> ForthResult<Cell> {
        self.kernel.stack_at(idx)
    }

    /// FALSE when interpreting, TRUE mid-definition.
    pub fn getstate(&self) -> Cell {
        self.state
    }

    pub fn geterror(&self) -> &str {
        &self.errormsg
    }

    /// The source line holding the last error: (line, column, line number).
    pub fn geterrorline(&self) -> (&str, usize, usize) {
        let src = &self.err_source;
        let at = self.err_intp.min(src.len());
        let start = src[..at].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let end = src[at..].find('\n').map(|p| at + p).unwrap_or(src.len());
        let lineno = src[..start].matches('\n').count() + 1;
        (&src[start..end], at - start, lineno)
    }

    /// Return-stack depth at the point of the last error; the stack is not
    /// unwound by an error, so the trace survives until reset().
    pub fn gettracedepth(&self) -> usize {
        self.kernel.rsp()
    }

    /// Name of the word at backtrace level `idx`; the highest index is the
    /// innermost frame.
    pub fn gettrace(&self, idx: usize) -> &str {
        let depth = self.kernel.rsp();
        if depth == 0 || idx >= depth {
            return "?";
        }
        if idx == depth - 1 {
            return self.name_of_xt(self.running);
        }
        match self.kernel.rframe(idx + 1) {
            Some(frame) => self.name_of_xt(frame.xt),
            None => "?",
        }
    }

    /// Clear the stacks, compile state, error message and handler count.
    pub fn reset(&mut self) {
        self.kernel.clear_stacks();
        self.ip = 0;
        self.running = 0;
        self.w = 0;
        self.state = FALSE;
        self.errormsg.clear();
        self.handlers = 0;
    }

    // ------------------------------------------------------------- error paths

    pub(crate) fn record_error(&mut self, e: ForthError) {
        self.errormsg = e.to_string();
        self.err_source = self.source.clone();
        self.err_intp = self.intp;
        debug!(error = %self.errormsg, "interpreter error");
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            sp: self.kernel.sp(),
            rsp: self.kernel.rsp(),
            lsp: self.kernel.lsp(),
            ip: self.ip,
            running: self.running,
            intp: self.intp,
            state: self.state,
        }
    }

    pub(crate) fn restore(&mut self, c: Checkpoint) {
        self.kernel.set_sp(c.sp);
        self.kernel.set_rsp(c.rsp);
        self.kernel.set_lsp(c.lsp);
        self.ip = c.ip;
        self.running = c.running;
        self.intp = c.intp;
        self.state = c.state;
    }

    // ---------------------------------------------------------------- images

    pub(crate) fn cached_xts(&self) -> [usize; 11] {
        [
            self.lit_xt,
            self.exit_xt,
            self.branch_xt,
            self.qbranch_xt,
            self.dodo_xt,
            self.doqdo_xt,
            self.doloop_xt,
            self.doaddloop_xt,
            self.codecomma_xt,
            self.store_xt,
            self.dotry_xt,
        ]
    }

    pub(crate) fn set_cached_xts(&mut self, xts: [usize; 11]) {
        self.lit_xt = xts[0];
        self.exit_xt = xts[1];
        self.branch_xt = xts[2];
        self.qbranch_xt = xts[3];
        self.dodo_xt = xts[4];
        self.doqdo_xt = xts[5];
        self.doloop_xt = xts[6];
        self.doaddloop_xt = xts[7];
        self.codecomma_xt = xts[8];
        self.store_xt = xts[9];
        self.dotry_xt = xts[10];
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::TRUE;
    use std::cell::RefCell;

    thread_local! {
        static OUT: RefCell<String> = RefCell::new(String::new());
    }

    const DOT: Cell = CORE_PRIM_FIRST;
    const EMIT: Cell = CORE_PRIM_FIRST + 1;

    fn test_prims(vm: &mut ForthRuntime, prim: Cell) -> ForthResult<()> {
        match prim {
            DOT => {
                let v = vm.pop()?;
                OUT.with(|o| o.borrow_mut().push_str(&format!("{} ", v)));
                Ok(())
            }
            EMIT => {
                let c = vm.pop()?;
                OUT.with(|o| o.borrow_mut().push((c as u8) as char));
                Ok(())
            }
            other => Err(ForthError::InvalidOpcode(other)),
        }
    }

    fn magic_notfound(vm: &mut ForthRuntime, word: &str) -> bool {
        if word == "magic" {
            let _ = vm.push(99);
            true
        } else {
            false
        }
    }

    fn vm() -> ForthRuntime {
        let mut vm = ForthRuntime::new(Some(test_prims), None);
        vm.cold_start().unwrap();
        vm.primitive(".", DOT, false).unwrap();
        vm.primitive("emit", EMIT, false).unwrap();
        OUT.with(|o| o.borrow_mut().clear());
        vm
    }

    fn out() -> String {
        OUT.with(|o| o.borrow().clone())
    }

    fn stack(vm: &ForthRuntime) -> Vec<Cell> {
        (0..vm.getdepth()).map(|i| vm.getstack(i).unwrap()).collect()
    }

    #[test]
    fn test_arithmetic_and_dot() {
        let mut vm = vm();
        assert!(vm.interpret("2 3 + ."));
        assert_eq!(out(), "5 ");
    }

    #[test]
    fn test_colon_definition() {
        let mut vm = vm();
        assert!(vm.interpret(": SQ DUP * ; 7 SQ ."));
        assert_eq!(out(), "49 ");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let mut vm = vm();
        assert!(vm.interpret("5 DUP duP +"));
        assert_eq!(stack(&vm), vec![5, 10]);
    }

    #[test]
    fn test_if_else_then() {
        let mut vm = vm();
        assert!(vm.interpret(": pick-one if 10 else 20 then ;"));
        assert!(vm.interpret("1 pick-one 0 pick-one"));
        assert_eq!(stack(&vm), vec![10, 20]);
    }

    #[test]
    fn test_if_then_without_else() {
        let mut vm = vm();
        assert!(vm.interpret(": maybe if 7 then ; 0 maybe 1 maybe"));
        assert_eq!(stack(&vm), vec![7]);
    }

    #[test]
    fn test_begin_until() {
        let mut vm = vm();
        assert!(vm.interpret(": cnt 0 begin 1+ dup 5 >= until ; cnt"));
        assert_eq!(stack(&vm), vec![5]);
    }

    #[test]
    fn test_begin_while_repeat() {
        let mut vm = vm();
        assert!(vm.interpret(": w 0 begin dup 3 < while 1+ repeat ; w"));
        assert_eq!(stack(&vm), vec![3]);
    }

    #[test]
    fn test_do_loop_countup() {
        let mut vm = vm();
        assert!(vm.interpret(": COUNTUP 10 0 DO I . LOOP ; COUNTUP"));
        assert_eq!(out(), "0 1 2 3 4 5 6 7 8 9 ");
    }

    #[test]
    fn test_qdo_skips_empty_range() {
        let mut vm = vm();
        assert!(vm.interpret(": z 0 0 ?do 1 . loop ; z"));
        assert_eq!(out(), "");
        assert_eq!(vm.getdepth(), 0);
    }

    #[test]
    fn test_plus_loop() {
        let mut vm = vm();
        assert!(vm.interpret(": evens 10 0 do i . 2 +loop ; evens"));
        assert_eq!(out(), "0 2 4 6 8 ");
    }

    #[test]
    fn test_leave() {
        let mut vm = vm();
        assert!(vm.interpret(": l 10 0 do i 5 = if leave then i . loop ; l"));
        assert_eq!(out(), "0 1 2 3 4 ");
        assert_eq!(vm.getdepth(), 0);
    }

    #[test]
    fn test_nested_loops_and_j() {
        let mut vm = vm();
        assert!(vm.interpret(": nj 3 0 do 2 0 do j . loop loop ; nj"));
        assert_eq!(out(), "0 0 1 1 2 2 ");
    }

    #[test]
    fn test_leave_across_call_boundary_errors() {
        let mut vm = vm();
        assert!(vm.interpret(": runaway leave ;"));
        assert!(!vm.interpret(": host 3 0 do runaway loop ; host"));
        assert_eq!(vm.geterror(), "leave outside of a loop");
    }

    #[test]
    fn test_variable_store_fetch() {
        let mut vm = vm();
        assert!(vm.interpret("VARIABLE X 42 X ! X @ ."));
        assert_eq!(out(), "42 ");
    }

    #[test]
    fn test_constant() {
        let mut vm = vm();
        assert!(vm.interpret("7 constant seven seven seven +"));
        assert_eq!(stack(&vm), vec![14]);
    }

    #[test]
    fn test_value_and_to() {
        let mut vm = vm();
        assert!(vm.interpret("5 value v v"));
        assert_eq!(stack(&vm), vec![5]);
        assert!(vm.interpret("drop 9 to v v"));
        assert_eq!(stack(&vm), vec![9]);
        assert!(vm.interpret("drop : setv 3 to v ; setv v"));
        assert_eq!(stack(&vm), vec![3]);
    }

    #[test]
    fn test_to_on_non_value() {
        let mut vm = vm();
        assert!(vm.interpret("variable nv"));
        assert!(!vm.interpret("5 to nv"));
        assert_eq!(vm.geterror(), "nv is not a value");
    }

    #[test]
    fn test_create_does() {
        let mut vm = vm();
        assert!(vm.interpret(": C1 CREATE , DOES> @ ; 100 C1 HUN HUN ."));
        assert_eq!(out(), "100 ");
    }

    #[test]
    fn test_create_does_children_independent() {
        let mut vm = vm();
        assert!(vm.interpret(": con create , does> @ ;"));
        assert!(vm.interpret("11 con a 22 con b a b"));
        assert_eq!(stack(&vm), vec![11, 22]);
    }

    #[test]
    fn test_create_alone_pushes_here() {
        let mut vm = vm();
        assert!(vm.interpret("here create spot spot"));
        let items = stack(&vm);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], items[1]);
    }

    #[test]
    fn test_tick_and_execute() {
        let mut vm = vm();
        assert!(vm.interpret(": sq dup * ;"));
        assert!(vm.interpret("7 ' sq execute"));
        assert_eq!(stack(&vm), vec![49]);
    }

    #[test]
    fn test_recurse_factorial() {
        let mut vm = vm();
        assert!(vm.interpret(": FACT DUP 1 > IF DUP 1 - RECURSE * THEN ; 5 FACT ."));
        assert_eq!(out(), "120 ");
    }

    #[test]
    fn test_smudge_hides_definition_from_itself() {
        let mut vm = vm();
        assert!(!vm.interpret(": foo foo ;"));
        assert_eq!(vm.geterror(), "foo ?");
    }

    #[test]
    fn test_smudge_allows_shadowing() {
        let mut vm = vm();
        // the inner reference binds to the old definition
        assert!(vm.interpret(": d 1 ; : d d 2 ; d"));
        assert_eq!(stack(&vm), vec![1, 2]);
    }

    #[test]
    fn test_try_catches_division_by_zero() {
        let mut vm = vm();
        assert!(vm.interpret(": BAD 1 0 / ; TRY BAD ."));
        assert_eq!(out(), "0 ");
        assert_eq!(vm.geterror(), "division by zero");
    }

    #[test]
    fn test_try_success_pushes_true() {
        let mut vm = vm();
        assert!(vm.interpret(": good 42 ; try good"));
        assert_eq!(stack(&vm), vec![42, TRUE]);
    }

    #[test]
    fn test_try_restores_stack_on_failure() {
        let mut vm = vm();
        assert!(vm.interpret(": bad2 1 2 3 1 0 / ; try bad2"));
        // everything bad2 pushed is unwound; only the flag remains
        assert_eq!(stack(&vm), vec![0]);
    }

    #[test]
    fn test_try_compiled_and_nested() {
        let mut vm = vm();
        assert!(vm.interpret(": bad 1 0 / ;"));
        assert!(vm.interpret(": inner try bad ;"));
        assert!(vm.interpret(": outer try inner inner ; outer"));
        // outer's protected inner succeeds (pushing bad's flag), then the
        // plain inner call pushes another flag
        assert_eq!(stack(&vm), vec![0, TRUE, 0]);
    }

    #[test]
    fn test_try_missing_word() {
        let mut vm = vm();
        assert!(!vm.interpret("try"));
        assert_eq!(vm.geterror(), "missing word after try");
    }

    #[test]
    fn test_error_word_raises() {
        let mut vm = vm();
        assert!(!vm.interpret("\" boom\" error"));
        assert_eq!(vm.geterror(), "boom");
    }

    #[test]
    fn test_user_error_caught_by_try() {
        let mut vm = vm();
        assert!(vm.interpret(": thrower \" boom\" error ; try thrower"));
        assert_eq!(stack(&vm), vec![0]);
        assert_eq!(vm.geterror(), "boom");
    }

    #[test]
    fn test_unknown_word_message() {
        let mut vm = vm();
        assert!(!vm.interpret("xyzzy"));
        assert_eq!(vm.geterror(), "xyzzy ?");
    }

    #[test]
    fn test_unmatched_quote() {
        let mut vm = vm();
        assert!(!vm.interpret("\" no closing"));
        assert_eq!(vm.geterror(), "unmatched \"");
    }

    #[test]
    fn test_unmatched_paren() {
        let mut vm = vm();
        assert!(!vm.interpret("( no closing"));
        assert_eq!(vm.geterror(), "unmatched (");
    }

    #[test]
    fn test_unbalanced_semicolon() {
        let mut vm = vm();
        assert!(!vm.interpret(": b if ;"));
        assert_eq!(vm.geterror(), "unbalanced control structure");
        vm.reset();
    }

    #[test]
    fn test_then_without_if() {
        let mut vm = vm();
        assert!(!vm.interpret(": t then ;"));
        assert_eq!(vm.geterror(), "unbalanced control structure");
        vm.reset();
    }

    #[test]
    fn test_repeat_kind_mismatch() {
        let mut vm = vm();
        assert!(!vm.interpret(": r begin repeat ;"));
        assert_eq!(vm.geterror(), "unbalanced control structure");
        vm.reset();
    }

    #[test]
    fn test_control_flow_requires_compile_state() {
        let mut vm = vm();
        assert!(!vm.interpret("1 if 2 then"));
        assert_eq!(vm.geterror(), "unbalanced control structure");
    }

    #[test]
    fn test_vocabulary_search_order() {
        let mut vm = vm();
        assert!(vm.interpret("vocabulary app app definitions : w1 7 ;"));
        assert!(vm.interpret("forth definitions"));
        // not visible from FORTH...
        assert!(!vm.interpret("w1"));
        assert_eq!(vm.geterror(), "w1 ?");
        // ...but visible when APP is the context, and core words still
        // resolve through the parent chain
        assert!(vm.interpret("app w1 1+"));
        assert_eq!(stack(&vm), vec![8]);
    }

    #[test]
    fn test_definitions_targets_context() {
        let mut vm = vm();
        assert!(vm.interpret("vocabulary app app definitions : inner 1 ; forth definitions : outer 2 ;"));
        assert!(vm.interpret("outer"));
        assert_eq!(stack(&vm), vec![2]);
    }

    #[test]
    fn test_booleans_are_all_ones() {
        let mut vm = vm();
        assert!(vm.interpret("3 0<> 0 0<> 3 0= 0 0="));
        assert_eq!(stack(&vm), vec![TRUE, 0, 0, TRUE]);
    }

    #[test]
    fn test_boolean_roundtrip_invariant() {
        let mut vm = vm();
        for x in [-5, -1, 0, 1, 42] {
            vm.push(x).unwrap();
            assert!(vm.interpret("0<> 0="));
            let got = vm.pop().unwrap();
            assert_eq!(got == TRUE, x == 0, "x = {}", x);
        }
    }

    #[test]
    fn test_divmod_order() {
        let mut vm = vm();
        assert!(vm.interpret("7 3 /mod"));
        // remainder first, then quotient on top
        assert_eq!(stack(&vm), vec![1, 2]);
    }

    #[test]
    fn test_division_by_zero_message() {
        let mut vm = vm();
        assert!(!vm.interpret("1 0 /"));
        assert_eq!(vm.geterror(), "division by zero");
    }

    #[test]
    fn test_hex_literals() {
        let mut vm = vm();
        assert!(vm.interpret("0x10 0Xff"));
        assert_eq!(stack(&vm), vec![16, 255]);
        assert!(!vm.interpret("-0x10"));
        assert_eq!(vm.geterror(), "-0x10 ?");
    }

    #[test]
    fn test_comments() {
        let mut vm = vm();
        assert!(vm.interpret("( a comment ) 5 \\ the rest is ignored\n7"));
        assert_eq!(stack(&vm), vec![5, 7]);
    }

    #[test]
    fn test_string_literal_and_length() {
        let mut vm = vm();
        assert!(vm.interpret("\" hi\" length"));
        assert_eq!(stack(&vm), vec![2]);
    }

    #[test]
    fn test_string_escapes() {
        let mut vm = vm();
        assert!(vm.interpret("\" a\\nb\" 1+ c@"));
        assert_eq!(stack(&vm), vec![10]);
    }

    #[test]
    fn test_string_in_definition() {
        let mut vm = vm();
        assert!(vm.interpret(": greet \" hey\" ; greet length"));
        assert_eq!(stack(&vm), vec![3]);
    }

    #[test]
    fn test_anonymous_block_executes() {
        let mut vm = vm();
        assert!(vm.interpret("{ 1 2 + }"));
        assert_eq!(stack(&vm), vec![3]);
    }

    #[test]
    fn test_anonymous_block_with_loop() {
        let mut vm = vm();
        assert!(vm.interpret("{ 3 0 do i . loop }"));
        assert_eq!(out(), "0 1 2 ");
    }

    #[test]
    fn test_compile_word() {
        let mut vm = vm();
        assert!(vm.interpret(": l8r compile dup ; immediate : t2 l8r ; 5 t2"));
        assert_eq!(stack(&vm), vec![5, 5]);
    }

    #[test]
    fn test_bracket_compile() {
        let mut vm = vm();
        assert!(vm.interpret(": myif [compile] if ; immediate : t3 1 myif 42 then ; t3"));
        assert_eq!(stack(&vm), vec![42]);
    }

    #[test]
    fn test_bracket_tick() {
        let mut vm = vm();
        assert!(vm.interpret(": sq dup * ; : sq-xt ['] sq ; 7 sq-xt execute"));
        assert_eq!(stack(&vm), vec![49]);
    }

    #[test]
    fn test_bracket_deferred_compilation() {
        let mut vm = vm();
        // the ticked xt is appended into the body while interpreting
        // mid-definition, the manual route to recursion
        assert!(vm.interpret(": sq dup * ; : run-sq [ ' sq code, ] ; 7 run-sq"));
        assert_eq!(stack(&vm), vec![49]);
    }

    #[test]
    fn test_exit_leaves_word_early() {
        let mut vm = vm();
        assert!(vm.interpret(": e 1 exit 2 ; e"));
        assert_eq!(stack(&vm), vec![1]);
    }

    #[test]
    fn test_execute_api() {
        let mut vm = vm();
        assert!(vm.interpret(": sq dup * ;"));
        vm.push(7).unwrap();
        assert!(vm.execute("sq"));
        assert_eq!(vm.pop().unwrap(), 49);
        assert!(!vm.execute("nosuch"));
        assert_eq!(vm.geterror(), "nosuch ?");
    }

    #[test]
    fn test_not_found_callback() {
        let mut vm = ForthRuntime::new(Some(test_prims), Some(magic_notfound));
        vm.cold_start().unwrap();
        assert!(vm.interpret("magic 1 +"));
        assert_eq!(vm.pop().unwrap(), 100);
    }

    #[test]
    fn test_compile_interpret_duality() {
        let mut vm = vm();
        assert!(vm.interpret("2 3 + 4 *"));
        let interpreted = stack(&vm);
        vm.reset();
        assert!(vm.interpret(": t 2 3 + 4 * ; t"));
        assert_eq!(stack(&vm), interpreted);
    }

    #[test]
    fn test_here_allot_invariant() {
        let mut vm = vm();
        assert!(vm.interpret("here 16 allot here swap -"));
        assert_eq!(stack(&vm), vec![16]);
    }

    #[test]
    fn test_store_fetch_invariant() {
        let mut vm = vm();
        assert!(vm.interpret("variable y 123 y ! y @"));
        assert_eq!(stack(&vm), vec![123]);
    }

    #[test]
    fn test_cstore_cfetch_masks() {
        let mut vm = vm();
        assert!(vm.interpret("variable b 0x1ff b c! b c@"));
        assert_eq!(stack(&vm), vec![0xff]);
    }

    #[test]
    fn test_to_data() {
        let mut vm = vm();
        assert!(vm.interpret("variable v 9 v ! ' v >data @"));
        assert_eq!(stack(&vm), vec![9]);
    }

    #[test]
    fn test_stack_overflow_detected() {
        let mut vm = vm();
        assert!(!vm.interpret(": blow begin 1 again ; blow"));
        assert_eq!(vm.geterror(), "stack overflow");
        vm.reset();
    }

    #[test]
    fn test_getstate_mid_definition() {
        let mut vm = vm();
        assert!(vm.interpret(": part 1 2"));
        assert_ne!(vm.getstate(), 0);
        assert!(vm.interpret("+ ;"));
        assert_eq!(vm.getstate(), 0);
        assert!(vm.interpret("part"));
        assert_eq!(stack(&vm), vec![3]);
    }

    #[test]
    fn test_traceback_after_error() {
        let mut vm = vm();
        assert!(vm.interpret(": deep 1 0 / ; : mid deep ; : top mid ;"));
        assert!(!vm.interpret("top"));
        let depth = vm.gettracedepth();
        assert!(depth >= 3);
        assert_eq!(vm.gettrace(depth - 1), "deep");
        assert_eq!(vm.gettrace(depth - 2), "mid");
        assert_eq!(vm.gettrace(depth - 3), "top");
        vm.reset();
        assert_eq!(vm.gettracedepth(), 0);
    }

    #[test]
    fn test_geterrorline() {
        let mut vm = vm();
        assert!(!vm.interpret("1 2 +\nbogus word"));
        let (line, col, lineno) = vm.geterrorline();
        assert_eq!(line, "bogus word");
        assert_eq!(lineno, 2);
        assert!(col <= line.len());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut vm = vm();
        assert!(!vm.interpret(": part 1 2 nonsense"));
        vm.reset();
        assert_eq!(vm.getdepth(), 0);
        assert_eq!(vm.getstate(), 0);
        assert_eq!(vm.geterror(), "");
        assert_eq!(vm.gettracedepth(), 0);
    }

    #[test]
    fn test_primitive_code_range_enforced() {
        let mut vm = vm();
        let err = vm.primitive("low", 5, false).unwrap_err();
        assert_eq!(err.to_string(), "invalid primitive code 5");
    }

    #[test]
    fn test_missing_names_after_defining_words() {
        let mut vm = vm();
        assert!(!vm.interpret(":"));
        assert_eq!(vm.geterror(), "missing word after :");
        assert!(!vm.interpret("5 constant"));
        assert_eq!(vm.geterror(), "missing word after constant");
        assert!(!vm.interpret("'"));
        assert_eq!(vm.geterror(), "missing word after '");
    }

    #[test]
    fn test_word_too_long() {
        let mut vm = vm();
        let long = "x".repeat(40);
        assert!(!vm.interpret(&long));
        assert_eq!(vm.geterror(), "word too long");
    }
}
