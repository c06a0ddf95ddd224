// General-purpose builtin words: arithmetic, comparison, logic, stack
// shuffling, and the data-space accessors.

use crate::errors::{ForthError, ForthResult};
use crate::kernel::{Cell, CELL_BYTES, FALSE, TRUE};
use crate::runtime::ForthRuntime;

#[inline]
fn bool_cell(b: bool) -> Cell {
    if b {
        TRUE
    } else {
        FALSE
    }
}

impl ForthRuntime {
    fn pop2_push1<F>(&mut self, f: F) -> ForthResult<()>
    where
        F: Fn(Cell, Cell) -> Cell,
    {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        self.kernel.push(f(a, b))
    }

    fn pop1_push1<F>(&mut self, f: F) -> ForthResult<()>
    where
        F: Fn(Cell) -> Cell,
    {
        let a = self.kernel.pop()?;
        self.kernel.push(f(a))
    }

    // ------------------------------------------------------------- arithmetic

    pub(crate) fn f_plus(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.wrapping_add(b))
    }

    pub(crate) fn f_minus(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.wrapping_sub(b))
    }

    pub(crate) fn f_times(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.wrapping_mul(b))
    }

    pub(crate) fn f_divide(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        if b == 0 {
            return Err(ForthError::DivisionByZero);
        }
        self.kernel.push(a.wrapping_div(b))
    }

    pub(crate) fn f_mod(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        if b == 0 {
            return Err(ForthError::DivisionByZero);
        }
        self.kernel.push(a.wrapping_rem(b))
    }

    /// /MOD ( a b -- rem quot ) remainder first, then quotient.
    pub(crate) fn f_divmod(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        if b == 0 {
            return Err(ForthError::DivisionByZero);
        }
        self.kernel.push(a.wrapping_rem(b))?;
        self.kernel.push(a.wrapping_div(b))
    }

    pub(crate) fn f_abs(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_abs())
    }

    pub(crate) fn f_negate(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_neg())
    }

    pub(crate) fn f_min(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.min(b))
    }

    pub(crate) fn f_max(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.max(b))
    }

    pub(crate) fn f_one_plus(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_add(1))
    }

    pub(crate) fn f_one_minus(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_sub(1))
    }

    pub(crate) fn f_two_star(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_shl(1))
    }

    pub(crate) fn f_two_slash(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a >> 1)
    }

    pub(crate) fn f_lshift(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a.wrapping_shl(b as u32))
    }

    pub(crate) fn f_rshift(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| ((a as u64).wrapping_shr(b as u32)) as Cell)
    }

    pub(crate) fn f_and(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a & b)
    }

    pub(crate) fn f_or(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a | b)
    }

    pub(crate) fn f_xor(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| a ^ b)
    }

    pub(crate) fn f_invert(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| !a)
    }

    // ------------------------------------------------------------- comparison

    pub(crate) fn f_equal(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a == b))
    }

    pub(crate) fn f_not_equal(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a != b))
    }

    pub(crate) fn f_less(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a < b))
    }

    pub(crate) fn f_greater(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a > b))
    }

    pub(crate) fn f_less_eq(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a <= b))
    }

    pub(crate) fn f_greater_eq(&mut self) -> ForthResult<()> {
        self.pop2_push1(|a, b| bool_cell(a >= b))
    }

    pub(crate) fn f_0equal(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| bool_cell(a == 0))
    }

    pub(crate) fn f_0less(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| bool_cell(a < 0))
    }

    pub(crate) fn f_0greater(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| bool_cell(a > 0))
    }

    pub(crate) fn f_0not_equal(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| bool_cell(a != 0))
    }

    pub(crate) fn f_true(&mut self) -> ForthResult<()> {
        self.kernel.push(TRUE)
    }

    pub(crate) fn f_false(&mut self) -> ForthResult<()> {
        self.kernel.push(FALSE)
    }

    // -------------------------------------------------------- stack shuffling

    pub(crate) fn f_dup(&mut self) -> ForthResult<()> {
        let top = self.kernel.top()?;
        self.kernel.push(top)
    }

    /// ?DUP duplicates only a nonzero top.
    pub(crate) fn f_q_dup(&mut self) -> ForthResult<()> {
        let top = self.kernel.top()?;
        if top != 0 {
            self.kernel.push(top)?;
        }
        Ok(())
    }

    pub(crate) fn f_drop(&mut self) -> ForthResult<()> {
        self.kernel.pop()?;
        Ok(())
    }

    pub(crate) fn f_swap(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        self.kernel.push(b)?;
        self.kernel.push(a)
    }

    pub(crate) fn f_over(&mut self) -> ForthResult<()> {
        let second = self.kernel.pick(1)?;
        self.kernel.push(second)
    }

    pub(crate) fn f_rot(&mut self) -> ForthResult<()> {
        let c = self.kernel.pop()?;
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        self.kernel.push(b)?;
        self.kernel.push(c)?;
        self.kernel.push(a)
    }

    pub(crate) fn f_nip(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        self.kernel.pop()?;
        self.kernel.push(b)
    }

    pub(crate) fn f_tuck(&mut self) -> ForthResult<()> {
        let b = self.kernel.pop()?;
        let a = self.kernel.pop()?;
        self.kernel.push(b)?;
        self.kernel.push(a)?;
        self.kernel.push(b)
    }

    /// PICK ( .. n -- .. v ) copy of the nth item below the (removed) count.
    pub(crate) fn f_pick(&mut self) -> ForthResult<()> {
        let n = self.kernel.pop()?;
        if n < 0 {
            return Err(ForthError::StackUnderflow);
        }
        let val = self.kernel.pick(n as usize)?;
        self.kernel.push(val)
    }

    pub(crate) fn f_depth(&mut self) -> ForthResult<()> {
        let depth = self.kernel.depth() as Cell;
        self.kernel.push(depth)
    }

    // ------------------------------------------------------------- data space

    /// @ ( a -- n )
    pub(crate) fn f_fetch(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let val = self.kernel.fetch(addr)?;
        self.kernel.push(val)
    }

    /// ! ( n a -- )
    pub(crate) fn f_store(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let val = self.kernel.pop()?;
        self.kernel.store(addr, val)
    }

    /// C@ ( a -- c )
    pub(crate) fn f_cfetch(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let val = self.kernel.cfetch(addr)?;
        self.kernel.push(val as Cell)
    }

    /// C! ( c a -- ) stores the low byte of c.
    pub(crate) fn f_cstore(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let val = self.kernel.pop()?;
        self.kernel.cstore(addr, val as u8)
    }

    /// +! ( n a -- )
    pub(crate) fn f_add_store(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let n = self.kernel.pop()?;
        let old = self.kernel.fetch(addr)?;
        self.kernel.store(addr, old.wrapping_add(n))
    }

    /// MOVE ( src dst n -- )
    pub(crate) fn f_move(&mut self) -> ForthResult<()> {
        let n = self.kernel.pop()?;
        let dst = self.kernel.pop()?;
        let src = self.kernel.pop()?;
        if n < 0 {
            return Err(ForthError::InvalidDataArea {
                addr: src,
                size: n as usize,
            });
        }
        self.kernel.move_bytes(src, dst, n as usize)
    }

    /// FILL ( a n c -- )
    pub(crate) fn f_fill(&mut self) -> ForthResult<()> {
        let c = self.kernel.pop()?;
        let n = self.kernel.pop()?;
        let addr = self.kernel.pop()?;
        if n < 0 {
            return Err(ForthError::InvalidDataArea {
                addr,
                size: n as usize,
            });
        }
        self.kernel.fill(addr, n as usize, c as u8)
    }

    /// ERASE ( a n -- )
    pub(crate) fn f_erase(&mut self) -> ForthResult<()> {
        let n = self.kernel.pop()?;
        let addr = self.kernel.pop()?;
        if n < 0 {
            return Err(ForthError::InvalidDataArea {
                addr,
                size: n as usize,
            });
        }
        self.kernel.fill(addr, n as usize, 0)
    }

    /// ALLOT ( n -- )
    pub(crate) fn f_allot(&mut self) -> ForthResult<()> {
        let n = self.kernel.pop()?;
        self.kernel.allot(n)
    }

    /// HERE ( -- a ) first free data byte.
    pub(crate) fn f_here(&mut self) -> ForthResult<()> {
        let dp = self.kernel.dp() as Cell;
        self.kernel.push(dp)
    }

    /// , ( n -- ) reserve one cell of data space and store n there.
    pub(crate) fn f_comma(&mut self) -> ForthResult<()> {
        let val = self.kernel.pop()?;
        let addr = self.kernel.dp() as Cell;
        self.kernel.allot(CELL_BYTES as Cell)?;
        self.kernel.store(addr, val)
    }

    /// COUNT ( a -- a+1 c ) split off the first byte.
    pub(crate) fn f_count(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let c = self.kernel.cfetch(addr)?;
        self.kernel.push(addr + 1)?;
        self.kernel.push(c as Cell)
    }

    /// LENGTH ( a -- n ) length of the NUL-terminated string at a.
    pub(crate) fn f_length(&mut self) -> ForthResult<()> {
        let addr = self.kernel.pop()?;
        let n = self.kernel.cstring_len(addr)?;
        self.kernel.push(n as Cell)
    }

    pub(crate) fn f_cell(&mut self) -> ForthResult<()> {
        self.kernel.push(CELL_BYTES as Cell)
    }

    pub(crate) fn f_cells(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_mul(CELL_BYTES as Cell))
    }

    pub(crate) fn f_cell_plus(&mut self) -> ForthResult<()> {
        self.pop1_push1(|a| a.wrapping_add(CELL_BYTES as Cell))
    }
}
