/// Image I/O
///
/// Three snapshot kinds, each opening with a 4-byte signature
/// `{mark, endian, cell_size, 0}`. Cells are written in native width and
/// byte order; the endian byte is a computed sentinel, so an image written
/// on one byte order refuses to load on the other.
///
/// System ('S'): code, data, dictionary, names, the FORTH vocabulary and
/// the cached xts: everything needed to resume with the same dictionary.
/// Program ('P'): an entry xt plus code, data and cached xts; headless.
/// Data ('D'): the data area only.
///
use crate::errors::{ForthError, ForthResult};
use crate::kernel::{
    Cell, WordFlags, WordRecord, CELL_BYTES, CODE_SIZE, DATA_SIZE, DICT_SIZE, NAMES_SIZE,
};
use crate::runtime::ForthRuntime;
use num_enum::TryFromPrimitive;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ImageKind {
    System = b'S',
    Program = b'P',
    Data = b'D',
}

/// First byte of a known-nonzero cell: 1 on little-endian, -1 (0xFF) on
/// big-endian once sign-extended through the probe below. Writer and reader
/// compute it the same way and compare.
fn endian_sentinel() -> u8 {
    let probe: Cell = 1;
    if probe.to_ne_bytes()[0] == 1 {
        1
    } else {
        (-1i8) as u8
    }
}

fn signature(kind: ImageKind) -> [u8; 4] {
    [kind as u8, endian_sentinel(), CELL_BYTES as u8, 0]
}

fn write_cell(w: &mut impl Write, x: Cell) -> ForthResult<()> {
    w.write_all(&x.to_ne_bytes())?;
    Ok(())
}

fn read_cell(r: &mut impl Read) -> ForthResult<Cell> {
    let mut bytes = [0u8; CELL_BYTES];
    r.read_exact(&mut bytes)?;
    Ok(Cell::from_ne_bytes(bytes))
}

/// A length-prefix cell, rejected when it does not fit its arena.
fn read_len(r: &mut impl Read, max: usize) -> ForthResult<usize> {
    let n = read_cell(r)?;
    if n < 0 || n as usize > max {
        return Err(ForthError::ImageTooLarge);
    }
    Ok(n as usize)
}

fn check_signature(r: &mut impl Read, expect: ImageKind) -> ForthResult<()> {
    let mut sig = [0u8; 4];
    r.read_exact(&mut sig)?;
    let kind = ImageKind::try_from_primitive(sig[0]).map_err(|_| ForthError::BadImageSignature)?;
    if kind != expect
        || sig[1] != endian_sentinel()
        || sig[2] != CELL_BYTES as u8
        || sig[3] != 0
    {
        return Err(ForthError::BadImageSignature);
    }
    Ok(())
}

impl ForthRuntime {
    fn write_code(&self, w: &mut impl Write) -> ForthResult<()> {
        let cp = self.kernel.cp();
        write_cell(w, cp as Cell)?;
        for &cell in self.kernel.code_slice(cp) {
            write_cell(w, cell)?;
        }
        Ok(())
    }

    fn read_code(&mut self, r: &mut impl Read) -> ForthResult<()> {
        let cp = read_len(r, CODE_SIZE)?;
        let code = self.kernel.code_slice_mut();
        for slot in code.iter_mut().take(cp) {
            *slot = read_cell(r)?;
        }
        code[cp..].fill(0);
        self.kernel.set_cp(cp.max(1));
        Ok(())
    }

    fn write_data(&self, w: &mut impl Write) -> ForthResult<()> {
        let dp = self.kernel.dp();
        write_cell(w, dp as Cell)?;
        w.write_all(self.kernel.data_slice(dp))?;
        Ok(())
    }

    fn read_data(&mut self, r: &mut impl Read) -> ForthResult<()> {
        let dp = read_len(r, DATA_SIZE)?;
        let data = self.kernel.data_slice_mut();
        r.read_exact(&mut data[..dp])?;
        data[dp..].fill(0);
        self.kernel.set_dp(dp.max(1));
        Ok(())
    }

    fn write_xts(&self, w: &mut impl Write) -> ForthResult<()> {
        for xt in self.cached_xts() {
            write_cell(w, xt as Cell)?;
        }
        Ok(())
    }

    fn read_xts(&mut self, r: &mut impl Read) -> ForthResult<()> {
        let mut xts = [0usize; 11];
        for xt in xts.iter_mut() {
            let cell = read_cell(r)?;
            *xt = self.kernel.check_code_addr(cell)?;
        }
        self.set_cached_xts(xts);
        Ok(())
    }

    /// Write a complete system image.
    pub fn savesystem(&mut self, fname: &str) -> ForthResult<()> {
        let mut w = BufWriter::new(File::create(fname)?);
        w.write_all(&signature(ImageKind::System))?;
        self.write_code(&mut w)?;
        self.write_data(&mut w)?;
        let dictp = self.kernel.dictp();
        write_cell(&mut w, dictp as Cell)?;
        for rec in self.kernel.dict_slice(dictp) {
            write_cell(&mut w, rec.link as Cell)?;
            write_cell(&mut w, rec.xt as Cell)?;
            write_cell(&mut w, rec.name as Cell)?;
            w.write_all(&[rec.flags.bits()])?;
        }
        let namesp = self.kernel.namesp();
        write_cell(&mut w, namesp as Cell)?;
        w.write_all(self.kernel.names_slice(namesp))?;
        write_cell(&mut w, self.forth_voc as Cell)?;
        self.write_xts(&mut w)?;
        w.flush()?;
        debug!(fname, "system image saved");
        Ok(())
    }

    /// Restore a system image; transient state (stacks, source, compile
    /// state) is reset, and the search order returns to FORTH.
    pub fn loadsystem(&mut self, fname: &str) -> ForthResult<()> {
        let mut r = BufReader::new(File::open(fname)?);
        check_signature(&mut r, ImageKind::System)?;
        self.read_code(&mut r)?;
        self.read_data(&mut r)?;
        let dictp = read_len(&mut r, DICT_SIZE)?;
        for i in 0..dictp {
            let link = read_cell(&mut r)?;
            let xt = read_cell(&mut r)?;
            let name = read_cell(&mut r)?;
            let mut flags = [0u8; 1];
            r.read_exact(&mut flags)?;
            self.kernel.dict_slice_mut()[i] = WordRecord {
                link: link.max(0) as usize,
                xt: xt.max(0) as usize,
                name: name.max(0) as usize,
                flags: WordFlags::from_bits_truncate(flags[0]),
            };
        }
        self.kernel.dict_slice_mut()[dictp..].fill(WordRecord::default());
        self.kernel.set_dictp(dictp.max(1));
        let namesp = read_len(&mut r, NAMES_SIZE)?;
        {
            let names = self.kernel.names_slice_mut();
            r.read_exact(&mut names[..namesp])?;
            names[namesp..].fill(0);
        }
        self.kernel.set_namesp(namesp.max(1));
        let forth_voc = read_cell(&mut r)?;
        self.forth_voc = self.kernel.check_code_addr(forth_voc)?;
        self.read_xts(&mut r)?;
        self.context = self.forth_voc;
        self.current = self.forth_voc;
        self.reset();
        debug!(fname, "system image loaded");
        Ok(())
    }

    /// Write a headless program image whose entry point is the named word.
    pub fn saveprogram(&mut self, fname: &str, entry: &str) -> ForthResult<()> {
        let idx = self
            .find(entry)
            .ok_or_else(|| ForthError::Undefined(entry.to_string()))?;
        let entry_xt = self.kernel.word(idx)?.xt;
        let mut w = BufWriter::new(File::create(fname)?);
        w.write_all(&signature(ImageKind::Program))?;
        write_cell(&mut w, entry_xt as Cell)?;
        self.write_code(&mut w)?;
        self.write_data(&mut w)?;
        self.write_xts(&mut w)?;
        w.flush()?;
        debug!(fname, entry, "program image saved");
        Ok(())
    }

    /// Load a program image, reset transient state, and run its entry word.
    /// Returns the success flag; on failure the message is in geterror().
    pub fn runprogram(&mut self, fname: &str) -> bool {
        let entry = match self.load_program(fname) {
            Ok(entry) => entry,
            Err(e) => {
                self.record_error(e);
                return false;
            }
        };
        self.handlers += 1;
        let result = self.execute_xt(entry);
        self.handlers -= 1;
        match result {
            Ok(()) => true,
            Err(e) => {
                self.record_error(e);
                false
            }
        }
    }

    fn load_program(&mut self, fname: &str) -> ForthResult<usize> {
        let mut r = BufReader::new(File::open(fname)?);
        check_signature(&mut r, ImageKind::Program)?;
        let entry = read_cell(&mut r)?;
        let entry = self.kernel.check_code_addr(entry)?;
        self.read_code(&mut r)?;
        self.read_data(&mut r)?;
        self.read_xts(&mut r)?;
        self.reset();
        Ok(entry)
    }

    /// Write the data area alone.
    pub fn savedata(&mut self, fname: &str) -> ForthResult<()> {
        let mut w = BufWriter::new(File::create(fname)?);
        w.write_all(&signature(ImageKind::Data))?;
        self.write_data(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// Replace the data area from a data image. Stacks and code are left
    /// alone.
    pub fn loaddata(&mut self, fname: &str) -> ForthResult<()> {
        let mut r = BufReader::new(File::open(fname)?);
        check_signature(&mut r, ImageKind::Data)?;
        self.read_data(&mut r)
    }
}

//////////////////////////////////////////////
/// TESTS
///
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn booted() -> ForthRuntime {
        let mut vm = ForthRuntime::new(None, None);
        vm.cold_start().unwrap();
        vm
    }

    #[test]
    fn test_system_image_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sys.img");
        let path = path.to_str().unwrap();

        let mut vm = booted();
        assert!(vm.interpret(": sq dup * ;"));
        assert!(vm.interpret("variable x 42 x !"));
        vm.savesystem(path).unwrap();

        // a brand-new VM (no cold start) must come back fully populated
        let mut vm2 = ForthRuntime::new(None, None);
        vm2.loadsystem(path).unwrap();
        assert!(vm2.interpret("7 sq"));
        assert_eq!(vm2.pop().unwrap(), 49);
        assert!(vm2.interpret("x @"));
        assert_eq!(vm2.pop().unwrap(), 42);
    }

    #[test]
    fn test_system_image_preserves_observables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sys.img");
        let path = path.to_str().unwrap();

        let mut vm = booted();
        assert!(vm.interpret(": noop ;"));
        let cp = vm.kernel.cp();
        let dp = vm.kernel.dp();
        let dictp = vm.kernel.dictp();
        let namesp = vm.kernel.namesp();
        let xts = vm.cached_xts();
        vm.savesystem(path).unwrap();

        let mut vm2 = ForthRuntime::new(None, None);
        vm2.loadsystem(path).unwrap();
        assert_eq!(vm2.kernel.cp(), cp);
        assert_eq!(vm2.kernel.dp(), dp);
        assert_eq!(vm2.kernel.dictp(), dictp);
        assert_eq!(vm2.kernel.namesp(), namesp);
        assert_eq!(vm2.cached_xts(), xts);
        assert_eq!(
            vm.kernel.code_slice(cp),
            vm2.kernel.code_slice(cp)
        );
        assert_eq!(vm.kernel.data_slice(dp), vm2.kernel.data_slice(dp));
    }

    #[test]
    fn test_program_image_runs_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prog.img");
        let path = path.to_str().unwrap();

        let mut vm = booted();
        assert!(vm.interpret(": main 6 7 * ;"));
        vm.saveprogram(path, "main").unwrap();

        let mut vm2 = ForthRuntime::new(None, None);
        assert!(vm2.runprogram(path));
        assert_eq!(vm2.pop().unwrap(), 42);
    }

    #[test]
    fn test_saveprogram_unknown_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prog.img");
        let mut vm = booted();
        let err = vm.saveprogram(path.to_str().unwrap(), "nosuch").unwrap_err();
        assert_eq!(err.to_string(), "nosuch ?");
    }

    #[test]
    fn test_data_image_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.img");
        let path = path.to_str().unwrap();

        let mut vm = booted();
        assert!(vm.interpret("variable q 55 q !"));
        vm.savedata(path).unwrap();
        assert!(vm.interpret("66 q !"));
        vm.loaddata(path).unwrap();
        assert!(vm.interpret("q @"));
        assert_eq!(vm.pop().unwrap(), 55);
    }

    #[test]
    fn test_signature_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.img");
        let path = path.to_str().unwrap();

        let mut vm = booted();
        vm.savedata(path).unwrap();
        // a data image is not a system image
        assert!(matches!(
            vm.loadsystem(path),
            Err(ForthError::BadImageSignature)
        ));
    }

    #[test]
    fn test_truncated_image_is_io_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trunc.img");
        std::fs::write(&path, signature(ImageKind::System)).unwrap();
        let mut vm = booted();
        assert!(matches!(
            vm.loadsystem(path.to_str().unwrap()),
            Err(ForthError::Io(_))
        ));
    }

    #[test]
    fn test_garbage_file_is_bad_signature() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.img");
        std::fs::write(&path, b"not an image").unwrap();
        let mut vm = booted();
        assert!(matches!(
            vm.loadsystem(path.to_str().unwrap()),
            Err(ForthError::BadImageSignature)
        ));
    }
}
