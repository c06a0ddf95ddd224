/// Dictionary and vocabularies
///
/// A vocabulary is an ordinary word whose code field is DOVOCABULARY and
/// whose two-cell body is `[latest, parent]`: the dictionary index of its
/// newest definition and the code-space body address of its parent
/// vocabulary. Lookup starts at `context` and follows parent links; new
/// definitions link into `current`.
///
use crate::errors::{ForthError, ForthResult};
use crate::internals::inner::Op;
use crate::kernel::{Cell, WordFlags, WordRecord};
use crate::runtime::ForthRuntime;
use tracing::debug;

impl ForthRuntime {
    /// Search the vocabulary chain for `name`, case-insensitively, skipping
    /// smudged entries. Returns the dictionary index.
    pub fn find(&self, name: &str) -> Option<usize> {
        let mut voc = self.context;
        while voc != 0 {
            let mut idx = match self.kernel.code_get(voc) {
                Ok(latest) if latest > 0 => latest as usize,
                _ => 0,
            };
            while idx != 0 {
                let Ok(rec) = self.kernel.word(idx) else {
                    break;
                };
                if !rec.flags.contains(WordFlags::SMUDGED)
                    && self.kernel.name_at(rec.name).eq_ignore_ascii_case(name)
                {
                    return Some(idx);
                }
                idx = rec.link;
            }
            voc = match self.kernel.code_get(voc + 1) {
                Ok(parent) if parent > 0 => parent as usize,
                _ => 0,
            };
        }
        None
    }

    /// Create a dictionary record for `name`, linked into the `current`
    /// vocabulary, with its xt at the present end of code space. The caller
    /// emits the code field right after.
    pub(crate) fn add_word(&mut self, name: &str, flags: WordFlags) -> ForthResult<usize> {
        let name_off = self.kernel.name_append(name)?;
        let latest = self.kernel.code_get(self.current)?;
        let xt = self.kernel.cp();
        let idx = self.kernel.dict_append(WordRecord {
            link: latest.max(0) as usize,
            xt,
            name: name_off,
            flags,
        })?;
        self.kernel.code_set(self.current, idx as Cell)?;
        self.last_word = idx;
        debug!(name, xt, "defined");
        Ok(idx)
    }

    /// Define a primitive word: one code cell holding the opcode.
    pub(crate) fn add_primitive_word(
        &mut self,
        name: &str,
        opcode: Cell,
        immediate: bool,
    ) -> ForthResult<usize> {
        let flags = if immediate {
            WordFlags::IMMEDIATE
        } else {
            WordFlags::empty()
        };
        self.add_word(name, flags)?;
        self.kernel.code_append(opcode)
    }

    /// Hand-craft the bootstrap FORTH vocabulary. It cannot go through
    /// add_word because there is no `current` vocabulary to link it into
    /// yet; its own body becomes both `context` and `current`.
    pub(crate) fn bootstrap_forth_vocabulary(&mut self) -> ForthResult<()> {
        let name_off = self.kernel.name_append("forth")?;
        let xt = self.kernel.cp();
        let idx = self.kernel.dict_append(WordRecord {
            link: 0,
            xt,
            name: name_off,
            flags: WordFlags::empty(),
        })?;
        self.kernel.code_append(Op::DoVocabulary as Cell)?;
        let body = self.kernel.code_append(idx as Cell)?; // latest = FORTH itself
        self.kernel.code_append(0)?; // parent = none
        self.forth_voc = body;
        self.context = body;
        self.current = body;
        self.last_word = idx;
        Ok(())
    }

    /// VOCABULARY <name>: a new empty vocabulary whose parent is the one
    /// definitions currently go to.
    pub(crate) fn f_vocabulary(&mut self) -> ForthResult<()> {
        let name = self.getword(' ')?;
        if name.is_empty() {
            return Err(ForthError::MissingWord("vocabulary"));
        }
        self.add_word(&name, WordFlags::empty())?;
        self.kernel.code_append(Op::DoVocabulary as Cell)?;
        self.kernel.code_append(0)?; // latest
        self.kernel.code_append(self.current as Cell)?; // parent
        Ok(())
    }

    /// DEFINITIONS: new definitions go to the context vocabulary.
    pub(crate) fn f_definitions(&mut self) -> ForthResult<()> {
        self.current = self.context;
        Ok(())
    }

    /// IMMEDIATE: flip the immediate bit of the newest definition.
    pub(crate) fn f_immediate(&mut self) -> ForthResult<()> {
        if self.last_word == 0 {
            return Err(ForthError::DoesWithoutCreate);
        }
        let rec = self.kernel.word_mut(self.last_word)?;
        rec.flags.toggle(WordFlags::IMMEDIATE);
        Ok(())
    }

    /// Reverse lookup for the backtrace: the name of the word whose body
    /// starts at `xt`, or "?" for anonymous code.
    pub fn name_of_xt(&self, xt: usize) -> &str {
        for idx in 1..self.kernel.dictp() {
            if let Ok(rec) = self.kernel.word(idx) {
                if rec.xt == xt {
                    return self.kernel.name_at(rec.name);
                }
            }
        }
        "?"
    }
}
