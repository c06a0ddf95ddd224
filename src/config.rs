// system configuration and command line processing
//
// This is the REPL frontend: an external collaborator of the core. It reads
// lines from stdin (or a source file given on the command line), feeds them
// to the interpreter, and renders error traces. The application primitives
// registered here supply all terminal output; the core itself never prints.

use clap::{arg, Command};
use rforth::{Cell, ForthError, ForthResult, ForthRuntime, PrimitiveWord, CORE_PRIM_FIRST};
use std::io::{self, BufRead, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing_subscriber::EnvFilter;

pub const VERSION: &str = "0.1.0";

// Application primitive numbers, all at or above CORE_PRIM_FIRST.
const BYE: Cell = CORE_PRIM_FIRST;
const DOT: Cell = CORE_PRIM_FIRST + 1;
const DOTX: Cell = CORE_PRIM_FIRST + 2;
const EMIT: Cell = CORE_PRIM_FIRST + 3;
const PRINT: Cell = CORE_PRIM_FIRST + 4;
const CR: Cell = CORE_PRIM_FIRST + 5;
const CLOCK: Cell = CORE_PRIM_FIRST + 6;
const DOTQUOTE: Cell = CORE_PRIM_FIRST + 7;

const APP_WORDS: &[PrimitiveWord] = &[
    PrimitiveWord { name: "bye", code: BYE, immediate: false },
    PrimitiveWord { name: ".", code: DOT, immediate: false },
    PrimitiveWord { name: ".x", code: DOTX, immediate: false },
    PrimitiveWord { name: "emit", code: EMIT, immediate: false },
    PrimitiveWord { name: "print", code: PRINT, immediate: false },
    PrimitiveWord { name: "cr", code: CR, immediate: false },
    PrimitiveWord { name: "clock", code: CLOCK, immediate: false },
    PrimitiveWord { name: ".\"", code: DOTQUOTE, immediate: true },
];

/// The single dispatch callback for every application primitive.
fn app_primitives(vm: &mut ForthRuntime, prim: Cell) -> ForthResult<()> {
    match prim {
        BYE => std::process::exit(0),
        DOT => {
            print!("{} ", vm.pop()?);
            Ok(())
        }
        DOTX => {
            print!("{:X} ", vm.pop()?);
            Ok(())
        }
        EMIT => {
            let c = vm.pop()?;
            print!("{}", (c as u8) as char);
            Ok(())
        }
        PRINT => {
            let addr = vm.pop()?;
            print!("{}", vm.string_at(addr)?);
            Ok(())
        }
        CR => {
            println!();
            Ok(())
        }
        CLOCK => {
            let micros = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_micros() as Cell)
                .unwrap_or(0);
            vm.push(micros)
        }
        // ." composes the core string word with PRINT: at compile time the
        // string is compiled and a call to PRINT follows it.
        DOTQUOTE => {
            if !vm.execute("\"") || !vm.interpret("print") {
                return Err(ForthError::UserRaised(vm.geterror().to_string()));
            }
            Ok(())
        }
        other => Err(ForthError::InvalidOpcode(other)),
    }
}

pub struct Config {
    pub loaded_file: String,
    pub image_file: String,
    pub run: bool,
}

impl Config {
    pub fn new() -> Config {
        Config {
            loaded_file: "".to_owned(),
            image_file: "".to_owned(),
            run: true,
        }
    }

    /// process_args handles command line argument processing using the clap library
    ///
    pub fn process_args(&mut self) -> &Config {
        let arguments = Command::new("rforth")
            .version(VERSION)
            .about("An embeddable Forth interpreter")
            .arg(arg!(-f --file <VALUE> "interpret a source file before reading stdin").required(false))
            .arg(arg!(-i --image <VALUE> "boot from a saved system image").required(false))
            .get_matches();

        if let Some(file) = arguments.get_one::<String>("file") {
            self.loaded_file = file.clone();
        }

        if let Some(image) = arguments.get_one::<String>("image") {
            self.image_file = image.clone();
        }
        self
    }

    /// Boot the VM and run the read-interpret loop.
    pub fn run_forth(&mut self) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();

        let mut vm = ForthRuntime::new(Some(app_primitives), None);
        if let Err(e) = vm.cold_start() {
            eprintln!("cold start failed: {}", e);
            return;
        }
        if let Err(e) = vm.library(APP_WORDS) {
            eprintln!("library registration failed: {}", e);
            return;
        }
        if !self.image_file.is_empty() {
            if let Err(e) = vm.loadsystem(&self.image_file) {
                eprintln!("{}: {}", self.image_file, e);
                return;
            }
        }

        if !self.loaded_file.is_empty() {
            match std::fs::read_to_string(&self.loaded_file) {
                Ok(source) => {
                    if !vm.interpret(&source) {
                        print_error(&vm, &self.loaded_file);
                        vm.reset();
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", self.loaded_file, e);
                    return;
                }
            }
        }

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            if vm.interpret(&line) {
                if vm.getstate() == 0 {
                    println!(" OK");
                }
            } else {
                print_error(&vm, "<stdin>");
                vm.reset();
            }
            let _ = io::stdout().flush();
        }
    }
}

/// Error display: message, the offending line with a caret, the return-stack
/// traceback, and the data stack.
fn print_error(vm: &ForthRuntime, source_name: &str) {
    eprintln!("Error: {}", vm.geterror());
    let (line, col, lineno) = vm.geterrorline();
    if !line.is_empty() {
        eprintln!("{}:{}", source_name, lineno);
        eprintln!("{}", line);
        eprintln!("{:>width$}", "^", width = col.max(1));
    }
    if vm.gettracedepth() > 0 {
        eprintln!("Traceback:");
        for i in (0..vm.gettracedepth()).rev() {
            eprintln!("\t{}", vm.gettrace(i));
        }
    }
    let mut stack_line = String::from("Stack: ");
    if vm.getdepth() == 0 {
        stack_line.push_str("empty");
    }
    for i in 0..vm.getdepth() {
        stack_line.push_str(&format!("{} ", vm.getstack(i).unwrap_or(0)));
    }
    eprintln!("{}", stack_line);
}
