use std::prelude::v1::*;
use std::fs::File;
use std::io::{self, BufRead, Read, Write, stdout, stderr};
use std::eprint;

use clap::Parser;

use crossterm::queue;
use crossterm::tty::IsTty;
use crossterm::style::{ResetColor, SetForegroundColor, Color, Print};

use crate::flowchart::*;
use crate::program::*;
use crate::runtime::Settings;

macro_rules! crash {
    ($ret:literal : $($tt:tt)*) => {{
        eprint!($($tt)*);
        eprint!("\n");
        std::process::exit($ret);
    }}
}

/// Standard RAPTOR program actions that can be performed
#[derive(Parser, Debug)]
pub enum Mode {
    /// Loads and runs a single program file
    Run {
        /// Path to the (.rap) program file
        src: String,

        /// Seed for the random number generator (default 0)
        #[clap(long, default_value_t = 0)]
        seed: u64,
    },
    /// Loads a single program file and dumps its decoded structure to stdout
    Dump {
        /// Path to the (.rap) program file
        src: String,
    },
}

#[derive(Debug)]
enum RunError {
    Io(io::Error),
    Exec(ExecError),
}
impl From<io::Error> for RunError { fn from(e: io::Error) -> Self { Self::Io(e) } }
impl From<ExecError> for RunError { fn from(e: ExecError) -> Self { Self::Exec(e) } }

/// Why `rap run` stopped early.
#[derive(Debug)]
enum RunFailure {
    /// The program hit a runtime error, which has been reported.
    Terminated,
    /// Reading from or writing to the terminal failed, possibly while reporting a runtime error.
    Terminal(io::Error),
}

/// Reports a runtime error with `report` and decides how the run ends.
fn finish(res: Result<(), RunError>, report: impl FnOnce(&ExecError) -> io::Result<()>) -> Result<(), RunFailure> {
    match res {
        Ok(()) => Ok(()),
        Err(RunError::Exec(e)) => match report(&e) {
            Ok(()) => Err(RunFailure::Terminated),
            Err(e) => Err(RunFailure::Terminal(e)),
        }
        Err(RunError::Io(e)) => Err(RunFailure::Terminal(e)),
    }
}

fn read_file(src: &str) -> io::Result<Vec<u8>> {
    let mut file = File::open(src)?;
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}
fn open_program(src: &str, settings: Settings) -> Program {
    let content = read_file(src).unwrap_or_else(|e| crash!(1: "failed to read file '{src}': {e}"));
    Program::load_with_settings(&content, settings).unwrap_or_else(|e| crash!(2: "failed to load '{src}': {e}"))
}

/// Writes program output and prompts, colored if stdout is a terminal.
struct Terminal {
    styled: bool,
}
impl Terminal {
    fn new() -> Self {
        Self { styled: stdout().is_tty() }
    }
    fn output(&self, text: &str) -> io::Result<()> {
        let mut out = stdout().lock();
        writeln!(out, "{text}")?;
        out.flush()
    }
    fn prompt(&self, prompt: &str) -> io::Result<()> {
        let mut out = stdout().lock();
        match self.styled {
            true => queue!(out, SetForegroundColor(Color::Blue), Print(prompt), Print(" > "), ResetColor)?,
            false => write!(out, "{prompt} > ")?,
        }
        out.flush()
    }
    fn error(&self, error: &ExecError) -> io::Result<()> {
        let mut out = stderr().lock();
        match self.styled && stderr().is_tty() {
            true => queue!(out, SetForegroundColor(Color::Red), Print(format!("runtime error: {error}\n")), ResetColor)?,
            false => writeln!(out, "runtime error: {error}")?,
        }
        out.flush()
    }
}

fn run_program(program: &mut Program, term: &Terminal) -> Result<(), RunError> {
    let mut stdin = io::stdin().lock();
    let mut line = String::new();
    loop {
        match program.step()? {
            StepResult::Continue => (),
            StepResult::Output(text) => {
                term.output(&text)?;
                program.resume()?;
            }
            StepResult::Input(prompt) => {
                term.prompt(&prompt)?;
                line.clear();
                if stdin.read_line(&mut line)? == 0 {
                    return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input ended while the program was waiting for an answer").into());
                }
                program.provide_input(line.trim_end_matches(['\r', '\n']))?;
                program.resume()?;
            }
            StepResult::Done => return Ok(()),
        }
    }
}

fn link(id: Option<NodeId>) -> String {
    match id {
        Some(x) => format!("{x}"),
        None => "-".into(),
    }
}
fn describe(node: &Node) -> String {
    match &node.kind {
        NodeKind::Oval => format!("terminal {:?} -> {}", node.label, link(node.successor)),
        NodeKind::OvalProcedure => format!("procedure {:?} -> {}", node.label, link(node.successor)),
        NodeKind::Rectangle { call: false } => format!("assign {:?} -> {}", node.label, link(node.successor)),
        NodeKind::Rectangle { call: true } => format!("call {:?} -> {}", node.label, link(node.successor)),
        NodeKind::IfControl { left, right } => format!("if {:?} yes {} no {} -> {}", node.label, link(*left), link(*right), link(node.successor)),
        NodeKind::Loop { before, after } => format!("loop until {:?} before {} after {} -> {}", node.label, link(*before), link(*after), link(node.successor)),
        NodeKind::Parallelogram { input: false, .. } => format!("output {:?} -> {}", node.label, link(node.successor)),
        NodeKind::Parallelogram { input: true, prompt } => format!("input {:?} prompt {:?} -> {}", node.label, prompt, link(node.successor)),
    }
}

fn dump_program(program: &Program, out: &mut impl Write) -> io::Result<()> {
    let info = program.info();
    writeln!(out, "version: {}", info.version)?;
    writeln!(out, "master mode: {}", info.master_mode)?;
    writeln!(out, "log entries: {}", info.logging.count)?;
    for entry in &info.logging.entries {
        writeln!(out, "  {} @ {} ticks {} kind {}",
            entry.user.as_deref().unwrap_or("?"), entry.machine.as_deref().unwrap_or("?"),
            entry.ticks.map(|x| format!("{x}")).unwrap_or_else(|| "?".into()),
            entry.kind.map(|x| format!("{x}")).unwrap_or_else(|| "?".into()))?;
    }

    for (i, chart) in program.subcharts().iter().enumerate() {
        write!(out, "\nsubchart {i} '{}' (kind {}", chart.name, chart.kind.0)?;
        if let Some(magic) = chart.magic {
            write!(out, ", magic {magic}")?;
        }
        writeln!(out, "):")?;
        for id in chart.flowchart.walk() {
            if let Some(node) = chart.flowchart.get(id) {
                writeln!(out, "  {id:>5}  {}", describe(node))?;
            }
        }
    }
    Ok(())
}

/// Runs a CLI client using the given [`Mode`] configuration.
pub fn run(mode: Mode) {
    match mode {
        Mode::Run { src, seed } => {
            let settings = Settings { rng_seed: seed, ..Default::default() };
            let mut program = open_program(&src, settings);
            let term = Terminal::new();
            match finish(run_program(&mut program, &term), |e| term.error(e)) {
                Ok(()) => (),
                Err(RunFailure::Terminated) => crash!(3: "program terminated"),
                Err(RunFailure::Terminal(e)) => crash!(4: "terminal error: {e}"),
            }
        }
        Mode::Dump { src } => {
            let program = open_program(&src, Settings::default());
            if let Err(e) = dump_program(&program, &mut stdout().lock()) {
                crash!(4: "terminal error: {e}");
            }
        }
    }
}

#[test]
fn test_finish() {
    use crate::runtime::ErrorCause;

    let error = || ExecError { cause: ErrorCause::UnknownCommand { label: "Begin".into() }, pos: None };
    let broken = || io::Error::new(io::ErrorKind::BrokenPipe, "closed");

    assert!(matches!(finish(Ok(()), |_| panic!()), Ok(())));

    let mut reported = vec![];
    let res = finish(Err(error().into()), |e| { reported.push(format!("{e}")); Ok(()) });
    assert!(matches!(res, Err(RunFailure::Terminated)));
    assert_eq!(reported, ["unknown command 'Begin'"]);

    match finish(Err(error().into()), |_| Err(broken())) {
        Err(RunFailure::Terminal(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        x => panic!("{x:?}"),
    }
    match finish(Err(broken().into()), |_| panic!()) {
        Err(RunFailure::Terminal(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        x => panic!("{x:?}"),
    }
}
