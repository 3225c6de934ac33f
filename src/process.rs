//! The stepwise interpreter.
//!
//! A [`Process`] visits exactly one flowchart component per call to [`Process::step`].
//! Output and input components suspend the process until the host calls [`Process::resume`];
//! while suspended, [`Process::step`] keeps reporting the same interrupt.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;

use compact_str::CompactString;
use educe::Educe;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use unicase::UniCase;

use crate::ast::*;
use crate::eval::Evaluator;
use crate::flowchart::*;
use crate::parser::*;
use crate::program::SubChart;
use crate::runtime::*;

/// Identifies a subchart by its position in the program.
pub type ChartId = usize;

/// The component at which an error occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// The name of the subchart.
    pub chart: CompactString,
    /// The object id of the component.
    pub node: NodeId,
}

/// An error that terminated a [`Process`], or a request the process could not honor.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecError {
    pub cause: ErrorCause,
    /// The component being executed, if the error came from executing one.
    pub pos: Option<Location>,
}
impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{} (in subchart '{}', component {})", self.cause, pos.chart, pos.node),
            None => write!(f, "{}", self.cause),
        }
    }
}

/// The execution state of a [`Process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Suspended after producing output text.
    InterruptedForOutput(CompactString),
    /// Suspended until the host answers the given prompt.
    InterruptedForInput(CompactString),
    /// Finished, either normally or because of an error.
    Done,
}

/// Result of stepping through a [`Process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// A component was executed and the process can keep going.
    Continue,
    /// The program printed this text. Reported until the host calls [`Process::resume`].
    Output(CompactString),
    /// The program wants input, showing this prompt. Reported until the host answers and calls [`Process::resume`].
    Input(CompactString),
    /// The program has finished.
    Done,
}

/// The kind of a control construct that is currently open, innermost last in [`Process::block_stack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    If,
    /// A call to a procedure, which has its own scope.
    Proc,
    /// A call to a plain subchart, which shares the caller's variables.
    Func,
    /// A loop that will test its condition next time it is reached.
    LoopStart,
    /// A loop whose body is running.
    LoopBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopPhase {
    Start,
    Body,
}

/// Where control goes when a branch runs out of components.
#[derive(Debug, Clone, Copy)]
enum Frame {
    If { ret: Option<NodeId> },
    Loop { node: NodeId, phase: LoopPhase },
    Call { ret: Option<NodeId>, chart: ChartId, scoped: bool },
}

#[derive(Debug)]
struct PendingInput {
    target: Expr,
    at: Location,
    answered: bool,
}

/// A running flowchart program.
#[derive(Educe)]
#[educe(Debug)]
pub struct Process {
    #[educe(Debug(ignore))]
    charts: Rc<[SubChart]>,
    #[educe(Debug(ignore))]
    globals: Rc<GlobalRegistry>,
    settings: Settings,

    env: Environment,
    #[educe(Debug(ignore))]
    rng: ChaCha8Rng,
    chart: ChartId,
    pos: Option<NodeId>,
    frames: Vec<Frame>,
    call_depth: usize,
    state: ProcessState,
    input: Option<PendingInput>,
}
impl Process {
    /// Creates a new process positioned at the root of the first subchart.
    /// `charts` must not be empty.
    pub fn new(charts: Rc<[SubChart]>, globals: Rc<GlobalRegistry>, settings: Settings) -> Self {
        let pos = charts.first().map(|x| x.flowchart.root());
        Self {
            charts,
            globals,
            settings,

            env: Environment::new(),
            rng: ChaCha8Rng::seed_from_u64(settings.rng_seed),
            chart: 0,
            pos,
            frames: vec![],
            call_depth: 0,
            state: ProcessState::Running,
            input: None,
        }
    }
    /// Discards all variables and restarts from the root of the first subchart.
    pub fn reset(&mut self) {
        *self = Self::new(self.charts.clone(), self.globals.clone(), self.settings);
    }

    pub fn state(&self) -> &ProcessState {
        &self.state
    }
    /// Checks if the process is currently running (possibly suspended on an interrupt).
    pub fn is_running(&self) -> bool {
        self.state != ProcessState::Done
    }
    /// The subchart that is currently executing.
    pub fn chart(&self) -> ChartId {
        self.chart
    }
    /// The component that the next step will execute, if any.
    pub fn position(&self) -> Option<Location> {
        self.pos.map(|node| self.location(node))
    }
    /// The open control constructs, innermost last.
    pub fn block_stack(&self) -> Vec<Block> {
        self.frames.iter().map(|x| match x {
            Frame::If { .. } => Block::If,
            Frame::Loop { phase: LoopPhase::Start, .. } => Block::LoopStart,
            Frame::Loop { phase: LoopPhase::Body, .. } => Block::LoopBody,
            Frame::Call { scoped: true, .. } => Block::Proc,
            Frame::Call { scoped: false, .. } => Block::Func,
        }).collect()
    }
    pub fn env(&self) -> &Environment {
        &self.env
    }
    /// The number of subchart and procedure calls in progress.
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }

    fn location(&self, node: NodeId) -> Location {
        let chart = self.charts.get(self.chart).map(|x| x.name.clone()).unwrap_or_default();
        Location { chart, node }
    }
    fn evaluator(&mut self) -> Evaluator<'_> {
        Evaluator { env: &mut self.env, globals: &self.globals, rng: &mut self.rng }
    }
    fn condition(&mut self, label: &str) -> Result<bool, ErrorCause> {
        let expr = parse_expr(label)?;
        Ok(self.evaluator().eval(&expr)?.as_bool()?)
    }

    /// Executes a single component.
    ///
    /// A runtime error terminates the process: the error is returned once and later steps report [`StepResult::Done`].
    pub fn step(&mut self) -> Result<StepResult, ExecError> {
        match &self.state {
            ProcessState::Running => (),
            ProcessState::InterruptedForOutput(x) => return Ok(StepResult::Output(x.clone())),
            ProcessState::InterruptedForInput(x) => return Ok(StepResult::Input(x.clone())),
            ProcessState::Done => return Ok(StepResult::Done),
        }

        let Some(id) = self.pos else {
            self.state = ProcessState::Done;
            return Ok(StepResult::Done);
        };
        match self.visit(id) {
            Ok(next) => self.advance(next),
            Err(cause) => {
                let pos = Some(self.location(id));
                self.state = ProcessState::Done;
                return Err(ExecError { cause, pos });
            }
        }

        Ok(match &self.state {
            ProcessState::Running if self.pos.is_none() => {
                self.state = ProcessState::Done;
                StepResult::Done
            }
            ProcessState::Running => StepResult::Continue,
            ProcessState::InterruptedForOutput(x) => StepResult::Output(x.clone()),
            ProcessState::InterruptedForInput(x) => StepResult::Input(x.clone()),
            ProcessState::Done => StepResult::Done,
        })
    }

    /// Moves to `next`, or unwinds open constructs until one says where to continue.
    fn advance(&mut self, mut next: Option<NodeId>) {
        while next.is_none() {
            match self.frames.pop() {
                None => break,
                Some(Frame::If { ret }) => next = ret,
                Some(frame @ Frame::Loop { node, .. }) => {
                    self.frames.push(frame);
                    next = Some(node);
                }
                Some(Frame::Call { ret, chart, scoped }) => {
                    if scoped {
                        self.env.pop_scope();
                    }
                    self.chart = chart;
                    self.call_depth -= 1;
                    next = ret;
                }
            }
        }
        self.pos = next;
    }

    /// Executes one component and returns the component to go to next.
    fn visit(&mut self, id: NodeId) -> Result<Option<NodeId>, ErrorCause> {
        let charts = self.charts.clone();
        let node = charts.get(self.chart).and_then(|x| x.flowchart.get(id)).ok_or(ErrorCause::UnknownComponent { id })?;

        match &node.kind {
            NodeKind::Oval => {
                let label = UniCase::new(node.label.trim());
                if label != UniCase::new("start") && label != UniCase::new("end") {
                    return Err(ErrorCause::UnknownCommand { label: node.label.clone() });
                }
                Ok(node.successor)
            }
            NodeKind::OvalProcedure => Ok(node.successor),
            NodeKind::Rectangle { call: false } => {
                let expr = parse_assignment(&node.label)?;
                self.evaluator().eval(&expr)?;
                Ok(node.successor)
            }
            NodeKind::Rectangle { call: true } => self.call(node),
            NodeKind::IfControl { left, right } => {
                let cond = self.condition(&node.label)?;
                self.frames.push(Frame::If { ret: node.successor });
                Ok(if cond { *left } else { *right })
            }
            NodeKind::Loop { before, after } => match self.frames.last() {
                Some(Frame::Loop { node: top, phase: LoopPhase::Start }) if *top == id => {
                    self.frames.pop();
                    if self.condition(&node.label)? {
                        return Ok(node.successor);
                    }
                    self.frames.push(Frame::Loop { node: id, phase: LoopPhase::Body });
                    Ok(*after)
                }
                Some(Frame::Loop { node: top, phase: LoopPhase::Body }) if *top == id => {
                    self.frames.pop();
                    self.frames.push(Frame::Loop { node: id, phase: LoopPhase::Start });
                    Ok(*before)
                }
                _ => {
                    self.frames.push(Frame::Loop { node: id, phase: LoopPhase::Start });
                    Ok(*before)
                }
            }
            NodeKind::Parallelogram { input: false, .. } => {
                let expr = parse_expr(&node.label)?;
                let text = self.evaluator().eval(&expr)?.to_text();
                self.state = ProcessState::InterruptedForOutput(text);
                Ok(node.successor)
            }
            NodeKind::Parallelogram { input: true, prompt } => {
                let target = parse_target(&node.label)?;
                let prompt = match prompt.trim().is_empty() {
                    true => CompactString::default(),
                    false => {
                        let expr = parse_expr(prompt)?;
                        self.evaluator().eval(&expr)?.to_text()
                    }
                };
                self.input = Some(PendingInput { target, at: self.location(id), answered: false });
                self.state = ProcessState::InterruptedForInput(prompt);
                Ok(node.successor)
            }
        }
    }

    /// Transfers control into the subchart or procedure named by a call component.
    fn call(&mut self, node: &Node) -> Result<Option<NodeId>, ErrorCause> {
        let (name, args) = parse_call(&node.label)?;
        let callee = self.globals.subchart(&name).ok_or_else(|| ErrorCause::UndefinedSubChart { name: name.clone() })?;
        if self.call_depth >= self.settings.max_call_depth {
            return Err(ErrorCause::CallDepthLimit { limit: self.settings.max_call_depth });
        }

        let charts = self.charts.clone();
        let root = charts.get(callee).ok_or_else(|| ErrorCause::UndefinedSubChart { name: name.clone() })?.flowchart.root_node();
        let scoped = match root.kind {
            NodeKind::OvalProcedure => {
                let header = parse_procedure_header(&root.label)?;
                if header.params.len() != args.len() {
                    return Err(ErrorCause::ArgCount { name, expected: Arity::Exact(header.params.len()), got: args.len() });
                }
                let mut scope = SymbolTable::default();
                for (param, arg) in header.params.iter().zip(&args) {
                    let value = match (param.mode, arg) {
                        (ParamMode::In, arg) => Shared::Unique(self.evaluator().eval(arg)?),
                        (ParamMode::Out | ParamMode::InOut, Expr::Variable(var)) => self.env.alias(var),
                        (ParamMode::Out | ParamMode::InOut, _) => return Err(ErrorCause::RefArgNotVariable { param: param.name.clone() }),
                    };
                    scope.define_or_redefine(&param.name, value);
                }
                self.env.push_scope(scope);
                true
            }
            _ => {
                if !args.is_empty() {
                    return Err(ErrorCause::ArgCount { name, expected: Arity::Exact(0), got: args.len() });
                }
                false
            }
        };

        self.frames.push(Frame::Call { ret: node.successor, chart: self.chart, scoped });
        self.call_depth += 1;
        self.chart = callee;
        Ok(Some(root.id))
    }

    /// Answers the pending input prompt.
    ///
    /// Numeric answers are stored as numbers, anything else as a string.
    pub fn provide_input(&mut self, answer: &str) -> Result<(), ExecError> {
        if !matches!(self.state, ProcessState::InterruptedForInput(_)) {
            return Err(ExecError { cause: ErrorCause::NotAwaitingInput, pos: None });
        }
        let Some(input) = self.input.take() else {
            return Err(ExecError { cause: ErrorCause::NotAwaitingInput, pos: None });
        };

        let value = match parse_number(answer) {
            Some(x) => Value::Number(x),
            None => Value::String(answer.into()),
        };
        if let Err(cause) = self.evaluator().assign(&input.target, value) {
            self.state = ProcessState::Done;
            return Err(ExecError { cause, pos: Some(input.at) });
        }
        self.input = Some(PendingInput { answered: true, ..input });
        Ok(())
    }

    /// Clears an output or (answered) input interrupt so the next step can proceed.
    /// This is a no-op if the process is not interrupted.
    pub fn resume(&mut self) -> Result<(), ExecError> {
        match &self.state {
            ProcessState::InterruptedForOutput(_) => self.state = ProcessState::Running,
            ProcessState::InterruptedForInput(_) => match &self.input {
                Some(PendingInput { answered: true, .. }) => {
                    self.input = None;
                    self.state = ProcessState::Running;
                }
                _ => return Err(ExecError { cause: ErrorCause::InputNotProvided, pos: None }),
            }
            ProcessState::Running | ProcessState::Done => (),
        }
        Ok(())
    }
}
