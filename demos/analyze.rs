use std::fmt::Display;

use clap::{Parser, ValueEnum};

use absint_rs::analysis::{Analysis, AnalysisConfig, CheckTool, SemanticCheck, SyntacticCheck};
use absint_rs::combination::CartesianProduct;
use absint_rs::dataflow::{ConstantPropagation, DefiniteDataflow};
use absint_rs::domain::{HeapDomain, ValueDomain};
use absint_rs::environment::Environment;
use absint_rs::error::Result;
use absint_rs::heap::{MonolithicHeap, PointBasedHeap};
use absint_rs::inference::InferredTypes;
use absint_rs::interprocedural::{CallStringToken, CfgResults};
use absint_rs::lattice::Lattice;
use absint_rs::numeric::{Interval, Parity};
use absint_rs::program::{Cfg, CfgBuilder, Expression, Program, Statement, StatementId};
use absint_rs::state::AbstractState;
use absint_rs::symbolic::{BinaryOp, Type};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Sample {
    /// x = 3; y = x + 4
    Constants,
    /// x = 0; while (true) { x = x + 1 }
    Loop,
    /// inc(n) { return n + 1 } called with 1 and 2
    Calls,
    /// a = new Obj(); if (c > 0) { b = new Obj() }; a.f = 1
    Heap,
    /// down(n) { if (n > 0) return down(n - 1); return 0 }
    Recursion,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Domain {
    Interval,
    Parity,
    Constants,
    /// Runtime types of every identifier.
    Types,
    /// Intervals and types side by side.
    IntervalTypes,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum HeapKind {
    Points,
    FieldInsensitive,
    Monolithic,
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Sample program to analyze.
    #[arg(value_enum, default_value = "calls")]
    sample: Sample,

    /// Value domain.
    #[clap(long, value_enum, default_value = "interval")]
    domain: Domain,

    /// Heap abstraction.
    #[clap(long, value_enum, default_value = "points")]
    heap: HeapKind,

    /// Call-string length (0 is context-insensitive).
    #[clap(long, value_name = "INT", default_value = "1")]
    k: usize,

    /// Loop-head visits before widening.
    #[clap(long, value_name = "INT", default_value = "5")]
    widening_threshold: usize,

    /// Maximum number of statement evaluations per fixpoint run.
    #[clap(long, value_name = "INT")]
    max_iterations: Option<usize>,
}

fn num(name: &str) -> Expression {
    Expression::var(name, Type::Numeric)
}

fn ptr(name: &str) -> Expression {
    Expression::var(name, Type::Pointer)
}

fn sample_program(sample: Sample) -> Program {
    let mut program = Program::new();
    let main = match sample {
        Sample::Constants => {
            let mut b = CfgBuilder::new("main");
            b.sequence([
                Statement::assign(num("x"), Expression::int(3)),
                Statement::assign(num("y"), Expression::binary(BinaryOp::Add, num("x"), Expression::int(4))),
            ]);
            program.add_cfg(b.build())
        }
        Sample::Loop => {
            let mut b = CfgBuilder::new("main");
            let init = b.add(Statement::assign(num("x"), Expression::int(0)));
            let cond = b.add(Statement::Condition(Expression::boolean(true)));
            let body = b.add(Statement::assign(
                num("x"),
                Expression::binary(BinaryOp::Add, num("x"), Expression::int(1)),
            ));
            let exit = b.add(Statement::NoOp);
            b.edge(init, cond);
            b.branch(cond, body, exit);
            b.edge(body, cond);
            program.add_cfg(b.build())
        }
        Sample::Calls => {
            let mut b = CfgBuilder::new("inc").parameter("n", Type::Numeric).returns(Type::Numeric);
            b.add(Statement::Return(Some(Expression::binary(
                BinaryOp::Add,
                num("n"),
                Expression::int(1),
            ))));
            program.add_cfg(b.build());

            let call = |arg| Expression::call("inc", vec![Expression::int(arg)], Type::Numeric);
            let mut b = CfgBuilder::new("main");
            b.sequence([
                Statement::assign(num("a"), call(1)),
                Statement::assign(num("b"), call(2)),
                Statement::Eval(Expression::call("print", vec![num("b")], Type::Void)),
            ]);
            program.add_cfg(b.build())
        }
        Sample::Heap => {
            let mut b = CfgBuilder::new("main").parameter("c", Type::Numeric);
            let first = b.add(Statement::assign(ptr("a"), Expression::new_object("Obj")));
            let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Gt, num("c"), Expression::int(0))));
            let then = b.add(Statement::assign(ptr("b"), Expression::new_object("Obj")));
            let join = b.add(Statement::NoOp);
            let write = b.add(Statement::assign(Expression::field(ptr("a"), "f"), Expression::int(1)));
            b.edge(first, cond);
            b.branch(cond, then, join);
            b.edge(then, join);
            b.edge(join, write);
            program.add_cfg(b.build())
        }
        Sample::Recursion => {
            let mut b = CfgBuilder::new("down").parameter("n", Type::Numeric).returns(Type::Numeric);
            let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Gt, num("n"), Expression::int(0))));
            let recurse = b.add(Statement::Return(Some(Expression::call(
                "down",
                vec![Expression::binary(BinaryOp::Sub, num("n"), Expression::int(1))],
                Type::Numeric,
            ))));
            let base = b.add(Statement::Return(Some(Expression::int(0))));
            b.branch(cond, recurse, base);
            program.add_cfg(b.build())
        }
    };
    program.add_entrypoint(main);
    program
}

/// Reports statements that may throw.
struct ThrowCheck;

impl SyntacticCheck for ThrowCheck {
    fn visit(&mut self, tool: &mut CheckTool, cfg: &Cfg, statement: StatementId) {
        if let Some(Statement::Throw(e)) = cfg.statement(statement) {
            tool.warn_on(cfg.location(statement, 0), format!("explicit throw of `{}`", e));
        }
    }
}

/// Reports statements unreachable in every analyzed context.
struct UnreachableCheck;

impl<H: HeapDomain, V: ValueDomain> SemanticCheck<H, V, CallStringToken> for UnreachableCheck {
    fn visit(
        &mut self,
        tool: &mut CheckTool,
        cfg: &Cfg,
        statement: StatementId,
        results: &CfgResults<H, V, CallStringToken>,
    ) -> Result<()> {
        let reached = results
            .iter()
            .any(|(_, result)| result.is_reached(statement) && !result.state_after(statement).is_bottom());
        if !reached {
            tool.warn_on(cfg.location(statement, 0), "unreachable statement");
        }
        Ok(())
    }
}

fn run<H, V>(program: &Program, initial: AbstractState<H, V>, args: &Cli) -> color_eyre::Result<()>
where
    H: HeapDomain + Display,
    V: ValueDomain + Display,
{
    let mut config = AnalysisConfig::default().with_widening_threshold(args.widening_threshold);
    if let Some(limit) = args.max_iterations {
        config = config.with_max_iterations(limit);
    }
    let mut analysis = Analysis::new(config);
    analysis.add_syntactic_check(ThrowCheck);
    analysis.add_semantic_check(UnreachableCheck);

    let time_analysis = std::time::Instant::now();
    let report = analysis.run(program, &initial, CallStringToken::new(args.k))?;
    println!("Analysis done in {:.3} s", time_analysis.elapsed().as_secs_f64());

    let interproc = report.analysis();
    println!("solver runs: {}, cache hits: {}", interproc.misses(), interproc.hits());
    for id in interproc.analyzed_cfgs() {
        let cfg = program.cfg(id)?;
        print!("{}", cfg);
        if let Some(results) = interproc.results(id) {
            for (token, result) in results.iter() {
                println!("context {}:", token);
                for statement in 0..cfg.len() {
                    println!("  {:>3}: {}", statement, result.state_after(statement));
                }
            }
        }
        println!();
    }

    println!("{} warning(s)", report.warnings().len());
    for warning in report.warnings() {
        println!("  {}", warning);
    }
    Ok(())
}

fn run_with_heap<V>(program: &Program, value: V, args: &Cli) -> color_eyre::Result<()>
where
    V: ValueDomain + Display,
{
    match args.heap {
        HeapKind::Points => run(program, AbstractState::new(PointBasedHeap::field_sensitive(), value), args),
        HeapKind::FieldInsensitive => run(program, AbstractState::new(PointBasedHeap::field_insensitive(), value), args),
        HeapKind::Monolithic => run(program, AbstractState::new(MonolithicHeap::new(), value), args),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let args = Cli::parse();
    println!("args = {:?}", args);

    let program = sample_program(args.sample);
    match args.domain {
        Domain::Interval => run_with_heap(&program, Environment::new(Interval::top()), &args),
        Domain::Parity => run_with_heap(&program, Environment::new(Parity::Top), &args),
        Domain::Constants => run_with_heap(&program, DefiniteDataflow::<ConstantPropagation>::new(), &args),
        Domain::Types => run_with_heap(&program, Environment::new(InferredTypes::new()), &args),
        Domain::IntervalTypes => {
            let value = CartesianProduct::new(Environment::new(Interval::top()), Environment::new(InferredTypes::new()));
            run_with_heap(&program, value, &args)
        }
    }
}
