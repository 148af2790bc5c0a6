use absint_rs::analysis::{Analysis, AnalysisConfig, CheckTool, SyntacticCheck};
use absint_rs::combination::CartesianProduct;
use absint_rs::dataflow::{ConstantPropagation, DefiniteDataflow};
use absint_rs::environment::Environment;
use absint_rs::error::{AnalysisError, SemanticError};
use absint_rs::fixpoint::FixpointEngine;
use absint_rs::heap::PointBasedHeap;
use absint_rs::inference::InferredTypes;
use absint_rs::interprocedural::{CallStringToken, ContextInsensitiveToken, ContextSensitiveAnalysis};
use absint_rs::lattice::Lattice;
use absint_rs::numeric::{Bound, Interval, Parity};
use absint_rs::program::{Cfg, CfgBuilder, CfgId, CodeLocation, Expression, Program, Statement, StatementId};
use absint_rs::state::AbstractState;
use absint_rs::symbolic::{AllocationSite, BinaryOp, Constant, Identifier, Type};
use test_log::test;

type IntervalState = AbstractState<PointBasedHeap, Environment<Interval>>;

fn num(name: &str) -> Expression {
    Expression::var(name, Type::Numeric)
}

fn ptr(name: &str) -> Expression {
    Expression::var(name, Type::Pointer)
}

fn id(name: &str) -> Identifier {
    Identifier::variable(name, Type::Numeric)
}

fn intervals() -> IntervalState {
    AbstractState::new(PointBasedHeap::field_sensitive(), Environment::new(Interval::top()))
}

fn single(cfg: Cfg) -> (Program, CfgId) {
    let mut program = Program::new();
    let main = program.add_cfg(cfg);
    program.add_entrypoint(main);
    (program, main)
}

/// x = 3; y = x + 4
fn constants() -> Cfg {
    let mut b = CfgBuilder::new("main");
    b.sequence([
        Statement::assign(num("x"), Expression::int(3)),
        Statement::assign(num("y"), Expression::binary(BinaryOp::Add, num("x"), Expression::int(4))),
    ]);
    b.build()
}

/// x = 0; while (true) { x = x + 1 }
fn counting_loop() -> (Cfg, StatementId) {
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
    (b.build(), cond)
}

/// inc(n) { return n + 1 }
fn inc() -> Cfg {
    let mut b = CfgBuilder::new("inc").parameter("n", Type::Numeric).returns(Type::Numeric);
    b.add(Statement::Return(Some(Expression::binary(
        BinaryOp::Add,
        num("n"),
        Expression::int(1),
    ))));
    b.build()
}

/// main() { a = inc(1); b = inc(2) }
fn two_calls() -> (Program, CfgId, CfgId) {
    let mut program = Program::new();
    let inc = program.add_cfg(inc());
    let call = |arg| Expression::call("inc", vec![Expression::int(arg)], Type::Numeric);
    let mut b = CfgBuilder::new("main");
    b.sequence([
        Statement::assign(num("a"), call(1)),
        Statement::assign(num("b"), call(2)),
    ]);
    let main = program.add_cfg(b.build());
    program.add_entrypoint(main);
    (program, main, inc)
}

#[test]
fn test_straight_line_constants() {
    let (program, main) = single(constants());
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();

    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert_eq!(exit.value().get(&id("x")), Interval::constant(3));
    assert_eq!(exit.value().get(&id("y")), Interval::constant(7));
}

#[test]
fn test_straight_line_other_value_domains() {
    let (program, main) = single(constants());

    let parity = AbstractState::new(PointBasedHeap::field_sensitive(), Environment::new(Parity::Top));
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &parity).unwrap();
    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert_eq!(exit.value().get(&id("y")), Parity::Odd);

    let constants = AbstractState::new(PointBasedHeap::field_sensitive(), DefiniteDataflow::<ConstantPropagation>::new());
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &constants).unwrap();
    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert_eq!(ConstantPropagation::constant_of(exit.value(), &id("y")), Some(7));
}

#[test]
fn test_intervals_and_types_together() {
    // x = 3; s = "a"; o = new Obj(); y = x + 4
    let mut b = CfgBuilder::new("main");
    b.sequence([
        Statement::assign(num("x"), Expression::int(3)),
        Statement::assign(Expression::var("s", Type::Str), Expression::Literal(Constant::Str("a".into()))),
        Statement::assign(ptr("o"), Expression::new_object("Obj")),
        Statement::assign(num("y"), Expression::binary(BinaryOp::Add, num("x"), Expression::int(4))),
    ]);
    let (program, main) = single(b.build());

    let value = CartesianProduct::new(Environment::new(Interval::top()), Environment::new(InferredTypes::new()));
    let initial = AbstractState::new(PointBasedHeap::field_sensitive(), value);
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &initial).unwrap();

    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    let (intervals, types) = (exit.value().left(), exit.value().right());
    assert_eq!(intervals.get(&id("y")), Interval::constant(7));
    assert_eq!(types.get(&id("y")).exact(), Some(Type::Numeric));
    assert_eq!(types.get(&Identifier::variable("s", Type::Str)).exact(), Some(Type::Str));
    assert_eq!(types.get(&Identifier::variable("o", Type::Pointer)).exact(), Some(Type::Pointer));
    assert!(intervals.get(&Identifier::variable("s", Type::Str)).is_top());
}

#[test]
fn test_infinite_loop_is_widened() {
    let (cfg, cond) = counting_loop();
    let (program, main) = single(cfg);
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();

    let result = analysis.result(main, &ContextInsensitiveToken).unwrap();
    assert_eq!(
        result.state_after(cond).value().get(&id("x")),
        Interval::new(Bound::Finite(0), Bound::PosInf)
    );
    // `while (true)` never exits.
    assert!(result.exit_state().unwrap().is_bottom());
}

#[test]
fn test_calls_share_one_context() {
    let (program, main, inc) = two_calls();
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();

    let results = analysis.results(inc).unwrap();
    assert_eq!(results.len(), 1);
    let callee = analysis.result(inc, &ContextInsensitiveToken).unwrap();
    let n = callee.entry_state().value().get(&id("n"));
    assert!(Interval::constant(1).less_or_equal(&n).unwrap());
    assert!(Interval::constant(2).less_or_equal(&n).unwrap());

    let ret = callee.exit_state().unwrap().value().get(&callee_ret(&program, inc));
    assert_eq!(ret, Interval::new(Bound::Finite(2), Bound::Finite(3)));

    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert_eq!(exit.value().get(&id("b")), Interval::new(Bound::Finite(2), Bound::Finite(3)));
}

fn callee_ret(program: &Program, cfg: CfgId) -> Identifier {
    program.cfg(cfg).unwrap().return_variable()
}

#[test]
fn test_call_strings_keep_call_sites_apart() {
    let (program, main, inc) = two_calls();
    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), CallStringToken::new(1));
    analysis.run(&program, &intervals()).unwrap();

    assert_eq!(analysis.results(inc).unwrap().len(), 2);
    let exit = analysis.result(main, &CallStringToken::new(1)).unwrap().exit_state().unwrap();
    assert_eq!(exit.value().get(&id("a")), Interval::constant(2));
    assert_eq!(exit.value().get(&id("b")), Interval::constant(3));
}

#[test]
fn test_covered_call_is_answered_from_cache() {
    // main(p) { a = inc(p); b = inc(2) }
    let mut program = Program::new();
    let inc = program.add_cfg(inc());
    let mut b = CfgBuilder::new("main").parameter("p", Type::Numeric);
    b.sequence([
        Statement::assign(num("a"), Expression::call("inc", vec![num("p")], Type::Numeric)),
        Statement::assign(num("b"), Expression::call("inc", vec![Expression::int(2)], Type::Numeric)),
    ]);
    let main = program.add_cfg(b.build());
    program.add_entrypoint(main);

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();

    assert_eq!(analysis.misses(), 2);
    assert_eq!(analysis.hits(), 1);
    let callee = analysis.result(inc, &ContextInsensitiveToken).unwrap();
    assert!(callee.entry_state().value().get(&id("n")).is_top());
    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert!(exit.value().get(&id("b")).is_top());
}

#[test]
fn test_recursive_procedure_terminates() {
    // down(n) { if (n > 0) return down(n - 1); return 0 }
    let mut program = Program::new();
    let mut b = CfgBuilder::new("down").parameter("n", Type::Numeric).returns(Type::Numeric);
    let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Gt, num("n"), Expression::int(0))));
    let recurse = b.add(Statement::Return(Some(Expression::call(
        "down",
        vec![Expression::binary(BinaryOp::Sub, num("n"), Expression::int(1))],
        Type::Numeric,
    ))));
    let base = b.add(Statement::Return(Some(Expression::int(0))));
    b.branch(cond, recurse, base);
    program.add_cfg(b.build());

    let mut b = CfgBuilder::new("main");
    b.add(Statement::assign(
        num("r"),
        Expression::call("down", vec![Expression::int(5)], Type::Numeric),
    ));
    let main = program.add_cfg(b.build());
    program.add_entrypoint(main);

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();

    let exit = analysis.result(main, &ContextInsensitiveToken).unwrap().exit_state().unwrap();
    assert!(Interval::constant(0).less_or_equal(&exit.value().get(&id("r"))).unwrap());
}

#[test]
fn test_conditional_allocation_joins_weak() {
    // main(c) { a = new Obj(); if (c > 0) { b = new Obj() }; a.f = 1 }
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
    let (program, main) = single(b.build());

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();
    let result = analysis.result(main, &ContextInsensitiveToken).unwrap();
    let exit = result.exit_state().unwrap();

    let sites = exit.heap().allocated_sites().collect::<Vec<_>>();
    assert_eq!(
        sites,
        vec![AllocationSite::new("main:0", false), AllocationSite::new("main:2", true)]
    );

    let field = Identifier::Heap(AllocationSite::new("main:0", false).with_field(Some("f".to_string())));
    assert_eq!(exit.value().get(&field), Interval::constant(1));
}

#[test]
fn test_write_through_may_alias_joins() {
    // main(c) { a = new Obj(); b = a; if (c > 0) { b = new Obj() }; a.f = 1; b.f = 2 }
    let mut b = CfgBuilder::new("main").parameter("c", Type::Numeric);
    let first = b.add(Statement::assign(ptr("a"), Expression::new_object("Obj")));
    let alias = b.add(Statement::assign(ptr("b"), ptr("a")));
    let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Gt, num("c"), Expression::int(0))));
    let then = b.add(Statement::assign(ptr("b"), Expression::new_object("Obj")));
    let join = b.add(Statement::NoOp);
    let write_a = b.add(Statement::assign(Expression::field(ptr("a"), "f"), Expression::int(1)));
    let write_b = b.add(Statement::assign(Expression::field(ptr("b"), "f"), Expression::int(2)));
    b.edge(first, alias);
    b.edge(alias, cond);
    b.branch(cond, then, join);
    b.edge(then, join);
    b.edge(join, write_a);
    b.edge(write_a, write_b);
    let (program, main) = single(b.build());

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();
    let result = analysis.result(main, &ContextInsensitiveToken).unwrap();

    let heap = result.state_after(join).heap();
    assert_eq!(heap.site_at(&CodeLocation::new("main", then, 0)), Some(AllocationSite::new("main:3", true)));

    let a_field = Identifier::Heap(AllocationSite::new("main:0", false).with_field(Some("f".to_string())));
    assert_eq!(result.state_after(write_a).value().get(&a_field), Interval::constant(1));
    let exit = result.exit_state().unwrap();
    assert_eq!(exit.value().get(&a_field), Interval::range(1, 2));
    let weak_field = Identifier::Heap(AllocationSite::new("main:3", true).with_field(Some("f".to_string())));
    assert!(Interval::constant(2).less_or_equal(&exit.value().get(&weak_field)).unwrap());
}

/// mk(v) { o = new Obj(); o.f = v; return o }
fn mk() -> Cfg {
    let mut b = CfgBuilder::new("mk").parameter("v", Type::Numeric).returns(Type::Pointer);
    b.sequence([
        Statement::assign(ptr("o"), Expression::new_object("Obj")),
        Statement::assign(Expression::field(ptr("o"), "f"), num("v")),
        Statement::Return(Some(ptr("o"))),
    ]);
    b.build()
}

#[test]
fn test_promotion_at_join_joins_cells() {
    // main(c) { p = mk(1); if (c > 0) { q = mk(2) }; p.f = 3 }
    let mut program = Program::new();
    program.add_cfg(mk());
    let call = |arg| Expression::call("mk", vec![Expression::int(arg)], Type::Pointer);
    let mut b = CfgBuilder::new("main").parameter("c", Type::Numeric);
    let first = b.add(Statement::assign(ptr("p"), call(1)));
    let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Gt, num("c"), Expression::int(0))));
    let then = b.add(Statement::assign(ptr("q"), call(2)));
    let join = b.add(Statement::NoOp);
    let write = b.add(Statement::assign(Expression::field(ptr("p"), "f"), Expression::int(3)));
    b.edge(first, cond);
    b.branch(cond, then, join);
    b.edge(then, join);
    b.edge(join, write);
    let main = program.add_cfg(b.build());
    program.add_entrypoint(main);

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), CallStringToken::new(1));
    analysis.run(&program, &intervals()).unwrap();
    let result = analysis.result(main, &CallStringToken::new(1)).unwrap();

    let site = CodeLocation::new("mk", 0, 0);
    let strong_field = Identifier::Heap(AllocationSite::new("mk:0", false).with_field(Some("f".to_string())));
    let weak_field = Identifier::Heap(AllocationSite::new("mk:0", true).with_field(Some("f".to_string())));

    let once = result.state_after(first);
    assert_eq!(once.heap().site_at(&site), Some(AllocationSite::new("mk:0", false)));
    assert_eq!(once.value().get(&strong_field), Interval::constant(1));

    let twice = result.state_after(then);
    assert_eq!(twice.heap().site_at(&site), Some(AllocationSite::new("mk:0", true)));
    assert_eq!(twice.value().get(&weak_field), Interval::range(1, 2));

    let joined = result.state_after(join);
    assert_eq!(joined.heap().site_at(&site), Some(AllocationSite::new("mk:0", true)));
    assert_eq!(joined.value().get(&weak_field), Interval::range(1, 2));
    assert!(joined.value().binding(&strong_field).is_none());
    assert!(once.less_or_equal(joined).unwrap());
    assert!(twice.less_or_equal(joined).unwrap());
    assert!(!joined.less_or_equal(once).unwrap());

    let exit = result.exit_state().unwrap();
    assert_eq!(exit.value().get(&weak_field), Interval::range(1, 3));
}

#[test]
fn test_allocation_in_loop_becomes_weak() {
    // i = 0; while (i < 3) { o = new Obj(); i = i + 1 }
    let mut b = CfgBuilder::new("main");
    let init = b.add(Statement::assign(num("i"), Expression::int(0)));
    let cond = b.add(Statement::Condition(Expression::binary(BinaryOp::Lt, num("i"), Expression::int(3))));
    let alloc = b.add(Statement::assign(ptr("o"), Expression::new_object("Obj")));
    let step = b.add(Statement::assign(
        num("i"),
        Expression::binary(BinaryOp::Add, num("i"), Expression::int(1)),
    ));
    let exit = b.add(Statement::NoOp);
    b.edge(init, cond);
    b.branch(cond, alloc, exit);
    b.edge(alloc, step);
    b.edge(step, cond);
    let (program, main) = single(b.build());

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();
    let result = analysis.result(main, &ContextInsensitiveToken).unwrap();

    let site = result.exit_state().unwrap().heap().site_at(&CodeLocation::new("main", alloc, 0));
    assert_eq!(site, Some(AllocationSite::new("main:2", true)));
    assert_eq!(
        result.state_after(exit).value().get(&id("i")),
        Interval::constant(3)
    );
}

#[test]
fn test_open_calls_lose_values() {
    // x = 1; print(x); y = read()
    let mut b = CfgBuilder::new("main");
    b.sequence([
        Statement::assign(num("x"), Expression::int(1)),
        Statement::Eval(Expression::call("print", vec![num("x")], Type::Void)),
        Statement::assign(num("y"), Expression::call("read", vec![], Type::Numeric)),
    ]);
    let (program, main) = single(b.build());

    let analysis = ContextSensitiveAnalysis::new(FixpointEngine::default(), ContextInsensitiveToken);
    analysis.run(&program, &intervals()).unwrap();
    let result = analysis.result(main, &ContextInsensitiveToken).unwrap();

    assert_eq!(result.state_after(0).value().get(&id("x")), Interval::constant(1));
    let after_print = result.state_after(1);
    assert!(!after_print.is_bottom());
    assert!(after_print.value().get(&id("x")).is_top());
    let exit = result.exit_state().unwrap();
    assert!(!exit.is_bottom());
    assert!(exit.value().get(&id("y")).is_top());
}

/// Warns once per analyzed statement.
struct CountStatements;

impl SyntacticCheck for CountStatements {
    fn visit(&mut self, tool: &mut CheckTool, cfg: &Cfg, statement: StatementId) {
        tool.warn_on(cfg.location(statement, 0), "visited");
    }
}

#[test]
fn test_runner_reports_warnings() {
    let (program, _) = single(constants());
    let mut analysis = Analysis::new(AnalysisConfig::default());
    analysis.add_syntactic_check(CountStatements);

    let report = analysis.run(&program, &intervals(), ContextInsensitiveToken).unwrap();
    assert_eq!(report.warnings().len(), 2);
    assert_eq!(report.warnings()[1].to_string(), "[main:1] visited");
    assert_eq!(report.analysis().misses(), 1);
}

#[test]
fn test_iteration_limit_keeps_warnings() {
    let (cfg, _) = counting_loop();
    let (program, _) = single(cfg);
    let mut analysis = Analysis::new(AnalysisConfig::default().with_max_iterations(3));
    analysis.add_syntactic_check(CountStatements);

    match analysis.run(&program, &intervals(), ContextInsensitiveToken) {
        Err(AnalysisError::Execution { source, warnings }) => {
            assert_eq!(warnings.len(), 4);
            assert!(matches!(source, SemanticError::IterationLimit { limit: 3, .. }));
        }
        other => panic!("expected an execution error, got {:?}", other.map(|_| ())),
    }
}
