//! End-to-end language tests: source text in, decoded value out.
//!
//! These cover the observable semantics of the whole pipeline: literals,
//! bindings, closures and lexical capture, partial and over-saturated
//! application, pattern matching, modules, and the runtime trap taxonomy.

use ember::{run, EmberError, RuntimeTrap, Value};

fn eval(source: &str) -> Value {
    run(source).unwrap_or_else(|err| panic!("program failed: {err}\nsource:\n{source}"))
}

// ============================================================================
// Literals
// ============================================================================

#[test]
fn test_number_literal() {
    assert_eq!(eval("4815"), Value::Number(4815));
}

#[test]
fn test_negative_number_literal() {
    assert_eq!(eval("-17"), Value::Number(-17));
}

#[test]
fn test_plain_symbol_literal() {
    assert_eq!(eval(":spot"), Value::symbol("spot"));
}

#[test]
fn test_compound_symbol_literal() {
    assert_eq!(
        eval(":sym 2 3"),
        Value::compound("sym", vec![Value::Number(2), Value::Number(3)])
    );
}

#[test]
fn test_nested_compound_symbol_literal() {
    assert_eq!(
        eval(":tree (:leaf 1) (:leaf 2)"),
        Value::compound(
            "tree",
            vec![
                Value::compound("leaf", vec![Value::Number(1)]),
                Value::compound("leaf", vec![Value::Number(2)]),
            ]
        )
    );
}

#[test]
fn test_string_literal() {
    assert_eq!(eval("\"hello world\""), Value::Str("hello world".to_owned()));
}

#[test]
fn test_compound_symbol_with_dynamic_slots() {
    let source = "val a = 2\n:pair a (add a 1)";
    assert_eq!(
        eval(source),
        Value::compound("pair", vec![Value::Number(2), Value::Number(3)])
    );
}

#[test]
fn test_compound_round_trip_through_match() {
    // a dynamic compound decodes the same as its static counterpart
    let source = "val a = 2\nval built = :pair a 3\nmatch built with\n  :pair x y -> :pair x y\nend";
    assert_eq!(eval(source), eval(":pair 2 3"));
}

// ============================================================================
// Bindings and arithmetic
// ============================================================================

#[test]
fn test_binding_then_addition() {
    assert_eq!(eval("val a = 4\n val b = 7\n add a b"), Value::Number(11));
}

#[test]
fn test_operator_spellings() {
    assert_eq!(eval("+ 2 3"), Value::Number(5));
    assert_eq!(eval("* 6 7"), Value::Number(42));
    assert_eq!(eval("- 1 10"), Value::Number(-9));
    assert_eq!(eval("/ 9 2"), Value::Number(4));
}

#[test]
fn test_nested_arithmetic() {
    assert_eq!(eval("sub (mul 6 7) (div 10 2)"), Value::Number(37));
}

#[test]
fn test_comparisons_produce_boolean_symbols() {
    assert_eq!(eval("lt 1 2"), Value::symbol("true"));
    assert_eq!(eval("gt 1 2"), Value::symbol("false"));
    assert_eq!(eval("eq :a :a"), Value::symbol("true"));
    assert_eq!(eval("eq :a :b"), Value::symbol("false"));
}

#[test]
fn test_boolean_symbols_are_first_class() {
    // the reserved symbols and primitive results are the same values
    assert_eq!(eval("eq (lt 1 2) :true"), Value::symbol("true"));
    assert_eq!(eval("&& :true (gt 3 1)"), Value::symbol("true"));
    assert_eq!(eval("|| :false :false"), Value::symbol("false"));
    assert_eq!(eval("! :false"), Value::symbol("true"));
    assert_eq!(eval("not (eq 1 2)"), Value::symbol("true"));
}

#[test]
fn test_string_equality_is_bitwise_via_dedup() {
    // identical string literals share one const-table cell
    assert_eq!(eval("eq \"abc\" \"abc\""), Value::symbol("true"));
}

// ============================================================================
// Functions, closures, saturation
// ============================================================================

#[test]
fn test_direct_function_call() {
    assert_eq!(eval("val id (x) = x\nid 7"), Value::Number(7));
}

#[test]
fn test_closure_captures_parameter() {
    let source = "val make-adder (x) = { val (y) = add x y }\nval adder = make-adder 22\nadder 55";
    assert_eq!(eval(source), Value::Number(77));
}

#[test]
fn test_closure_over_constant_uses_capture_time_value() {
    let source = "val c = 10\nval f (x) = add x c\nf 5";
    assert_eq!(eval(source), Value::Number(15));
}

#[test]
fn test_returned_closure_chain() {
    let source = "val make-sub (x y z w) = { val (a) = sub (sub z y) (sub x a) }\nval test = make-sub 33 55 99 160\ntest 24";
    assert_eq!(eval(source), Value::Number(35));
}

#[test]
fn test_nested_closures_capture_lexically() {
    // three nested lambdas over an outer constant; 1000+800+60+2 = 1862
    let source = "val big = 1000\nval f (x) = {\n  val g (y) = {\n    val h (z) = add big (add x (add y z))\n    h\n  }\n  g\n}\nval g1 = f 800\nval h1 = g1 60\nh1 2";
    assert_eq!(eval(source), Value::Number(1862));
}

#[test]
fn test_partial_application() {
    let source = "val add3 (x y z) = add x (add y z)\nval p = add3 1 2\np 3";
    assert_eq!(eval(source), Value::Number(6));
}

#[test]
fn test_partial_application_applied_in_stages() {
    let source = "val add3 (x y z) = add x (add y z)\nval p = add3 10\nval q = p 20\nq 30";
    assert_eq!(eval(source), Value::Number(60));
}

#[test]
fn test_over_saturation_of_known_function() {
    let source = "val make-adder (x) = { val (y) = add x y }\nmake-adder 22 55";
    assert_eq!(eval(source), Value::Number(77));
}

#[test]
fn test_over_saturation_through_unknown_arity() {
    // inside apply2 the callee's arity is unknown; the VM re-applies the
    // intermediate closure at run time
    let source = "val make-adder (x) = { val (y) = add x y }\nval apply2 (f v w) = f v w\napply2 make-adder 3 4";
    assert_eq!(eval(source), Value::Number(7));
}

#[test]
fn test_function_passed_as_value() {
    let source = "val twice (f x) = f (f x)\nval inc (n) = add n 1\ntwice inc 5";
    assert_eq!(eval(source), Value::Number(7));
}

#[test]
fn test_anonymous_lambda_applied_via_binding() {
    let source = "val f = { val (x) = mul x x }\nf 9";
    assert_eq!(eval(source), Value::Number(81));
}

#[test]
fn test_recursion() {
    let source = "val fact (n) = match n with\n  0 -> 1\n  m -> mul m (fact (sub m 1))\nend\nfact 10";
    assert_eq!(eval(source), Value::Number(3628800));
}

#[test]
fn test_mutual_recursion_via_nested_definition() {
    // `even` is defined inside `odd` and refers back to it; the recursive
    // capture is threaded through both closures
    let source = "val odd (n) = {\n  val even (k) = match k with\n    0 -> :true\n    j -> odd (sub j 1)\n  end\n  match n with\n    0 -> :false\n    m -> even (sub m 1)\n  end\n}\nodd 9";
    assert_eq!(eval(source), Value::symbol("true"));
}

#[test]
fn test_deep_tail_recursion_completes() {
    let source = "val loop (n acc) = match n with\n  0 -> acc\n  m -> loop (sub m 1) (add acc 2)\nend\nloop 100000 0";
    assert_eq!(eval(source), Value::Number(200000));
}

// ============================================================================
// Pattern matching
// ============================================================================

#[test]
fn test_match_number_branches() {
    let source = "val classify (n) = match n with\n  0 -> :zero\n  1 -> :one\n  _ -> :many\nend\nclassify 1";
    assert_eq!(eval(source), Value::symbol("one"));
}

#[test]
fn test_match_first_branch_wins() {
    let source = "match 3 with\n  x -> :first\n  3 -> :second\nend";
    assert_eq!(eval(source), Value::symbol("first"));
}

#[test]
fn test_match_binds_captured_subvalues() {
    let source = "val p = :pair 4 9\nmatch p with\n  :pair a b -> sub b a\nend";
    assert_eq!(eval(source), Value::Number(5));
}

#[test]
fn test_match_nested_pattern() {
    let source = "val v = :cons 1 (:cons 2 :nil)\nmatch v with\n  :cons x (:cons y _) -> add x y\n  _ -> 0\nend";
    assert_eq!(eval(source), Value::Number(3));
}

#[test]
fn test_match_plain_symbol_branch() {
    let source = "match :blue with\n  :red -> 1\n  :blue -> 2\nend";
    assert_eq!(eval(source), Value::Number(2));
}

#[test]
fn test_match_branch_uses_enclosing_scope() {
    let source = "val base = { val r (x) = x\nr 100 }\nmatch 1 with\n  n -> add n base\nend";
    assert_eq!(eval(source), Value::Number(101));
}

#[test]
fn test_list_length_via_recursion() {
    let source = "val length (l) = match l with\n  :nil -> 0\n  :cons _ rest -> add 1 (length rest)\nend\nlength (:cons 10 (:cons 20 (:cons 30 :nil)))";
    assert_eq!(eval(source), Value::Number(3));
}

// ============================================================================
// Modules
// ============================================================================

#[test]
fn test_module_field_lookup() {
    let source = "val geo = module { val sides = 4\nval area = mul sides sides }\ngeo.area";
    assert_eq!(eval(source), Value::Number(16));
}

#[test]
fn test_module_function_field() {
    let source = "val m = module { val double (x) = mul x 2 }\nval d = m.double\nd 21";
    assert_eq!(eval(source), Value::Number(42));
}

// ============================================================================
// Errors and traps
// ============================================================================

#[test]
fn test_unknown_name_is_compile_error() {
    assert!(matches!(run("ghost"), Err(EmberError::Compile(_))));
}

#[test]
fn test_unmatched_pattern_traps() {
    assert_eq!(
        run("match 5 with\n  0 -> 1\nend"),
        Err(EmberError::Trap(RuntimeTrap::UnmatchedPattern))
    );
}

#[test]
fn test_division_by_zero_traps() {
    assert_eq!(run("div 1 0"), Err(EmberError::Trap(RuntimeTrap::DivisionByZero)));
}

#[test]
fn test_arithmetic_on_symbol_traps() {
    assert!(matches!(
        run("add 1 :a"),
        Err(EmberError::Trap(RuntimeTrap::NumberExpected { .. }))
    ));
}

#[test]
fn test_applying_non_callable_traps() {
    assert!(matches!(
        run("val f = 5\nf 1"),
        Err(EmberError::Trap(RuntimeTrap::NotCallable { .. }))
    ));
}

#[test]
fn test_unknown_module_field_traps() {
    let source = "val m = module { val a = 1 }\nm.b";
    assert!(matches!(
        run(source),
        Err(EmberError::Trap(RuntimeTrap::UnknownField { .. }))
    ));
}

#[test]
fn test_parse_error_reported() {
    assert!(matches!(run("val = 4"), Err(EmberError::Parse(_))));
}
