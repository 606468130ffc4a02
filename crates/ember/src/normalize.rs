//! A-normalization: surface AST to NST.
//!
//! Pass 1 of the normalizer. Every non-trivial sub-expression is hoisted into
//! a fresh `Let`-bound local; free variables of lambdas and match branches
//! are classified as constant or dynamic; arities of named lambdas are
//! recorded for saturation analysis. References to a lambda binding from its
//! own body are left as `Recursive` placeholders for the resolver
//! (see `resolve`).

use ahash::AHashMap;
use indexmap::IndexSet;
use tracing::debug;

use crate::ast::{Binding, Block, Expr, MatchArm, Pattern};
use crate::consts::{ConstTable, ConstValue};
use crate::error::CompileError;
use crate::intern::{well_known::SYM_MODULE, Arity, ArityTable, SymbolTable};
use crate::nst::{BranchAtom, LambdaAtom, NstAtom, NstExpr, NstVar, PrimOp, VarKind};
use crate::resolve::resolve_recursion;
use crate::value::MAX_COMPOUND_ARITY;

/// Output of normalization: the NST plus the tables built alongside it.
#[derive(Debug)]
pub struct Normalized {
    pub expr: NstExpr,
    pub consts: ConstTable,
    pub symbols: SymbolTable,
    pub arities: ArityTable,
}

/// Normalizes a parsed program and resolves recursive references.
pub fn normalize(program: &Block) -> Result<Normalized, CompileError> {
    let mut normalizer = Normalizer::new();
    let mut binds = Vec::new();
    let atom = normalizer.atomize_block(program, &mut binds, None)?;
    let mut expr = fold_lets(binds, atom);
    resolve_recursion(&mut expr, &mut normalizer.arities)?;
    debug!(symbols = normalizer.symbols.len(), "normalization complete");
    Ok(Normalized {
        expr,
        consts: normalizer.consts,
        symbols: normalizer.symbols,
        arities: normalizer.arities,
    })
}

/// Wraps accumulated bindings around a final atom, innermost last.
fn fold_lets(binds: Vec<(String, NstAtom)>, atom: NstAtom) -> NstExpr {
    let mut expr = NstExpr::Atom(atom);
    for (var, bound) in binds.into_iter().rev() {
        expr = NstExpr::Let {
            var,
            atom: bound,
            body: Box::new(expr),
        };
    }
    expr
}

/// Hoisted bindings accumulated while atomizing one scope level.
type Binds = Vec<(String, NstAtom)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindingKind {
    Param,
    Local { constant: bool },
}

/// One lexical scope on the context stack.
///
/// A context is pushed when entering a lambda or match branch, seeded with
/// the formal parameter (or matched variable) names.
#[derive(Debug, Default)]
struct Context {
    /// Names bound in this scope.
    bindings: AHashMap<String, BindingKind>,
    /// Outer-scope names referenced dynamically from this scope, in first-use
    /// order; this order becomes the closure's capture layout.
    dynamic_free: IndexSet<String>,
    /// The name this scope's lambda is being bound under, if any.
    self_name: Option<String>,
    /// Synthetic local aliases created for constant free variables.
    const_aliases: AHashMap<String, String>,
    /// Set when a reference from this scope (or a nested one) resolved to a
    /// self name still being bound; the resolver will add captures here.
    recursive_touched: bool,
}

struct Normalizer {
    symbols: SymbolTable,
    consts: ConstTable,
    arities: ArityTable,
    contexts: Vec<Context>,
    tmp_counter: u32,
}

impl Normalizer {
    fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            consts: ConstTable::new(),
            arities: ArityTable::new(),
            contexts: vec![Context::default()],
            tmp_counter: 0,
        }
    }

    fn current(&mut self) -> &mut Context {
        self.contexts.last_mut().expect("context stack is never empty")
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let n = self.tmp_counter;
        self.tmp_counter += 1;
        format!("${prefix}:{n}")
    }

    fn bind_param(&mut self, name: &str) {
        self.current().bindings.insert(name.to_owned(), BindingKind::Param);
    }

    fn bind_local(&mut self, name: &str, constant: bool) {
        self.current()
            .bindings
            .insert(name.to_owned(), BindingKind::Local { constant });
    }

    /// True when any scope binds `name` (including as a pending self name);
    /// used to let user bindings shadow primitive operator names.
    fn name_is_bound(&self, name: &str) -> bool {
        self.contexts
            .iter()
            .any(|ctx| ctx.bindings.contains_key(name) || ctx.self_name.as_deref() == Some(name))
    }

    /// Resolves `name` against the context stack, innermost first.
    ///
    /// Dynamic references to outer scopes are recorded in the current
    /// context's free set; references to a lambda binding still being
    /// established come back as `Recursive`.
    fn lookup(&mut self, name: &str) -> Result<NstVar, CompileError> {
        let depth = self.contexts.len() - 1;
        if let Some(&kind) = self.contexts[depth].bindings.get(name) {
            let kind = match kind {
                BindingKind::Param => VarKind::Param,
                BindingKind::Local { .. } => VarKind::Local,
            };
            return Ok(NstVar::new(name, kind));
        }
        if self.contexts[depth].self_name.as_deref() == Some(name) {
            self.contexts[depth].recursive_touched = true;
            return Ok(NstVar::new(name, VarKind::Recursive));
        }
        for i in (0..depth).rev() {
            if let Some(&kind) = self.contexts[i].bindings.get(name) {
                return match kind {
                    BindingKind::Local { constant: true } => Ok(NstVar::new(name, VarKind::ConstantFree)),
                    _ => {
                        self.contexts[depth].dynamic_free.insert(name.to_owned());
                        Ok(NstVar::new(name, VarKind::DynamicFree))
                    }
                };
            }
            if self.contexts[i].self_name.as_deref() == Some(name) {
                // Every scope from the named lambda inward will gain this
                // capture during resolution.
                for ctx in &mut self.contexts[i..] {
                    ctx.recursive_touched = true;
                }
                return Ok(NstVar::new(name, VarKind::Recursive));
            }
        }
        Err(CompileError::UnknownName(name.to_owned()))
    }

    // ========================================================================
    // Atomization
    // ========================================================================

    /// `name` is the binding name of the block itself, if any; it flows to
    /// the result expression so `val f = { val (x) = ... }` records f's
    /// arity like a named lambda.
    fn atomize_block(&mut self, block: &Block, binds: &mut Binds, name: Option<&str>) -> Result<NstAtom, CompileError> {
        for binding in &block.bindings {
            self.atomize_binding(binding, binds)?;
        }
        self.atomize(&block.result, binds, name)
    }

    /// Atomizes one named binding and registers it in the current scope.
    fn atomize_binding(&mut self, binding: &Binding, binds: &mut Binds) -> Result<(), CompileError> {
        let atom = self.atomize(&binding.value, binds, Some(&binding.name))?;
        let constant = atom_is_constant(&atom);
        binds.push((binding.name.clone(), atom));
        self.bind_local(&binding.name, constant);
        Ok(())
    }

    fn atomize(&mut self, expr: &Expr, binds: &mut Binds, name: Option<&str>) -> Result<NstAtom, CompileError> {
        match expr {
            Expr::Number(n) => Ok(NstAtom::Number(*n)),
            Expr::Symbol(s) => Ok(NstAtom::PlainSymbol(self.symbols.intern(s))),
            Expr::Str(s) => Ok(NstAtom::Str(self.consts.add_string(s))),
            Expr::Compound { symbol, args } => self.atomize_compound(symbol, args, binds),
            Expr::Var(var_name) => self.atomize_var(var_name, binds),
            Expr::Apply { head, args } => self.atomize_apply(head, args, binds),
            Expr::Lambda { params, body } => self.atomize_lambda(name, params, body),
            Expr::Block(block) => self.atomize_block(block, binds, name),
            Expr::Match { subject, branches } => self.atomize_match(subject, branches, binds),
            Expr::Module { bindings } => self.atomize_module(bindings, binds),
            Expr::FieldAccess { object, field } => self.atomize_field_access(object, field, binds),
        }
    }

    /// Names an expression: returns its variable directly when it is already
    /// a register-resident reference, otherwise hoists it into a fresh local.
    fn name_expr(&mut self, expr: &Expr, binds: &mut Binds) -> Result<NstVar, CompileError> {
        let atom = self.atomize(expr, binds, None)?;
        if let NstAtom::Var(var) = atom {
            return Ok(var);
        }
        let constant = atom_is_constant(&atom);
        let tmp = self.fresh("tmp");
        binds.push((tmp.clone(), atom));
        self.bind_local(&tmp, constant);
        Ok(NstVar::new(tmp, VarKind::Local))
    }

    /// A compound-symbol argument is static iff it is a number, a plain
    /// symbol, or a compound symbol whose every argument is static.
    fn static_const_value(&mut self, expr: &Expr) -> Option<ConstValue> {
        match expr {
            Expr::Number(n) => Some(ConstValue::Number(*n)),
            Expr::Symbol(s) => Some(ConstValue::Symbol(self.symbols.intern(s))),
            Expr::Compound { symbol, args } => {
                let fields: Option<Vec<ConstValue>> = args.iter().map(|a| self.static_const_value(a)).collect();
                Some(ConstValue::Compound {
                    symbol: self.symbols.intern(symbol),
                    fields: fields?,
                })
            }
            _ => None,
        }
    }

    fn atomize_compound(&mut self, symbol: &str, args: &[Expr], binds: &mut Binds) -> Result<NstAtom, CompileError> {
        if args.len() > MAX_COMPOUND_ARITY {
            return Err(CompileError::TooManyFields {
                symbol: symbol.to_owned(),
                count: args.len(),
                max: MAX_COMPOUND_ARITY,
            });
        }
        let sid = self.symbols.intern(symbol);
        let mut fields = Vec::with_capacity(args.len());
        let mut slot_fills = Vec::new();
        for (slot, arg) in args.iter().enumerate() {
            match self.static_const_value(arg) {
                Some(value) => fields.push(value),
                None => {
                    // Dynamic slot: hoist the argument and leave a
                    // placeholder in the template cell.
                    let var = self.name_expr(arg, binds)?;
                    fields.push(ConstValue::Number(0));
                    slot_fills.push((slot, var));
                }
            }
        }
        let addr = self.consts.add_compound(sid, &fields)?;
        Ok(NstAtom::CompoundSymbol { addr, slot_fills })
    }

    fn atomize_var(&mut self, name: &str, binds: &mut Binds) -> Result<NstAtom, CompileError> {
        let var = self.lookup(name)?;
        match var.kind {
            VarKind::Param | VarKind::Local | VarKind::DynamicFree => Ok(NstAtom::Var(var)),
            VarKind::ConstantFree => {
                // Bind the constant once per scope under a synthetic name and
                // reuse the local for later references.
                if let Some(alias) = self.current().const_aliases.get(name).cloned() {
                    return Ok(NstAtom::Var(NstVar::new(alias, VarKind::Local)));
                }
                let alias = format!("$locconst:{name}");
                binds.push((alias.clone(), NstAtom::Var(var)));
                self.bind_local(&alias, true);
                if let Some(arity) = self.arities.lookup(name) {
                    self.arities.record(&alias, arity);
                }
                self.current().const_aliases.insert(name.to_owned(), alias.clone());
                Ok(NstAtom::Var(NstVar::new(alias, VarKind::Local)))
            }
            VarKind::Recursive => {
                let tmp = self.fresh("rec");
                binds.push((tmp.clone(), NstAtom::Var(var)));
                self.bind_local(&tmp, false);
                Ok(NstAtom::Var(NstVar::new(tmp, VarKind::Local)))
            }
        }
    }

    fn atomize_apply(&mut self, head: &Expr, args: &[Expr], binds: &mut Binds) -> Result<NstAtom, CompileError> {
        // Primitive operators, unless shadowed by a user binding.
        if let Expr::Var(op_name) = head {
            if let Some(op) = PrimOp::from_name(op_name) {
                if op.arity() == args.len() && !self.name_is_bound(op_name) {
                    let operands = args
                        .iter()
                        .map(|a| self.name_expr(a, binds))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(NstAtom::PrimOp { op, args: operands });
                }
            }
        }

        let head_name = match head {
            Expr::Var(n) => Some(n.as_str()),
            _ => None,
        };
        let fun = self.name_expr(head, binds)?;
        let arg_vars = args
            .iter()
            .map(|a| self.name_expr(a, binds))
            .collect::<Result<Vec<_>, _>>()?;

        let Some(arity) = head_name.and_then(|n| self.arities.lookup(n)) else {
            // Unknown arity: generic application with all args named.
            return Ok(NstAtom::FunAp { fun, args: arg_vars });
        };

        use std::cmp::Ordering;
        match arg_vars.len().cmp(&arity.params) {
            Ordering::Equal => Ok(NstAtom::FunAp { fun, args: arg_vars }),
            Ordering::Less => {
                if arity.captures > 0 {
                    return Err(CompileError::internal(format!(
                        "static partial application of closure '{}'",
                        head_name.unwrap_or("?")
                    )));
                }
                Ok(NstAtom::PartAp { fun, args: arg_vars })
            }
            Ordering::Greater => {
                // Saturate the known arity, then apply the result to the rest.
                let rest = arg_vars[arity.params..].to_vec();
                let first = arg_vars[..arity.params].to_vec();
                let tmp = self.fresh("app");
                binds.push((tmp.clone(), NstAtom::FunAp { fun, args: first }));
                self.bind_local(&tmp, false);
                Ok(NstAtom::FunAp {
                    fun: NstVar::new(tmp, VarKind::Local),
                    args: rest,
                })
            }
        }
    }

    fn atomize_lambda(&mut self, name: Option<&str>, params: &[String], body: &Expr) -> Result<NstAtom, CompileError> {
        self.contexts.push(Context {
            self_name: name.map(str::to_owned),
            ..Context::default()
        });
        for param in params {
            self.bind_param(param);
        }
        let body_nst = self.normalize_scope_body(body)?;
        let ctx = self.contexts.pop().expect("lambda context pushed above");
        let free_vars: Vec<String> = ctx.dynamic_free.into_iter().collect();
        self.pull_up_frees(&free_vars);

        if let Some(name) = name {
            self.arities.record(
                name,
                Arity {
                    captures: free_vars.len(),
                    params: params.len(),
                },
            );
        }
        Ok(NstAtom::Lambda(LambdaAtom {
            free_vars,
            params: params.to_vec(),
            body: Box::new(body_nst),
            has_recursive_refs: ctx.recursive_touched,
        }))
    }

    /// Normalizes a lambda or branch body in the context pushed by the caller.
    fn normalize_scope_body(&mut self, body: &Expr) -> Result<NstExpr, CompileError> {
        let mut binds = Vec::new();
        let atom = self.atomize(body, &mut binds, None)?;
        Ok(fold_lets(binds, atom))
    }

    /// Propagates a popped scope's dynamic frees into the enclosing context:
    /// any name the enclosing scope does not bind becomes a dynamic free
    /// variable there too.
    fn pull_up_frees(&mut self, free_vars: &[String]) {
        for free in free_vars {
            let bound_here = self.current().bindings.contains_key(free);
            if !bound_here {
                self.current().dynamic_free.insert(free.clone());
            }
        }
    }

    fn atomize_match(&mut self, subject: &Expr, arms: &[MatchArm], binds: &mut Binds) -> Result<NstAtom, CompileError> {
        let subject_var = self.name_expr(subject, binds)?;

        let mut roots = Vec::with_capacity(arms.len());
        let mut matched: Vec<Vec<String>> = Vec::with_capacity(arms.len());
        for arm in arms {
            let mut captured = Vec::new();
            let root = self.encode_pattern(&arm.pattern, &mut captured)?;
            roots.push(root);
            matched.push(captured);
        }
        let pattern_addr = self.consts.add_match_data(&roots)?;
        let max_captures = matched.iter().map(Vec::len).max().unwrap_or(0);

        let mut branches = Vec::with_capacity(arms.len());
        for (arm, matched_vars) in arms.iter().zip(matched) {
            self.contexts.push(Context::default());
            for var in &matched_vars {
                self.bind_param(var);
            }
            let body_nst = self.normalize_scope_body(&arm.body)?;
            let ctx = self.contexts.pop().expect("branch context pushed above");
            let free_vars: Vec<String> = ctx.dynamic_free.into_iter().collect();
            self.pull_up_frees(&free_vars);
            if ctx.recursive_touched {
                self.current().recursive_touched = true;
            }
            branches.push(BranchAtom {
                free_vars,
                matched_vars,
                body: Box::new(body_nst),
            });
        }
        Ok(NstAtom::Match {
            max_captures,
            subject: subject_var,
            pattern_addr,
            branches,
        })
    }

    /// Encodes a pattern into a constant tree, assigning capture slots in
    /// positional order and collecting the captured names.
    fn encode_pattern(&mut self, pattern: &Pattern, captured: &mut Vec<String>) -> Result<ConstValue, CompileError> {
        match pattern {
            Pattern::Number(n) => Ok(ConstValue::Number(*n)),
            Pattern::Symbol(s) => Ok(ConstValue::Symbol(self.symbols.intern(s))),
            Pattern::Compound { symbol, args } => {
                let sid = self.symbols.intern(symbol);
                let fields = args
                    .iter()
                    .map(|p| self.encode_pattern(p, captured))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ConstValue::Compound { symbol: sid, fields })
            }
            Pattern::Var(name) => {
                let slot = captured.len() as u32;
                captured.push(name.clone());
                Ok(ConstValue::MatchVar(slot))
            }
            Pattern::Wildcard => {
                let slot = captured.len() as u32;
                captured.push("_".to_owned());
                Ok(ConstValue::MatchVar(slot))
            }
        }
    }

    fn atomize_module(&mut self, bindings: &[Binding], binds: &mut Binds) -> Result<NstAtom, CompileError> {
        if bindings.len() * 2 > MAX_COMPOUND_ARITY {
            return Err(CompileError::TooManyFields {
                symbol: "$module".to_owned(),
                count: bindings.len(),
                max: MAX_COMPOUND_ARITY / 2,
            });
        }
        let mut fields = Vec::with_capacity(bindings.len() * 2);
        let mut slot_fills = Vec::with_capacity(bindings.len());
        for (i, binding) in bindings.iter().enumerate() {
            // Field values are hoisted under their own names so later fields
            // can reference earlier ones.
            self.atomize_binding(binding, binds)?;
            let var = self.atomize_var(&binding.name, binds)?;
            let NstAtom::Var(var) = var else {
                return Err(CompileError::internal("module field did not resolve to a variable"));
            };
            let sid = self.symbols.intern(&binding.name);
            fields.push(ConstValue::Symbol(sid));
            fields.push(ConstValue::Number(0));
            slot_fills.push((2 * i + 1, var));
        }
        let addr = self.consts.add_compound(SYM_MODULE, &fields)?;
        Ok(NstAtom::Module { addr, slot_fills })
    }

    fn atomize_field_access(&mut self, object: &Expr, field: &str, binds: &mut Binds) -> Result<NstAtom, CompileError> {
        let module = self.name_expr(object, binds)?;
        let sid = self.symbols.intern(field);
        let tmp = self.fresh("sym");
        binds.push((tmp.clone(), NstAtom::PlainSymbol(sid)));
        self.bind_local(&tmp, true);
        Ok(NstAtom::ModuleLookup {
            module,
            field: NstVar::new(tmp, VarKind::Local),
        })
    }
}

/// A binding is a compile-time constant iff its atom is a plain literal, a
/// plain symbol, a fully static compound symbol, or a lambda that captures
/// nothing (and will not gain a self capture during resolution).
fn atom_is_constant(atom: &NstAtom) -> bool {
    match atom {
        NstAtom::Number(_) | NstAtom::PlainSymbol(_) => true,
        NstAtom::CompoundSymbol { slot_fills, .. } => slot_fills.is_empty(),
        NstAtom::Lambda(lambda) => lambda.free_vars.is_empty() && !lambda.has_recursive_refs,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::parser::parse;

    fn normalize_source(source: &str) -> Normalized {
        normalize(&parse(source).unwrap()).unwrap()
    }

    /// Collects the Let chain into (name, atom) pairs plus the final atom.
    fn unroll(expr: &NstExpr) -> (Vec<(&str, &NstAtom)>, &NstAtom) {
        let mut lets = Vec::new();
        let mut cur = expr;
        loop {
            match cur {
                NstExpr::Let { var, atom, body } => {
                    lets.push((var.as_str(), atom));
                    cur = body;
                }
                NstExpr::Atom(atom) => return (lets, atom),
            }
        }
    }

    #[test]
    fn test_number_program() {
        let normalized = normalize_source("4815");
        let (lets, atom) = unroll(&normalized.expr);
        assert!(lets.is_empty());
        assert_eq!(*atom, NstAtom::Number(4815));
    }

    #[test]
    fn test_prim_op_recognized() {
        let normalized = normalize_source("val a = 4\nval b = 7\nadd a b");
        let (_, atom) = unroll(&normalized.expr);
        let NstAtom::PrimOp { op, args } = atom else {
            panic!("expected prim op, got {atom:?}");
        };
        assert_eq!(*op, PrimOp::Add);
        assert_eq!(args.len(), 2);
        assert!(args.iter().all(|a| a.kind == VarKind::Local));
    }

    #[test]
    fn test_nested_application_hoisted() {
        let normalized = normalize_source("val a = 1\nadd (add a 2) 3");
        let (lets, atom) = unroll(&normalized.expr);
        // inner application and literals are hoisted into locals
        assert!(lets.iter().any(|(name, _)| name.starts_with("$tmp:")));
        assert!(matches!(atom, NstAtom::PrimOp { op: PrimOp::Add, .. }));
    }

    #[test]
    fn test_constant_free_var_classification() {
        // `x` is dynamic inside the lambda (a parameter of the enclosing
        // one), while `c` is a compile-time constant of the outer scope.
        let source = "val c = 10\nval f (x) = { val g (y) = add (add x y) c\ng }\nf";
        let normalized = normalize_source(source);
        let (lets, _) = unroll(&normalized.expr);
        let (_, f_atom) = lets.iter().find(|(name, _)| *name == "f").unwrap();
        let NstAtom::Lambda(f) = f_atom else { panic!("f should be a lambda") };
        // f itself captures nothing dynamic
        assert!(f.free_vars.is_empty());
        let (inner_lets, _) = unroll(&f.body);
        let (_, g_atom) = inner_lets.iter().find(|(name, _)| *name == "g").unwrap();
        let NstAtom::Lambda(g) = g_atom else { panic!("g should be a lambda") };
        assert_eq!(g.free_vars, vec!["x".to_owned()]);
        // the constant is materialized through a synthetic local inside g
        let (g_lets, _) = unroll(&g.body);
        let (_, alias_atom) = g_lets.iter().find(|(name, _)| *name == "$locconst:c").unwrap();
        assert_eq!(
            **alias_atom,
            NstAtom::Var(NstVar::new("c", VarKind::ConstantFree))
        );
    }

    #[test]
    fn test_partial_application_detected() {
        let normalized = normalize_source("val add2 (x y) = add x y\nval inc = add2 1\ninc");
        let (lets, _) = unroll(&normalized.expr);
        let (_, atom) = lets.iter().find(|(name, _)| *name == "inc").unwrap();
        assert!(matches!(atom, NstAtom::PartAp { args, .. } if args.len() == 1));
    }

    #[test]
    fn test_over_saturation_split() {
        let source = "val make-adder (x) = { val (y) = add x y }\nmake-adder 22 55";
        let normalized = normalize_source(source);
        let (lets, atom) = unroll(&normalized.expr);
        // the first application is hoisted, the final atom applies its result
        let (app_name, app_atom) = lets.iter().find(|(name, _)| name.starts_with("$app:")).unwrap();
        assert!(matches!(app_atom, NstAtom::FunAp { args, .. } if args.len() == 1));
        let NstAtom::FunAp { fun, args } = atom else {
            panic!("expected application result");
        };
        assert_eq!(fun.name, *app_name);
        assert_eq!(args.len(), 1);
    }

    #[test]
    fn test_recursive_reference_left_for_resolver() {
        // After resolution the self reference is a dynamic free capture.
        let normalized = normalize_source("val loop (n) = loop n\nloop");
        let (lets, _) = unroll(&normalized.expr);
        let (_, atom) = lets.iter().find(|(name, _)| *name == "loop").unwrap();
        let NstAtom::Lambda(lambda) = atom else { panic!("expected lambda") };
        assert_eq!(lambda.free_vars, vec!["loop".to_owned()]);
        assert!(lambda.has_recursive_refs);
        let (body_lets, _) = unroll(&lambda.body);
        let (_, rec_atom) = body_lets.iter().find(|(name, _)| name.starts_with("$rec:")).unwrap();
        assert_eq!(
            **rec_atom,
            NstAtom::Var(NstVar::new("loop", VarKind::DynamicFree))
        );
    }

    #[test]
    fn test_static_compound_fully_encoded() {
        let normalized = normalize_source(":sym 2 3");
        let (lets, atom) = unroll(&normalized.expr);
        assert!(lets.is_empty());
        let NstAtom::CompoundSymbol { slot_fills, .. } = atom else {
            panic!("expected compound symbol");
        };
        assert!(slot_fills.is_empty());
    }

    #[test]
    fn test_dynamic_compound_slots() {
        let normalized = normalize_source("val a = 1\n:pair a 2");
        let (_, atom) = unroll(&normalized.expr);
        let NstAtom::CompoundSymbol { slot_fills, .. } = atom else {
            panic!("expected compound symbol");
        };
        assert_eq!(slot_fills.len(), 1);
        assert_eq!(slot_fills[0].0, 0);
    }

    #[test]
    fn test_match_captures_and_max() {
        let source = "val p = :pair 1 2\nmatch p with\n  :pair a b -> add a b\n  _ -> 0\nend";
        let normalized = normalize_source(source);
        let (_, atom) = unroll(&normalized.expr);
        let NstAtom::Match {
            max_captures, branches, ..
        } = atom
        else {
            panic!("expected match");
        };
        assert_eq!(*max_captures, 2);
        assert_eq!(branches[0].matched_vars, vec!["a".to_owned(), "b".to_owned()]);
        assert_eq!(branches[1].matched_vars, vec!["_".to_owned()]);
    }

    #[test]
    fn test_unknown_name_rejected() {
        let err = normalize(&parse("ghost").unwrap()).unwrap_err();
        assert_eq!(err, CompileError::UnknownName("ghost".to_owned()));
    }

    #[test]
    fn test_shadowed_primitive_is_applied_normally() {
        let source = "val add (x y) = 99\nadd 1 2";
        let normalized = normalize_source(source);
        let (_, atom) = unroll(&normalized.expr);
        assert!(matches!(atom, NstAtom::FunAp { .. }));
    }
}
