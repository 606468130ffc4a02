//! Recursion resolver: pass 2 of the normalizer.
//!
//! Rewrites every `Recursive` variable reference left by pass 1 into a
//! `DynamicFree` reference, augmenting the free-variable list of each lambda
//! the name must travel through. A lambda that ends up capturing its own
//! binding name gets a self-reference slot, which the code generator fills
//! in after the closure record is allocated.
//!
//! This runs as a separate post-order pass because whether a self name is
//! dynamic can only be decided once the whole body has been seen.

use ahash::AHashSet;
use indexmap::IndexSet;

use crate::error::CompileError;
use crate::intern::ArityTable;
use crate::nst::{BranchAtom, NstAtom, NstExpr, VarKind};

/// Resolves all `Recursive` references in a normalized program.
///
/// Also re-validates partial applications: augmentation can give a
/// previously capture-free lambda a self capture, and a closure must never
/// be the target of a static partial application.
pub fn resolve_recursion(expr: &mut NstExpr, arities: &mut ArityTable) -> Result<(), CompileError> {
    let mut bound = AHashSet::new();
    let needs = resolve_body(expr, &mut bound, arities)?;
    if let Some(name) = needs.first() {
        return Err(CompileError::internal(format!(
            "recursive reference '{name}' escaped the top-level scope"
        )));
    }
    Ok(())
}

/// Walks one function scope. `bound` collects the names visible in it.
/// Returns the recursive-origin names this scope needs its enclosing scope
/// to supply.
fn resolve_body(
    expr: &mut NstExpr,
    bound: &mut AHashSet<String>,
    arities: &mut ArityTable,
) -> Result<IndexSet<String>, CompileError> {
    let mut needs = IndexSet::new();
    let mut cur = expr;
    loop {
        match cur {
            NstExpr::Let { var, atom, body } => {
                resolve_atom(atom, Some(var), bound, arities, &mut needs)?;
                bound.insert(var.clone());
                cur = body;
            }
            NstExpr::Atom(atom) => {
                resolve_atom(atom, None, bound, arities, &mut needs)?;
                return Ok(needs);
            }
        }
    }
}

fn resolve_atom(
    atom: &mut NstAtom,
    let_name: Option<&str>,
    bound: &AHashSet<String>,
    arities: &mut ArityTable,
    needs: &mut IndexSet<String>,
) -> Result<(), CompileError> {
    match atom {
        NstAtom::Var(var) => {
            if var.kind == VarKind::Recursive {
                var.kind = VarKind::DynamicFree;
                needs.insert(var.name.clone());
            }
            Ok(())
        }
        NstAtom::Lambda(lambda) => {
            let inner_needs = resolve_scope(
                &mut lambda.body,
                &lambda.params,
                &lambda.free_vars,
                arities,
            )?;
            absorb_needs(
                inner_needs,
                &mut lambda.free_vars,
                let_name,
                bound,
                arities,
                needs,
            );
            Ok(())
        }
        NstAtom::Match { branches, .. } => {
            for branch in branches.iter_mut() {
                resolve_branch(branch, bound, arities, needs)?;
            }
            Ok(())
        }
        NstAtom::PartAp { fun, .. } => {
            // A closure must never be partially applied statically; the
            // normalizer checked this, but resolution may have added a self
            // capture to the target since.
            if let Some(arity) = arities.lookup(&fun.name) {
                if arity.captures > 0 {
                    return Err(CompileError::internal(format!(
                        "static partial application of closure '{}'",
                        fun.name
                    )));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn resolve_branch(
    branch: &mut BranchAtom,
    bound: &AHashSet<String>,
    arities: &mut ArityTable,
    needs: &mut IndexSet<String>,
) -> Result<(), CompileError> {
    let inner_needs = resolve_scope(
        &mut branch.body,
        &branch.matched_vars,
        &branch.free_vars,
        arities,
    )?;
    absorb_needs(inner_needs, &mut branch.free_vars, None, bound, arities, needs);
    Ok(())
}

fn resolve_scope(
    body: &mut NstExpr,
    params: &[String],
    free_vars: &[String],
    arities: &mut ArityTable,
) -> Result<IndexSet<String>, CompileError> {
    let mut inner_bound: AHashSet<String> = params.iter().cloned().collect();
    inner_bound.extend(free_vars.iter().cloned());
    resolve_body(body, &mut inner_bound, arities)
}

/// Folds a nested scope's unmet needs into the enclosing lambda.
///
/// Every needed name joins the free-var list (this is the augmentation the
/// self-reference slot falls out of: the slot is the position of the
/// lambda's own name in its free list). Needs the enclosing scope cannot
/// satisfy either — neither as a binding nor as the lambda's own name —
/// propagate further out.
fn absorb_needs(
    inner_needs: IndexSet<String>,
    free_vars: &mut Vec<String>,
    let_name: Option<&str>,
    bound: &AHashSet<String>,
    arities: &mut ArityTable,
    needs: &mut IndexSet<String>,
) {
    for need in inner_needs {
        if !free_vars.contains(&need) {
            free_vars.push(need.clone());
            if let Some(name) = let_name {
                arities.add_captures(name, 1);
            }
        }
        let satisfied = let_name == Some(need.as_str()) || bound.contains(&need);
        if !satisfied {
            needs.insert(need);
        }
    }
}
