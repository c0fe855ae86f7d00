use std::fmt;

use futures::future::BoxFuture;

use crate::error::ResolutionError;
use crate::permission::ScopesByAction;
use crate::resolvers::ScopeAttributeMutator;
use crate::scope::{grant_matches, inject_params, ScopeParams};

/// Boolean access check over a subject's grants
///
/// Evaluation is pure and short-circuits: `All` stops at the first false
/// child, `Any` at the first true one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluator {
    /// `action` granted on every scope in `scopes`; no scopes means the
    /// action alone is enough
    Permission { action: String, scopes: Vec<String> },
    All(Vec<Evaluator>),
    Any(Vec<Evaluator>),
}

impl Evaluator {
    /// Leaf check; empty scope strings are dropped
    pub fn permission<I, S>(action: impl Into<String>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Evaluator::Permission {
            action: action.into(),
            scopes: scopes
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Leaf check on the action only
    pub fn action(action: impl Into<String>) -> Self {
        Evaluator::Permission {
            action: action.into(),
            scopes: Vec::new(),
        }
    }

    pub fn all(children: impl IntoIterator<Item = Evaluator>) -> Self {
        Evaluator::All(children.into_iter().collect())
    }

    pub fn any(children: impl IntoIterator<Item = Evaluator>) -> Self {
        Evaluator::Any(children.into_iter().collect())
    }

    /// Check the tree against grouped grants
    ///
    /// Never fails: a missing action evaluates to false.
    pub fn evaluate(&self, permissions: &ScopesByAction) -> bool {
        match self {
            Evaluator::Permission { action, scopes } => {
                let Some(granted) = permissions.get(action) else {
                    return false;
                };
                scopes
                    .iter()
                    .all(|required| granted.iter().any(|g| grant_matches(g, required)))
            }
            Evaluator::All(children) => children.iter().all(|c| c.evaluate(permissions)),
            Evaluator::Any(children) => children.iter().any(|c| c.evaluate(permissions)),
        }
    }

    /// Return a copy with attribute scopes replaced by resolver output
    ///
    /// Scopes no resolver claims pass through unchanged. A scope resolving
    /// to several concrete scopes becomes an `Any` over them. `self` is left
    /// untouched.
    pub fn mutate_scopes<'a>(
        &'a self,
        mutator: &'a dyn ScopeAttributeMutator,
    ) -> BoxFuture<'a, Result<Evaluator, ResolutionError>> {
        Box::pin(async move {
            match self {
                Evaluator::Permission { action, scopes } => {
                    let mut alternatives = Vec::with_capacity(scopes.len());
                    for scope in scopes {
                        match mutator.mutate(scope).await? {
                            Some(resolved) => alternatives.push(resolved),
                            None => alternatives.push(vec![scope.clone()]),
                        }
                    }
                    Ok(Self::from_alternatives(action, alternatives))
                }
                Evaluator::All(children) => {
                    let mut mutated = Vec::with_capacity(children.len());
                    for child in children {
                        mutated.push(child.mutate_scopes(mutator).await?);
                    }
                    Ok(Evaluator::All(mutated))
                }
                Evaluator::Any(children) => {
                    let mut mutated = Vec::with_capacity(children.len());
                    for child in children {
                        mutated.push(child.mutate_scopes(mutator).await?);
                    }
                    Ok(Evaluator::Any(mutated))
                }
            }
        })
    }

    /// Return a copy with `{...}` placeholders in every scope expanded
    pub fn inject(&self, params: &ScopeParams) -> Result<Evaluator, ResolutionError> {
        match self {
            Evaluator::Permission { action, scopes } => Ok(Evaluator::Permission {
                action: action.clone(),
                scopes: scopes
                    .iter()
                    .map(|s| inject_params(s, params))
                    .collect::<Result<_, _>>()?,
            }),
            Evaluator::All(children) => Ok(Evaluator::All(
                children
                    .iter()
                    .map(|c| c.inject(params))
                    .collect::<Result<_, _>>()?,
            )),
            Evaluator::Any(children) => Ok(Evaluator::Any(
                children
                    .iter()
                    .map(|c| c.inject(params))
                    .collect::<Result<_, _>>()?,
            )),
        }
    }

    /// Rebuild a leaf from per-scope alternatives
    ///
    /// `alternatives[i]` lists the concrete scopes that may satisfy the i-th
    /// required scope.
    fn from_alternatives(action: &str, alternatives: Vec<Vec<String>>) -> Evaluator {
        if alternatives.iter().all(|alts| alts.len() == 1) {
            return Evaluator::permission(action, alternatives.into_iter().flatten());
        }

        let mut required: Vec<Evaluator> = alternatives
            .into_iter()
            .map(|alts| match alts.len() {
                1 => Evaluator::permission(action, alts),
                _ => Evaluator::Any(
                    alts.into_iter()
                        .map(|s| Evaluator::permission(action, [s]))
                        .collect(),
                ),
            })
            .collect();

        if required.len() == 1 {
            required.remove(0)
        } else {
            Evaluator::All(required)
        }
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, children: &[Evaluator]) -> fmt::Result {
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{child}")?;
            }
            Ok(())
        }

        match self {
            Evaluator::Permission { action, scopes } if scopes.is_empty() => {
                write!(f, "Permission({action})")
            }
            Evaluator::Permission { action, scopes } => {
                write!(f, "Permission({action}, [{}])", scopes.join(", "))
            }
            Evaluator::All(children) => {
                f.write_str("All(")?;
                join(f, children)?;
                f.write_str(")")
            }
            Evaluator::Any(children) => {
                f.write_str("Any(")?;
                join(f, children)?;
                f.write_str(")")
            }
        }
    }
}
