use std::{
    fmt::{self, Debug, Formatter},
    hash::{Hash, Hasher},
    rc::Rc,
};

use pdc_lang::Args;
use rustc_hash::FxHasher;

pub type HashFn = dyn Fn(&Args) -> u64;
/// `(previous, current)`; `true` means the exec code is stale.
pub type CompareFn = dyn Fn(&Args, &Args) -> bool;

/// When exec code is regenerated.
#[derive(Clone, Default)]
pub enum Recalculation {
    /// Once, lazily, and again only after `reset` or `refresh`.
    #[default]
    Manual,
    /// Whenever the fingerprint of the arguments changes.
    Hash(Rc<HashFn>),
    /// Whenever the predicate reports the arguments changed since the last regeneration.
    Compare(Rc<CompareFn>),
}

impl Debug for Recalculation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Recalculation::Manual => write!(f, "Manual"),
            Recalculation::Hash(_) => write!(f, "Hash"),
            Recalculation::Compare(_) => write!(f, "Compare"),
        }
    }
}

/// Fingerprints every argument by its `repr`.
pub fn simple_hash(args: &Args) -> u64 {
    let mut hasher = FxHasher::default();
    args.positional.len().hash(&mut hasher);
    for value in &args.positional {
        value.repr().hash(&mut hasher);
    }
    for (name, value) in &args.keywords {
        name.hash(&mut hasher);
        value.repr().hash(&mut hasher);
    }
    hasher.finish()
}

/// Stale when any argument differs.
pub fn simple_compare(previous: &Args, current: &Args) -> bool {
    previous != current
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdc_lang::RuntimeValue;
    use rstest::rstest;

    fn args(values: &[i64]) -> Args {
        Args::new(values.iter().map(|v| RuntimeValue::Int(*v)).collect())
    }

    #[rstest]
    #[case::same(args(&[1, 2]), args(&[1, 2]), true)]
    #[case::different(args(&[1, 2]), args(&[2, 1]), false)]
    #[case::keyword(args(&[1]), args(&[1]).with_keyword("k", RuntimeValue::Int(1)), false)]
    fn test_simple_hash(#[case] a: Args, #[case] b: Args, #[case] equal: bool) {
        assert_eq!(simple_hash(&a) == simple_hash(&b), equal);
    }

    #[rstest]
    #[case::unchanged(args(&[1]), args(&[1]), false)]
    #[case::changed(args(&[1]), args(&[3]), true)]
    fn test_simple_compare(#[case] previous: Args, #[case] current: Args, #[case] stale: bool) {
        assert_eq!(simple_compare(&previous, &current), stale);
    }
}
