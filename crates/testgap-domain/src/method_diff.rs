//! Structural difference between two sets of parsed methods.

use std::collections::BTreeSet;

use crate::ParsedMethod;

/// Methods of `new` whose structural identity does not occur in `old`.
///
/// Line and column are ignored, so a method that only moved because of
/// edits elsewhere in its file is not reported.
pub fn new_or_changed<'a, O, N>(old: O, new: N) -> BTreeSet<ParsedMethod>
where
    O: IntoIterator<Item = &'a ParsedMethod>,
    N: IntoIterator<Item = ParsedMethod>,
{
    let known: BTreeSet<_> = old.into_iter().map(ParsedMethod::identity).collect();
    new.into_iter()
        .filter(|method| !known.contains(&method.identity()))
        .collect()
}

/// Remove getter/setter shaped methods, returning the survivors and the
/// number removed.
pub fn drop_accessors(methods: BTreeSet<ParsedMethod>) -> (BTreeSet<ParsedMethod>, usize) {
    let (accessors, kept): (BTreeSet<_>, BTreeSet<_>) =
        methods.into_iter().partition(ParsedMethod::is_accessor);
    (kept, accessors.len())
}
