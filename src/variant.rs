//! Variant resolution: which placeholders are bound to what
//!
//! A [`Variant`] is an immutable snapshot. Binding produces a new one, and a
//! fully bound variant has a discriminator suffix that keys the compiled
//! entry. Binding order never shows in the suffix.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::ast::Group;
use crate::decorated::Decorated;
use crate::error::{TurboError, TurboResult};
use crate::types::{ConstValue, Placeholder, TypeArg};
use crate::value::Value;

impl Group {
    pub fn contains(&self, arg: &TypeArg) -> bool {
        match (self, arg) {
            (Group::Members(members), arg) => members.contains(arg),
            (Group::Range(range), TypeArg::Obj(ConstValue::Int(n))) => range.contains(n),
            (Group::Range(_), _) => false,
        }
    }

    pub fn members(&self) -> Vec<TypeArg> {
        match self {
            Group::Members(members) => members.clone(),
            Group::Range(range) => range.clone().map(TypeArg::from).collect(),
        }
    }

    /// `5to9` for a range, otherwise sorted member discriminators joined by `ET`
    pub fn discriminator(&self) -> String {
        match self {
            Group::Range(range) if !range.is_empty() => format!("{}to{}", range.start, range.end - 1),
            _ => {
                let mut members = self.members();
                members.sort_by(compare_args);
                members
                    .iter()
                    .map(TypeArg::discriminator)
                    .collect::<Vec<_>>()
                    .join("ET")
            }
        }
    }
}

fn compare_args(a: &TypeArg, b: &TypeArg) -> Ordering {
    match (a, b) {
        (TypeArg::Obj(x), TypeArg::Obj(y)) => x.sort_cmp(y),
        _ => a.discriminator().cmp(&b.discriminator()),
    }
}

/// Group sets declared per placeholder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSets {
    groups: BTreeMap<Placeholder, Vec<Group>>,
}

impl GroupSets {
    pub fn new(groups: impl IntoIterator<Item = (Placeholder, Group)>) -> Self {
        let mut sets = Self::default();
        for (placeholder, group) in groups {
            sets.groups.entry(placeholder).or_default().push(group);
        }
        sets
    }

    pub fn groups(&self, placeholder: Placeholder) -> &[Group] {
        self.groups.get(&placeholder).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The group containing `arg`, if any
    pub fn group_of(&self, placeholder: Placeholder, arg: &TypeArg) -> Option<&Group> {
        self.groups(placeholder).iter().find(|g| g.contains(arg))
    }

    /// Every value sharing a compiled unit with `arg`
    pub fn spread(&self, placeholder: Placeholder, arg: &TypeArg) -> Vec<TypeArg> {
        match self.group_of(placeholder, arg) {
            Some(group) => group.members(),
            None => vec![arg.clone()],
        }
    }

    pub fn group_discriminator(&self, placeholder: Placeholder, arg: &TypeArg) -> String {
        match self.group_of(placeholder, arg) {
            Some(group) => group.discriminator(),
            None => arg.discriminator(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    bindings: BTreeMap<Placeholder, TypeArg>,
    unbound: BTreeSet<Placeholder>,
}

impl Variant {
    /// Nothing bound yet
    pub fn new(placeholders: &BTreeSet<Placeholder>) -> Self {
        Self {
            bindings: BTreeMap::new(),
            unbound: placeholders.clone(),
        }
    }

    pub fn from_bindings(bindings: BTreeMap<Placeholder, TypeArg>, unbound: BTreeSet<Placeholder>) -> Self {
        Self { bindings, unbound }
    }

    pub fn arg(&self, placeholder: Placeholder) -> Option<&TypeArg> {
        self.bindings.get(&placeholder)
    }

    pub fn bindings(&self) -> &BTreeMap<Placeholder, TypeArg> {
        &self.bindings
    }

    pub fn unbound(&self) -> &BTreeSet<Placeholder> {
        &self.unbound
    }

    pub fn is_complete(&self) -> bool {
        self.unbound.is_empty()
    }

    /// Bind one more placeholder
    pub fn spinoff(&self, placeholder: Placeholder, arg: TypeArg) -> TurboResult<Variant> {
        if let Some(current) = self.bindings.get(&placeholder) {
            return Err(TurboError::AlreadyBound {
                placeholder,
                current: current.clone(),
                given: arg,
            });
        }
        if !self.unbound.contains(&placeholder) {
            return Err(TurboError::NoSuchPlaceholder { placeholder });
        }
        let mut next = self.clone();
        next.unbound.remove(&placeholder);
        next.bindings.insert(placeholder, arg);
        Ok(next)
    }

    /// Bind every remaining placeholder from the runtime arguments
    pub fn complete(&self, decorated: &Decorated, args: &[Value]) -> TurboResult<Variant> {
        if !decorated.dynamic() {
            return Err(TurboError::NotDynamic {
                function: decorated.name().to_string(),
            });
        }
        let mut next = self.clone();
        for &placeholder in &self.unbound {
            let uninferable = |reason: String| TurboError::Uninferable {
                placeholder,
                function: decorated.name().to_string(),
                reason,
            };
            let mut inferred: Option<TypeArg> = None;
            for (position, resolver) in decorated.resolvers(placeholder) {
                let Some(value) = args.get(*position) else {
                    continue;
                };
                let given = resolver.resolve(value).map_err(|reason| {
                    uninferable(format!("argument {}: {}", position, reason))
                })?;
                match &inferred {
                    Some(current) if *current != given => {
                        return Err(TurboError::AlreadyBound {
                            placeholder,
                            current: current.clone(),
                            given,
                        })
                    }
                    Some(_) => {}
                    None => inferred = Some(given),
                }
            }
            let arg = inferred.ok_or_else(|| uninferable("no argument supplies it".into()))?;
            next.unbound.remove(&placeholder);
            next.bindings.insert(placeholder, arg);
        }
        Ok(next)
    }

    /// `_<disc>` per binding in placeholder order, once complete
    pub fn suffix(&self) -> Option<String> {
        self.is_complete().then(|| {
            self.bindings
                .values()
                .map(|arg| format!("_{}", arg.discriminator()))
                .collect()
        })
    }

    /// Suffix naming the compiled unit shared by a whole group
    pub fn group_suffix(&self, groups: &GroupSets) -> Option<String> {
        self.is_complete().then(|| {
            self.bindings
                .iter()
                .map(|(p, arg)| format!("_{}", groups.group_discriminator(*p, arg)))
                .collect()
        })
    }

    /// Suffix of a variant that must be complete by now
    pub fn complete_suffix(&self) -> TurboResult<String> {
        self.suffix().ok_or_else(|| self.incomplete())
    }

    pub fn complete_group_suffix(&self, groups: &GroupSets) -> TurboResult<String> {
        self.group_suffix(groups).ok_or_else(|| self.incomplete())
    }

    fn incomplete(&self) -> TurboError {
        let unbound: Vec<String> = self.unbound.iter().map(ToString::to_string).collect();
        TurboError::Incomplete {
            unbound: unbound.join(", "),
        }
    }

    /// Every variant sharing this one's compiled unit, this one included
    pub fn group_variants(&self, groups: &GroupSets) -> Vec<Variant> {
        let mut variants = vec![BTreeMap::new()];
        for (&placeholder, arg) in &self.bindings {
            let spread = groups.spread(placeholder, arg);
            variants = variants
                .into_iter()
                .flat_map(|partial: BTreeMap<Placeholder, TypeArg>| {
                    spread.iter().map(move |member| {
                        let mut bindings = partial.clone();
                        bindings.insert(placeholder, member.clone());
                        bindings
                    })
                })
                .collect();
        }
        variants
            .into_iter()
            .map(|bindings| Variant::from_bindings(bindings, self.unbound.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;
    use pretty_assertions::assert_eq;

    fn placeholders(ps: &[Placeholder]) -> BTreeSet<Placeholder> {
        ps.iter().copied().collect()
    }

    #[test]
    fn test_spinoff_and_suffix() {
        let v = Variant::new(&placeholders(&[Placeholder::T, Placeholder::U]));
        assert_eq!(v.suffix(), None);
        let v = v.spinoff(Placeholder::U, ScalarType::Int32.into()).unwrap();
        assert!(!v.is_complete());
        let v = v.spinoff(Placeholder::T, ScalarType::Float32.into()).unwrap();
        assert_eq!(v.suffix().unwrap(), "_float32_int32");
    }

    #[test]
    fn test_binding_order_irrelevant() {
        let start = Variant::new(&placeholders(&[Placeholder::T, Placeholder::X]));
        let a = start
            .spinoff(Placeholder::T, ScalarType::Int8.into())
            .and_then(|v| v.spinoff(Placeholder::X, TypeArg::from(4i64)))
            .unwrap();
        let b = start
            .spinoff(Placeholder::X, TypeArg::from(4i64))
            .and_then(|v| v.spinoff(Placeholder::T, ScalarType::Int8.into()))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.suffix().unwrap(), "_int8_4");
    }

    #[test]
    fn test_incomplete_suffix_names_unbound() {
        let v = Variant::new(&placeholders(&[Placeholder::T, Placeholder::X, Placeholder::U]))
            .spinoff(Placeholder::U, ScalarType::Int8.into())
            .unwrap();
        match v.complete_suffix() {
            Err(TurboError::Incomplete { unbound }) => assert_eq!(unbound, "T, X"),
            other => panic!("expected Incomplete, got {:?}", other),
        }
        assert!(matches!(
            v.complete_group_suffix(&GroupSets::default()),
            Err(TurboError::Incomplete { .. })
        ));
        let v = v.spinoff(Placeholder::T, ScalarType::Int8.into()).unwrap();
        let v = v.spinoff(Placeholder::X, TypeArg::from(2i64)).unwrap();
        assert_eq!(v.complete_suffix().unwrap(), "_int8_int8_2");
    }

    #[test]
    fn test_rebinding_rejected() {
        let v = Variant::new(&placeholders(&[Placeholder::T]))
            .spinoff(Placeholder::T, ScalarType::Int8.into())
            .unwrap();
        match v.spinoff(Placeholder::T, ScalarType::Int8.into()) {
            Err(TurboError::AlreadyBound { placeholder, current, given }) => {
                assert_eq!(placeholder, Placeholder::T);
                assert_eq!(current, TypeArg::Type(ScalarType::Int8));
                assert_eq!(given, TypeArg::Type(ScalarType::Int8));
            }
            other => panic!("expected AlreadyBound, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_placeholder() {
        let v = Variant::new(&placeholders(&[Placeholder::T]));
        assert!(matches!(
            v.spinoff(Placeholder::Z, ScalarType::Int8.into()),
            Err(TurboError::NoSuchPlaceholder { placeholder: Placeholder::Z })
        ));
    }

    #[test]
    fn test_range_group() {
        let groups = GroupSets::new([(Placeholder::X, Group::Range(5..10))]);
        let v = Variant::new(&placeholders(&[Placeholder::X]))
            .spinoff(Placeholder::X, TypeArg::from(6i64))
            .unwrap();
        assert_eq!(v.suffix().unwrap(), "_6");
        assert_eq!(v.group_suffix(&groups).unwrap(), "_5to9");
        let suffixes: Vec<String> = v
            .group_variants(&groups)
            .iter()
            .filter_map(Variant::suffix)
            .collect();
        assert_eq!(suffixes, vec!["_5", "_6", "_7", "_8", "_9"]);

        let outside = Variant::new(&placeholders(&[Placeholder::X]))
            .spinoff(Placeholder::X, TypeArg::from(10i64))
            .unwrap();
        assert_eq!(outside.group_suffix(&groups).unwrap(), "_10");
        assert_eq!(outside.group_variants(&groups).len(), 1);
    }

    #[test]
    fn test_member_group() {
        let group = Group::Members(vec![ScalarType::Float64.into(), ScalarType::Float32.into()]);
        let groups = GroupSets::new([(Placeholder::T, group)]);
        let v = Variant::new(&placeholders(&[Placeholder::T, Placeholder::U]))
            .spinoff(Placeholder::T, ScalarType::Float64.into())
            .and_then(|v| v.spinoff(Placeholder::U, ScalarType::Int8.into()))
            .unwrap();
        assert_eq!(v.group_suffix(&groups).unwrap(), "_float32ETfloat64_int8");
        assert_eq!(v.group_variants(&groups).len(), 2);
    }

    #[test]
    fn test_const_members_sort_by_value() {
        let group = Group::Members(vec![TypeArg::from(10i64), TypeArg::from(9i64)]);
        assert_eq!(group.discriminator(), "9ET10");
    }
}
