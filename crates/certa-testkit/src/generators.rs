//! Proptest generators for property-based testing.

use proptest::prelude::*;

use certa_core::{AccessStructure, Address, Attribute};

/// Generate a random address.
pub fn address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from_bytes)
}

/// Generate a valid attribute name, including comparison-style names.
pub fn attribute() -> impl Strategy<Value = Attribute> {
    "[a-z][a-z0-9]{0,5}([=<>][A-Za-z0-9]{1,3})?"
        .prop_filter("keyword", |s| !matches!(s.as_str(), "and" | "or" | "of"))
        .prop_map(|s| Attribute::new(s).unwrap())
}

/// A fixed pool of `n` distinct attributes `a0`, `a1`, ...
pub fn attribute_pool(n: usize) -> Vec<Attribute> {
    (0..n)
        .map(|i| Attribute::new(format!("a{}", i)).unwrap())
        .collect()
}

/// Generate a policy whose leaves are drawn from `pool`.
pub fn policy_over(pool: Vec<Attribute>) -> impl Strategy<Value = AccessStructure> {
    let leaf = prop::sample::select(pool).prop_map(AccessStructure::Leaf);
    leaf.prop_recursive(3, 16, 3, |inner| {
        prop::collection::vec(inner, 1..4).prop_flat_map(|children| {
            let n = children.len();
            (1..=n).prop_map(move |threshold| AccessStructure::Gate {
                threshold,
                children: children.clone(),
            })
        })
    })
}

/// Generate which members of a pool of `n` are held.
pub fn held_mask(n: usize) -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(any::<bool>(), n)
}
