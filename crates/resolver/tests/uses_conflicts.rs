//! Uses-constraint conflicts: backtracking permutations, multiple
//! cardinality relaxation, and diagnostic rendering.

mod common;

use common::*;
use weft_model::namespace::PACKAGE_NAMESPACE;
use weft_model::{Filter, ResourceBuilder};
use weft_resolver::{ResolutionError, Resolver, StaticResolveContext};

/// Exports `p` at `p_version` with `uses:=q`, and imports `q` pinned to
/// `[q_min, q_max)`.
fn p_provider(id: u64, name: &str, p_version: (u32, u32, u32), q_range: (u32, u32)) -> weft_model::Resource {
    ResourceBuilder::new(id, name, v(1, 0, 0))
        .export_package("p", v(p_version.0, p_version.1, p_version.2), &["q"])
        .import_package_range("q", v(q_range.0, 0, 0), Some(v(q_range.1, 0, 0)))
        .build()
}

#[test]
fn uses_conflict_forces_backtracking_onto_a_consistent_pair() {
    // Both providers of p pin q to 1.x through their uses constraint, while
    // the consumer would prefer q 2.0. The resolver must backtrack on the
    // consumer's q import.
    let a1 = p_provider(10, "a1", (2, 0, 0), (1, 2));
    let a2 = p_provider(11, "a2", (1, 0, 0), (1, 2));
    let q1 = exporter(12, "q1", "q", v(1, 0, 0));
    let q2 = exporter(13, "q2", "q", v(2, 0, 0));
    let b = ResourceBuilder::new(1, "b", v(1, 0, 0))
        .import_package("p")
        .import_package("q")
        .build();

    let mut ctx = StaticResolveContext::new();
    for resource in [&a1, &a2, &q1, &q2] {
        ctx.add_resource(resource.clone());
    }
    ctx.add_mandatory(b.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    // b ends on a consistent pair: p from a1 (the preferred provider) and q
    // from q1, the provider a1's uses constraint pins.
    assert_package_wire(&wire_map, &b, &a1, "p");
    assert_package_wire(&wire_map, &b, &q1, "q");
    assert_package_wire(&wire_map, &a1, &q1, "q");
    assert_wire_map_invariants(&wire_map);
}

#[test]
fn unsolvable_uses_conflict_reports_both_chains() {
    // Single candidates everywhere: no permutation can fix the conflict
    // between b's q 2.x import and a1's uses-pinned q 1.x.
    let a1 = p_provider(10, "a1", (1, 0, 0), (1, 2));
    let q1 = exporter(12, "q1", "q", v(1, 0, 0));
    let q2 = exporter(13, "q2", "q", v(2, 0, 0));
    let b = ResourceBuilder::new(1, "b", v(1, 0, 0))
        .import_package("p")
        .import_package_range("q", v(2, 0, 0), Some(v(3, 0, 0)))
        .build();

    let mut ctx = StaticResolveContext::new();
    for resource in [&a1, &q1, &q2] {
        ctx.add_resource(resource.clone());
    }
    ctx.add_mandatory(b.clone());

    let error = Resolver::new().resolve(&ctx).unwrap_err();
    let message = error.to_string();
    assert!(message.contains("Uses constraint violation"), "{}", message);
    assert!(message.contains("exposed to package 'q'"), "{}", message);
    assert!(message.contains("Chain 1:"), "{}", message);
    assert!(message.contains("Chain 2:"), "{}", message);
    assert!(message.contains("import:"), "{}", message);

    // The diagnostic names the conflicting root requirement.
    let roots = error.root_requirements();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].namespace(), PACKAGE_NAMESPACE);
}

#[test]
fn multiple_cardinality_drops_the_incompatible_provider() {
    // l binds every svc provider. y's svc capability pins q to 1.x via its
    // uses constraint, conflicting with l's q 2.0 import; the resolver drops
    // y from the binding instead of failing.
    let q1 = exporter(12, "q1", "q", v(1, 0, 0));
    let q2 = exporter(13, "q2", "q", v(2, 0, 0));
    let x = ResourceBuilder::new(20, "x", v(1, 0, 0))
        .capability("svc", weft_model::Attributes::new(), weft_model::Directives::new())
        .build();
    let y = {
        let mut directives = weft_model::Directives::new();
        directives.insert("uses".to_string(), "q".to_string());
        ResourceBuilder::new(21, "y", v(1, 0, 0))
            .capability("svc", weft_model::Attributes::new(), directives)
            .import_package_range("q", v(1, 0, 0), Some(v(2, 0, 0)))
            .build()
    };
    let z = ResourceBuilder::new(22, "z", v(1, 0, 0))
        .capability("svc", weft_model::Attributes::new(), weft_model::Directives::new())
        .build();
    let l = ResourceBuilder::new(1, "l", v(1, 0, 0))
        .import_package_range("q", v(2, 0, 0), None)
        .require_multiple("svc", Filter::Any)
        .build();

    let mut ctx = StaticResolveContext::new();
    for resource in [&q1, &q2, &x, &y, &z] {
        ctx.add_resource(resource.clone());
    }
    ctx.add_mandatory(l.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    let svc_providers: Vec<_> = wires_of(&wire_map, &l)
        .iter()
        .filter(|wire| wire.requirement().namespace() == "svc")
        .map(|wire| wire.provider().clone())
        .collect();
    assert!(svc_providers.contains(&x), "x should stay bound");
    assert!(svc_providers.contains(&z), "z should stay bound");
    assert!(!svc_providers.contains(&y), "y must be dropped from the binding");
    assert_package_wire(&wire_map, &l, &q2, "q");
    assert_wire_map_invariants(&wire_map);
}

#[test]
fn export_used_conflict_rewires_the_exporter_consumer() {
    // e exports q 3.0 and imports p; every p provider pins q elsewhere
    // through uses:=q, so e's own export conflicts with what it sees
    // through p. With a second p provider that does not use q, the
    // resolver backtracks onto it.
    let q1 = exporter(12, "q1", "q", v(1, 0, 0));
    let a1 = p_provider(10, "a1", (2, 0, 0), (1, 2));
    let a2 = ResourceBuilder::new(11, "a2", v(1, 0, 0))
        .export_package("p", v(1, 0, 0), &[])
        .build();
    let e = ResourceBuilder::new(1, "e", v(1, 0, 0))
        .export_package("q", v(3, 0, 0), &[])
        .import_package("p")
        .build();

    let mut ctx = StaticResolveContext::new();
    for resource in [&q1, &a1, &a2] {
        ctx.add_resource(resource.clone());
    }
    ctx.add_mandatory(e.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();
    // a1 (q-using) is incompatible with e's own q export; a2 is fine.
    assert_package_wire(&wire_map, &e, &a2, "p");
    assert_wire_map_invariants(&wire_map);
}
