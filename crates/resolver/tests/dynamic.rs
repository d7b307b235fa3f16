//! Dynamic imports: one-shot resolves against an already-resolved host.

mod common;

use common::*;
use weft_model::namespace::{self, PACKAGE_NAMESPACE};
use weft_model::{Requirement, ResolveContext, Resource, ResourceBuilder, Wiring};
use weft_resolver::{ResolutionError, Resolver, StaticResolveContext};

fn dynamic_requirement(resource: &Resource) -> Requirement {
    resource
        .requirements()
        .into_iter()
        .find(namespace::is_dynamic)
        .expect("dynamic requirement")
}

#[test]
fn dynamic_import_discovers_a_new_wire() {
    let d1 = exporter(41, "d1", "d.pkg", v(1, 0, 0));
    let d2 = exporter(40, "d2", "d.pkg", v(2, 0, 0));
    let h = ResourceBuilder::new(1, "h", v(1, 0, 0))
        .dynamic_import(Some("d.pkg"))
        .build();

    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(d1.clone());
    ctx.add_resource(d2.clone());
    ctx.add_wiring(Wiring::from_wires(h.clone(), Vec::new()));

    let requirement = dynamic_requirement(&h);
    let matches = ctx.find_providers(&requirement);
    assert_eq!(matches[0].resource(), &d2, "d2 is preferred");

    let wire_map = Resolver::new()
        .resolve_dynamic(&ctx, &h, &requirement, matches)
        .unwrap();

    // The host gains exactly the dynamic wire; d2 resolves along with it.
    let host_wires = wires_of(&wire_map, &h);
    assert_eq!(host_wires.len(), 1);
    assert_eq!(host_wires[0].provider(), &d2);
    assert_eq!(host_wires[0].capability().package_name(), Some("d.pkg"));
    assert!(wires_of(&wire_map, &d2).is_empty());
    assert!(wire_map.get(&d1).is_none());
}

#[test]
fn dynamic_import_of_a_visible_package_is_rejected() {
    let d = exporter(2, "d", "x", v(1, 0, 0));
    let h = ResourceBuilder::new(1, "h", v(1, 0, 0))
        .export_package("x", v(1, 0, 0), &[])
        .dynamic_import(Some("x"))
        .build();

    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(d.clone());
    ctx.add_wiring(Wiring::from_wires(h.clone(), Vec::new()));

    let requirement = dynamic_requirement(&h);
    let matches = d.capabilities_in(PACKAGE_NAMESPACE);

    let error = Resolver::new()
        .resolve_dynamic(&ctx, &h, &requirement, matches)
        .unwrap_err();
    assert!(matches!(
        error,
        ResolutionError::DynamicImportShadowed { .. }
    ));
}

#[test]
fn dynamic_resolve_requires_package_candidates() {
    let provider = ResourceBuilder::new(2, "provider", v(1, 0, 0))
        .provide_bundle()
        .build();
    let h = ResourceBuilder::new(1, "h", v(1, 0, 0))
        .dynamic_import(None)
        .build();

    let mut ctx = StaticResolveContext::new();
    ctx.add_wiring(Wiring::from_wires(h.clone(), Vec::new()));

    let requirement = dynamic_requirement(&h);
    let matches = provider.capabilities_in(weft_model::namespace::BUNDLE_NAMESPACE);
    let error = Resolver::new()
        .resolve_dynamic(&ctx, &h, &requirement, matches)
        .unwrap_err();
    assert!(matches!(error, ResolutionError::InvalidDynamicRequirement));
}

#[test]
fn dynamic_resolve_of_an_unresolved_host_returns_nothing() {
    let d = exporter(2, "d", "x", v(1, 0, 0));
    let h = ResourceBuilder::new(1, "h", v(1, 0, 0))
        .dynamic_import(Some("x"))
        .build();

    // No wiring registered for h.
    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(d.clone());
    ctx.add_resource(h.clone());

    let requirement = dynamic_requirement(&h);
    let matches = d.capabilities_in(PACKAGE_NAMESPACE);
    let wire_map = Resolver::new()
        .resolve_dynamic(&ctx, &h, &requirement, matches)
        .unwrap();
    assert!(wire_map.is_empty());
}

#[test]
fn dynamic_provider_pulls_in_its_own_dependencies() {
    // The chosen provider is itself unresolved and needs q; its wires are
    // part of the returned map.
    let q = exporter(50, "q", "q", v(1, 0, 0));
    let d = ResourceBuilder::new(40, "d", v(1, 0, 0))
        .export_package("d.pkg", v(1, 0, 0), &[])
        .import_package("q")
        .build();
    let h = ResourceBuilder::new(1, "h", v(1, 0, 0))
        .dynamic_import(Some("d.pkg"))
        .build();

    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(q.clone());
    ctx.add_resource(d.clone());
    ctx.add_wiring(Wiring::from_wires(h.clone(), Vec::new()));

    let requirement = dynamic_requirement(&h);
    let matches = ctx.find_providers(&requirement);
    let wire_map = Resolver::new()
        .resolve_dynamic(&ctx, &h, &requirement, matches)
        .unwrap();

    assert_eq!(wires_of(&wire_map, &h).len(), 1);
    assert_package_wire(&wire_map, &d, &q, "q");
    assert_wire_map_invariants(&wire_map);
}
