//! End-to-end resolves over small module graphs: basic wiring, substitutable
//! exports, wire ordering, determinism, and idempotence.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use weft_model::namespace::{BUNDLE_NAMESPACE, PACKAGE_NAMESPACE};
use weft_model::{Filter, ResourceBuilder, Wiring};
use weft_resolver::{ResolutionError, Resolver, StaticResolveContext};

#[test]
fn single_import_wires_to_the_only_exporter() {
    let a = exporter(1, "a", "x", v(1, 0, 0));
    let b = importer(2, "b", "x");
    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(a.clone());
    ctx.add_mandatory(b.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    assert_package_wire(&wire_map, &b, &a, "x");
    assert_eq!(wires_of(&wire_map, &b).len(), 1);
    // The exporter resolved too, with no wires of its own.
    assert!(wires_of(&wire_map, &a).is_empty());
    assert_wire_map_invariants(&wire_map);
}

#[test]
fn missing_mandatory_requirement_is_fatal() {
    let b = importer(1, "b", "x");
    let mut ctx = StaticResolveContext::new();
    ctx.add_mandatory(b.clone());

    let error = Resolver::new().resolve(&ctx).unwrap_err();
    match error {
        ResolutionError::MissingRequirement { resource, .. } => assert_eq!(resource, b),
        other => panic!("expected MissingRequirement, got {}", other),
    }
}

#[test]
fn missing_optional_resource_is_skipped() {
    let a = exporter(1, "a", "x", v(1, 0, 0));
    let b = importer(2, "b", "x");
    let broken = importer(3, "broken", "no.such.package");
    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(a.clone());
    ctx.add_mandatory(b.clone());
    ctx.add_optional(broken.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();
    assert_package_wire(&wire_map, &b, &a, "x");
    assert!(wire_map.get(&broken).is_none());
}

#[test]
fn substitutable_export_defers_to_the_preferred_provider() {
    // S exports s 1.0 and also imports it; T's s 2.0 outranks S's own
    // export, so S's export is substituted away for every consumer.
    let s = ResourceBuilder::new(30, "s", v(1, 0, 0))
        .export_package("s", v(1, 0, 0), &[])
        .import_package("s")
        .build();
    let t = exporter(20, "t", "s", v(2, 0, 0));
    let u = importer(1, "u", "s");

    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(t.clone());
    ctx.add_mandatory(s.clone());
    ctx.add_mandatory(u.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    assert_package_wire(&wire_map, &u, &t, "s");
    assert_package_wire(&wire_map, &s, &t, "s");
    assert_wire_map_invariants(&wire_map);
}

#[test]
fn wires_are_ordered_package_then_bundle_then_generic() {
    let lib = ResourceBuilder::new(2, "lib", v(1, 0, 0))
        .provide_bundle()
        .export_package("x", v(1, 0, 0), &[])
        .capability("svc", weft_model::Attributes::new(), weft_model::Directives::new())
        .build();
    let app = ResourceBuilder::new(1, "app", v(1, 0, 0))
        .requirement("svc", Filter::Any, weft_model::Directives::new())
        .require_bundle("lib", false)
        .import_package("x")
        .build();

    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(lib.clone());
    ctx.add_mandatory(app.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();
    let namespaces: Vec<&str> = wires_of(&wire_map, &app)
        .iter()
        .map(|wire| wire.requirement().namespace())
        .collect();
    assert_eq!(namespaces, vec![PACKAGE_NAMESPACE, BUNDLE_NAMESPACE, "svc"]);
    assert_wire_map_invariants(&wire_map);
}

#[test]
fn resolve_is_deterministic() {
    let a1 = exporter(1, "a1", "x", v(1, 0, 0));
    let a2 = exporter(2, "a2", "x", v(1, 0, 0));
    let b = importer(3, "b", "x");
    let c = importer(4, "c", "x");
    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(a1);
    ctx.add_resource(a2);
    ctx.add_mandatory(b);
    ctx.add_mandatory(c);

    let first = Resolver::new().resolve(&ctx).unwrap();
    let second = Resolver::new().resolve(&ctx).unwrap();
    assert_eq!(first, second);
}

#[test]
fn resolving_an_already_resolved_context_yields_an_empty_delta() {
    let a = exporter(1, "a", "x", v(1, 0, 0));
    let b = importer(2, "b", "x");
    let mut ctx = StaticResolveContext::new();
    ctx.add_resource(a.clone());
    ctx.add_mandatory(b.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();

    // Feed the result back as existing wirings.
    let mut resolved_ctx = StaticResolveContext::new();
    for (resource, wires) in &wire_map {
        resolved_ctx.add_wiring(Wiring::from_wires(resource.clone(), wires.clone()));
    }
    resolved_ctx.add_mandatory(b.clone());

    let delta = Resolver::new().resolve(&resolved_ctx).unwrap();
    assert!(delta.is_empty(), "expected empty delta, got {:?} entries", delta.len());
}

#[test]
fn self_wires_are_suppressed_in_wiring_namespaces() {
    // A resource that can satisfy its own import keeps the import wire off
    // the result rather than wiring to itself.
    let s = ResourceBuilder::new(1, "s", v(1, 0, 0))
        .export_package("s", v(1, 0, 0), &[])
        .import_package("s")
        .build();
    let mut ctx = StaticResolveContext::new();
    ctx.add_mandatory(s.clone());

    let wire_map = Resolver::new().resolve(&ctx).unwrap();
    assert!(wires_of(&wire_map, &s).is_empty());
}
