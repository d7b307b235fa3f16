//! Shared builders and assertions for the resolver scenario tests.

#![allow(dead_code)]

use weft_model::namespace::PACKAGE_NAMESPACE;
use weft_model::{Resource, ResourceBuilder, Version, Wire};
use weft_resolver::WireMap;

pub fn v(major: u32, minor: u32, micro: u32) -> Version {
    Version::new(major, minor, micro)
}

/// A resource exporting a single package.
pub fn exporter(id: u64, name: &str, package: &str, version: Version) -> Resource {
    ResourceBuilder::new(id, name, v(1, 0, 0))
        .export_package(package, version, &[])
        .build()
}

/// A resource importing a single package at any version.
pub fn importer(id: u64, name: &str, package: &str) -> Resource {
    ResourceBuilder::new(id, name, v(1, 0, 0))
        .import_package(package)
        .build()
}

/// The wires of `resource` in the result.
pub fn wires_of<'a>(wire_map: &'a WireMap, resource: &Resource) -> &'a [Wire] {
    wire_map
        .get(resource)
        .map(Vec::as_slice)
        .unwrap_or_else(|| panic!("no entry for {}", resource))
}

/// Asserts a single package wire from `requirer` to `provider` for
/// `package`.
pub fn assert_package_wire(wire_map: &WireMap, requirer: &Resource, provider: &Resource, package: &str) {
    let found = wires_of(wire_map, requirer).iter().any(|wire| {
        wire.provider() == provider
            && wire.requirement().namespace() == PACKAGE_NAMESPACE
            && wire.capability().package_name() == Some(package)
    });
    assert!(
        found,
        "expected {} to wire package '{}' to {}",
        requirer, package, provider
    );
}

/// Invariants that hold for every successful resolve: each wire's
/// capability satisfies its requirement, and no resource imports one
/// package from two providers.
pub fn assert_wire_map_invariants(wire_map: &WireMap) {
    for (resource, wires) in wire_map {
        let mut seen_packages = Vec::new();
        for wire in wires {
            assert!(
                wire.requirement().matches(wire.capability()),
                "wire of {} does not satisfy its requirement: {}",
                resource,
                wire
            );
            if wire.requirement().namespace() == PACKAGE_NAMESPACE {
                if let Some(package) = wire.capability().package_name() {
                    assert!(
                        !seen_packages.contains(&package.to_string()),
                        "{} has two package wires for '{}'",
                        resource,
                        package
                    );
                    seen_packages.push(package.to_string());
                }
            }
        }
    }
}
